//! Typed event bus.
//!
//! Every classified change fans out to six notifications, in this order:
//!
//! ```text
//! <name>:store:<kind>
//! <name>:store:<kind>:<type>
//! <name>:store:<kind>:<type>:<id>
//! <name>:store:change                  (carries <kind>)
//! <name>:store:change:<type>
//! <name>:store:change:<type>:<id>
//! ```
//!
//! Consumers subscribe at whichever granularity they need. Keys are
//! structured; the `Display` impl renders the string names above.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use tether_core::{ChangeKind, Record};

/// Type segment used for records that have no type, e.g.
/// `store:add:undefined:<id>`.
pub const UNTYPED: &str = "undefined";

/// Store-level event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTopic {
    Add,
    Update,
    Remove,
    /// Generic change; the event carries the concrete kind.
    Change,
}

impl StoreTopic {
    pub const fn as_str(&self) -> &'static str {
        match self {
            StoreTopic::Add => "add",
            StoreTopic::Update => "update",
            StoreTopic::Remove => "remove",
            StoreTopic::Change => "change",
        }
    }
}

impl From<ChangeKind> for StoreTopic {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Add => StoreTopic::Add,
            ChangeKind::Update => StoreTopic::Update,
            ChangeKind::Remove => StoreTopic::Remove,
        }
    }
}

/// Error signals raised by the pull loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTopic {
    Unauthenticated,
    Server,
}

impl ErrorTopic {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorTopic::Unauthenticated => "unauthenticated",
            ErrorTopic::Server => "server",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Store {
        topic: StoreTopic,
        record_type: Option<String>,
        id: Option<String>,
    },
    Error(ErrorTopic),
}

/// Structured event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    /// Store name; `None` for an unnamed engine.
    pub scope: Option<String>,
    pub topic: Topic,
}

impl EventKey {
    /// Unscoped store event, e.g. `store:add`.
    pub fn store(scope: Option<&str>, topic: StoreTopic) -> Self {
        Self {
            scope: scope.map(str::to_string),
            topic: Topic::Store {
                topic,
                record_type: None,
                id: None,
            },
        }
    }

    /// Error event, e.g. `error:unauthenticated`.
    pub fn error(scope: Option<&str>, topic: ErrorTopic) -> Self {
        Self {
            scope: scope.map(str::to_string),
            topic: Topic::Error(topic),
        }
    }

    /// Narrow a store event to a record type.
    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        if let Topic::Store { record_type: t, .. } = &mut self.topic {
            *t = Some(record_type.into());
        }
        self
    }

    /// Narrow a typed store event to a single record.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        if let Topic::Store { id: i, .. } = &mut self.topic {
            *i = Some(id.into());
        }
        self
    }

    /// The six keys a change to `record` is published under, in order.
    ///
    /// A record without a type is scoped under [`UNTYPED`].
    pub fn fan_out(scope: Option<&str>, kind: ChangeKind, record: &Record) -> Vec<EventKey> {
        let record_type = record.record_type.as_deref().unwrap_or(UNTYPED);
        let mut keys = Vec::with_capacity(6);
        for topic in [StoreTopic::from(kind), StoreTopic::Change] {
            let base = EventKey::store(scope, topic);
            let typed = base.clone().with_type(record_type);
            keys.push(base);
            keys.push(typed.clone());
            keys.push(typed.with_id(record.id.clone()));
        }
        keys
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.scope {
            write!(f, "{}:", scope)?;
        }
        match &self.topic {
            Topic::Store {
                topic,
                record_type,
                id,
            } => {
                write!(f, "store:{}", topic.as_str())?;
                if let Some(record_type) = record_type {
                    write!(f, ":{}", record_type)?;
                    if let Some(id) = id {
                        write!(f, ":{}", id)?;
                    }
                }
                Ok(())
            }
            Topic::Error(topic) => write!(f, "error:{}", topic.as_str()),
        }
    }
}

/// Event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A classified change. Both the kind-specific and the generic `change`
    /// notifications carry the kind.
    Change { kind: ChangeKind, record: Record },
    Error { topic: ErrorTopic, message: String },
}

/// A handler refused or failed to process an event.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

impl DeliveryError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// A failed delivery, reported back to whoever emitted the event.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub key: EventKey,
    pub error: DeliveryError,
}

/// Receives events.
///
/// Closures `Fn(&EventKey, &Event) -> Result<(), DeliveryError>` implement
/// this trait.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, key: &EventKey, event: &Event) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&EventKey, &Event) -> Result<(), DeliveryError> + Send + Sync,
{
    async fn handle(&self, key: &EventKey, event: &Event) -> Result<(), DeliveryError> {
        self(key, event)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handlers = Vec<(SubscriptionId, Arc<dyn EventHandler>)>;

/// Dispatch table from event keys to handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKey, Handlers>>,
    /// Handlers receiving every event.
    global: RwLock<Handlers>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one exact key.
    pub fn subscribe(&self, key: EventKey, handler: impl EventHandler + 'static) -> SubscriptionId {
        let id = self.next_id();
        self.handlers
            .write()
            .entry(key)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self, handler: impl EventHandler + 'static) -> SubscriptionId {
        let id = self.next_id();
        self.global.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut global = self.global.write();
        let before = global.len();
        global.retain(|(sub, _)| *sub != id);
        if global.len() != before {
            return true;
        }
        drop(global);

        let mut handlers = self.handlers.write();
        let mut removed = false;
        handlers.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|(sub, _)| *sub != id);
            removed |= subs.len() != before;
            !subs.is_empty()
        });
        removed
    }

    /// Deliver an event to the handlers of `key` and then to the global
    /// handlers. Failures are collected, never short-circuit delivery.
    pub async fn emit(&self, key: &EventKey, event: &Event) -> Vec<DeliveryFailure> {
        let targets: Handlers = {
            let handlers = self.handlers.read();
            let global = self.global.read();
            handlers
                .get(key)
                .into_iter()
                .flatten()
                .chain(global.iter())
                .cloned()
                .collect()
        };

        let mut failures = Vec::new();
        for (_, handler) in targets {
            if let Err(error) = handler.handle(key, event).await {
                tracing::warn!(event = %key, %error, "event delivery failed");
                failures.push(DeliveryFailure {
                    key: key.clone(),
                    error,
                });
            }
        }
        failures
    }

    /// Publish a classified change under all six keys.
    pub async fn emit_change(
        &self,
        scope: Option<&str>,
        kind: ChangeKind,
        record: &Record,
    ) -> Vec<DeliveryFailure> {
        let event = Event::Change {
            kind,
            record: record.clone(),
        };
        let mut failures = Vec::new();
        for key in EventKey::fan_out(scope, kind, record) {
            failures.extend(self.emit(&key, &event).await);
        }
        failures
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}
