//! Configuration for the sync engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// How long a long-poll request may stay open before it is aborted and
/// reissued. Intermediaries tend to kill idle connections well before the
/// server would answer.
pub const PULL_RESTART_AFTER: Duration = Duration::from_secs(25);

/// Fixed delay before retrying a failed pull.
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Heartbeat interval requested from the change feed, in milliseconds.
pub const HEARTBEAT_MS: u64 = 10_000;

/// Which directions are synced continuously once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "SyncOption", into = "SyncOption")]
pub enum SyncMode {
    #[default]
    Off,
    /// Continuous in both directions.
    Sync,
    PullOnly,
    PushOnly,
}

impl SyncMode {
    /// Build from per-direction flags.
    pub const fn from_flags(pull: bool, push: bool) -> Self {
        match (pull, push) {
            (true, true) => SyncMode::Sync,
            (true, false) => SyncMode::PullOnly,
            (false, true) => SyncMode::PushOnly,
            (false, false) => SyncMode::Off,
        }
    }

    /// Whether the pull loop restarts itself.
    pub const fn pulls(&self) -> bool {
        matches!(self, SyncMode::Sync | SyncMode::PullOnly)
    }

    /// Whether local changes are pushed as they happen.
    pub const fn pushes(&self) -> bool {
        matches!(self, SyncMode::Sync | SyncMode::PushOnly)
    }

    /// Whether anything is synced at all.
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, SyncMode::Off)
    }
}

/// The `sync` option as it appears in JSON: `true`, `false` or
/// `{"pull": bool, "push": bool}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum SyncOption {
    Flag(bool),
    Directions {
        #[serde(default)]
        pull: bool,
        #[serde(default)]
        push: bool,
    },
}

impl From<SyncOption> for SyncMode {
    fn from(option: SyncOption) -> Self {
        match option {
            SyncOption::Flag(on) => SyncMode::from_flags(on, on),
            SyncOption::Directions { pull, push } => SyncMode::from_flags(pull, push),
        }
    }
}

impl From<SyncMode> for SyncOption {
    fn from(mode: SyncMode) -> Self {
        match mode {
            SyncMode::Sync => SyncOption::Flag(true),
            SyncMode::Off => SyncOption::Flag(false),
            other => SyncOption::Directions {
                pull: other.pulls(),
                push: other.pushes(),
            },
        }
    }
}

/// Configuration recognized when an engine is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Prefixes request paths (`/<name>/...`) and namespaces events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Document id prefix, independent of the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Sync mode applied on start.
    #[serde(default)]
    pub sync: SyncMode,
}

impl SyncConfig {
    /// Creates an unnamed, unprefixed configuration with syncing off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON options shape.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SyncError::InvalidMessage(format!("sync config: {}", e)))
    }

    /// Sets the store name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the document id prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the sync mode.
    pub fn with_sync(mut self, sync: SyncMode) -> Self {
        self.sync = sync;
        self
    }
}
