//! Transport abstraction for the remote document store.
//!
//! The engine never opens connections itself. It hands a method, a path and
//! request options to a [`Transport`] and gets back a decoded JSON body or a
//! [`SyncError`]. Connection handling, auth headers and timeouts below the
//! change feed watchdog belong to the implementation.
//!
//! Cancellation is done by dropping the returned future, which is what the
//! engine does when it aborts an in-flight request.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// HTTP methods the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options passed along with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// JSON body, if any.
    pub data: Option<Value>,
    pub content_type: String,
    /// Expected response type.
    pub data_type: String,
    /// Whether the transport may re-encode `data` (never for JSON bodies).
    pub process_data: bool,
}

impl RequestOptions {
    /// JSON request without a body.
    pub fn json() -> Self {
        Self {
            data: None,
            content_type: "application/json".into(),
            data_type: "json".into(),
            process_data: false,
        }
    }

    /// Attach a JSON body.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::json()
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

/// Transport trait for talking to the remote store.
///
/// Implementations must be thread-safe (Send + Sync). Non-success statuses
/// are reported as errors built with [`SyncError::from_status`], network
/// failures as [`SyncError::TransportError`].
///
/// [`SyncError::from_status`]: crate::error::SyncError::from_status
/// [`SyncError::TransportError`]: crate::error::SyncError::TransportError
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, path: &str, options: RequestOptions)
        -> Result<Response>;
}

/// A scripted transport for testing.
///
/// Replies are queued per `METHOD path` (query string ignored). A request
/// with nothing queued waits until a reply is queued, which is how a held
/// long-poll request behaves.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    use crate::error::SyncError;

    /// What the mock answers with.
    #[derive(Debug, Clone)]
    pub enum MockReply {
        Json(Value),
        Status(u16),
        NetworkError(String),
    }

    impl MockReply {
        fn into_result(self) -> Result<Response> {
            match self {
                MockReply::Json(body) => Ok(Response::ok(body)),
                MockReply::Status(status) => Err(SyncError::from_status(
                    status,
                    format!("mock status {}", status),
                )),
                MockReply::NetworkError(message) => Err(SyncError::TransportError(message)),
            }
        }
    }

    /// A request the mock has seen.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: Method,
        pub path: String,
        pub body: Option<Value>,
        pub at: Instant,
    }

    #[derive(Default)]
    struct MockState {
        queued: HashMap<String, VecDeque<MockReply>>,
        sticky: HashMap<String, MockReply>,
        requests: Vec<RecordedRequest>,
    }

    #[derive(Default)]
    struct Shared {
        state: Mutex<MockState>,
        reply_queued: Notify,
        request_made: Notify,
    }

    /// Scripted transport. Clones share the same script and request log.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        shared: Arc<Shared>,
    }

    fn route(method: Method, path: &str) -> String {
        let path = path.split('?').next().unwrap_or(path);
        format!("{} {}", method, path)
    }

    impl MockTransport {
        /// Create a transport with nothing scripted.
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a one-shot reply.
        pub fn reply(&self, method: Method, path: &str, reply: MockReply) {
            self.shared
                .state
                .lock()
                .queued
                .entry(route(method, path))
                .or_default()
                .push_back(reply);
            self.shared.reply_queued.notify_waiters();
        }

        /// Answer every request on this route with `reply` once the queue is
        /// empty.
        pub fn always(&self, method: Method, path: &str, reply: MockReply) {
            self.shared
                .state
                .lock()
                .sticky
                .insert(route(method, path), reply);
            self.shared.reply_queued.notify_waiters();
        }

        /// Every request seen so far.
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.shared.state.lock().requests.clone()
        }

        /// Requests whose path (without query) equals `path`.
        pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
            self.requests()
                .into_iter()
                .filter(|r| r.path.split('?').next() == Some(path))
                .collect()
        }

        /// Wait until at least `count` requests have been made.
        pub async fn wait_for_requests(&self, count: usize) {
            loop {
                let notified = self.shared.request_made.notified();
                if self.shared.state.lock().requests.len() >= count {
                    return;
                }
                notified.await;
            }
        }

        fn next_reply(&self, key: &str) -> Option<MockReply> {
            let mut state = self.shared.state.lock();
            if let Some(reply) = state.queued.get_mut(key).and_then(VecDeque::pop_front) {
                return Some(reply);
            }
            state.sticky.get(key).cloned()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn request(
            &self,
            method: Method,
            path: &str,
            options: RequestOptions,
        ) -> Result<Response> {
            self.shared.state.lock().requests.push(RecordedRequest {
                method,
                path: path.to_string(),
                body: options.data,
                at: Instant::now(),
            });
            self.shared.request_made.notify_waiters();

            let key = route(method, path);
            loop {
                let notified = self.shared.reply_queued.notified();
                if let Some(reply) = self.next_reply(&key) {
                    return reply.into_result();
                }
                notified.await;
            }
        }
    }
}
