//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: sample records, change feed
//! bodies and a scripted remote.

use serde_json::{json, Value};

use tether_core::Record;
use tether_sync::transport::mock::{MockReply, MockTransport};
use tether_sync::{Method, RemotePaths, SyncConfig, SyncEngine};

/// A task record with a title.
pub fn sample_task(id: &str, title: &str) -> Record {
    Record::new("task", id).with("title", title)
}

/// Builds `GET /_changes` response bodies.
#[derive(Debug, Clone, Default)]
pub struct ChangeFeed {
    last_seq: Value,
    rows: Vec<Value>,
}

impl ChangeFeed {
    /// An empty feed ending at `last_seq`.
    pub fn new(last_seq: u64) -> Self {
        Self {
            last_seq: json!(last_seq),
            rows: Vec::new(),
        }
    }

    /// A feed ending at an opaque sequence token.
    pub fn with_token(token: &str) -> Self {
        Self {
            last_seq: json!(token),
            rows: Vec::new(),
        }
    }

    /// Add a row carrying a full document.
    pub fn doc(mut self, doc: Value) -> Self {
        let id = doc.get("_id").cloned().unwrap_or(Value::Null);
        self.rows.push(json!({"id": id, "doc": doc}));
        self
    }

    /// Add a live document `<doc_id>` at revision `rev` with extra fields.
    pub fn live(self, doc_id: &str, rev: &str, fields: Value) -> Self {
        let mut doc = json!({"_id": doc_id, "_rev": rev});
        if let (Some(doc), Value::Object(fields)) = (doc.as_object_mut(), fields) {
            doc.extend(fields);
        }
        self.doc(doc)
    }

    /// Add a tombstone for `<doc_id>`.
    pub fn deleted(self, doc_id: &str, rev: &str) -> Self {
        self.doc(json!({"_id": doc_id, "_rev": rev, "_deleted": true}))
    }

    pub fn build(self) -> Value {
        json!({"last_seq": self.last_seq, "results": self.rows})
    }

    pub fn reply(self) -> MockReply {
        MockReply::Json(self.build())
    }
}

/// `POST /_bulk_docs` success body for the given `(id, rev)` pairs.
pub fn bulk_docs_ok(written: &[(&str, &str)]) -> Value {
    Value::Array(
        written
            .iter()
            .map(|(id, rev)| json!({"ok": true, "id": id, "rev": rev}))
            .collect(),
    )
}

/// A scripted remote for one store.
pub struct TestRemote {
    pub transport: MockTransport,
    paths: RemotePaths,
}

impl TestRemote {
    /// A remote serving the unnamed store.
    pub fn new() -> Self {
        Self::named(None)
    }

    /// A remote serving the store called `name`.
    pub fn named(name: Option<&str>) -> Self {
        Self {
            transport: MockTransport::new(),
            paths: RemotePaths::new(name),
        }
    }

    /// An engine talking to this remote.
    pub fn engine(&self, config: SyncConfig) -> SyncEngine<MockTransport> {
        SyncEngine::new(config, self.transport.clone())
    }

    /// Queue one change feed response.
    pub fn feed(&self, feed: ChangeFeed) {
        self.transport.reply(Method::Get, &self.changes_route(), feed.reply());
    }

    /// Queue one failed change feed response.
    pub fn feed_status(&self, status: u16) {
        self.transport
            .reply(Method::Get, &self.changes_route(), MockReply::Status(status));
    }

    /// Accept every bulk write.
    pub fn accept_bulk_docs(&self) {
        self.transport.always(
            Method::Post,
            &self.paths.bulk_docs(),
            MockReply::Json(bulk_docs_ok(&[])),
        );
    }

    /// Bodies of every bulk write so far.
    pub fn bulk_writes(&self) -> Vec<Value> {
        self.transport
            .requests_to(&self.paths.bulk_docs())
            .into_iter()
            .filter_map(|r| r.body)
            .collect()
    }

    /// Paths of every change feed request so far.
    pub fn feed_requests(&self) -> Vec<String> {
        self.transport
            .requests_to(&self.changes_route())
            .into_iter()
            .map(|r| r.path)
            .collect()
    }

    fn changes_route(&self) -> String {
        let path = self.paths.changes(&Default::default(), false);
        path.split('?').next().unwrap_or(&path).to_string()
    }
}

impl Default for TestRemote {
    fn default() -> Self {
        Self::new()
    }
}
