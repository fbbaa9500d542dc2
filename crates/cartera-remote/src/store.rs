//! The document-database seam consumed by the sync layer.

use async_trait::async_trait;
use tokio::sync::mpsc;

use cartera_shared::value::{Fields, RawDocument};

use crate::error::Result;
use crate::query::Query;

/// One operation inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Merge `fields` into an existing document.
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Remove a document. Deleting a missing document is a no-op.
    Delete { collection: String, id: String },
}

/// A live query subscription.
///
/// The backend pushes the *complete current snapshot* of all matching
/// documents on every change — never a diff. Dropping the subscription
/// cancels it; the backend stops delivering and prunes its sender.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Vec<RawDocument>>,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Vec<RawDocument>>) -> Self {
        Self { receiver }
    }

    /// Wait for the next snapshot. `None` means the backend closed the
    /// subscription (connectivity lost or store shut down).
    pub async fn next(&mut self) -> Option<Vec<RawDocument>> {
        self.receiver.recv().await
    }
}

/// Hosted document database: collections of loosely-typed documents with
/// generated ids, equality queries, atomic batches and live snapshot
/// subscriptions.
///
/// `Value::ServerTimestamp` sentinels in written fields are resolved to
/// the commit time by the backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a document with a store-assigned id; returns the id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Fetch one document, `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>>;

    /// Merge fields into an existing document. Fails with `NotFound` if
    /// the document does not exist; fields absent from the map are left
    /// untouched.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Delete one document. Deleting a missing document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Run an equality query and return the matching documents, sorted
    /// per the query's order-by clause.
    async fn query(&self, collection: &str, query: Query) -> Result<Vec<RawDocument>>;

    /// Apply every operation atomically: either all take effect or none.
    async fn batch(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Open a live subscription. The current snapshot is delivered
    /// immediately, then again in full after every commit that touches
    /// the collection.
    async fn subscribe(&self, collection: &str, query: Query) -> Subscription;
}
