//! In-process reference implementation of [`RemoteStore`].
//!
//! Behaves like the hosted backend as far as the sync layer can tell:
//! store-assigned ids, server-timestamp resolution at commit time,
//! all-or-nothing batches, and full-snapshot pushes to every live
//! subscriber after each commit. Used by the test suite and by local
//! single-process deployments.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use cartera_shared::value::{Fields, RawDocument, Value};

use crate::error::{RemoteError, Result};
use crate::query::Query;
use crate::store::{RemoteStore, Subscription, WriteOp};

struct Subscriber {
    collection: String,
    query: Query,
    tx: mpsc::UnboundedSender<Vec<RawDocument>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    subscribers: Vec<Subscriber>,
    /// Collections whose next write is rejected (test aid).
    failing: HashSet<String>,
}

/// In-memory document store with live snapshot subscriptions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write (add/update/batch) against `collection` fail
    /// with `Unavailable`, leaving the store untouched. Lets callers
    /// exercise compensating-action paths.
    pub fn fail_next_write(&self, collection: &str) {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .failing
            .insert(collection.to_string());
    }

    /// Close every live subscription, as a lost connection would.
    /// Subscribers observe an end-of-stream on their next receive.
    pub fn disconnect(&self) {
        self.lock().subscribers.clear();
    }

    /// Number of live subscriptions, across all collections.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.subscribers.retain(|s| !s.tx.is_closed());
        inner.subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }
}

impl Inner {
    fn take_failure(&mut self, collection: &str) -> Result<()> {
        if self.failing.remove(collection) {
            return Err(RemoteError::Unavailable(format!(
                "injected failure for `{collection}`"
            )));
        }
        Ok(())
    }

    fn snapshot(&self, collection: &str, query: &Query) -> Vec<RawDocument> {
        let mut docs: Vec<RawDocument> = self
            .collections
            .get(collection)
            .map(|coll| {
                coll.iter()
                    .map(|(id, fields)| RawDocument::new(id.clone(), fields.clone()))
                    .filter(|doc| query.matches(doc))
                    .collect()
            })
            .unwrap_or_default();
        query.sort(&mut docs);
        docs
    }

    /// Re-push the full snapshot to every subscriber of the touched
    /// collections. Closed subscribers are pruned.
    fn broadcast(&mut self, touched: &HashSet<String>) {
        let snapshots: Vec<(usize, Vec<RawDocument>)> = self
            .subscribers
            .iter()
            .enumerate()
            .filter(|(_, s)| touched.contains(&s.collection))
            .map(|(i, s)| (i, self.snapshot(&s.collection, &s.query)))
            .collect();

        let mut dead = Vec::new();
        for (i, snapshot) in snapshots {
            if self.subscribers[i].tx.send(snapshot).is_err() {
                dead.push(i);
            }
        }
        for i in dead.into_iter().rev() {
            self.subscribers.remove(i);
        }
    }
}

/// Replace write sentinels with concrete commit-time values.
fn resolve_sentinels(fields: &mut Fields) {
    let now = Utc::now();
    for value in fields.values_mut() {
        if matches!(value, Value::ServerTimestamp) {
            *value = Value::Timestamp(now);
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn add(&self, collection: &str, mut fields: Fields) -> Result<String> {
        let mut inner = self.lock();
        inner.take_failure(collection)?;

        resolve_sentinels(&mut fields);
        let id = Uuid::new_v4().to_string();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);

        debug!(collection, id = %id, "document added");
        inner.broadcast(&HashSet::from([collection.to_string()]));
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>> {
        let inner = self.lock();
        Ok(inner
            .collections
            .get(collection)
            .and_then(|coll| coll.get(id))
            .map(|fields| RawDocument::new(id, fields.clone())))
    }

    async fn update(&self, collection: &str, id: &str, mut fields: Fields) -> Result<()> {
        let mut inner = self.lock();
        inner.take_failure(collection)?;

        resolve_sentinels(&mut fields);
        let existing = inner
            .collections
            .get_mut(collection)
            .and_then(|coll| coll.get_mut(id))
            .ok_or_else(|| RemoteError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        existing.extend(fields);

        inner.broadcast(&HashSet::from([collection.to_string()]));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut inner = self.lock();
        let removed = inner
            .collections
            .get_mut(collection)
            .and_then(|coll| coll.remove(id))
            .is_some();

        if removed {
            debug!(collection, id, "document deleted");
            inner.broadcast(&HashSet::from([collection.to_string()]));
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<RawDocument>> {
        let inner = self.lock();
        Ok(inner.snapshot(collection, &query))
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut inner = self.lock();

        // Validate everything before touching state so the batch is
        // all-or-nothing.
        for op in &ops {
            match op {
                WriteOp::Update { collection, id, .. } => {
                    inner.take_failure(collection).map_err(|e| {
                        RemoteError::BatchRejected(e.to_string())
                    })?;
                    let exists = inner
                        .collections
                        .get(collection)
                        .is_some_and(|coll| coll.contains_key(id));
                    if !exists {
                        return Err(RemoteError::BatchRejected(format!(
                            "no document `{id}` in `{collection}`"
                        )));
                    }
                }
                WriteOp::Delete { collection, .. } => {
                    inner.take_failure(collection).map_err(|e| {
                        RemoteError::BatchRejected(e.to_string())
                    })?;
                }
            }
        }

        let mut touched = HashSet::new();
        for op in ops {
            match op {
                WriteOp::Update {
                    collection,
                    id,
                    mut fields,
                } => {
                    resolve_sentinels(&mut fields);
                    if let Some(existing) = inner
                        .collections
                        .get_mut(&collection)
                        .and_then(|coll| coll.get_mut(&id))
                    {
                        existing.extend(fields);
                    }
                    touched.insert(collection);
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(coll) = inner.collections.get_mut(&collection) {
                        coll.remove(&id);
                    }
                    touched.insert(collection);
                }
            }
        }

        inner.broadcast(&touched);
        Ok(())
    }

    async fn subscribe(&self, collection: &str, query: Query) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        // Initial snapshot, then one push per commit.
        let snapshot = inner.snapshot(collection, &query);
        let _ = tx.send(snapshot);

        inner.subscribers.push(Subscriber {
            collection: collection.to_string(),
            query,
            tx,
        });
        Subscription::new(rx)
    }
}
