//! Live mirrors of the remote collections.
//!
//! One mirror per entity type: it holds a live subscription, normalizes
//! every document of each pushed snapshot, sorts the result canonically
//! and publishes it wholesale through a `watch` channel. Consumers only
//! ever replace their view with the latest snapshot — merging two pushes
//! is never correct, because the backend always delivers the complete
//! collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use cartera_remote::{Direction, Query, RemoteStore};
use cartera_shared::normalize::{
    normalize_broker, normalize_client, normalize_document, normalize_message,
};
use cartera_shared::value::RawDocument;
use cartera_shared::{Broker, Client, Document, Message};

/// The four remotely-owned entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Clients,
    Messages,
    Brokers,
    Documents,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Clients,
        EntityKind::Messages,
        EntityKind::Brokers,
        EntityKind::Documents,
    ];
}

/// The published read state: one collection per entity type.
///
/// Only the mirrors write here; the gateway goes through the remote
/// store and waits for the change to come back via a push.
#[derive(Clone)]
pub struct Collections {
    clients: Arc<watch::Sender<Vec<Client>>>,
    messages: Arc<watch::Sender<Vec<Message>>>,
    brokers: Arc<watch::Sender<Vec<Broker>>>,
    documents: Arc<watch::Sender<Vec<Document>>>,
}

impl Collections {
    pub(crate) fn new() -> Self {
        Self {
            clients: Arc::new(watch::channel(Vec::new()).0),
            messages: Arc::new(watch::channel(Vec::new()).0),
            brokers: Arc::new(watch::channel(Vec::new()).0),
            documents: Arc::new(watch::channel(Vec::new()).0),
        }
    }

    pub fn clients(&self) -> watch::Receiver<Vec<Client>> {
        self.clients.subscribe()
    }

    pub fn messages(&self) -> watch::Receiver<Vec<Message>> {
        self.messages.subscribe()
    }

    pub fn brokers(&self) -> watch::Receiver<Vec<Broker>> {
        self.brokers.subscribe()
    }

    pub fn documents(&self) -> watch::Receiver<Vec<Document>> {
        self.documents.subscribe()
    }

    fn clear_one(&self, kind: EntityKind) {
        match kind {
            EntityKind::Clients => {
                self.clients.send_replace(Vec::new());
            }
            EntityKind::Messages => {
                self.messages.send_replace(Vec::new());
            }
            EntityKind::Brokers => {
                self.brokers.send_replace(Vec::new());
            }
            EntityKind::Documents => {
                self.documents.send_replace(Vec::new());
            }
        }
    }

    pub(crate) fn clear(&self) {
        for kind in EntityKind::ALL {
            self.clear_one(kind);
        }
    }
}

/// Owns the mirror tasks, one per entity type.
pub(crate) struct MirrorSet {
    remote: Arc<dyn RemoteStore>,
    collections: Collections,
    degraded: Arc<watch::Sender<bool>>,
    tasks: Mutex<HashMap<EntityKind, JoinHandle<()>>>,
}

impl MirrorSet {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        collections: Collections,
        degraded: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            remote,
            collections,
            degraded,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start the mirror for one entity type. Idempotent: a second call
    /// while the mirror is running is a no-op.
    pub fn start(&self, kind: EntityKind) {
        let mut tasks = self.tasks.lock().expect("mirror set lock poisoned");
        if let Some(handle) = tasks.get(&kind) {
            if !handle.is_finished() {
                return;
            }
        }

        let remote = self.remote.clone();
        let degraded = self.degraded.clone();
        let handle = match kind {
            EntityKind::Clients => spawn_mirror(
                remote,
                "clients",
                Query::new().order_by("createdAt", Direction::Descending),
                normalize_client,
                |items| items.sort_by(|a: &Client, b| b.created_at.cmp(&a.created_at)),
                self.collections.clients.clone(),
                degraded,
            ),
            EntityKind::Messages => spawn_mirror(
                remote,
                "messages",
                Query::new().order_by("timestamp", Direction::Descending),
                normalize_message,
                |items| items.sort_by(|a: &Message, b| b.timestamp.cmp(&a.timestamp)),
                self.collections.messages.clone(),
                degraded,
            ),
            EntityKind::Brokers => spawn_mirror(
                remote,
                "brokers",
                Query::new().order_by("name", Direction::Ascending),
                normalize_broker,
                |items| items.sort_by(|a: &Broker, b| a.name.cmp(&b.name)),
                self.collections.brokers.clone(),
                degraded,
            ),
            EntityKind::Documents => spawn_mirror(
                remote,
                "documents",
                Query::new().order_by("uploadDate", Direction::Descending),
                normalize_document,
                |items| items.sort_by(|a: &Document, b| b.upload_date.cmp(&a.upload_date)),
                self.collections.documents.clone(),
                degraded,
            ),
        };
        tasks.insert(kind, handle);
    }

    /// Cancel one mirror and clear its published collection. Once this
    /// returns, no further push from the old subscription is processed.
    pub async fn stop(&self, kind: EntityKind) {
        let handle = self
            .tasks
            .lock()
            .expect("mirror set lock poisoned")
            .remove(&kind);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.collections.clear_one(kind);
    }

    /// Cancel every mirror and clear all published collections.
    pub async fn stop_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("mirror set lock poisoned");
            tasks.drain().map(|(_, h)| h).collect()
        };
        for handle in &handles {
            handle.abort();
        }
        futures::future::join_all(handles).await;
        self.collections.clear();
    }

    pub fn is_running(&self, kind: EntityKind) -> bool {
        self.tasks
            .lock()
            .expect("mirror set lock poisoned")
            .get(&kind)
            .is_some_and(|h| !h.is_finished())
    }
}

/// One mirror task: subscribe, normalize, sort, publish wholesale.
fn spawn_mirror<T, N>(
    remote: Arc<dyn RemoteStore>,
    collection: &'static str,
    query: Query,
    normalize: N,
    sort: fn(&mut Vec<T>),
    publish: Arc<watch::Sender<Vec<T>>>,
    degraded: Arc<watch::Sender<bool>>,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    N: Fn(&RawDocument) -> T + Send + 'static,
{
    tokio::spawn(async move {
        let mut subscription = remote.subscribe(collection, query).await;
        while let Some(snapshot) = subscription.next().await {
            let mut items: Vec<T> = snapshot.iter().map(&normalize).collect();
            sort(&mut items);
            debug!(collection, count = items.len(), "mirror snapshot published");
            publish.send_replace(items);
        }
        // The backend closed the subscription underneath us; surface a
        // degraded signal instead of crashing.
        warn!(collection, "live subscription closed");
        degraded.send_replace(true);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cartera_remote::MemoryStore;
    use cartera_shared::value::{Fields, Value};

    fn client_fields(first_name: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("firstName".into(), first_name.into());
        fields.insert("createdAt".into(), Value::ServerTimestamp);
        fields
    }

    async fn wait_for<T: Clone>(
        rx: &mut watch::Receiver<Vec<T>>,
        pred: impl Fn(&[T]) -> bool,
    ) -> Vec<T> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                {
                    let snapshot = rx.borrow_and_update();
                    if pred(&snapshot) {
                        return snapshot.clone();
                    }
                }
                rx.changed().await.expect("mirror channel closed");
            }
        })
        .await
        .expect("mirror never reached expected state")
    }

    fn mirror_set(store: &Arc<MemoryStore>) -> (MirrorSet, Collections) {
        let collections = Collections::new();
        let degraded = Arc::new(watch::channel(false).0);
        let set = MirrorSet::new(store.clone() as Arc<dyn RemoteStore>, collections.clone(), degraded);
        (set, collections)
    }

    #[tokio::test]
    async fn snapshots_replace_never_merge() {
        let store = Arc::new(MemoryStore::new());
        let (set, collections) = mirror_set(&store);
        set.start(EntityKind::Clients);

        let mut rx = collections.clients();
        let mut first_ids = Vec::new();
        for name in ["Ana", "Luis", "Eva"] {
            first_ids.push(store.add("clients", client_fields(name)).await.unwrap());
        }
        wait_for(&mut rx, |c| c.len() == 3).await;

        // Remove all three and add one unrelated record: the published
        // collection must contain exactly the new record.
        for id in &first_ids {
            store.delete("clients", id).await.unwrap();
        }
        let lone = store.add("clients", client_fields("Marta")).await.unwrap();

        let snapshot = wait_for(&mut rx, |c| c.len() == 1 && c[0].id == lone).await;
        assert!(first_ids.iter().all(|id| snapshot[0].id != *id));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let (set, _collections) = mirror_set(&store);

        set.start(EntityKind::Brokers);
        set.start(EntityKind::Brokers);

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.subscriber_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("mirror never subscribed");

        assert_eq!(store.subscriber_count(), 1);
        assert!(set.is_running(EntityKind::Brokers));
    }

    #[tokio::test]
    async fn published_order_is_canonical() {
        let store = Arc::new(MemoryStore::new());
        let (set, collections) = mirror_set(&store);
        set.start(EntityKind::Brokers);

        let mut names = Fields::new();
        names.insert("name".into(), "Zeta".into());
        store.add("brokers", names).await.unwrap();
        let mut names = Fields::new();
        names.insert("name".into(), "Alfa".into());
        store.add("brokers", names).await.unwrap();

        let mut rx = collections.brokers();
        let brokers = wait_for(&mut rx, |b| b.len() == 2).await;
        assert_eq!(brokers[0].name, "Alfa");
        assert_eq!(brokers[1].name, "Zeta");
    }

    #[tokio::test]
    async fn stop_clears_collection_and_subscription() {
        let store = Arc::new(MemoryStore::new());
        let (set, collections) = mirror_set(&store);
        set.start(EntityKind::Clients);

        let mut rx = collections.clients();
        store.add("clients", client_fields("Ana")).await.unwrap();
        wait_for(&mut rx, |c| c.len() == 1).await;

        set.stop(EntityKind::Clients).await;
        assert!(rx.borrow().is_empty());
        assert!(!set.is_running(EntityKind::Clients));

        // Writes after the stop never reach the cleared state.
        store.add("clients", client_fields("Luis")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.borrow().is_empty());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn malformed_documents_still_publish() {
        let store = Arc::new(MemoryStore::new());
        let (set, collections) = mirror_set(&store);
        set.start(EntityKind::Messages);

        let mut fields = Fields::new();
        fields.insert("clientId".into(), Value::Int(42));
        fields.insert("timestamp".into(), Value::Bool(true));
        store.add("messages", fields).await.unwrap();

        let mut rx = collections.messages();
        let messages = wait_for(&mut rx, |m| m.len() == 1).await;
        assert_eq!(messages[0].client_id, "");
    }

}
