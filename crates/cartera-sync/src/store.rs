//! The store lifecycle controller.
//!
//! [`DataStore`] is the single context object owning mirrors, gateway
//! and emitter. It is constructed once per process and passed by
//! reference to consumers; there is no global state. `start` binds the
//! mirrors to the remote store while a session is active, `stop` tears
//! every subscription down and discards all session-local state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use cartera_remote::{BlobStorage, RemoteStore};
use cartera_shared::{Broker, Client, Document, Message};

use crate::emitter::Emitter;
use crate::gateway::Gateway;
use crate::mirror::{Collections, EntityKind, MirrorSet};
use crate::retry::RetryPolicy;

/// Owns the whole sync layer for one advisor session.
pub struct DataStore {
    collections: Collections,
    emitter: Arc<Emitter>,
    gateway: Gateway,
    mirrors: MirrorSet,
    degraded: Arc<watch::Sender<bool>>,
}

impl DataStore {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStorage>,
        retry: RetryPolicy,
    ) -> Self {
        let collections = Collections::new();
        let emitter = Arc::new(Emitter::new());
        let degraded = Arc::new(watch::channel(false).0);

        let gateway = Gateway::new(
            remote.clone(),
            blobs,
            emitter.clone(),
            collections.clients(),
            collections.brokers(),
            retry,
        );
        let mirrors = MirrorSet::new(remote, collections.clone(), degraded.clone());

        Self {
            collections,
            emitter,
            gateway,
            mirrors,
            degraded,
        }
    }

    /// Start every mirror. Call only while a session is authenticated.
    /// Idempotent: mirrors already running are left alone.
    pub fn start(&self) {
        for kind in EntityKind::ALL {
            self.mirrors.start(kind);
        }
        info!("data listeners started");
    }

    /// Cancel every subscription, clear every published collection and
    /// discard all local activities and notifications. Once this
    /// returns, no stale callback can fire into the cleared state.
    pub async fn stop(&self) {
        self.mirrors.stop_all().await;
        self.emitter.clear();
        self.degraded.send_replace(false);
        info!("data listeners stopped");
    }

    /// Start a single entity mirror (idempotent).
    pub fn start_mirror(&self, kind: EntityKind) {
        self.mirrors.start(kind);
    }

    /// Stop a single entity mirror and clear its collection.
    pub async fn stop_mirror(&self, kind: EntityKind) {
        self.mirrors.stop(kind).await;
    }

    pub fn is_mirror_running(&self, kind: EntityKind) -> bool {
        self.mirrors.is_running(kind)
    }

    /// Drive start/stop from the authentication provider's session
    /// signal (`true` while signed in). Returns once the signal's
    /// sender is dropped, after a final teardown.
    pub async fn drive_session(&self, mut session: watch::Receiver<bool>) {
        loop {
            let signed_in = *session.borrow_and_update();
            if signed_in {
                self.start();
            } else {
                self.stop().await;
            }
            if session.changed().await.is_err() {
                self.stop().await;
                return;
            }
        }
    }

    // Published read state. Each receiver observes full-collection
    // replacements only.

    pub fn clients(&self) -> watch::Receiver<Vec<Client>> {
        self.collections.clients()
    }

    pub fn messages(&self) -> watch::Receiver<Vec<Message>> {
        self.collections.messages()
    }

    pub fn brokers(&self) -> watch::Receiver<Vec<Broker>> {
        self.collections.brokers()
    }

    pub fn documents(&self) -> watch::Receiver<Vec<Document>> {
        self.collections.documents()
    }

    /// Connectivity-degraded signal: flips to `true` when a live
    /// subscription closes underneath a running mirror.
    pub fn degraded(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// The write side.
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Local activity/notification state.
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cartera_remote::{FsBlobStore, MemoryStore};

    async fn data_store() -> (Arc<MemoryStore>, DataStore, tempfile::TempDir) {
        let remote = Arc::new(MemoryStore::new());
        let dir = tempfile::TempDir::new().unwrap();
        let blobs = Arc::new(FsBlobStore::new(dir.path().to_path_buf()).await.unwrap());
        let store = DataStore::new(
            remote.clone() as Arc<dyn RemoteStore>,
            blobs as Arc<dyn BlobStorage>,
            RetryPolicy::default(),
        );
        (remote, store, dir)
    }

    async fn wait_until(pred: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !pred() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn start_is_idempotent_across_calls() {
        let (remote, store, _dir) = data_store().await;

        store.start();
        store.start();

        wait_until(|| remote.subscriber_count() == 4).await;
        for kind in EntityKind::ALL {
            assert!(store.is_mirror_running(kind));
        }
    }

    #[tokio::test]
    async fn stop_then_start_holds_exactly_one_subscription_per_type() {
        let (remote, store, _dir) = data_store().await;

        store.start();
        wait_until(|| remote.subscriber_count() == 4).await;

        store.stop().await;
        assert_eq!(remote.subscriber_count(), 0);

        store.start();
        wait_until(|| remote.subscriber_count() == 4).await;
    }

    #[tokio::test]
    async fn stop_discards_session_local_state() {
        let (remote, store, _dir) = data_store().await;
        store.start();

        let mut clients_rx = store.clients();
        store
            .gateway()
            .add_client(sample_client("Ana", "ana@example.com"))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while clients_rx.borrow_and_update().is_empty() {
                clients_rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(store.emitter().activities().len(), 1);

        store.stop().await;

        assert!(store.clients().borrow().is_empty());
        assert!(store.emitter().activities().is_empty());
        assert!(store.emitter().notifications().is_empty());
        // The remote record is untouched; only the local view is gone.
        let remaining = remote
            .query("clients", cartera_remote::Query::new())
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn lost_subscription_flips_degraded_flag() {
        let (remote, store, _dir) = data_store().await;
        store.start();
        wait_until(|| remote.subscriber_count() == 4).await;

        let mut degraded = store.degraded();
        assert!(!*degraded.borrow());

        remote.disconnect();
        tokio::time::timeout(Duration::from_secs(2), degraded.changed())
            .await
            .expect("no degraded signal")
            .unwrap();
        assert!(*degraded.borrow());

        // A fresh session resets the flag.
        store.stop().await;
        assert!(!*store.degraded().borrow());
    }

    #[tokio::test]
    async fn session_signal_drives_lifecycle() {
        let (remote, store, _dir) = data_store().await;
        let store = Arc::new(store);
        let (session_tx, session_rx) = watch::channel(false);

        let driver = {
            let store = store.clone();
            tokio::spawn(async move { store.drive_session(session_rx).await })
        };

        session_tx.send_replace(true);
        wait_until(|| remote.subscriber_count() == 4).await;

        session_tx.send_replace(false);
        wait_until(|| remote.subscriber_count() == 0).await;

        drop(session_tx);
        driver.await.unwrap();
    }

    fn sample_client(first_name: &str, email: &str) -> crate::gateway::NewClient {
        crate::gateway::NewClient {
            first_name: first_name.into(),
            last_name: "Gómez".into(),
            email: email.into(),
            phone: "11-4444-5555".into(),
            investor_profile: Default::default(),
            objectives: String::new(),
            investment_horizon: String::new(),
            broker: String::new(),
            notes: Vec::new(),
            last_contact: None,
        }
    }
}
