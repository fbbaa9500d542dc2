//! Local-only activity timeline and notification feed.
//!
//! Activities and notifications are not persisted remotely: they live in
//! process memory for the session and are cleared on sign-out. Every
//! notification is additionally published on a broadcast channel so the
//! desktop-notification facility can react without the gateway knowing
//! about it.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use cartera_shared::{Activity, ActivityKind, Notification, NotificationKind};

/// An activity entry minus its generated id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityDraft {
    pub client_id: String,
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// A notification entry minus its generated id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub kind: NotificationKind,
    pub client_id: Option<String>,
}

/// In-memory emitter for activities and notifications.
///
/// Appends are synchronous, infallible and never deduplicated: emitting
/// the same content twice produces two entries.
pub struct Emitter {
    activities: Mutex<Vec<Activity>>,
    notifications: Mutex<Vec<Notification>>,
    events: broadcast::Sender<Notification>,
}

impl Emitter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            activities: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Append a timeline entry with a generated id.
    pub fn emit_activity(&self, draft: ActivityDraft) -> Activity {
        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            client_id: draft.client_id,
            kind: draft.kind,
            title: draft.title,
            description: draft.description,
            timestamp: draft.timestamp,
        };
        self.activities
            .lock()
            .expect("emitter lock poisoned")
            .push(activity.clone());
        activity
    }

    /// Append a notification with a generated id and publish it on the
    /// event channel for the desktop-notification facility.
    pub fn emit_notification(&self, draft: NotificationDraft) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            message: draft.message,
            timestamp: draft.timestamp,
            read: false,
            kind: draft.kind,
            client_id: draft.client_id,
        };
        self.notifications
            .lock()
            .expect("emitter lock poisoned")
            .push(notification.clone());
        // No listener is fine; the feed itself is the source of truth.
        let _ = self.events.send(notification.clone());
        notification
    }

    /// Flip the read flag of exactly one notification. Unknown ids are a
    /// no-op.
    pub fn mark_notification_read(&self, id: &str) {
        let mut notifications = self.notifications.lock().expect("emitter lock poisoned");
        if let Some(n) = notifications.iter_mut().find(|n| n.id == id) {
            n.read = true;
        }
    }

    pub fn activities(&self) -> Vec<Activity> {
        self.activities.lock().expect("emitter lock poisoned").clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .expect("emitter lock poisoned")
            .clone()
    }

    /// Listen for notifications as they are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Drop every entry referencing a deleted client.
    pub(crate) fn drop_for_client(&self, client_id: &str) {
        self.activities
            .lock()
            .expect("emitter lock poisoned")
            .retain(|a| a.client_id != client_id);
        self.notifications
            .lock()
            .expect("emitter lock poisoned")
            .retain(|n| n.client_id.as_deref() != Some(client_id));
    }

    /// Discard all local state (sign-out).
    pub(crate) fn clear(&self) {
        self.activities.lock().expect("emitter lock poisoned").clear();
        self.notifications
            .lock()
            .expect("emitter lock poisoned")
            .clear();
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}
