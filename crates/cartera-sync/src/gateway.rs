//! All writes against the remote store, with their side-effect
//! choreography.
//!
//! The gateway never touches the published collections: it writes
//! remotely and lets the mirrors reflect the change. Local side effects
//! (activities, notifications) go through the [`Emitter`]. Every
//! operation is at-most-one-attempt unless a [`RetryPolicy`] says
//! otherwise, and any failure propagates typed to the caller.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use cartera_remote::{BlobStorage, Query, RemoteStore, WriteOp};
use cartera_shared::normalize::{normalize_broker, normalize_document, normalize_message};
use cartera_shared::value::{Fields, Value};
use cartera_shared::{
    ActivityKind, Broker, Client, DocumentType, InvestorProfile, MessageStatus, Note,
    NotificationKind, Visibility,
};

use crate::emitter::{ActivityDraft, Emitter, NotificationDraft};
use crate::error::{Result, SyncError};
use crate::retry::RetryPolicy;

/// Preview length for activity descriptions.
const ACTIVITY_PREVIEW: usize = 50;
/// Preview length for notification bodies.
const NOTIFICATION_PREVIEW: usize = 100;

/// A client to be created; ids and the creation timestamp are assigned
/// by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub investor_profile: InvestorProfile,
    pub objectives: String,
    pub investment_horizon: String,
    pub broker: String,
    pub notes: Vec<Note>,
    /// Defaults to the server-assigned creation time when `None`.
    pub last_contact: Option<DateTime<Utc>>,
}

/// A partial client update. Only `Some` fields are written; an absent
/// field is never nulled out remotely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub investor_profile: Option<InvestorProfile>,
    pub objectives: Option<String>,
    pub investment_horizon: Option<String>,
    pub broker: Option<String>,
    pub notes: Option<Vec<Note>>,
    pub last_contact: Option<DateTime<Utc>>,
}

/// A message to be created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub client_id: String,
    pub content: String,
    /// Defaults to the server-assigned commit time when `None`.
    pub timestamp: Option<DateTime<Utc>>,
    pub is_from_advisor: bool,
    /// Defaults to pending.
    pub status: Option<MessageStatus>,
}

/// A document to be uploaded and shared.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub description: String,
    pub doc_type: DocumentType,
    pub visibility: Visibility,
    /// Recipient ids; required non-empty for `selected` visibility,
    /// ignored for `all`.
    pub client_ids: Vec<String>,
    pub file_name: String,
    pub data: Bytes,
}

/// The write side of the sync layer.
pub struct Gateway {
    remote: Arc<dyn RemoteStore>,
    blobs: Arc<dyn BlobStorage>,
    emitter: Arc<Emitter>,
    clients: watch::Receiver<Vec<Client>>,
    brokers: watch::Receiver<Vec<Broker>>,
    retry: RetryPolicy,
}

impl Gateway {
    pub(crate) fn new(
        remote: Arc<dyn RemoteStore>,
        blobs: Arc<dyn BlobStorage>,
        emitter: Arc<Emitter>,
        clients: watch::Receiver<Vec<Client>>,
        brokers: watch::Receiver<Vec<Broker>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            remote,
            blobs,
            emitter,
            clients,
            brokers,
            retry,
        }
    }

    // -----------------------------------------------------------------
    // Brokers
    // -----------------------------------------------------------------

    /// Create a broker by name unless one already exists
    /// (case-insensitive). Checks the mirror first, then the remote
    /// collection, to avoid duplicating a record the mirror has not
    /// caught up with yet.
    pub async fn ensure_broker_exists(&self, name: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let lowered = trimmed.to_lowercase();

        let mirrored = self
            .brokers
            .borrow()
            .iter()
            .any(|b| b.name.to_lowercase() == lowered);
        if mirrored {
            return Ok(());
        }

        let remote_brokers = self.remote.query("brokers", Query::new()).await?;
        let exists = remote_brokers
            .iter()
            .map(normalize_broker)
            .any(|b| b.name.to_lowercase() == lowered);
        if exists {
            return Ok(());
        }

        let mut fields = Fields::new();
        fields.insert("name".into(), trimmed.into());
        self.retry
            .run(|| self.remote.add("brokers", fields.clone()))
            .await?;
        info!(broker = trimmed, "broker created");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------

    /// Create a client. Upserts the named broker first, then writes the
    /// record with a server-assigned creation timestamp and records a
    /// "client created" activity.
    pub async fn add_client(&self, data: NewClient) -> Result<String> {
        if data.first_name.trim().is_empty() {
            return Err(SyncError::Validation("first name is required".into()));
        }
        let email = data.email.trim().to_lowercase();
        if !email.is_empty() {
            let duplicate = self
                .clients
                .borrow()
                .iter()
                .any(|c| c.email.to_lowercase() == email);
            if duplicate {
                return Err(SyncError::Validation(format!(
                    "a client with email `{}` already exists",
                    data.email.trim()
                )));
            }
        }

        self.ensure_broker_exists(&data.broker).await?;

        let mut fields = Fields::new();
        fields.insert("firstName".into(), data.first_name.clone().into());
        fields.insert("lastName".into(), data.last_name.clone().into());
        fields.insert("email".into(), data.email.trim().into());
        fields.insert("phone".into(), data.phone.into());
        fields.insert(
            "investorProfile".into(),
            data.investor_profile.as_str().into(),
        );
        fields.insert("objectives".into(), data.objectives.into());
        fields.insert("investmentHorizon".into(), data.investment_horizon.into());
        fields.insert("broker".into(), data.broker.trim().into());
        fields.insert("notes".into(), notes_value(&data.notes));
        fields.insert(
            "lastContact".into(),
            match data.last_contact {
                Some(ts) => Value::Timestamp(ts),
                None => Value::ServerTimestamp,
            },
        );
        fields.insert("createdAt".into(), Value::ServerTimestamp);

        let id = self
            .retry
            .run(|| self.remote.add("clients", fields.clone()))
            .await?;

        self.emitter.emit_activity(ActivityDraft {
            client_id: id.clone(),
            kind: ActivityKind::Note,
            title: "Cliente creado".into(),
            description: format!("Nuevo cliente: {} {}", data.first_name, data.last_name),
            timestamp: Utc::now(),
        });

        info!(client = %id, "client created");
        Ok(id)
    }

    /// Partially update a client. Only the fields present in the update
    /// are written; a change of broker upserts the broker record first.
    pub async fn update_client(&self, id: &str, updates: ClientUpdate) -> Result<()> {
        if let Some(broker) = &updates.broker {
            self.ensure_broker_exists(broker).await?;
        }

        let mut fields = Fields::new();
        if let Some(v) = updates.first_name {
            fields.insert("firstName".into(), v.into());
        }
        if let Some(v) = updates.last_name {
            fields.insert("lastName".into(), v.into());
        }
        if let Some(v) = updates.email {
            fields.insert("email".into(), v.into());
        }
        if let Some(v) = updates.phone {
            fields.insert("phone".into(), v.into());
        }
        if let Some(v) = updates.investor_profile {
            fields.insert("investorProfile".into(), v.as_str().into());
        }
        if let Some(v) = updates.objectives {
            fields.insert("objectives".into(), v.into());
        }
        if let Some(v) = updates.investment_horizon {
            fields.insert("investmentHorizon".into(), v.into());
        }
        if let Some(v) = updates.broker {
            fields.insert("broker".into(), v.trim().into());
        }
        if let Some(v) = updates.notes {
            fields.insert("notes".into(), notes_value(&v));
        }
        if let Some(v) = updates.last_contact {
            fields.insert("lastContact".into(), Value::Timestamp(v));
        }

        if fields.is_empty() {
            debug!(client = id, "empty client update skipped");
            return Ok(());
        }

        self.retry
            .run(|| self.remote.update("clients", id, fields.clone()))
            .await?;
        Ok(())
    }

    /// Delete a client and everything hanging off it: all of its
    /// messages (as one atomic batch), its local activities and
    /// notifications, and its membership in document recipient lists. A
    /// `selected` document left without recipients is deleted outright,
    /// blob included; an `all` document is never deleted by this
    /// cascade.
    pub async fn delete_client(&self, id: &str) -> Result<()> {
        self.retry
            .run(|| self.remote.delete("clients", id))
            .await?;

        let messages = self
            .remote
            .query("messages", Query::new().filter_eq("clientId", id))
            .await?;
        if !messages.is_empty() {
            let ops: Vec<WriteOp> = messages
                .iter()
                .map(|m| WriteOp::Delete {
                    collection: "messages".into(),
                    id: m.id.clone(),
                })
                .collect();
            self.retry.run(|| self.remote.batch(ops.clone())).await?;
            debug!(client = id, count = messages.len(), "cascaded message deletion");
        }

        self.emitter.drop_for_client(id);

        // Recipient lists can reference the client from any document, so
        // walk the whole collection.
        let documents = self.remote.query("documents", Query::new()).await?;
        for raw in &documents {
            let document = normalize_document(raw);
            if !document.client_ids.iter().any(|c| c == id) {
                continue;
            }
            let remaining: Vec<String> = document
                .client_ids
                .iter()
                .filter(|c| c.as_str() != id)
                .cloned()
                .collect();

            if remaining.is_empty() && document.visibility == Visibility::Selected {
                self.delete_document(&document.id).await?;
            } else {
                let mut fields = Fields::new();
                fields.insert(
                    "clientIds".into(),
                    Value::Array(remaining.into_iter().map(Value::Text).collect()),
                );
                self.retry
                    .run(|| self.remote.update("documents", &document.id, fields.clone()))
                    .await?;
            }
        }

        info!(client = id, "client deleted");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------

    /// Create a message, bump the parent client's last-contact time and
    /// record an activity. A client-authored message additionally emits
    /// one notification with a content preview.
    pub async fn add_message(&self, data: NewMessage) -> Result<String> {
        if data.client_id.trim().is_empty() {
            return Err(SyncError::Validation("client id is required".into()));
        }

        // Advisor-authored messages are read by definition.
        let visto = data.is_from_advisor;
        let status = data.status.unwrap_or_default();

        let mut fields = Fields::new();
        fields.insert("clientId".into(), data.client_id.clone().into());
        fields.insert("content".into(), data.content.clone().into());
        fields.insert(
            "timestamp".into(),
            match data.timestamp {
                Some(ts) => Value::Timestamp(ts),
                None => Value::ServerTimestamp,
            },
        );
        fields.insert("isFromAdvisor".into(), data.is_from_advisor.into());
        fields.insert("status".into(), status.as_str().into());
        fields.insert("visto".into(), visto.into());
        // Mirrored alias kept for older readers of the collection.
        fields.insert("read".into(), visto.into());

        let id = self
            .retry
            .run(|| self.remote.add("messages", fields.clone()))
            .await?;

        let mut bump = Fields::new();
        bump.insert("lastContact".into(), Value::ServerTimestamp);
        self.retry
            .run(|| self.remote.update("clients", &data.client_id, bump.clone()))
            .await?;

        let when = data.timestamp.unwrap_or_else(Utc::now);
        self.emitter.emit_activity(ActivityDraft {
            client_id: data.client_id.clone(),
            kind: ActivityKind::Message,
            title: if data.is_from_advisor {
                "Mensaje enviado".into()
            } else {
                "Mensaje recibido".into()
            },
            description: preview(&data.content, ACTIVITY_PREVIEW),
            timestamp: when,
        });

        if !data.is_from_advisor {
            let client = self
                .clients
                .borrow()
                .iter()
                .find(|c| c.id == data.client_id)
                .cloned();
            if let Some(client) = client {
                self.emitter.emit_notification(NotificationDraft {
                    title: format!("Nuevo mensaje de {}", client.full_name()),
                    message: preview(&data.content, NOTIFICATION_PREVIEW),
                    timestamp: when,
                    kind: NotificationKind::Message,
                    client_id: Some(client.id),
                });
            }
        }

        info!(message = %id, client = %data.client_id, from_advisor = data.is_from_advisor, "message added");
        Ok(id)
    }

    /// Mark one message as read.
    pub async fn mark_message_read(&self, id: &str) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("visto".into(), true.into());
        fields.insert("read".into(), true.into());
        self.retry
            .run(|| self.remote.update("messages", id, fields.clone()))
            .await?;
        Ok(())
    }

    /// Mark every client-authored, currently-unread message of a client
    /// as read, in one atomic batch. Idempotent: with nothing to mark it
    /// is a no-op, not an error.
    pub async fn mark_client_messages_read(&self, client_id: &str) -> Result<()> {
        let candidates = self
            .remote
            .query(
                "messages",
                Query::new()
                    .filter_eq("clientId", client_id)
                    .filter_eq("isFromAdvisor", false),
            )
            .await?;

        let mut fields = Fields::new();
        fields.insert("visto".into(), true.into());
        fields.insert("read".into(), true.into());

        let ops: Vec<WriteOp> = candidates
            .iter()
            .filter(|raw| !normalize_message(raw).visto)
            .map(|raw| WriteOp::Update {
                collection: "messages".into(),
                id: raw.id.clone(),
                fields: fields.clone(),
            })
            .collect();

        if ops.is_empty() {
            return Ok(());
        }

        let count = ops.len();
        self.retry.run(|| self.remote.batch(ops.clone())).await?;
        debug!(client = client_id, count, "messages marked read");
        Ok(())
    }

    /// Update the handling status of one message.
    pub async fn update_message_status(&self, id: &str, status: MessageStatus) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("status".into(), status.as_str().into());
        self.retry
            .run(|| self.remote.update("messages", id, fields.clone()))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------

    /// Upload a report blob and write its metadata record. If the
    /// metadata write fails after a successful upload, the orphaned blob
    /// is deleted best-effort and the original failure propagates. On
    /// success, each recipient gets one activity and one notification.
    pub async fn add_document(&self, data: NewDocument) -> Result<String> {
        let recipients = self.resolve_recipients(&data)?;

        let storage_path = format!(
            "reports/{}-{}",
            Utc::now().timestamp_millis(),
            data.file_name.replace(['/', '\\'], "_")
        );
        let size = data.data.len() as i64;
        let file_url = self.blobs.put(&storage_path, data.data.clone()).await?;

        let mut fields = Fields::new();
        fields.insert("name".into(), data.name.clone().into());
        fields.insert("description".into(), data.description.clone().into());
        fields.insert("type".into(), data.doc_type.as_str().into());
        fields.insert("size".into(), size.into());
        fields.insert("visibility".into(), data.visibility.as_str().into());
        fields.insert(
            "clientIds".into(),
            Value::Array(recipients.iter().cloned().map(Value::Text).collect()),
        );
        fields.insert("fileUrl".into(), file_url.into());
        fields.insert("storagePath".into(), storage_path.clone().into());
        fields.insert("uploadDate".into(), Value::ServerTimestamp);

        let id = match self
            .retry
            .run(|| self.remote.add("documents", fields.clone()))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                // Compensate: do not leave the uploaded blob orphaned.
                if let Err(del) = self.blobs.delete(&storage_path).await {
                    warn!(path = %storage_path, error = %del, "failed to delete orphaned blob");
                }
                return Err(e.into());
            }
        };

        let now = Utc::now();
        for client_id in &recipients {
            self.emitter.emit_activity(ActivityDraft {
                client_id: client_id.clone(),
                kind: ActivityKind::Document,
                title: "Documento compartido".into(),
                description: data.name.clone(),
                timestamp: now,
            });
            self.emitter.emit_notification(NotificationDraft {
                title: format!("Nuevo informe: {}", data.name),
                message: data.description.clone(),
                timestamp: now,
                kind: NotificationKind::Report,
                client_id: Some(client_id.clone()),
            });
        }

        info!(document = %id, recipients = recipients.len(), "document shared");
        Ok(id)
    }

    /// Delete a document's metadata record, then its blob best-effort: a
    /// blob that cannot be removed is logged, not raised.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let Some(raw) = self.remote.get("documents", id).await? else {
            return Ok(());
        };
        let document = normalize_document(&raw);

        self.retry
            .run(|| self.remote.delete("documents", id))
            .await?;

        if !document.storage_path.is_empty() {
            if let Err(e) = self.blobs.delete(&document.storage_path).await {
                warn!(document = id, path = %document.storage_path, error = %e, "blob delete failed");
            }
        }

        info!(document = id, "document deleted");
        Ok(())
    }

    /// Resolve the effective recipient set of a new document: `all`
    /// expands to every mirrored client, `selected` keeps the given ids
    /// de-duplicated and must not be empty.
    fn resolve_recipients(&self, data: &NewDocument) -> Result<Vec<String>> {
        match data.visibility {
            Visibility::All => Ok(self.clients.borrow().iter().map(|c| c.id.clone()).collect()),
            Visibility::Selected => {
                let mut seen = std::collections::HashSet::new();
                let ids: Vec<String> = data
                    .client_ids
                    .iter()
                    .filter(|id| !id.trim().is_empty())
                    .filter(|id| seen.insert(id.as_str()))
                    .cloned()
                    .collect();
                if ids.is_empty() {
                    return Err(SyncError::Validation(
                        "selected visibility requires at least one recipient".into(),
                    ));
                }
                Ok(ids)
            }
        }
    }
}

/// Convert the inline notes of a client record to their wire shape.
fn notes_value(notes: &[Note]) -> Value {
    Value::Array(
        notes
            .iter()
            .map(|note| {
                let mut fields = Fields::new();
                fields.insert("text".into(), note.text.clone().into());
                fields.insert("date".into(), note.date.clone().into());
                Value::Map(fields)
            })
            .collect(),
    )
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn preview(content: &str, max: usize) -> String {
    content.chars().take(max).collect()
}
