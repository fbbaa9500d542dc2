//! Domain model structs mirrored from the remote collections.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer. Enum wire values are the Spanish strings of
//! the persisted schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Risk profile of a client, as stored in the `clients` collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InvestorProfile {
    #[serde(rename = "Conservador")]
    Conservative,
    #[default]
    #[serde(rename = "Moderado")]
    Moderate,
    #[serde(rename = "Agresivo")]
    Aggressive,
}

impl InvestorProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestorProfile::Conservative => "Conservador",
            InvestorProfile::Moderate => "Moderado",
            InvestorProfile::Aggressive => "Agresivo",
        }
    }

    /// Parse a wire value; anything unrecognized falls back to the default.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "Conservador" => InvestorProfile::Conservative,
            "Agresivo" => InvestorProfile::Aggressive,
            _ => InvestorProfile::Moderate,
        }
    }
}

/// A person being advised. Source of truth lives in the remote `clients`
/// collection; local copies are read-through mirrors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub investor_profile: InvestorProfile,
    pub objectives: String,
    pub investment_horizon: String,
    /// Denormalized broker name; an upsert into `brokers` keeps it backed
    /// by a record.
    pub broker: String,
    pub notes: Vec<Note>,
    /// Defaults to `created_at` when the record carries no value.
    pub last_contact: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// An annotation on a client, stored inline in the client record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    /// ISO-8601 string, kept as text to match the persisted shape.
    pub date: String,
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// A financial intermediary, deduplicated by case-insensitive name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broker {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Handling state of a message thread entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MessageStatus {
    #[default]
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "respondido")]
    Answered,
    #[serde(rename = "en_revision")]
    InReview,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pendiente",
            MessageStatus::Answered => "respondido",
            MessageStatus::InReview => "en_revision",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "respondido" => MessageStatus::Answered,
            "en_revision" => MessageStatus::InReview,
            _ => MessageStatus::Pending,
        }
    }
}

/// One unit of a client conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub client_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// `false` means the client wrote it.
    pub is_from_advisor: bool,
    pub status: MessageStatus,
    /// Canonical read flag (`visto` on the wire). Advisor-authored
    /// messages are always read; client-authored ones start unread.
    pub visto: bool,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Category of a shared report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DocumentType {
    #[serde(rename = "rendimiento")]
    Performance,
    #[serde(rename = "recomendaciones")]
    Recommendations,
    #[default]
    #[serde(rename = "informe_mercado")]
    MarketReport,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Performance => "rendimiento",
            DocumentType::Recommendations => "recomendaciones",
            DocumentType::MarketReport => "informe_mercado",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "rendimiento" => DocumentType::Performance,
            "recomendaciones" => DocumentType::Recommendations,
            _ => DocumentType::MarketReport,
        }
    }
}

/// Whether a document is shared with everyone or an explicit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    Selected,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::All => "all",
            Visibility::Selected => "selected",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "selected" => Visibility::Selected,
            _ => Visibility::All,
        }
    }
}

/// A shared file/report. Content is an opaque blob in object storage;
/// this record holds the metadata and the blob's location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub upload_date: DateTime<Utc>,
    /// Byte size of the uploaded blob.
    pub size: i64,
    pub file_url: String,
    /// Object-storage path, kept so the blob can be deleted later.
    pub storage_path: String,
    pub visibility: Visibility,
    /// Recipient client ids; ignored when visibility is `all`.
    pub client_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Activity & Notification (local-only)
// ---------------------------------------------------------------------------

/// Kind of timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    #[serde(rename = "mensaje")]
    Message,
    #[serde(rename = "documento")]
    Document,
    #[serde(rename = "nota")]
    Note,
    #[serde(rename = "actualizacion")]
    Update,
}

/// An immutable timeline entry for a client. Held only in process memory
/// for the session; not persisted remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub client_id: String,
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Kind of advisor-facing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "mensaje")]
    Message,
    #[serde(rename = "capital")]
    Capital,
    #[serde(rename = "informe")]
    Report,
}

/// An alert surfaced to the advisor. Local-only, cleared on sign-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub kind: NotificationKind,
    pub client_id: Option<String>,
}
