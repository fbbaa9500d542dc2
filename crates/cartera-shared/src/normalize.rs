//! Total normalization of raw remote documents into typed entities.
//!
//! The remote collections accumulate records written by several app
//! versions, so any field may be missing or oddly typed. Every function
//! here is total: malformed input resolves to a documented default and
//! nothing ever panics or errors. Downstream code can therefore work
//! with fully-populated entities and no null-checks.

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{
    Broker, Client, Document, DocumentType, InvestorProfile, Message, MessageStatus, Note,
    Visibility,
};
use crate::value::{RawDocument, Value};

/// Decode a timestamp from any of the shapes seen in the wild: the
/// store's native timestamp, an ISO-8601 string, or a numeric epoch in
/// milliseconds. Anything else resolves to the current time.
pub fn to_datetime(value: Option<&Value>) -> DateTime<Utc> {
    match value {
        Some(Value::Timestamp(dt)) => *dt,
        Some(Value::Text(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        Some(Value::Int(millis)) => Utc
            .timestamp_millis_opt(*millis)
            .single()
            .unwrap_or_else(Utc::now),
        Some(Value::Float(millis)) => Utc
            .timestamp_millis_opt(*millis as i64)
            .single()
            .unwrap_or_else(Utc::now),
        _ => Utc::now(),
    }
}

fn text(doc: &RawDocument, key: &str) -> String {
    doc.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_text(doc: &RawDocument, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn boolean(doc: &RawDocument, key: &str) -> bool {
    doc.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Normalize one record of the `clients` collection.
pub fn normalize_client(doc: &RawDocument) -> Client {
    let created_at = to_datetime(doc.get("createdAt"));
    // lastContact falls back to the creation time, not to "now".
    let last_contact = match doc.get("lastContact") {
        Some(v) => to_datetime(Some(v)),
        None => created_at,
    };

    Client {
        id: doc.id.clone(),
        first_name: text(doc, "firstName"),
        last_name: text(doc, "lastName"),
        email: text(doc, "email"),
        phone: text(doc, "phone"),
        investor_profile: doc
            .get("investorProfile")
            .and_then(Value::as_str)
            .map(InvestorProfile::parse_or_default)
            .unwrap_or_default(),
        objectives: text(doc, "objectives"),
        investment_horizon: text(doc, "investmentHorizon"),
        broker: text(doc, "broker"),
        notes: normalize_notes(doc.get("notes")),
        last_contact,
        created_at,
    }
}

/// Normalize the inline `notes` array of a client record. Non-map
/// entries are dropped; each survivor's text is coerced to a string and
/// its date to an ISO-8601 string, defaulting to now.
pub fn normalize_notes(value: Option<&Value>) -> Vec<Note> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_map)
        .map(|fields| {
            let text = fields
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let date = match fields.get("date") {
                Some(Value::Text(s)) => s.clone(),
                Some(Value::Timestamp(dt)) => dt.to_rfc3339(),
                _ => Utc::now().to_rfc3339(),
            };
            Note { text, date }
        })
        .collect()
}

/// Normalize one record of the `messages` collection.
pub fn normalize_message(doc: &RawDocument) -> Message {
    let is_from_advisor = boolean(doc, "isFromAdvisor");
    // `visto` is canonical; older records only carry the `read` alias.
    // Advisor-authored messages are read by definition.
    let visto = doc
        .get("visto")
        .or_else(|| doc.get("read"))
        .and_then(Value::as_bool)
        .unwrap_or(is_from_advisor);

    Message {
        id: doc.id.clone(),
        client_id: text(doc, "clientId"),
        content: text(doc, "content"),
        timestamp: to_datetime(doc.get("timestamp")),
        is_from_advisor,
        status: doc
            .get("status")
            .and_then(Value::as_str)
            .map(MessageStatus::parse_or_default)
            .unwrap_or_default(),
        visto,
    }
}

/// Normalize one record of the `brokers` collection.
pub fn normalize_broker(doc: &RawDocument) -> Broker {
    Broker {
        id: doc.id.clone(),
        name: text(doc, "name"),
        email: opt_text(doc, "email"),
        phone: opt_text(doc, "phone"),
        notes: opt_text(doc, "notes"),
    }
}

/// Normalize one record of the `documents` collection.
pub fn normalize_document(doc: &RawDocument) -> Document {
    let client_ids = doc
        .get("clientIds")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Document {
        id: doc.id.clone(),
        name: text(doc, "name"),
        description: text(doc, "description"),
        doc_type: doc
            .get("type")
            .and_then(Value::as_str)
            .map(DocumentType::parse_or_default)
            .unwrap_or_default(),
        upload_date: to_datetime(doc.get("uploadDate")),
        size: doc.get("size").and_then(Value::as_i64).unwrap_or(0),
        file_url: text(doc, "fileUrl"),
        storage_path: text(doc, "storagePath"),
        visibility: doc
            .get("visibility")
            .and_then(Value::as_str)
            .map(Visibility::parse_or_default)
            .unwrap_or_default(),
        client_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Fields;
    use chrono::Duration;

    fn doc(id: &str, pairs: Vec<(&str, Value)>) -> RawDocument {
        let mut fields = Fields::new();
        for (k, v) in pairs {
            fields.insert(k.to_string(), v);
        }
        RawDocument::new(id, fields)
    }

    #[test]
    fn empty_client_record_gets_full_defaults() {
        let before = Utc::now();
        let client = normalize_client(&doc("c1", vec![]));

        assert_eq!(client.id, "c1");
        assert_eq!(client.first_name, "");
        assert_eq!(client.investor_profile, InvestorProfile::Moderate);
        assert!(client.notes.is_empty());
        assert!(client.created_at >= before);
        // With no createdAt either, lastContact equals the defaulted createdAt.
        assert_eq!(client.last_contact, client.created_at);
    }

    #[test]
    fn last_contact_defaults_to_created_at() {
        let created = Utc::now() - Duration::days(30);
        let client = normalize_client(&doc("c1", vec![("createdAt", created.into())]));
        assert_eq!(client.created_at, created);
        assert_eq!(client.last_contact, created);
    }

    #[test]
    fn timestamps_decode_from_every_supported_shape() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap();

        assert_eq!(to_datetime(Some(&Value::Timestamp(dt))), dt);
        assert_eq!(to_datetime(Some(&Value::Text(dt.to_rfc3339()))), dt);
        assert_eq!(to_datetime(Some(&Value::Int(dt.timestamp_millis()))), dt);

        let before = Utc::now();
        let fallback = to_datetime(Some(&Value::Text("not a date".into())));
        assert!(fallback >= before);
        let missing = to_datetime(None);
        assert!(missing >= before);
    }

    #[test]
    fn notes_filter_non_map_entries_and_coerce_fields() {
        let mut good = Fields::new();
        good.insert("text".into(), "llamar el lunes".into());
        good.insert("date".into(), "2024-01-02T03:04:05+00:00".into());

        let mut dated = Fields::new();
        dated.insert(
            "date".into(),
            Value::Timestamp(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
        );

        let raw = Value::Array(vec![
            Value::Map(good),
            Value::Int(7),
            Value::Text("stray".into()),
            Value::Map(dated),
        ]);

        let notes = normalize_notes(Some(&raw));
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].text, "llamar el lunes");
        assert_eq!(notes[0].date, "2024-01-02T03:04:05+00:00");
        assert_eq!(notes[1].text, "");
        assert!(notes[1].date.starts_with("2023-01-01"));

        assert!(normalize_notes(Some(&Value::Text("nope".into()))).is_empty());
        assert!(normalize_notes(None).is_empty());
    }

    #[test]
    fn advisor_messages_default_to_read() {
        let advisor = normalize_message(&doc("m1", vec![("isFromAdvisor", true.into())]));
        assert!(advisor.visto);

        let client = normalize_message(&doc("m2", vec![("isFromAdvisor", false.into())]));
        assert!(!client.visto);

        // An explicit flag wins over the authorship default.
        let explicit = normalize_message(&doc(
            "m3",
            vec![("isFromAdvisor", false.into()), ("visto", true.into())],
        ));
        assert!(explicit.visto);

        // Legacy records carry only the `read` alias.
        let legacy = normalize_message(&doc(
            "m4",
            vec![("isFromAdvisor", false.into()), ("read", true.into())],
        ));
        assert!(legacy.visto);
    }

    #[test]
    fn malformed_message_fields_degrade_to_defaults() {
        let msg = normalize_message(&doc(
            "m1",
            vec![
                ("clientId", Value::Int(42)),
                ("content", Value::Null),
                ("status", "desconocido".into()),
                ("timestamp", Value::Bool(true)),
            ],
        ));
        assert_eq!(msg.client_id, "");
        assert_eq!(msg.content, "");
        assert_eq!(msg.status, MessageStatus::Pending);
    }

    #[test]
    fn document_client_ids_drop_non_strings() {
        let document = normalize_document(&doc(
            "d1",
            vec![
                ("visibility", "selected".into()),
                (
                    "clientIds",
                    Value::Array(vec!["c1".into(), Value::Int(9), "c2".into()]),
                ),
            ],
        ));
        assert_eq!(document.visibility, Visibility::Selected);
        assert_eq!(document.client_ids, vec!["c1", "c2"]);
        assert_eq!(document.doc_type, DocumentType::MarketReport);
        assert_eq!(document.size, 0);
    }

    #[test]
    fn broker_empty_optionals_become_none() {
        let broker = normalize_broker(&doc(
            "b1",
            vec![("name", "Banco Galicia".into()), ("email", "".into())],
        ));
        assert_eq!(broker.name, "Banco Galicia");
        assert_eq!(broker.email, None);
        assert_eq!(broker.phone, None);
    }
}
