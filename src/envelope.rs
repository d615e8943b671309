//! Channel-agnostic message types.
//!
//! Channel adapters convert their native payloads into a `MessageEnvelope`
//! before anything in this crate sees them, and turn the returned
//! `OutboundReply` back into a channel-native send. The engine never touches
//! a wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound envelope ────────────────────────────────────────────────

/// Normalized form of one inbound chat event. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Source channel: "whatsapp", "telegram", "cli", etc.
    pub channel: String,
    /// Channel-native sender identifier.
    pub user_id: String,
    /// Human-readable sender name.
    pub user_name: String,
    /// Message body, if any.
    pub text: Option<String>,
    /// Attached media, if any.
    pub media: Option<MediaPayload>,
    /// Sender location, if the channel provides one.
    pub location: Option<GeoPoint>,
    /// Channel-native message id, used for audit trails.
    pub external_message_id: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Whether the envelope carries non-blank text.
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Media attached to an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    /// MIME type as reported by the channel.
    pub mime_type: String,
    /// Raw bytes or a channel-hosted URL, whichever the transport hands us.
    pub source: MediaSource,
    /// Original filename, if known.
    pub filename: Option<String>,
}

/// Where the media content lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    Bytes(Vec<u8>),
    Url(String),
}

/// A geographic point with optional labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub name: Option<String>,
    pub address: Option<String>,
}

// ── Outbound reply ──────────────────────────────────────────────────

/// Reply handed back to the channel adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutboundReply {
    /// Text-only reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

/// A file reference attached to an outbound reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
}

// ── User context ────────────────────────────────────────────────────

/// The sender's role, resolved by the portal's user registry.
///
/// Closed set — dispatch matches exhaustively, and an unregistered sender is
/// `Unknown` rather than a fall-through on an unmatched string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    FieldWorker,
    Contractor,
    Unknown,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::FieldWorker => "field_worker",
            Self::Contractor => "contractor",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Who is talking. Resolved once per message, never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub role: Role,
    /// Department reference from the org registry, if any.
    pub department: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            department: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(text: Option<&str>) -> MessageEnvelope {
        MessageEnvelope {
            channel: "cli".into(),
            user_id: "u-1".into(),
            user_name: "Asha".into(),
            text: text.map(String::from),
            media: None,
            location: None,
            external_message_id: "m-1".into(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn has_text_ignores_blank() {
        assert!(envelope(Some("fixed the pump")).has_text());
        assert!(!envelope(Some("   ")).has_text());
        assert!(!envelope(None).has_text());
    }

    #[test]
    fn role_display_matches_serde() {
        for role in [Role::FieldWorker, Role::Contractor, Role::Unknown] {
            let display = format!("{role}");
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(format!("\"{display}\""), json);
        }
    }

    #[test]
    fn media_source_roundtrip() {
        let media = MediaPayload {
            mime_type: "image/jpeg".into(),
            source: MediaSource::Url("https://cdn.example/p.jpg".into()),
            filename: Some("p.jpg".into()),
        };
        let json = serde_json::to_string(&media).unwrap();
        let parsed: MediaPayload = serde_json::from_str(&json).unwrap();
        match parsed.source {
            MediaSource::Url(u) => assert_eq!(u, "https://cdn.example/p.jpg"),
            other => panic!("Expected Url, got {other:?}"),
        }
    }

    #[test]
    fn reply_text_constructor() {
        let reply = OutboundReply::text("Thanks!");
        assert_eq!(reply.text, "Thanks!");
        assert!(reply.attachments.is_empty());
    }
}
