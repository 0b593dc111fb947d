use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub mod analysis;
pub mod capture;

/// A single reported safety event with its metadata and conversation thread.
///
/// Field names are pinned to the stored wire format; the conversation is
/// append-only and holds at least the reporter's initial message from the
/// moment the incident exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(
        default,
        rename = "audioReference",
        skip_serializing_if = "Option::is_none"
    )]
    pub audio_reference: Option<AudioRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub status: IncidentStatus,
    #[serde(default)]
    pub conversation: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Incident {
    /// Allocates a new incident from a validated draft. The conversation is
    /// seeded with the reporter's message; an audio-only report keeps an
    /// empty-text placeholder so the thread is never empty.
    pub fn from_draft(draft: IncidentDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation: vec![Message::user(draft.text.clone())],
            text: draft.text,
            audio_reference: draft.audio_reference,
            location: draft.location,
            created_at,
            status: IncidentStatus::Pending,
            severity: None,
            recommendation: None,
            summary: None,
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.conversation.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.conversation.push(Message::assistant(text));
    }
}

/// One turn in an incident's conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub sender: MessageSender,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: MessageSender::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: MessageSender::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    User,
    Assistant,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSender::User => "user",
            MessageSender::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IncidentStatus {
    Pending,
    #[serde(rename = "AIResolved")]
    AiResolved,
    Escalated,
}

impl Default for IncidentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "Pending",
            IncidentStatus::AiResolved => "AIResolved",
            IncidentStatus::Escalated => "Escalated",
        }
    }

    /// No automatic transition leaves a resolved or escalated incident.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::AiResolved | IncidentStatus::Escalated)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "pending" => Ok(IncidentStatus::Pending),
            "airesolved" | "ai-resolved" | "ai_resolved" | "ai resolved" => {
                Ok(IncidentStatus::AiResolved)
            }
            "escalated" => Ok(IncidentStatus::Escalated),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Medium
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("Unknown severity: {other}")),
        }
    }
}

/// Opaque handle to recorded audio, owned by the capture collaborator.
/// The core stores it verbatim and never decodes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AudioRef(pub String);

impl AudioRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Location snapshot, immutable once captured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Reporter input before an incident exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentDraft {
    pub text: String,
    pub audio_reference: Option<AudioRef>,
    pub location: Option<GeoPoint>,
}

impl IncidentDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// A draft must carry text or an audio reference to become an incident.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.is_empty() && self.audio_reference.is_none() {
            return Err(ValidationError::NothingToReport);
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("nothing to report")]
    NothingToReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn draft_with_text_or_audio_passes_validation() {
        assert!(IncidentDraft::text("followed home").validate().is_ok());

        let audio_only = IncidentDraft {
            audio_reference: Some(AudioRef("blob:rec-1".to_string())),
            ..IncidentDraft::default()
        };
        assert!(audio_only.validate().is_ok());
    }

    #[test]
    fn empty_draft_is_rejected() {
        let err = IncidentDraft::default()
            .validate()
            .expect_err("empty draft must fail");
        assert_eq!(err, ValidationError::NothingToReport);
        assert_eq!(err.to_string(), "nothing to report");
    }

    #[test]
    fn new_incident_starts_pending_with_seeded_conversation() {
        let incident = Incident::from_draft(IncidentDraft::text("followed home"), ts());

        assert_eq!(incident.status, IncidentStatus::Pending);
        assert_eq!(incident.conversation.len(), 1);
        assert_eq!(incident.conversation[0].sender, MessageSender::User);
        assert_eq!(incident.conversation[0].text, "followed home");
        assert!(incident.severity.is_none());
        assert!(incident.summary.is_none());
    }

    #[test]
    fn audio_only_incident_keeps_placeholder_message() {
        let draft = IncidentDraft {
            audio_reference: Some(AudioRef("blob:rec-2".to_string())),
            ..IncidentDraft::default()
        };
        let incident = Incident::from_draft(draft, ts());

        assert_eq!(incident.conversation.len(), 1);
        assert_eq!(incident.conversation[0].text, "");
    }

    #[test]
    fn incident_ids_are_unique() {
        let a = Incident::from_draft(IncidentDraft::text("one"), ts());
        let b = Incident::from_draft(IncidentDraft::text("two"), ts());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn status_parses_display_names_and_aliases() {
        for status in [
            IncidentStatus::Pending,
            IncidentStatus::AiResolved,
            IncidentStatus::Escalated,
        ] {
            let parsed: IncidentStatus = status.as_str().parse().expect("roundtrip parse");
            assert_eq!(parsed, status);
        }
        assert_eq!(
            "ai-resolved".parse::<IncidentStatus>().expect("alias"),
            IncidentStatus::AiResolved
        );
        assert!("archived".parse::<IncidentStatus>().is_err());
    }

    #[test]
    fn terminal_states_are_resolved_and_escalated() {
        assert!(!IncidentStatus::Pending.is_terminal());
        assert!(IncidentStatus::AiResolved.is_terminal());
        assert!(IncidentStatus::Escalated.is_terminal());
    }

    #[test]
    fn stored_shape_uses_wire_field_names() {
        let mut incident = Incident::from_draft(
            IncidentDraft {
                text: "followed home".to_string(),
                audio_reference: Some(AudioRef("blob:rec-3".to_string())),
                location: Some(GeoPoint {
                    lat: 59.91,
                    lon: 10.75,
                }),
            },
            ts(),
        );
        incident.status = IncidentStatus::AiResolved;
        incident.severity = Some(Severity::High);

        let value = serde_json::to_value(&incident).expect("serialize");
        let object = value.as_object().expect("object");

        assert!(object.contains_key("audioReference"));
        assert!(object.contains_key("createdAt"));
        assert_eq!(object["status"], "AIResolved");
        assert_eq!(object["severity"], "high");
        assert_eq!(object["conversation"][0]["sender"], "user");
    }

    #[test]
    fn stored_shape_roundtrips() {
        let incident = Incident::from_draft(IncidentDraft::text("report"), ts());
        let encoded = serde_json::to_string(&incident).expect("encode");
        let decoded: Incident = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, incident);
    }
}
