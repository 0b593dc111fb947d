use crate::{Message, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

pub const PLACEHOLDER_SUMMARY: &str = "Summary unavailable.";
pub const PLACEHOLDER_RECOMMENDATION: &str = "Recommendation unavailable.";

/// Initial submission to the analysis service. The two shapes the service
/// accepts are one tagged type so every caller goes through the same
/// normalized result instead of divergent parsing paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialAnalysisRequest {
    /// Plain form submission carrying only the report text.
    TextSubmission { text: String },
    /// Conversational submission carrying the report text plus the turns
    /// exchanged so far; the service answers with a model turn.
    ConversationalSubmission { text: String, history: Vec<Message> },
}

impl InitialAnalysisRequest {
    pub fn report_text(&self) -> &str {
        match self {
            InitialAnalysisRequest::TextSubmission { text } => text,
            InitialAnalysisRequest::ConversationalSubmission { text, .. } => text,
        }
    }
}

/// Normalized outcome of a successful initial analysis, whichever request
/// variant produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialAnalysis {
    pub summary: String,
    pub severity: Severity,
    pub recommendation: String,
    /// First assistant turn to append, when the service supplies one.
    pub assistant_reply: Option<String>,
}

/// Follow-up question plus the full conversation context, serialized with
/// the service's field names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowUpRequest {
    #[serde(rename = "incidentId")]
    pub incident_id: String,
    #[serde(rename = "followUp")]
    pub follow_up: String,
    pub conversation: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpReply {
    pub reply: String,
}

/// Parses a conversational model turn whose body should be JSON with keys
/// `user_response`, `summary`, `severity`, `recommendation`. Anything
/// malformed fails soft: missing or unusable fields fall back to
/// placeholder values rather than aborting the flow, and a non-JSON body
/// is kept verbatim as the assistant reply.
pub fn parse_conversational_reply(raw: &str) -> InitialAnalysis {
    let parsed: Option<Value> = serde_json::from_str(raw).ok();
    let fields = parsed.as_ref().and_then(Value::as_object);

    let string_field = |key: &str| {
        fields
            .and_then(|object| object.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let severity = string_field("severity")
        .and_then(|value| Severity::from_str(&value).ok())
        .unwrap_or_default();

    let assistant_reply = string_field("user_response").or_else(|| {
        if fields.is_some() {
            return None;
        }
        let raw = raw.trim();
        (!raw.is_empty()).then(|| raw.to_string())
    });

    InitialAnalysis {
        summary: string_field("summary").unwrap_or_else(|| PLACEHOLDER_SUMMARY.to_string()),
        severity,
        recommendation: string_field("recommendation")
            .unwrap_or_else(|| PLACEHOLDER_RECOMMENDATION.to_string()),
        assistant_reply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageSender;

    #[test]
    fn follow_up_request_serializes_service_field_names() {
        let request = FollowUpRequest {
            incident_id: "inc-1".to_string(),
            follow_up: "Are you safe now?".to_string(),
            conversation: vec![Message::user("I am being followed")],
        };

        let value = serde_json::to_value(&request).expect("serialize");
        let object = value.as_object().expect("object");
        assert!(object.contains_key("incidentId"));
        assert!(object.contains_key("followUp"));
        assert_eq!(object["conversation"][0]["sender"], "user");
    }

    #[test]
    fn conversational_submission_tags_its_kind() {
        let request = InitialAnalysisRequest::ConversationalSubmission {
            text: "report".to_string(),
            history: Vec::new(),
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["kind"], "conversational_submission");
        assert_eq!(request.report_text(), "report");
    }

    #[test]
    fn well_formed_model_turn_parses_all_fields() {
        let analysis = parse_conversational_reply(
            r#"{
                "user_response": "Stay on a busy street and call someone you trust.",
                "summary": "Stalking report",
                "severity": "high",
                "recommendation": "Contact local authority"
            }"#,
        );

        assert_eq!(analysis.summary, "Stalking report");
        assert_eq!(analysis.severity, Severity::High);
        assert_eq!(analysis.recommendation, "Contact local authority");
        assert_eq!(
            analysis.assistant_reply.as_deref(),
            Some("Stay on a busy street and call someone you trust.")
        );
    }

    #[test]
    fn malformed_model_turn_falls_back_to_placeholders() {
        let analysis = parse_conversational_reply("I could not produce structured output");

        assert_eq!(analysis.summary, PLACEHOLDER_SUMMARY);
        assert_eq!(analysis.severity, Severity::Medium);
        assert_eq!(analysis.recommendation, PLACEHOLDER_RECOMMENDATION);
        assert_eq!(
            analysis.assistant_reply.as_deref(),
            Some("I could not produce structured output")
        );
    }

    #[test]
    fn partial_model_turn_keeps_known_fields() {
        let analysis =
            parse_conversational_reply(r#"{"summary": "Harassment report", "severity": "bogus"}"#);

        assert_eq!(analysis.summary, "Harassment report");
        assert_eq!(analysis.severity, Severity::Medium);
        assert_eq!(analysis.recommendation, PLACEHOLDER_RECOMMENDATION);
        assert!(analysis.assistant_reply.is_none());
    }

    #[test]
    fn empty_model_turn_yields_no_reply() {
        let analysis = parse_conversational_reply("   ");
        assert!(analysis.assistant_reply.is_none());
        assert_eq!(analysis.summary, PLACEHOLDER_SUMMARY);
    }

    #[test]
    fn messages_round_trip_through_history() {
        let history = vec![
            Message::user("I am being followed"),
            Message::assistant("Where are you right now?"),
        ];
        let encoded = serde_json::to_string(&history).expect("encode");
        let decoded: Vec<Message> = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, history);
        assert_eq!(decoded[1].sender, MessageSender::Assistant);
    }
}
