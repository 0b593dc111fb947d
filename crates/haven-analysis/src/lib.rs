use haven_core::analysis::{
    parse_conversational_reply, FollowUpReply, FollowUpRequest, InitialAnalysis,
    InitialAnalysisRequest,
};
use haven_core::{Message, Severity};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure surfaced by an analysis call. Transport failures always render
/// as the fixed user-facing message; the underlying detail is kept for
/// diagnostics only.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("transport error")]
    Transport { detail: String },
    #[error("{message}")]
    Service { message: String },
}

/// Request/response client for the external analysis service. One attempt
/// per call; retrying is the caller's decision.
pub trait AnalysisClient {
    fn analyze_initial(
        &self,
        request: &InitialAnalysisRequest,
    ) -> Result<InitialAnalysis, AnalysisError>;

    fn analyze_follow_up(&self, request: &FollowUpRequest)
        -> Result<FollowUpReply, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct AnalysisEndpointConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for AnalysisEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
            user_agent: "haven/0.1".to_string(),
        }
    }
}

pub struct HttpAnalysisClient {
    agent: ureq::Agent,
    config: AnalysisEndpointConfig,
}

impl HttpAnalysisClient {
    pub fn new(config: AnalysisEndpointConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms.max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(&config.user_agent)
            .build();
        Self { agent, config }
    }

    fn endpoint(&self, path: &str) -> String {
        endpoint_url(&self.config.base_url, path)
    }

    fn read_body(response: ureq::Response) -> Result<String, AnalysisError> {
        response.into_string().map_err(|err| AnalysisError::Transport {
            detail: err.to_string(),
        })
    }
}

impl AnalysisClient for HttpAnalysisClient {
    fn analyze_initial(
        &self,
        request: &InitialAnalysisRequest,
    ) -> Result<InitialAnalysis, AnalysisError> {
        match request {
            InitialAnalysisRequest::TextSubmission { text } => {
                let response = self
                    .agent
                    .post(&self.endpoint("incident/analyze-text"))
                    .send_form(&[("text", text.as_str())])
                    .map_err(map_ureq_error)?;
                decode_analyze_text(&Self::read_body(response)?)
            }
            InitialAnalysisRequest::ConversationalSubmission { text, history } => {
                let response = self
                    .agent
                    .post(&self.endpoint("incident/conversation"))
                    .send_json(ConversationalWireRequest {
                        message: text.clone(),
                        history: history.clone(),
                    })
                    .map_err(map_ureq_error)?;
                decode_conversational(&Self::read_body(response)?)
            }
        }
    }

    fn analyze_follow_up(
        &self,
        request: &FollowUpRequest,
    ) -> Result<FollowUpReply, AnalysisError> {
        let response = self
            .agent
            .post(&self.endpoint("incident/follow-up"))
            .send_json(request)
            .map_err(map_ureq_error)?;
        decode_follow_up(&Self::read_body(response)?)
    }
}

#[derive(Debug, Serialize)]
struct ConversationalWireRequest {
    message: String,
    history: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum AnalyzeTextWire {
    Success {
        summary: String,
        severity: Severity,
        recommendation: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ConversationalWire {
    Success { reply: String },
    Error { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum FollowUpWire {
    Success {
        #[serde(alias = "answer")]
        reply: String,
    },
    Error {
        message: String,
    },
}

fn decode_analyze_text(body: &str) -> Result<InitialAnalysis, AnalysisError> {
    match serde_json::from_str(body).map_err(malformed_payload)? {
        AnalyzeTextWire::Success {
            summary,
            severity,
            recommendation,
        } => Ok(InitialAnalysis {
            summary,
            severity,
            recommendation,
            assistant_reply: None,
        }),
        AnalyzeTextWire::Error { message } => Err(AnalysisError::Service { message }),
    }
}

fn decode_conversational(body: &str) -> Result<InitialAnalysis, AnalysisError> {
    match serde_json::from_str(body).map_err(malformed_payload)? {
        // The model turn itself fails soft to placeholder values; only the
        // envelope is held to a strict shape.
        ConversationalWire::Success { reply } => Ok(parse_conversational_reply(&reply)),
        ConversationalWire::Error { message } => Err(AnalysisError::Service { message }),
    }
}

fn decode_follow_up(body: &str) -> Result<FollowUpReply, AnalysisError> {
    match serde_json::from_str(body).map_err(malformed_payload)? {
        FollowUpWire::Success { reply } => Ok(FollowUpReply { reply }),
        FollowUpWire::Error { message } => Err(AnalysisError::Service { message }),
    }
}

fn malformed_payload(err: serde_json::Error) -> AnalysisError {
    AnalysisError::Service {
        message: format!("malformed analysis response: {err}"),
    }
}

fn map_ureq_error(err: ureq::Error) -> AnalysisError {
    match err {
        ureq::Error::Status(code, response) => {
            let message = response
                .into_string()
                .ok()
                .and_then(|body| extract_error_message(&body))
                .unwrap_or_else(|| format!("analysis service returned status {code}"));
            AnalysisError::Service { message }
        }
        ureq::Error::Transport(transport) => AnalysisError::Transport {
            detail: transport.to_string(),
        },
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}
