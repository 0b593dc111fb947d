use chrono::Utc;
use haven_analysis::{AnalysisClient, AnalysisError};
use haven_core::analysis::{
    FollowUpReply, FollowUpRequest, InitialAnalysis, InitialAnalysisRequest,
};
use haven_core::{Incident, IncidentDraft, IncidentStatus, ValidationError};
use haven_store::{IncidentStore, StoreError};
use thiserror::Error;

pub mod flight;

pub use flight::{AnalysisFlights, FlightTicket};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no incident with id {id}")]
    UnknownIncident { id: String },
}

/// Which initial-analysis shape the service is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Text,
    Conversational,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub analysis_mode: AnalysisMode,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            analysis_mode: AnalysisMode::Text,
        }
    }
}

/// The reporting session's explicit state: which incident the conversation
/// view is pointed at. Held here instead of ambient UI state so operations
/// receive it deliberately.
#[derive(Debug, Default, Clone)]
pub struct SessionContext {
    current_incident: Option<String>,
}

impl SessionContext {
    pub fn current_incident(&self) -> Option<&str> {
        self.current_incident.as_deref()
    }

    fn select(&mut self, incident_id: &str) {
        self.current_incident = Some(incident_id.to_string());
    }
}

/// Owns the per-incident state machine: creation, analysis enrichment,
/// follow-up conversation, operator status changes. Every mutation is
/// reconciled with the store through its targeted update interface, and
/// every analysis call goes through the single-flight tracker so a
/// superseded completion cannot clobber a newer one.
pub struct IncidentLifecycle {
    store: IncidentStore,
    client: Box<dyn AnalysisClient>,
    config: LifecycleConfig,
    session: SessionContext,
    flights: AnalysisFlights,
}

impl IncidentLifecycle {
    pub fn new(store: IncidentStore, client: Box<dyn AnalysisClient>) -> Self {
        Self::with_config(store, client, LifecycleConfig::default())
    }

    pub fn with_config(
        store: IncidentStore,
        client: Box<dyn AnalysisClient>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            client,
            config,
            session: SessionContext::default(),
            flights: AnalysisFlights::new(),
        }
    }

    /// Creates and persists a new incident from the reporter's draft and
    /// selects it as the session's current incident. The record is durable
    /// before any analysis call is issued, so a failed call cannot lose the
    /// report.
    pub fn create_incident(&mut self, draft: IncidentDraft) -> Result<Incident, LifecycleError> {
        draft.validate()?;
        let incident = Incident::from_draft(draft, Utc::now());
        self.store.upsert_incident(&incident)?;
        self.session.select(&incident.id);
        Ok(incident)
    }

    /// Issues the initial analysis for an incident and applies the outcome.
    /// Blocks at the analysis boundary; see `begin_analysis` /
    /// `apply_analysis_outcome` for the two halves.
    pub fn submit_for_analysis(&mut self, incident_id: &str) -> Result<(), LifecycleError> {
        let (ticket, request) = self.begin_analysis(incident_id)?;
        let outcome = self.client.analyze_initial(&request);
        self.apply_analysis_outcome(ticket, outcome)
    }

    /// First half of `submit_for_analysis`: builds the request snapshot and
    /// registers the flight. Any analysis already in flight for this
    /// incident is superseded.
    pub fn begin_analysis(
        &mut self,
        incident_id: &str,
    ) -> Result<(FlightTicket, InitialAnalysisRequest), LifecycleError> {
        let incident = self.require_incident(incident_id)?;
        let request = match self.config.analysis_mode {
            AnalysisMode::Text => InitialAnalysisRequest::TextSubmission {
                text: incident.text.clone(),
            },
            AnalysisMode::Conversational => InitialAnalysisRequest::ConversationalSubmission {
                text: incident.text.clone(),
                history: incident.conversation.clone(),
            },
        };
        Ok((self.flights.begin(incident_id), request))
    }

    /// Second half: applies a completed initial analysis. Success appends
    /// the assistant reply (when present), records summary, severity and
    /// recommendation, and resolves the incident. Failure appends one
    /// assistant message with the failure reason and leaves the status
    /// `Pending` for a manual retry. A superseded ticket is discarded
    /// without touching the incident.
    pub fn apply_analysis_outcome(
        &mut self,
        ticket: FlightTicket,
        outcome: Result<InitialAnalysis, AnalysisError>,
    ) -> Result<(), LifecycleError> {
        if !self.flights.settle(&ticket) {
            return Ok(());
        }

        match outcome {
            Ok(analysis) => {
                self.update(ticket.incident_id(), |incident| {
                    if let Some(reply) = analysis.assistant_reply {
                        incident.push_assistant(reply);
                    }
                    incident.summary = Some(analysis.summary);
                    incident.severity = Some(analysis.severity);
                    incident.recommendation = Some(analysis.recommendation);
                    incident.status = IncidentStatus::AiResolved;
                })?;
            }
            Err(failure) => {
                self.update(ticket.incident_id(), |incident| {
                    incident.push_assistant(format!("AI analysis failed: {failure}"));
                })?;
            }
        }
        Ok(())
    }

    /// Appends a follow-up question and obtains the assistant's reply.
    /// No-op when the question is empty or the incident does not exist.
    pub fn ask_follow_up(
        &mut self,
        incident_id: &str,
        follow_up: &str,
    ) -> Result<(), LifecycleError> {
        let Some((ticket, request)) = self.begin_follow_up(incident_id, follow_up)? else {
            return Ok(());
        };
        let outcome = self.client.analyze_follow_up(&request);
        self.apply_follow_up_outcome(ticket, outcome)
    }

    /// Follow-up against the session's current incident; no-op when no
    /// incident is selected.
    pub fn ask_follow_up_current(&mut self, follow_up: &str) -> Result<(), LifecycleError> {
        let Some(incident_id) = self.session.current_incident().map(str::to_string) else {
            return Ok(());
        };
        self.ask_follow_up(&incident_id, follow_up)
    }

    /// First half of `ask_follow_up`: appends and persists the user's
    /// message immediately, so it is visible before the analysis call is
    /// issued, then registers the flight with the full conversation
    /// snapshot.
    pub fn begin_follow_up(
        &mut self,
        incident_id: &str,
        follow_up: &str,
    ) -> Result<Option<(FlightTicket, FollowUpRequest)>, LifecycleError> {
        if follow_up.is_empty() {
            return Ok(None);
        }
        if self.store.get_incident(incident_id)?.is_none() {
            return Ok(None);
        }

        let updated = self.update(incident_id, |incident| incident.push_user(follow_up))?;
        let request = FollowUpRequest {
            incident_id: incident_id.to_string(),
            follow_up: follow_up.to_string(),
            conversation: updated.conversation,
        };
        Ok(Some((self.flights.begin(incident_id), request)))
    }

    /// Second half: appends the assistant's reply, or a failure message
    /// when the call did not produce one. Superseded tickets are discarded;
    /// the synchronously appended user message always stays.
    pub fn apply_follow_up_outcome(
        &mut self,
        ticket: FlightTicket,
        outcome: Result<FollowUpReply, AnalysisError>,
    ) -> Result<(), LifecycleError> {
        if !self.flights.settle(&ticket) {
            return Ok(());
        }

        let text = match outcome {
            Ok(reply) => reply.reply,
            Err(failure) => format!("AI analysis failed: {failure}"),
        };
        self.update(ticket.incident_id(), |incident| {
            incident.push_assistant(text);
        })?;
        Ok(())
    }

    /// Operator transition: unconditionally overwrites the status of an
    /// existing incident and persists it.
    pub fn set_status(
        &mut self,
        incident_id: &str,
        status: IncidentStatus,
    ) -> Result<Incident, LifecycleError> {
        self.update(incident_id, |incident| incident.status = status)
    }

    pub fn incidents(&self) -> Result<Vec<Incident>, LifecycleError> {
        Ok(self.store.load_all()?)
    }

    pub fn incident(&self, incident_id: &str) -> Result<Option<Incident>, LifecycleError> {
        Ok(self.store.get_incident(incident_id)?)
    }

    pub fn select_incident(&mut self, incident_id: &str) -> Result<(), LifecycleError> {
        self.require_incident(incident_id)?;
        self.session.select(incident_id);
        Ok(())
    }

    pub fn current_incident(&self) -> Option<&str> {
        self.session.current_incident()
    }

    pub fn has_analysis_in_flight(&self, incident_id: &str) -> bool {
        self.flights.has_in_flight(incident_id)
    }

    fn require_incident(&self, incident_id: &str) -> Result<Incident, LifecycleError> {
        self.store
            .get_incident(incident_id)?
            .ok_or_else(|| LifecycleError::UnknownIncident {
                id: incident_id.to_string(),
            })
    }

    fn update<F>(&mut self, incident_id: &str, patch: F) -> Result<Incident, LifecycleError>
    where
        F: FnOnce(&mut Incident),
    {
        self.store
            .update_incident(incident_id, patch)
            .map_err(|err| match err {
                StoreError::IncidentNotFound { id } => LifecycleError::UnknownIncident { id },
                other => LifecycleError::Store(other),
            })
    }
}
