use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use haven_analysis::{AnalysisEndpointConfig, HttpAnalysisClient};
use haven_core::{AudioRef, GeoPoint, Incident, IncidentDraft, IncidentStatus, MessageSender};
use haven_lifecycle::{AnalysisMode, IncidentLifecycle, LifecycleConfig};
use haven_store::IncidentStore;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "haven")]
#[command(about = "Safety incident reporting and triage", long_about = None)]
struct Cli {
    /// Incident database path; defaults to the user data directory.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Analysis service base URL.
    #[arg(
        long,
        global = true,
        env = "HAVEN_ANALYSIS_URL",
        default_value = "http://localhost:8000"
    )]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new incident report
    Report {
        /// Report text; may be omitted for an audio-only report
        #[arg(default_value = "")]
        text: String,
        /// Reference to recorded audio emitted by the capture device
        #[arg(long)]
        audio: Option<String>,
        #[arg(long, requires = "lon")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lon: Option<f64>,
        /// Drive the conversational analysis variant instead of the plain
        /// text submission
        #[arg(long)]
        conversational: bool,
        /// Persist the report without contacting the analysis service
        #[arg(long)]
        no_analyze: bool,
    },
    /// Ask a follow-up question about an incident
    FollowUp { incident_id: String, text: String },
    /// List reported incidents
    List {
        /// Only incidents with this status (Pending, AIResolved, Escalated)
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one incident with its conversation
    Show {
        incident_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Overwrite an incident's status (operator action)
    SetStatus { incident_id: String, status: String },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();
    let store = open_store(cli.db.clone())?;
    let client = HttpAnalysisClient::new(AnalysisEndpointConfig {
        base_url: cli.endpoint.clone(),
        ..AnalysisEndpointConfig::default()
    });

    match cli.command {
        Commands::Report {
            text,
            audio,
            lat,
            lon,
            conversational,
            no_analyze,
        } => {
            let mode = if conversational {
                AnalysisMode::Conversational
            } else {
                AnalysisMode::Text
            };
            let mut lifecycle = IncidentLifecycle::with_config(
                store,
                Box::new(client),
                LifecycleConfig {
                    analysis_mode: mode,
                },
            );

            let draft = IncidentDraft {
                text,
                audio_reference: audio.map(AudioRef),
                location: match (lat, lon) {
                    (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
                    _ => None,
                },
            };
            let incident = lifecycle
                .create_incident(draft)
                .context("Failed to create incident")?;
            println!("Incident {} recorded.", incident.id);

            if no_analyze {
                return Ok(());
            }

            info!(incident_id = %incident.id, "submitting for analysis");
            lifecycle
                .submit_for_analysis(&incident.id)
                .context("Failed to apply analysis outcome")?;

            let enriched = lifecycle
                .incident(&incident.id)
                .context("Failed to reload incident")?
                .ok_or_else(|| anyhow!("incident disappeared after analysis"))?;
            match enriched.status {
                IncidentStatus::AiResolved => {
                    println!("{}", enriched.summary.as_deref().unwrap_or_default());
                    if let Some(severity) = enriched.severity {
                        println!("Severity: {severity}");
                    }
                    if let Some(recommendation) = enriched.recommendation.as_deref() {
                        println!("Next Steps: {recommendation}");
                    }
                }
                _ => {
                    warn!(incident_id = %enriched.id, "analysis did not resolve the incident");
                    if let Some(last) = enriched.conversation.last() {
                        println!("{}", last.text);
                    }
                    println!("The incident stays Pending; ask a follow-up to retry.");
                }
            }
        }
        Commands::FollowUp { incident_id, text } => {
            let mut lifecycle = IncidentLifecycle::new(store, Box::new(client));
            lifecycle
                .ask_follow_up(&incident_id, &text)
                .context("Failed to ask follow-up")?;

            let incident = lifecycle
                .incident(&incident_id)
                .context("Failed to reload incident")?
                .ok_or_else(|| anyhow!("no incident with id {incident_id}"))?;
            match incident.conversation.last() {
                Some(message) if message.sender == MessageSender::Assistant => {
                    println!("{}", message.text);
                }
                _ => println!("No reply recorded."),
            }
        }
        Commands::List { status, json } => {
            let lifecycle = IncidentLifecycle::new(store, Box::new(client));
            let filter = status
                .map(|raw| raw.parse::<IncidentStatus>().map_err(|err| anyhow!(err)))
                .transpose()?;

            let incidents: Vec<Incident> = lifecycle
                .incidents()
                .context("Failed to load incidents")?
                .into_iter()
                .filter(|incident| filter.map_or(true, |wanted| incident.status == wanted))
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&incidents)?);
                return Ok(());
            }

            if incidents.is_empty() {
                println!("No incidents reported yet.");
                return Ok(());
            }
            println!("{} incidents:", incidents.len());
            for incident in &incidents {
                let description = if incident.text.is_empty() {
                    "(Audio Only)"
                } else {
                    incident.text.as_str()
                };
                println!(
                    "- [{}] {} | {} | {}",
                    incident.id,
                    incident.status,
                    incident.created_at.to_rfc3339(),
                    description
                );
            }
        }
        Commands::Show { incident_id, json } => {
            let lifecycle = IncidentLifecycle::new(store, Box::new(client));
            let incident = lifecycle
                .incident(&incident_id)
                .context("Failed to load incident")?
                .ok_or_else(|| anyhow!("no incident with id {incident_id}"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&incident)?);
                return Ok(());
            }

            println!("Incident {}", incident.id);
            println!("Status: {}", incident.status);
            println!("Reported: {}", incident.created_at.to_rfc3339());
            if let Some(location) = incident.location {
                println!("Location: {:.4}, {:.4}", location.lat, location.lon);
            }
            if let Some(audio) = &incident.audio_reference {
                println!("Audio: {}", audio.as_str());
            }
            if let Some(summary) = incident.summary.as_deref() {
                println!("Summary: {summary}");
            }
            if let Some(severity) = incident.severity {
                println!("Severity: {severity}");
            }
            if let Some(recommendation) = incident.recommendation.as_deref() {
                println!("Recommendation: {recommendation}");
            }
            println!("Conversation:");
            for message in &incident.conversation {
                println!("  {}: {}", message.sender, message.text);
            }
        }
        Commands::SetStatus {
            incident_id,
            status,
        } => {
            let mut lifecycle = IncidentLifecycle::new(store, Box::new(client));
            let status = status.parse::<IncidentStatus>().map_err(|err| anyhow!(err))?;
            let incident = lifecycle
                .set_status(&incident_id, status)
                .context("Failed to update status")?;
            println!("Incident {} is now {}.", incident.id, incident.status);
        }
    }

    Ok(())
}

fn open_store(db: Option<PathBuf>) -> Result<IncidentStore> {
    let path = match db {
        Some(path) => path,
        None => {
            let base = dirs::data_dir().ok_or_else(|| anyhow!("no user data directory"))?;
            base.join("haven").join("incidents.db")
        }
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    IncidentStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}
