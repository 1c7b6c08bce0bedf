//! Scripted multi-client sessions against the in-memory sheet server.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sheet_sync_core::authority::{Authority, LoopbackTransport, SharedAuthority};
use sheet_sync_core::models::{Role, User};
use sheet_sync_core::sync::{ResolveOutcome, ServerEvent, SyncStatus, UpdateOutcome};
use sheet_sync_core::util::normalize_text_option;
use sheet_sync_core::{
    Conflict, ConnectionState, Document, FieldPath, FieldValue, ResubmitPolicy, SyncClient,
    SyncConfig,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::commands::common::{format_field_lines, read_json_file, value_preview};
use crate::error::CliError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub sheet: Document,
    /// Whether the server honours expected versions on edits
    #[serde(default = "default_true")]
    pub preconditions: bool,
    pub clients: Vec<ScriptClient>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A collaborator; `name` doubles as the editor identity.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptClient {
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub resubmit_policy: Option<ResubmitPolicy>,
    #[serde(default)]
    pub send_expected_version: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Step {
    /// `field` is a field id or a `sections[i].fields[j].value` path
    Edit {
        client: String,
        field: String,
        value: FieldValue,
    },
    /// Hand queued server events to one client, or to every client
    Deliver {
        #[serde(default)]
        client: Option<String>,
    },
    Resolve {
        client: String,
        keep_local: bool,
        #[serde(default)]
        field: Option<String>,
    },
    Disconnect {
        client: String,
    },
    Connect {
        client: String,
    },
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StepReport {
    pub step: usize,
    pub client: String,
    pub action: &'static str,
    pub outcome: String,
}

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub path: FieldPath,
    pub value: FieldValue,
}

#[derive(Debug, Serialize)]
pub struct ClientReport {
    pub name: String,
    pub role: Role,
    pub status: SyncStatus,
    pub document: Document,
    pub pending: Vec<PendingItem>,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub server: Document,
    pub steps: Vec<StepReport>,
    pub clients: Vec<ClientReport>,
}

struct SimClient {
    name: String,
    role: Role,
    client: SyncClient<LoopbackTransport>,
    events: UnboundedReceiver<ServerEvent>,
}

impl ScriptClient {
    fn config(&self, editor: &str, base: &SyncConfig) -> SyncConfig {
        SyncConfig {
            editor: editor.to_string(),
            role: self.role,
            resubmit_policy: self.resubmit_policy.unwrap_or(base.resubmit_policy),
            send_expected_version: self
                .send_expected_version
                .unwrap_or(base.send_expected_version),
            ..base.clone()
        }
    }
}

pub async fn run_simulate(
    script_path: &Path,
    config: &SyncConfig,
    as_json: bool,
) -> Result<(), CliError> {
    let script = read_json_file::<Script>(script_path)?;
    let report = run_script(script, config).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Host the script's sheet, connect its clients, and play every step.
///
/// Errors from the sync core (locked fields, a dropped connection, nothing
/// to resolve) are part of a scenario and end up in the step report. Only
/// malformed scripts abort the run.
pub async fn run_script(script: Script, base: &SyncConfig) -> Result<SimulationReport, CliError> {
    let authority =
        SharedAuthority::new(Authority::new().with_preconditions(script.preconditions));
    let document_id = authority.host(script.sheet).await?;

    let mut clients: Vec<SimClient> = Vec::with_capacity(script.clients.len());
    for entry in &script.clients {
        let Some(name) = normalize_text_option(Some(entry.name.clone())) else {
            return Err(CliError::Config("client name must not be empty".to_string()));
        };
        if clients.iter().any(|existing| existing.name == name) {
            return Err(CliError::DuplicateClient(name));
        }

        let config = entry.config(&name, base);
        let (transport, events) = authority
            .connect(User::new(name.clone(), config.role))
            .await;
        let snapshot = transport.open(document_id).await?;
        let mut client = SyncClient::new(transport, config);
        client.load_document(snapshot)?;
        clients.push(SimClient {
            name,
            role: entry.role,
            client,
            events,
        });
    }

    let mut steps = Vec::new();
    for (index, step) in script.steps.into_iter().enumerate() {
        play_step(&mut clients, index + 1, step, &mut steps).await?;
    }

    let server = authority.fetch(document_id).await?;
    let clients = clients.iter().filter_map(client_report).collect();
    Ok(SimulationReport {
        server,
        steps,
        clients,
    })
}

async fn play_step(
    clients: &mut [SimClient],
    number: usize,
    step: Step,
    reports: &mut Vec<StepReport>,
) -> Result<(), CliError> {
    tracing::debug!(step = number, ?step, "Playing script step");
    match step {
        Step::Edit {
            client,
            field,
            value,
        } => {
            let sim = client_mut(clients, &client)?;
            let path = resolve_field(sim.client.document(), &field, number)?;
            let outcome = match sim.client.submit_field_edit(path, value.clone()).await {
                Ok(receipt) if receipt.replaced_conflict => format!(
                    "submitted {path} = {} (replaced local side of conflict)",
                    value_preview(&value, 40)
                ),
                Ok(_) => format!("submitted {path} = {}", value_preview(&value, 40)),
                Err(error) => format!("error: {error}"),
            };
            reports.push(report(number, &client, "edit", outcome));
        }
        Step::Deliver { client: None } => {
            for sim in clients.iter_mut() {
                deliver(sim, number, reports);
            }
        }
        Step::Deliver {
            client: Some(client),
        } => {
            deliver(client_mut(clients, &client)?, number, reports);
        }
        Step::Resolve {
            client,
            keep_local,
            field,
        } => {
            let sim = client_mut(clients, &client)?;
            let resolved = match field {
                Some(field) => {
                    let path = resolve_field(sim.client.document(), &field, number)?;
                    sim.client.resolve_conflict_at(path, keep_local).await
                }
                None => sim.client.resolve_conflict(keep_local).await,
            };
            let outcome = match resolved {
                Ok(outcome) => describe_resolution(&outcome),
                Err(error) => format!("error: {error}"),
            };
            reports.push(report(number, &client, "resolve", outcome));
        }
        Step::Disconnect { client } => {
            let sim = client_mut(clients, &client)?;
            sim.client
                .transport_mut()
                .set_connection_state(ConnectionState::Disconnected);
            reports.push(report(number, &client, "disconnect", "disconnected".to_string()));
        }
        Step::Connect { client } => {
            let sim = client_mut(clients, &client)?;
            sim.client
                .transport_mut()
                .set_connection_state(ConnectionState::Connected);
            reports.push(report(number, &client, "connect", "connected".to_string()));
        }
    }
    Ok(())
}

fn deliver(sim: &mut SimClient, number: usize, reports: &mut Vec<StepReport>) {
    let mut delivered = 0_usize;
    while let Ok(event) = sim.events.try_recv() {
        delivered += 1;
        let outcome = match sim.client.handle_event(&event) {
            Ok(outcome) => describe_outcome(&outcome),
            Err(error) => format!("error: {error}"),
        };
        reports.push(report(number, &sim.name, "deliver", outcome));
    }
    if delivered == 0 {
        reports.push(report(number, &sim.name, "deliver", "no events".to_string()));
    }
}

fn client_mut<'a>(clients: &'a mut [SimClient], name: &str) -> Result<&'a mut SimClient, CliError> {
    clients
        .iter_mut()
        .find(|sim| sim.name == name.trim())
        .ok_or_else(|| CliError::UnknownClient(name.to_string()))
}

fn resolve_field(
    document: Option<&Document>,
    field: &str,
    step: usize,
) -> Result<FieldPath, CliError> {
    let document = document.ok_or_else(|| CliError::InvalidStep {
        step,
        reason: "client has no sheet open".to_string(),
    })?;
    field
        .parse::<FieldPath>()
        .ok()
        .or_else(|| document.path_of(field.trim()))
        .ok_or_else(|| CliError::InvalidStep {
            step,
            reason: format!("unknown field '{field}'"),
        })
}

fn report(step: usize, client: &str, action: &'static str, outcome: String) -> StepReport {
    StepReport {
        step,
        client: client.to_string(),
        action,
        outcome,
    }
}

pub fn describe_outcome(outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::Applied {
            path,
            version,
            cleared_pending: true,
        } => format!("applied {path} at version {version}, confirming local edit"),
        UpdateOutcome::Applied { path, version, .. } => {
            format!("applied {path} at version {version}")
        }
        UpdateOutcome::ConflictRaised(path) => format!("conflict on {path}"),
        UpdateOutcome::ConflictRefreshed(path) => format!("conflict on {path} refreshed"),
        UpdateOutcome::ConflictSettled(path) => {
            format!("conflict on {path} settled by own write")
        }
        UpdateOutcome::Ignored { incoming, current } => {
            format!("ignored stale version {incoming} (at {current})")
        }
        UpdateOutcome::Discarded => "discarded".to_string(),
    }
}

fn describe_resolution(outcome: &ResolveOutcome) -> String {
    match outcome {
        ResolveOutcome::Resubmitted {
            path,
            expected_version: Some(version),
        } => format!("kept local value for {path}, resubmitted against version {version}"),
        ResolveOutcome::Resubmitted { path, .. } => {
            format!("kept local value for {path}, resubmitted")
        }
        ResolveOutcome::AcceptedIncoming(event) => format!(
            "accepted {} = {} from {} at version {}",
            event.path,
            value_preview(&event.new_value, 40),
            event.edited_by,
            event.version
        ),
    }
}

fn client_report(sim: &SimClient) -> Option<ClientReport> {
    let document = sim.client.document()?.clone();
    let pending = sim
        .client
        .pending()
        .map(|pending| {
            pending
                .iter()
                .map(|(path, value)| PendingItem {
                    path,
                    value: value.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ClientReport {
        name: sim.name.clone(),
        role: sim.role,
        status: sim.client.status(),
        document,
        pending,
        conflicts: sim.client.conflicts().to_vec(),
    })
}

pub fn format_report_lines(report: &SimulationReport) -> Vec<String> {
    let mut lines = Vec::new();
    for step in &report.steps {
        lines.push(format!(
            "{:>3}. {} {}: {}",
            step.step, step.client, step.action, step.outcome
        ));
    }

    lines.push(String::new());
    lines.push(format!("server: version {}", report.server.version));
    lines.extend(
        format_field_lines(&report.server)
            .into_iter()
            .map(|line| format!("  {line}")),
    );

    for client in &report.clients {
        let status = &client.status;
        lines.push(String::new());
        lines.push(format!(
            "{} ({}): {}, version {}, {} pending, {} conflict(s)",
            client.name,
            client.role,
            status.connection.label(),
            status
                .version
                .map_or_else(|| "-".to_string(), |version| version.to_string()),
            status.pending,
            status.conflicts
        ));
        lines.extend(
            format_field_lines(&client.document)
                .into_iter()
                .map(|line| format!("  {line}")),
        );
        for item in &client.pending {
            lines.push(format!(
                "  pending {} = {}",
                item.path,
                value_preview(&item.value, 40)
            ));
        }
        for conflict in &client.conflicts {
            lines.push(format!(
                "  conflict {}: local {} vs {} from {} (version {})",
                conflict.path,
                value_preview(&conflict.local_value, 40),
                value_preview(&conflict.incoming_value, 40),
                conflict.incoming_editor,
                conflict.incoming_version
            ));
        }
    }
    lines
}
