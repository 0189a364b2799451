//! Scenario simulator
//!
//! Runs canned incidents through the engine with the connectors configured
//! from the environment (demo mode without credentials) and prints every
//! event as it arrives.
//!
//! Usage:
//!   cargo run --bin simulate -- database_outage
//!   cargo run --bin simulate -- all --step-delay-ms 500

use anyhow::{bail, Context, Result};
use choreo_connectors::{build_collaborators, ConnectorConfig};
use choreo_core::{
    EngineSettings, EventScope, Incident, WorkflowEvent, WorkflowInputs, WorkflowSummary,
};
use choreo_monitoring::{init_logging, MonitoringConfig};
use choreo_server::scenarios::{self, Scenario, SCENARIOS};
use choreo_server::{build_state, AppState};
use clap::Parser;
use std::time::Duration;
use tokio::time::timeout;

// CLI Arguments
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario to run, or `all`
    scenario: String,

    /// Pause between workflow steps
    #[arg(long, default_value_t = 0)]
    step_delay_ms: u64,

    /// Repositories to analyse
    #[arg(long = "repo")]
    repositories: Vec<String>,

    /// Log filter
    #[arg(long, default_value = "warn")]
    log_filter: String,
}

// Grace period for events still in flight after a run returns
const DRAIN_WINDOW: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&MonitoringConfig::for_environment(
        "simulate",
        "development",
        cli.log_filter.clone(),
    ))
    .context("Failed to initialize logging")?;

    let selected: Vec<&Scenario> = if cli.scenario == "all" {
        SCENARIOS.iter().collect()
    } else {
        match scenarios::find(&cli.scenario) {
            Some(scenario) => vec![scenario],
            None => bail!(
                "Unknown scenario: {}. Available: {}, all",
                cli.scenario,
                scenarios::names()
            ),
        }
    };

    let connector_config = ConnectorConfig::from_env().context("Failed to load connector configuration")?;
    let collaborators =
        build_collaborators(&connector_config).context("Failed to build connectors")?;
    let state = build_state(
        collaborators,
        EngineSettings {
            step_delay: Duration::from_millis(cli.step_delay_ms),
        },
    );

    for (i, scenario) in selected.iter().enumerate() {
        println!("\n{}", "=".repeat(60));
        println!("[{}/{}] Simulating incident: {}", i + 1, selected.len(), scenario.name);
        println!("{}", "=".repeat(60));
        println!("Title:    {}", scenario.title);
        println!("Severity: {}", scenario.severity.as_str().to_uppercase());
        println!("Tags:     {}\n", scenario.tags.join(", "));

        let inputs = WorkflowInputs {
            repositories: cli.repositories.clone(),
            team_members: Vec::new(),
        };
        simulate(&state, scenario.incident(), inputs).await?;
    }

    Ok(())
}

async fn simulate(state: &AppState, incident: Incident, inputs: WorkflowInputs) -> Result<()> {
    let incident_id = incident.id.clone();
    let mut subscription = state.bus.subscribe_scoped(EventScope::Incident(incident_id.clone()));

    let run = state.runtime.run_workflow(incident, inputs);
    tokio::pin!(run);

    let workflow = loop {
        tokio::select! {
            result = &mut run => break result.context("Workflow run failed")?,
            Some(event) = subscription.recv() => print_event(&event),
        }
    };

    while let Ok(Some(event)) = timeout(DRAIN_WINDOW, subscription.recv()).await {
        print_event(&event);
    }

    let summary = WorkflowSummary::from(&workflow);
    println!("\nWorkflow summary:");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    for step in &workflow.steps {
        let note = step
            .result
            .as_ref()
            .and_then(|r| r.note())
            .map(|n| format!(" ({})", n))
            .unwrap_or_default();
        println!("  {}. {:<32} {:?}{}", step.number, step.name, step.status, note);
    }

    let incident = state.runtime.get_incident(&incident_id).await?;
    println!("\nIncident {}:", incident.id);
    println!("  ticket:     {}", incident.ticket_id.as_deref().unwrap_or("-"));
    println!("  channel:    {}", incident.chat_channel_name.as_deref().unwrap_or("-"));
    println!("  root cause: {}", incident.root_cause.as_deref().unwrap_or("-"));
    println!("  wiki page:  {}", incident.wiki_page_url.as_deref().unwrap_or("-"));
    println!("  tracker:    {}", incident.tracker_issue_key.as_deref().unwrap_or("-"));
    println!("  assignee:   {}", incident.assignee.as_deref().unwrap_or("-"));
    Ok(())
}

fn print_event(event: &WorkflowEvent) {
    let step = event
        .step_number
        .map(|n| format!(" step={}", n))
        .unwrap_or_default();
    println!(
        "[{}] {}{}",
        event.timestamp.format("%H:%M:%S%.3f"),
        event.topic.as_str(),
        step
    );
}
