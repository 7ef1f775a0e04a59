//! One-shot orchestration from the command line.
//!
//! `mlorch run --request '<json>'` or `--request @request.json` runs the
//! selected workflow with the same pipeline as the HTTP surface and prints
//! the report. With `--watch`, execution events are printed live.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use mlorch_types::event::FlowEvent;
use mlorch_types::result::{FlowResult, FlowStatus, StepResult, StepStatus};

use crate::service;
use crate::state::AppState;

/// How long to wait for the watcher to drain buffered events.
const WATCH_DRAIN: Duration = Duration::from_secs(1);

/// Read the request argument: inline JSON, or `@path` for a file.
pub async fn read_request(arg: &str) -> Result<Value> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read request file {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&raw).context("request is not valid JSON")
}

pub async fn run_request(
    state: &AppState,
    arg: &str,
    watch: bool,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let body = read_request(arg).await?;

    let watcher = watch.then(|| {
        let mut rx = state.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let done = matches!(event, FlowEvent::FlowFinished { .. });
                        print_event(&event);
                        if done {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        eprintln!("  {}", style(format!("({n} events dropped)")).dim());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let outcome = service::orchestrate(state, body).await;

    if let Some(handle) = watcher {
        if outcome.is_ok() {
            if tokio::time::timeout(WATCH_DRAIN, handle).await.is_err() {
                tracing::debug!("event watcher did not finish in time");
            }
        } else {
            handle.abort();
        }
    }

    let report = outcome?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print_report(&report);
    }

    if report.status == FlowStatus::Failed {
        let reason = report
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "flow failed".to_string());
        bail!("flow '{}' failed: {reason}", report.flow_name);
    }
    Ok(())
}

fn print_event(event: &FlowEvent) {
    match event {
        FlowEvent::FlowStarted { flow_name, total_stages, .. } => {
            println!(
                "  {} flow {} ({total_stages} stages)",
                style("▶").bold(),
                style(flow_name).cyan()
            );
        }
        FlowEvent::StageStarted { stage_index, steps, .. } => {
            println!("  {} stage {stage_index}: {}", style("•").dim(), steps.join(", "));
        }
        FlowEvent::StepStarted { step_name, .. } => {
            println!("    {} {step_name}", style("…").dim());
        }
        FlowEvent::StepFinished {
            step_name,
            status,
            attempts,
            duration_ms,
            ..
        } => {
            println!(
                "    {} {step_name} {} ({attempts} attempts, {duration_ms}ms)",
                status_mark(*status),
                status
            );
        }
        FlowEvent::FlowFinished { status, duration_ms, .. } => {
            println!("  {} {status} in {duration_ms}ms", style("■").bold());
        }
    }
}

fn status_mark(status: StepStatus) -> String {
    match status {
        StepStatus::Success => format!("{}", style("✓").green()),
        StepStatus::Failed => format!("{}", style("✗").red()),
        StepStatus::Skipped => format!("{}", style("-").dim()),
    }
}

fn step_detail(step: &StepResult) -> String {
    if let Some(error) = &step.error {
        return format!("{}: {}", error.kind, error.message.chars().take(60).collect::<String>());
    }
    step.skip_reason.clone().unwrap_or_else(|| "-".to_string())
}

fn print_report(report: &FlowResult) {
    let status = match report.status {
        FlowStatus::Success => style(report.status.to_string()).green(),
        FlowStatus::Partial => style(report.status.to_string()).yellow(),
        FlowStatus::Failed => style(report.status.to_string()).red(),
    };

    println!();
    println!(
        "  Flow {} {} in {}ms",
        style(&report.flow_name).cyan(),
        status.bold(),
        report.duration_ms
    );
    println!("  Execution: {}", style(report.execution_id).dim());
    if let Some(error) = &report.error {
        println!("  Error: {}", style(&error.message).red());
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Stage").fg(Color::Cyan),
            Cell::new("Step"),
            Cell::new("Status"),
            Cell::new("Attempts"),
            Cell::new("Duration"),
            Cell::new("Detail"),
        ]);

    for step in &report.results {
        let status_cell = match step.status {
            StepStatus::Success => Cell::new("success").fg(Color::Green),
            StepStatus::Failed => Cell::new("failed").fg(Color::Red),
            StepStatus::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(step.stage_index),
            Cell::new(&step.step_name),
            status_cell,
            Cell::new(step.attempts),
            Cell::new(format!("{}ms", step.duration_ms)),
            Cell::new(step_detail(step)),
        ]);
    }

    println!("{table}");
    println!(
        "  {} total, {} successful, {} failed, {} skipped",
        report.summary.total_steps,
        report.summary.successful,
        report.summary.failed,
        report.summary.skipped
    );
    println!();
}
