//! Command execution.

use crate::Commands;
use colored::Colorize;
use fsmkit_core::{AdvanceResult, Event, Outcome, Subject, Table};
use fsmkit_notation::{
    generate, parse_file, render, DefaultStubWriter, ParseOutput, Severity, StubOptions,
};
use fsmkit_runtime::{Config, DispatchMode, Posted, Runtime};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// How long `run` waits for a queued event to complete.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(5);

/// Text to print and whether the command succeeded.
pub struct Output {
    pub text: String,
    pub success: bool,
}

impl Output {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }
}

/// Subject created by `run`. It binds no hooks, so every hook is the
/// default logging no-op.
struct Scripted {
    class_id: String,
}

impl Subject for Scripted {
    fn class_id(&self) -> &str {
        &self.class_id
    }
}

/// What happened to one posted event.
#[derive(Serialize)]
#[serde(untagged)]
enum Report {
    Result(AdvanceResult),
    NotDelivered { event: String, reason: String },
}

/// Executes a command and returns the formatted output.
pub async fn execute(cmd: Commands, config: Config) -> Result<Output, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Check { file } => {
            let parsed = parse_file(&file)?;
            let mut text = format_diagnostics(&file, &parsed);
            let success = parsed.table.is_some() && !parsed.has_errors();

            match &parsed.table {
                Some(table) if success => text.push_str(&format!(
                    "{} {}: {} states, {} transitions, {} events\n",
                    "OK".green(),
                    table.class_id().cyan(),
                    table.state_count(),
                    table.transitions().count(),
                    table.events().len()
                )),
                _ => text.push_str(&format!(
                    "{} {} error(s)\n",
                    "FAILED".red(),
                    parsed.errors().count()
                )),
            }

            Ok(Output { text, success })
        }

        Commands::Show { file, json } => {
            let table = load_table(&file)?;
            if json {
                Ok(Output::ok(serde_json::to_string_pretty(&table)?))
            } else {
                Ok(Output::ok(format_table(&table)))
            }
        }

        Commands::Render { file } => Ok(Output::ok(render(&load_table(&file)?))),

        Commands::Stubs {
            file,
            type_name,
            existing,
        } => {
            let table = load_table(&file)?;
            let mut options = StubOptions::new()
                .existing(existing)
                .generated_at(chrono::Utc::now());
            if let Some(name) = type_name {
                options = options.type_name(name);
            }
            Ok(Output::ok(generate(&table, &DefaultStubWriter, &options)))
        }

        Commands::Run {
            file,
            events,
            queued,
            name,
            json,
        } => {
            let table = load_table(&file)?;
            let mode = if queued {
                DispatchMode::Queued
            } else {
                config.queue.default_mode
            };
            run(table, config, events, mode, name, json).await
        }
    }
}

async fn run(
    table: Table,
    config: Config,
    events: Vec<String>,
    mode: DispatchMode,
    name: Option<String>,
    json: bool,
) -> Result<Output, Box<dyn std::error::Error>> {
    let class_id = table.class_id().to_string();
    let runtime = Runtime::new(config);
    runtime.register_table(table)?;

    let name = name.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let subject = Scripted {
        class_id: class_id.clone(),
    };
    let machine = runtime.create_subject(&class_id, name, subject, mode)?;
    let initial = machine.current_state();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    if mode == DispatchMode::Queued {
        machine.on_completion(move |result| {
            let _ = tx.send(result.clone());
        })?;
    }

    // One slot per event; queued events are filled in as they complete.
    let mut slots: Vec<Option<Report>> = Vec::with_capacity(events.len());
    for event in &events {
        let posted = machine.post(Event::new(event).notify_on_completion()).await;
        slots.push(match posted {
            Ok(Posted::Completed(result)) => Some(Report::Result(result)),
            Ok(Posted::Enqueued) => None,
            Ok(Posted::Rejected(reason)) => Some(Report::NotDelivered {
                event: event.clone(),
                reason: reason.to_string(),
            }),
            Err(e) => Some(Report::NotDelivered {
                event: event.clone(),
                reason: e.to_string(),
            }),
        });
    }

    let mut retired = false;
    for (slot, event) in slots.iter_mut().zip(&events) {
        if slot.is_some() {
            continue;
        }
        let received = if retired {
            None
        } else {
            tokio::time::timeout(COMPLETION_TIMEOUT, rx.recv())
                .await
                .ok()
                .flatten()
        };
        *slot = Some(match received {
            Some(result) => {
                retired = result.retired;
                Report::Result(result)
            }
            None => Report::NotDelivered {
                event: event.clone(),
                reason: if retired {
                    "dropped: subject retired".to_string()
                } else {
                    "no completion received".to_string()
                },
            },
        });
    }

    runtime.shutdown().await;

    let reports: Vec<Report> = slots.into_iter().flatten().collect();
    if json {
        return Ok(Output::ok(serde_json::to_string_pretty(&reports)?));
    }

    let mut text = format!(
        "{} {} ({}) in {}\n",
        "Created".green(),
        machine.key().cyan(),
        mode,
        initial.as_deref().unwrap_or("-").yellow()
    );
    for report in &reports {
        text.push_str(&format_report(report));
        text.push('\n');
    }
    text.push_str(&format!(
        "Final state: {}{}\n",
        machine.current_state().as_deref().unwrap_or("-").yellow(),
        if machine.is_retired() {
            format!(" ({})", "retired".magenta())
        } else {
            String::new()
        }
    ));
    Ok(Output::ok(text))
}

/// Parses a file, requiring a table. Diagnostics are logged.
fn load_table(path: &Path) -> Result<Table, Box<dyn std::error::Error>> {
    let parsed = parse_file(path)?;
    for d in &parsed.diagnostics {
        match d.severity {
            Severity::Error => tracing::error!("{}: {}", path.display(), d),
            Severity::Warning => tracing::warn!("{}: {}", path.display(), d),
            Severity::Note => tracing::debug!("{}: {}", path.display(), d),
        }
    }
    match parsed.table {
        Some(table) => Ok(table),
        None => Err(format!(
            "{}: no table produced\n{}",
            path.display(),
            format_diagnostics(path, &parsed).trim_end()
        )
        .into()),
    }
}

fn format_diagnostics(path: &Path, parsed: &ParseOutput) -> String {
    let mut output = String::new();
    for d in &parsed.diagnostics {
        let severity = match d.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow(),
            Severity::Note => "note".blue(),
        };
        output.push_str(&format!(
            "{}:{}: {}: {}\n",
            path.display(),
            d.line,
            severity,
            d.message
        ));
    }
    output
}

fn format_table(table: &Table) -> String {
    let mut output = format!("{}\n", format!("Table {}", table.class_id().cyan()).bold());
    if let Some(namespace) = table.namespace() {
        output.push_str(&format!("  Namespace: {}\n", namespace));
    }
    if let Some(version) = table.version() {
        output.push_str(&format!("  Version: {}\n", version));
    }
    output.push_str(&format!(
        "  Allocation: {}{}\n",
        table.allocation_policy(),
        if table.auto_retire() { ", auto-retire" } else { "" }
    ));

    let initial = table.initial_state();
    for state in table.states() {
        let mut marks = Vec::new();
        if Some(state.id()) == initial {
            marks.push("initial");
        }
        if state.is_terminal() {
            marks.push("terminal");
        }
        output.push_str(&format!(
            "  {}{}\n",
            state.name().yellow(),
            if marks.is_empty() {
                String::new()
            } else {
                format!(" [{}]", marks.join(", "))
            }
        ));
        if let Some(hint) = state.entry_annotation() {
            output.push_str(&format!("      onEntry: {}\n", hint));
        }
        if let Some(hint) = state.exit_annotation() {
            output.push_str(&format!("      onExit: {}\n", hint));
        }
        for t in state.transitions() {
            output.push_str(&format!("    --{}--> {}", t.event.cyan(), t.to));
            if let Some(guard) = &t.guard {
                output.push_str(&format!(" [{}]", guard));
            }
            if let Some(action) = &t.action {
                output.push_str(&format!(" / {}", action));
            }
            output.push('\n');
        }
    }
    output
}

fn format_report(report: &Report) -> String {
    let (event, mut line) = match report {
        Report::Result(result) => {
            let line = match &result.outcome {
                Outcome::Transitioned { from, to } => {
                    format!("{} {} -> {}", "transitioned".green(), from, to.yellow())
                }
                Outcome::Ignored { state } => format!("{} in {}", "ignored".yellow(), state),
                Outcome::Refused { state } => {
                    format!("{} by guard in {}", "refused".yellow(), state)
                }
                Outcome::Rejected(reason) => format!("{}: {}", "rejected".red(), reason),
            };
            (result.event.as_str(), line)
        }
        Report::NotDelivered { event, reason } => {
            (event.as_str(), format!("{}: {}", "not delivered".red(), reason))
        }
    };

    if let Report::Result(result) = report {
        if result.retired {
            line.push_str(&format!(" ({})", "retired".magenta()));
        } else if result.terminal {
            line.push_str(" (terminal)");
        }
    }
    format!("  {} {}", event.bold(), line)
}
