//! Transition engine.
//!
//! [`advance`] is a pure function of (current state, event) against a bound
//! table, apart from the hooks it runs. For an accepted event the hooks run in
//! a fixed order: exit of the current state, the transition action, entry of
//! the target state. Each falls back to a logging no-op when unbound.

use crate::event::{Event, Rejection};
use crate::hooks::Binding;
use crate::table::StateId;
use serde::Serialize;

/// How an event was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    /// The transition was taken.
    Transitioned { from: String, to: String },
    /// The current state has no transition for the event.
    Ignored { state: String },
    /// The transition's guard returned false.
    Refused { state: String },
    /// The event failed validation; no hooks ran.
    Rejected(Rejection),
}

impl Outcome {
    /// Returns true if the subject changed state.
    pub fn is_transition(&self) -> bool {
        matches!(self, Outcome::Transitioned { .. })
    }

    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Transitioned { .. } => "transitioned",
            Outcome::Ignored { .. } => "ignored",
            Outcome::Refused { .. } => "refused",
            Outcome::Rejected(_) => "rejected",
        }
    }
}

/// Result of one engine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// State after the step.
    pub next: Option<StateId>,
    pub outcome: Outcome,
}

/// Result of delivering an event to a subject, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvanceResult {
    /// Subject key (`CLASS:name`).
    pub subject: String,
    /// Event name.
    pub event: String,
    /// State after the event, if the subject has one.
    pub state: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// True if the resulting state has no outbound transitions.
    pub terminal: bool,
    /// True if this event retired the subject: it reached a terminal state of
    /// an auto-retiring table, or one of its hooks retired it.
    pub retired: bool,
}

/// Delivers `event` to a subject in state `current`.
pub fn advance<B>(
    binding: &Binding<B>,
    subject_key: &str,
    current: Option<StateId>,
    subject: &mut B,
    event: &Event,
) -> Step {
    let table = binding.table();

    let Some(current) = current else {
        tracing::warn!(
            "{}: event '{}' rejected: no current state",
            subject_key,
            event.name()
        );
        return Step {
            next: None,
            outcome: Outcome::Rejected(Rejection::NoInitialState),
        };
    };

    if let Err(reason) = event.validate(table, subject_key) {
        tracing::warn!("{}: event '{}' rejected: {}", subject_key, event.name(), reason);
        return Step {
            next: Some(current),
            outcome: Outcome::Rejected(reason),
        };
    }

    let Some(state) = table.state(current) else {
        return Step {
            next: Some(current),
            outcome: Outcome::Rejected(Rejection::NoInitialState),
        };
    };

    let Some(transition) = state.transition(event.name()) else {
        tracing::debug!(
            "{}: event '{}' ignored in state '{}'",
            subject_key,
            event.name(),
            state.name()
        );
        return Step {
            next: Some(current),
            outcome: Outcome::Ignored {
                state: state.name().to_string(),
            },
        };
    };

    if let Some(guard) = binding.guard(transition) {
        if !guard(subject, event) {
            tracing::debug!(
                "{}: guard refused event '{}' in state '{}'",
                subject_key,
                event.name(),
                state.name()
            );
            return Step {
                next: Some(current),
                outcome: Outcome::Refused {
                    state: state.name().to_string(),
                },
            };
        }
    }

    binding.run_exit(current, subject, event);
    binding.run_action(transition, subject, event);
    binding.run_entry(transition.target(), subject, event);

    tracing::debug!(
        "{}: {} --{}--> {}",
        subject_key,
        transition.from,
        transition.event,
        transition.to
    );

    Step {
        next: Some(transition.target()),
        outcome: Outcome::Transitioned {
            from: transition.from.clone(),
            to: transition.to.clone(),
        },
    }
}

/// Reports where `event` would lead without running exit, action or entry hooks.
///
/// The guard, if bound, is still evaluated.
pub fn probe<B>(
    binding: &Binding<B>,
    subject_key: &str,
    current: Option<StateId>,
    subject: &mut B,
    event: &Event,
) -> Step {
    let table = binding.table();
    let Some(current) = current else {
        return Step {
            next: None,
            outcome: Outcome::Rejected(Rejection::NoInitialState),
        };
    };
    if let Err(reason) = event.validate(table, subject_key) {
        return Step {
            next: Some(current),
            outcome: Outcome::Rejected(reason),
        };
    }

    let state = table.state(current);
    let name = state.map(|s| s.name().to_string()).unwrap_or_default();
    match state.and_then(|s| s.transition(event.name())) {
        None => Step {
            next: Some(current),
            outcome: Outcome::Ignored { state: name },
        },
        Some(t) => {
            let allowed = binding.guard(t).map(|g| g(subject, event)).unwrap_or(true);
            if allowed {
                Step {
                    next: Some(t.target()),
                    outcome: Outcome::Transitioned {
                        from: t.from.clone(),
                        to: t.to.clone(),
                    },
                }
            } else {
                Step {
                    next: Some(current),
                    outcome: Outcome::Refused { state: name },
                }
            }
        }
    }
}
