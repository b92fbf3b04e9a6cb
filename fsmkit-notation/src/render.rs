//! Renders a table back into description notation.
//!
//! The output parses to an equivalent table: same header, states in the same
//! order, same initial state and transitions. Auto-retire and allocation
//! policy have no notation and are not rendered.
//!
//! Hints survive when their text is a single line, has no double quotes and
//! does not itself read as a hint marker. An entry hint such as `exit stage`
//! is rendered as written but reads back as an exit hint; such states are
//! logged at warn level.

use crate::parser::{entry_hint, exit_hint};
use fsmkit_core::{State, Table, Transition};
use std::fmt::Write;

/// Characters that must be quoted to survive a parse.
const SPECIAL: &[char] = &[';', ',', ':', '[', ']', '/', '-', '>', '<', '=', '#'];

/// Renders `table` as a description.
pub fn render(table: &Table) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "#FSM:{}", table.class_id());
    if let Some(namespace) = table.namespace() {
        let _ = writeln!(out, "#nameSpace:{}", namespace);
    }
    if let Some(version) = table.version() {
        let _ = writeln!(out, "#vctString:{}", version);
    }

    let states: Vec<String> = table.states().map(state_declaration).collect();
    let _ = writeln!(out, "{};", states.join(",\n"));

    if let Some(initial) = table.initial_state().and_then(|id| table.state(id)) {
        let _ = writeln!(out, "initial->{};", token(initial.name()));
    }
    for transition in table.transitions() {
        let _ = writeln!(out, "{};", transition_declaration(transition));
    }

    out
}

fn state_declaration(state: &State) -> String {
    let mut hints = Vec::new();
    if let Some(entry) = state.entry_annotation() {
        hints.push(format!("onEntry: {}", entry.replace('"', "")));
    }
    if let Some(exit) = state.exit_annotation() {
        hints.push(format!("onExit: {}", exit.replace('"', "")));
    }

    if hints.is_empty() {
        return token(state.name());
    }

    let annotation = hints.join("\n");
    if !hints_survive(state, &annotation) {
        tracing::warn!(
            "state '{}': hints will not read back unchanged from {:?}",
            state.name(),
            annotation
        );
    }
    format!("{}:\"{}\"", token(state.name()), annotation)
}

/// Returns true if `annotation` reads back as the state's own hints.
pub(crate) fn hints_survive(state: &State, annotation: &str) -> bool {
    entry_hint(annotation).as_deref() == state.entry_annotation()
        && exit_hint(annotation).as_deref() == state.exit_annotation()
}

fn transition_declaration(transition: &Transition) -> String {
    let mut out = format!(
        "{}->{}:{}",
        token(&transition.from),
        token(&transition.to),
        token(&transition.event)
    );
    if let Some(guard) = &transition.guard {
        let _ = write!(out, "[{}]", token(guard));
    }
    if let Some(action) = &transition.action {
        let _ = write!(out, "/{}", token(action));
    }
    out
}

fn token(text: &str) -> String {
    let text = text.replace('"', "");
    if text.chars().any(|c| c.is_whitespace() || SPECIAL.contains(&c)) {
        format!("\"{}\"", text)
    } else {
        text
    }
}
