//! Hook stub generation.
//!
//! [`generate`] walks a table and emits a Rust skeleton implementing
//! [`Subject`](fsmkit_core::Subject) for it: one method per conventional hook
//! name, registered in `register_hooks`, each with a logging default body.
//! Guards default to allowing the transition.
//!
//! Output is assembled by a [`StubWriter`]. Every section has a default, so a
//! custom writer overrides only the parts it wants to change.

use chrono::{DateTime, SecondsFormat, Utc};
use fsmkit_core::{hook_name, HookKind, Table};
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write;

/// One hook to be stubbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookStub {
    pub kind: HookKind,
    /// State the hook belongs to; the source state for actions and guards.
    pub state: String,
    /// Transition identifier, for actions and guards.
    pub transition: Option<String>,
    /// Conventional hook name, e.g. `Playing__onEntry`.
    pub name: String,
    /// Generated method name, e.g. `playing_on_entry`.
    pub method: String,
    /// Author hint from the table annotations.
    pub hint: Option<String>,
    /// Set on the entry stub of a terminal state when the table auto-retires.
    pub retires: bool,
}

/// Generation options.
#[derive(Debug, Clone, Default)]
pub struct StubOptions {
    /// Name of the generated type. Derived from the class id when unset.
    pub type_name: Option<String>,
    /// Hook names that already have implementations and are skipped.
    pub existing: BTreeSet<String>,
    /// Emit the struct declaration as well as the impl blocks.
    pub include_struct: bool,
    /// Timestamp for the banner. Omitted when unset.
    pub generated_at: Option<DateTime<Utc>>,
}

impl StubOptions {
    pub fn new() -> Self {
        Self {
            include_struct: true,
            ..Self::default()
        }
    }

    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    /// Skips stubs for hooks that are already implemented.
    pub fn existing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.existing.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }
}

/// Writes the sections of a stub listing.
pub trait StubWriter {
    /// Writes the banner, struct declaration and `Subject` impl.
    fn write_class(
        &self,
        out: &mut String,
        table: &Table,
        type_name: &str,
        stubs: &[HookStub],
        options: &StubOptions,
    ) {
        let _ = writeln!(
            out,
            "// Hooks for {}{}{}.",
            table.class_id(),
            table
                .namespace()
                .map(|ns| format!(" in {}", ns))
                .unwrap_or_default(),
            table
                .version()
                .map(|v| format!(", version {}", v))
                .unwrap_or_default()
        );
        if let Some(at) = options.generated_at {
            let _ = writeln!(
                out,
                "// Generated {} by fsmkit.",
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        }
        out.push('\n');
        out.push_str("use fsmkit_core::{Event, HookRegistry, Subject};\n\n");

        if options.include_struct {
            let _ = writeln!(out, "pub struct {};\n", type_name);
        }

        let _ = writeln!(out, "impl Subject for {} {{", type_name);
        out.push_str("    fn class_id(&self) -> &str {\n");
        let _ = writeln!(out, "        {:?}", table.class_id());
        out.push_str("    }\n");
        if !stubs.is_empty() {
            out.push_str("\n    fn register_hooks(hooks: &mut HookRegistry<Self>) {\n");
            out.push_str("        hooks");
            for stub in stubs {
                let register = match stub.kind {
                    HookKind::Guard => "predicate",
                    _ => "action",
                };
                let _ = write!(
                    out,
                    "\n            .{}({:?}, Self::{})",
                    register, stub.name, stub.method
                );
            }
            out.push_str(";\n    }\n");
        }
        out.push_str("}\n");
    }

    fn write_entry(&self, out: &mut String, class_id: &str, stub: &HookStub) {
        write_hint(out, stub);
        if stub.retires {
            out.push_str("    // Terminal state: the subject retires after this hook.\n");
        }
        write_action_body(out, class_id, stub);
    }

    fn write_exit(&self, out: &mut String, class_id: &str, stub: &HookStub) {
        write_hint(out, stub);
        write_action_body(out, class_id, stub);
    }

    fn write_action(&self, out: &mut String, class_id: &str, stub: &HookStub) {
        write_hint(out, stub);
        write_action_body(out, class_id, stub);
    }

    fn write_guard(&self, out: &mut String, class_id: &str, stub: &HookStub) {
        write_hint(out, stub);
        let _ = writeln!(
            out,
            "    fn {}(&mut self, event: &Event) -> bool {{",
            stub.method
        );
        let _ = writeln!(
            out,
            "        tracing::debug!(\"{}.{} allowing {{}}\", event.name());",
            class_id, stub.name
        );
        out.push_str("        true\n    }\n");
    }
}

/// The stock writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStubWriter;

impl StubWriter for DefaultStubWriter {}

fn write_hint(out: &mut String, stub: &HookStub) {
    let _ = writeln!(out, "    /// `{}`", stub.name);
    if let Some(hint) = &stub.hint {
        let _ = writeln!(out, "    ///\n    /// {}", hint);
    }
}

fn write_action_body(out: &mut String, class_id: &str, stub: &HookStub) {
    let _ = writeln!(out, "    fn {}(&mut self, event: &Event) {{", stub.method);
    let _ = writeln!(
        out,
        "        tracing::debug!(\"{}.{} on {{}}\", event.name());",
        class_id, stub.name
    );
    out.push_str("    }\n");
}

/// Generates hook stubs for `table`.
pub fn generate(table: &Table, writer: &dyn StubWriter, options: &StubOptions) -> String {
    let type_name = options
        .type_name
        .clone()
        .unwrap_or_else(|| pascal_case(table.class_id()));
    let stubs = collect(table, options);

    let mut out = String::new();
    writer.write_class(&mut out, table, &type_name, &stubs, options);

    if !stubs.is_empty() {
        let _ = writeln!(out, "\nimpl {} {{", type_name);
        for (i, stub) in stubs.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            match stub.kind {
                HookKind::OnEntry => writer.write_entry(&mut out, table.class_id(), stub),
                HookKind::OnExit => writer.write_exit(&mut out, table.class_id(), stub),
                HookKind::Action => writer.write_action(&mut out, table.class_id(), stub),
                HookKind::Guard => writer.write_guard(&mut out, table.class_id(), stub),
            }
        }
        out.push_str("}\n");
    }

    tracing::debug!(
        "{}: generated {} hook stubs ({} skipped)",
        table.class_id(),
        stubs.len(),
        options.existing.len()
    );
    out
}

/// Lists the hooks to stub, state by state, in table order.
pub fn collect(table: &Table, options: &StubOptions) -> Vec<HookStub> {
    let mut stubs = Vec::new();
    let mut methods = HashSet::new();
    let mut push = |kind: HookKind,
                    state: &str,
                    event: &str,
                    transition: Option<String>,
                    hint: Option<&str>,
                    retires: bool| {
        let name = hook_name(kind, state, event);
        if options.existing.contains(&name) {
            return;
        }
        let base = match kind {
            HookKind::OnEntry => format!("{}_on_entry", snake_case(state)),
            HookKind::OnExit => format!("{}_on_exit", snake_case(state)),
            HookKind::Action => format!("{}_{}", snake_case(state), snake_case(event)),
            HookKind::Guard => format!("{}_{}_guard", snake_case(state), snake_case(event)),
        };
        let mut method = base.clone();
        let mut n = 2;
        while !methods.insert(method.clone()) {
            method = format!("{}_{}", base, n);
            n += 1;
        }
        stubs.push(HookStub {
            kind,
            state: state.to_string(),
            transition,
            name,
            method,
            hint: hint.map(str::to_string),
            retires,
        });
    };

    for state in table.states() {
        let terminal = state.is_terminal();
        push(
            HookKind::OnEntry,
            state.name(),
            "",
            None,
            state.entry_annotation(),
            terminal && table.auto_retire(),
        );
        if !terminal {
            push(
                HookKind::OnExit,
                state.name(),
                "",
                None,
                state.exit_annotation(),
                false,
            );
        }
        for t in state.transitions() {
            push(
                HookKind::Action,
                state.name(),
                t.event.as_str(),
                Some(t.id()),
                t.action.as_deref(),
                false,
            );
            push(
                HookKind::Guard,
                state.name(),
                t.event.as_str(),
                Some(t.id()),
                t.guard.as_deref(),
                false,
            );
        }
    }

    stubs
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    let trimmed = out.trim_end_matches('_');
    match trimmed.chars().next() {
        None => "hook".to_string(),
        Some(c) if c.is_ascii_digit() => format!("_{}", trimmed),
        Some(_) => trimmed.to_string(),
    }
}

fn pascal_case(class_id: &str) -> String {
    let name: String = class_id
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect();
    match name.chars().next() {
        None => "Machine".to_string(),
        Some(c) if c.is_ascii_digit() => format!("Machine{}", name),
        Some(_) => name,
    }
}
