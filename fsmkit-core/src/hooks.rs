//! Hook binding.
//!
//! Behaviour is attached to a table through four kinds of optional hooks,
//! named by convention after the state and event they belong to:
//!
//! - `<State>__onEntry` - runs when the subject enters `State`
//! - `<State>__onExit` - runs when the subject leaves `State`
//! - `<From>__<event>` - transition action
//! - `<From>__<event>Guard` - predicate that may veto the transition
//!
//! A subject type registers its hooks once in a [`HookRegistry`]. A
//! [`Binding`] pairs that registry with a frozen [`Table`] and resolves each
//! state's and transition's hooks the first time they are reached. Missing
//! hooks are not errors: the engine falls back to a logging no-op.

use crate::error::CoreError;
use crate::event::Event;
use crate::table::{StateId, Table, Transition};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A hook run for its side effects: entry, exit or transition action.
pub type ActionHook<B> = Arc<dyn Fn(&mut B, &Event) + Send + Sync>;

/// A transition guard.
pub type GuardHook<B> = Arc<dyn Fn(&mut B, &Event) -> bool + Send + Sync>;

/// The business object a subject instance wraps.
pub trait Subject: Send + 'static {
    /// Class identifier. Must equal the class id of the table driving this subject.
    fn class_id(&self) -> &str;

    /// Registers this type's hooks. Called once per table/type binding.
    fn register_hooks(_hooks: &mut HookRegistry<Self>)
    where
        Self: Sized,
    {
    }
}

/// Hook categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    OnEntry,
    OnExit,
    Action,
    Guard,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::OnEntry => f.write_str("onEntry"),
            HookKind::OnExit => f.write_str("onExit"),
            HookKind::Action => f.write_str("action"),
            HookKind::Guard => f.write_str("guard"),
        }
    }
}

/// Conventional name of a state's entry hook.
pub fn entry_hook_name(state: &str) -> String {
    format!("{}__onEntry", state)
}

/// Conventional name of a state's exit hook.
pub fn exit_hook_name(state: &str) -> String {
    format!("{}__onExit", state)
}

/// Conventional name of a transition's action hook.
pub fn action_hook_name(from: &str, event: &str) -> String {
    format!("{}__{}", from, event)
}

/// Conventional name of a transition's guard hook.
pub fn guard_hook_name(from: &str, event: &str) -> String {
    format!("{}__{}Guard", from, event)
}

/// Conventional name of the hook of `kind`. `event` is unused for entry and exit hooks.
pub fn hook_name(kind: HookKind, state: &str, event: &str) -> String {
    match kind {
        HookKind::OnEntry => entry_hook_name(state),
        HookKind::OnExit => exit_hook_name(state),
        HookKind::Action => action_hook_name(state, event),
        HookKind::Guard => guard_hook_name(state, event),
    }
}

/// Hooks registered by one subject type, keyed by conventional name.
pub struct HookRegistry<B> {
    actions: HashMap<String, ActionHook<B>>,
    guards: HashMap<String, GuardHook<B>>,
}

impl<B> Default for HookRegistry<B> {
    fn default() -> Self {
        Self {
            actions: HashMap::new(),
            guards: HashMap::new(),
        }
    }
}

impl<B> HookRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the entry hook of `state`.
    pub fn on_entry<F>(&mut self, state: &str, hook: F) -> &mut Self
    where
        F: Fn(&mut B, &Event) + Send + Sync + 'static,
    {
        self.action(entry_hook_name(state), hook)
    }

    /// Registers the exit hook of `state`.
    pub fn on_exit<F>(&mut self, state: &str, hook: F) -> &mut Self
    where
        F: Fn(&mut B, &Event) + Send + Sync + 'static,
    {
        self.action(exit_hook_name(state), hook)
    }

    /// Registers the action of the transition leaving `from` on `event`.
    pub fn on_transition<F>(&mut self, from: &str, event: &str, hook: F) -> &mut Self
    where
        F: Fn(&mut B, &Event) + Send + Sync + 'static,
    {
        self.action(action_hook_name(from, event), hook)
    }

    /// Registers the guard of the transition leaving `from` on `event`.
    pub fn guard<F>(&mut self, from: &str, event: &str, hook: F) -> &mut Self
    where
        F: Fn(&mut B, &Event) -> bool + Send + Sync + 'static,
    {
        self.predicate(guard_hook_name(from, event), hook)
    }

    /// Registers an entry, exit or action hook under an explicit conventional name.
    pub fn action<F>(&mut self, name: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&mut B, &Event) + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(hook));
        self
    }

    /// Registers a guard under an explicit conventional name.
    pub fn predicate<F>(&mut self, name: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&mut B, &Event) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Arc::new(hook));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name) || self.guards.contains_key(name)
    }

    /// Names of every registered hook.
    pub fn names(&self) -> BTreeSet<String> {
        self.actions
            .keys()
            .chain(self.guards.keys())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len() + self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct StateHooks<B> {
    entry: Option<ActionHook<B>>,
    exit: Option<ActionHook<B>>,
}

struct TransitionHooks<B> {
    action: Option<ActionHook<B>>,
    guard: Option<GuardHook<B>>,
}

/// A subject type's hooks bound to one frozen table.
///
/// Resolution is lazy: each state's and transition's hooks are looked up the
/// first time they are needed and cached for the lifetime of the binding.
pub struct Binding<B> {
    table: Arc<Table>,
    hooks: HookRegistry<B>,
    states: Vec<OnceLock<StateHooks<B>>>,
    transitions: Vec<Vec<OnceLock<TransitionHooks<B>>>>,
}

impl<B: Subject> Binding<B> {
    /// Binds the hooks `B` registers to `table`.
    pub fn new(table: Arc<Table>) -> Self {
        let mut hooks = HookRegistry::new();
        B::register_hooks(&mut hooks);
        Self::with_hooks(table, hooks)
    }

    /// Checks that `subject` belongs to the class this binding's table describes.
    pub fn check_class(&self, subject: &B) -> Result<(), CoreError> {
        if subject.class_id() != self.table.class_id() {
            return Err(CoreError::ClassMismatch {
                table: self.table.class_id().to_string(),
                subject: subject.class_id().to_string(),
            });
        }
        Ok(())
    }
}

impl<B> Binding<B> {
    /// Binds an explicit registry to `table`.
    pub fn with_hooks(table: Arc<Table>, hooks: HookRegistry<B>) -> Self {
        let states = table.states().map(|_| OnceLock::new()).collect();
        let transitions = table
            .states()
            .map(|s| s.transitions().map(|_| OnceLock::new()).collect())
            .collect();

        Self {
            table,
            hooks,
            states,
            transitions,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Returns true if a hook with the given conventional name is registered.
    pub fn is_bound(&self, name: &str) -> bool {
        self.hooks.contains(name)
    }

    /// Runs the entry hook of `state`, or the default no-op.
    pub fn run_entry(&self, state: StateId, subject: &mut B, event: &Event) {
        match self.state_hooks(state).and_then(|h| h.entry.as_ref()) {
            Some(hook) => hook(subject, event),
            None => tracing::debug!(
                "{}: default onEntry for '{}' on event '{}'",
                self.table.class_id(),
                self.state_name(state),
                event.name()
            ),
        }
    }

    /// Runs the exit hook of `state`, or the default no-op.
    pub fn run_exit(&self, state: StateId, subject: &mut B, event: &Event) {
        match self.state_hooks(state).and_then(|h| h.exit.as_ref()) {
            Some(hook) => hook(subject, event),
            None => tracing::debug!(
                "{}: default onExit for '{}' on event '{}'",
                self.table.class_id(),
                self.state_name(state),
                event.name()
            ),
        }
    }

    /// Runs the action of `transition`, or the default no-op.
    pub fn run_action(&self, transition: &Transition, subject: &mut B, event: &Event) {
        match self
            .transition_hooks(transition)
            .and_then(|h| h.action.as_ref())
        {
            Some(hook) => hook(subject, event),
            None => tracing::debug!(
                "{}: default action for '{}' on event '{}'",
                self.table.class_id(),
                transition.id(),
                event.name()
            ),
        }
    }

    /// Returns the guard of `transition`, if one is bound.
    pub fn guard(&self, transition: &Transition) -> Option<&GuardHook<B>> {
        self.transition_hooks(transition)
            .and_then(|h| h.guard.as_ref())
    }

    fn state_name(&self, state: StateId) -> &str {
        self.table.state(state).map(|s| s.name()).unwrap_or("?")
    }

    fn state_hooks(&self, id: StateId) -> Option<&StateHooks<B>> {
        let cell = self.states.get(id.index())?;
        let state = self.table.state(id)?;
        Some(cell.get_or_init(|| {
            let entry = self.lookup_action(&entry_hook_name(state.name()));
            // Terminal states are never exited, so a missing exit hook is expected.
            let exit = if state.is_terminal() {
                self.hooks.actions.get(&exit_hook_name(state.name())).cloned()
            } else {
                self.lookup_action(&exit_hook_name(state.name()))
            };
            StateHooks { entry, exit }
        }))
    }

    fn transition_hooks(&self, transition: &Transition) -> Option<&TransitionHooks<B>> {
        let cell = self
            .transitions
            .get(transition.source().index())?
            .get(transition.slot())?;
        Some(cell.get_or_init(|| {
            let action = self.lookup_action(&action_hook_name(&transition.from, &transition.event));
            let name = guard_hook_name(&transition.from, &transition.event);
            let guard = self.hooks.guards.get(&name).cloned();
            if guard.is_none() {
                tracing::debug!(
                    "{}: no hook {}, transition is unguarded",
                    self.table.class_id(),
                    name
                );
            }
            TransitionHooks { action, guard }
        }))
    }

    fn lookup_action(&self, name: &str) -> Option<ActionHook<B>> {
        let hook = self.hooks.actions.get(name).cloned();
        if hook.is_none() {
            tracing::debug!(
                "{}: no hook {}, using default",
                self.table.class_id(),
                name
            );
        }
        hook
    }
}
