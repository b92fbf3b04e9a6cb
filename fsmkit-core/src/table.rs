//! State transition table types.
//!
//! A [`Table`] describes the behaviour of one subject class: its states, the
//! transitions between them and the events that trigger those transitions.
//!
//! ```text
//! CDPLAYER
//!   Begin   --startPlaying--> Playing
//!   Begin   --stop----------> Stopped
//!   Playing --pause---------> Paused
//!   Paused  --stop----------> Stopped
//! ```
//!
//! Tables are mutable while being built. Once handed to a registry they are
//! frozen behind an `Arc` and shared by every subject of the class.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Names that mark pseudostates in the description notation. They are never
/// materialised as ordinary states.
pub const RESERVED_STATE_NAMES: [&str; 3] = ["initial", "final", "pseudo-initial"];

/// Returns true if `name` is a reserved pseudostate name.
pub fn is_reserved_state_name(name: &str) -> bool {
    RESERVED_STATE_NAMES.contains(&name)
}

/// Index of a state within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How queued subjects of a table are assigned to background workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Every queued subject owns a private buffer and worker.
    #[default]
    PerInstance,
    /// All queued subjects of the class share one buffer and worker set.
    PerClass,
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationPolicy::PerInstance => f.write_str("per-instance"),
            AllocationPolicy::PerClass => f.write_str("per-class"),
        }
    }
}

/// A transition out of a state.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    /// Event that triggers this transition.
    pub event: String,

    /// Source state name.
    pub from: String,

    /// Target state name.
    pub to: String,

    /// Guard annotation (author hint, not executable).
    ///
    /// Stored without the surrounding brackets: `[ready]` in a description
    /// is kept as `ready`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,

    /// Action annotation (author hint, not executable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(skip)]
    source: StateId,
    #[serde(skip)]
    target: StateId,
    #[serde(skip)]
    slot: usize,
}

impl Transition {
    /// Compound identifier `source__event__target`.
    pub fn id(&self) -> String {
        format!("{}__{}__{}", self.from, self.event, self.to)
    }

    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn target(&self) -> StateId {
        self.target
    }

    /// Position of this transition within its source state.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn set_guard_annotation(&mut self, guard: impl Into<String>) {
        self.guard = Some(guard.into());
    }

    pub fn set_action_annotation(&mut self, action: impl Into<String>) {
        self.action = Some(action.into());
    }
}

/// A state in a table.
#[derive(Debug, Clone, Serialize)]
pub struct State {
    name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    entry_annotation: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    exit_annotation: Option<String>,

    transitions: Vec<Transition>,

    #[serde(skip)]
    id: StateId,

    #[serde(skip)]
    by_event: HashMap<String, usize>,
}

impl State {
    fn new(id: StateId, name: String) -> Self {
        Self {
            name,
            entry_annotation: None,
            exit_annotation: None,
            transitions: Vec::new(),
            id,
            by_event: HashMap::new(),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A state without outbound transitions is terminal.
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Looks up the transition triggered by `event`.
    pub fn transition(&self, event: &str) -> Option<&Transition> {
        self.by_event.get(event).map(|&i| &self.transitions[i])
    }

    /// Outbound transitions in insertion order.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn entry_annotation(&self) -> Option<&str> {
        self.entry_annotation.as_deref()
    }

    pub fn exit_annotation(&self) -> Option<&str> {
        self.exit_annotation.as_deref()
    }

    pub fn set_entry_annotation(&mut self, text: impl Into<String>) {
        self.entry_annotation = Some(text.into());
    }

    pub fn set_exit_annotation(&mut self, text: impl Into<String>) {
        self.exit_annotation = Some(text.into());
    }

    /// Mutable access to a transition, for attaching annotations.
    pub fn transition_mut(&mut self, event: &str) -> Option<&mut Transition> {
        match self.by_event.get(event) {
            Some(&i) => self.transitions.get_mut(i),
            None => None,
        }
    }
}

/// The state transition table of one subject class.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    /// Class identifier; must match the class of every subject driven by it.
    class_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,

    states: Vec<State>,

    /// Every event name used by any transition.
    events: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    initial: Option<String>,

    auto_retire: bool,

    allocation: AllocationPolicy,

    #[serde(skip)]
    initial_id: Option<StateId>,

    #[serde(skip)]
    index: HashMap<String, StateId>,
}

impl Table {
    /// Creates an empty table for the given class.
    pub fn new(class_id: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            namespace: None,
            version: None,
            states: Vec::new(),
            events: BTreeSet::new(),
            initial: None,
            auto_retire: false,
            allocation: AllocationPolicy::default(),
            initial_id: None,
            index: HashMap::new(),
        }
    }

    /// Sets the binding namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the version/compatibility string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Adds a new state.
    pub fn add_state(&mut self, name: impl Into<String>) -> Result<StateId, CoreError> {
        let name = name.into();
        if is_reserved_state_name(&name) {
            return Err(CoreError::ReservedStateName { name });
        }
        if !is_valid_name(&name) {
            return Err(CoreError::InvalidStateName { name });
        }
        if self.index.contains_key(&name) {
            return Err(CoreError::DuplicateState {
                class_id: self.class_id.clone(),
                state: name,
            });
        }

        let id = StateId(self.states.len());
        self.index.insert(name.clone(), id);
        self.states.push(State::new(id, name));
        Ok(id)
    }

    /// Returns the id of `name`, adding the state if it is not yet present.
    pub fn ensure_state(&mut self, name: &str) -> Result<StateId, CoreError> {
        match self.index.get(name) {
            Some(&id) => Ok(id),
            None => self.add_state(name),
        }
    }

    /// Adds a transition from `from` to `to` on `event`.
    ///
    /// A state holds at most one transition per event; a second one is
    /// rejected and the table is left unchanged.
    pub fn add_transition(
        &mut self,
        from: StateId,
        event: impl Into<String>,
        to: StateId,
    ) -> Result<&mut Transition, CoreError> {
        let event = event.into();
        if !is_valid_name(&event) {
            return Err(CoreError::InvalidEventName { name: event });
        }
        let to_name = self.checked_state(to)?.name.clone();
        let class_id = self.class_id.clone();
        let source = self.checked_state_mut(from)?;

        if source.by_event.contains_key(&event) {
            tracing::warn!(
                "{}: duplicate transition from '{}' on event '{}' ignored",
                class_id,
                source.name,
                event
            );
            return Err(CoreError::DuplicateTransition {
                state: source.name.clone(),
                event,
            });
        }

        let slot = source.transitions.len();
        source.by_event.insert(event.clone(), slot);
        source.transitions.push(Transition {
            event: event.clone(),
            from: source.name.clone(),
            to: to_name,
            guard: None,
            action: None,
            source: from,
            target: to,
            slot,
        });
        self.events.insert(event);

        Ok(&mut self.states[from.0].transitions[slot])
    }

    /// Adds a transition between two states named by string.
    pub fn add_transition_by_name(
        &mut self,
        from: &str,
        event: impl Into<String>,
        to: &str,
    ) -> Result<&mut Transition, CoreError> {
        let from = self.require_state(from)?;
        let to = self.require_state(to)?;
        self.add_transition(from, event, to)
    }

    /// Designates the initial state.
    pub fn set_initial_state(&mut self, id: StateId) -> Result<(), CoreError> {
        let name = self.checked_state(id)?.name.clone();
        self.initial = Some(name);
        self.initial_id = Some(id);
        Ok(())
    }

    /// Retire subjects automatically when they reach a terminal state.
    pub fn set_auto_retire(&mut self) {
        self.auto_retire = true;
    }

    pub fn set_allocation_policy(&mut self, policy: AllocationPolicy) {
        self.allocation = policy;
    }

    pub fn initial_state(&self) -> Option<StateId> {
        self.initial_id
    }

    pub fn auto_retire(&self) -> bool {
        self.auto_retire
    }

    pub fn allocation_policy(&self) -> AllocationPolicy {
        self.allocation
    }

    /// Looks up a state by id.
    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0)
    }

    /// Mutable access to a state, for attaching annotations.
    pub fn state_mut(&mut self, id: StateId) -> Option<&mut State> {
        self.states.get_mut(id.0)
    }

    /// Looks up a state id by name.
    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.index.get(name).copied()
    }

    /// Looks up a state by name.
    pub fn state_named(&self, name: &str) -> Option<&State> {
        self.state_id(name).and_then(|id| self.state(id))
    }

    /// States in insertion order.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// All transitions of all states, grouped by source state.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.states.iter().flat_map(|s| s.transitions.iter())
    }

    /// Every event name used by a transition in this table.
    pub fn events(&self) -> &BTreeSet<String> {
        &self.events
    }

    /// Returns true if `event` triggers at least one transition in this table.
    pub fn accepts_event(&self, event: &str) -> bool {
        self.events.contains(event)
    }

    /// Returns true if the state has no outbound transitions.
    pub fn is_terminal(&self, id: StateId) -> bool {
        self.state(id).map(State::is_terminal).unwrap_or(false)
    }

    fn require_state(&self, name: &str) -> Result<StateId, CoreError> {
        self.state_id(name).ok_or_else(|| CoreError::InvalidStateName {
            name: name.to_string(),
        })
    }

    fn checked_state(&self, id: StateId) -> Result<&State, CoreError> {
        self.states.get(id.0).ok_or_else(|| CoreError::UnknownState {
            class_id: self.class_id.clone(),
            index: id.0,
        })
    }

    fn checked_state_mut(&mut self, id: StateId) -> Result<&mut State, CoreError> {
        let class_id = &self.class_id;
        match self.states.get_mut(id.0) {
            Some(state) => Ok(state),
            None => Err(CoreError::UnknownState {
                class_id: class_id.clone(),
                index: id.0,
            }),
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c.is_control())
}
