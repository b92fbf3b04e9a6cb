//! Subject instance state.

use crate::engine::{self, AdvanceResult, Outcome};
use crate::error::CoreError;
use crate::event::Event;
use crate::hooks::{Binding, Subject};
use crate::table::{StateId, Table};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Instance accepts events.
    #[default]
    Active,
    /// Instance has been removed from its registry.
    Retired,
}

/// Point-in-time description of an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Registry key (`CLASS:name`).
    pub key: String,

    /// Table class id.
    pub class_id: String,

    /// Instance name within its class.
    pub name: String,

    /// Current state, if the table has an initial state.
    pub state: Option<String>,

    pub status: InstanceStatus,

    /// Events delivered to this instance, including ignored and rejected ones.
    pub events_processed: u64,

    /// Transitions actually taken.
    pub transitions_taken: u64,

    /// Last event delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<String>,

    /// Creation timestamp (Unix millis).
    pub created_at: i64,

    /// Last update timestamp (Unix millis).
    pub updated_at: i64,
}

/// Type-erased view of an instance, used by registries and queue workers.
pub trait Advance: Send + Sync {
    fn key(&self) -> &str;

    fn table(&self) -> &Arc<Table>;

    fn current_state(&self) -> Option<String>;

    /// Delivers an event and records the resulting state.
    fn advance(&self, event: &Event) -> AdvanceResult;

    /// Reports where an event would lead without running hooks other than the guard.
    fn probe(&self, event: &Event) -> AdvanceResult;

    fn status(&self) -> InstanceStatus;

    /// Marks the instance retired.
    fn retire(&self);

    fn info(&self) -> InstanceInfo;
}

/// A business object paired with a table binding and its current state.
///
/// The business object and the progress record sit behind separate locks.
/// Hooks run holding only the subject lock, so queries and retirement never
/// wait on a hook, and a hook may retire its own subject. The subject lock
/// also serialises deliveries, so the current state only changes under it.
pub struct Instance<B> {
    key: String,
    name: String,
    binding: Arc<Binding<B>>,
    subject: Mutex<B>,
    progress: RwLock<Progress>,
    created_at: i64,
}

struct Progress {
    current: Option<StateId>,
    status: InstanceStatus,
    events_processed: u64,
    transitions_taken: u64,
    last_event: Option<String>,
    updated_at: i64,
}

impl<B: Subject> Instance<B> {
    /// Creates an instance in the table's initial state.
    ///
    /// Fails if the subject's class differs from the table's. The initial
    /// state's entry hook is not run; see [`Instance::initialise`].
    pub fn new(
        name: impl Into<String>,
        binding: Arc<Binding<B>>,
        subject: B,
    ) -> Result<Self, CoreError> {
        binding.check_class(&subject)?;

        let name = name.into();
        let key = subject_key(binding.table().class_id(), &name);
        let now = now_millis();

        Ok(Self {
            key,
            name,
            subject: Mutex::new(subject),
            progress: RwLock::new(Progress {
                current: binding.table().initial_state(),
                status: InstanceStatus::Active,
                events_processed: 0,
                transitions_taken: 0,
                last_event: None,
                updated_at: now,
            }),
            binding,
            created_at: now,
        })
    }

    /// Runs the initial state's entry hook with the given event.
    pub fn initialise_with(&self, event: &Event) {
        let mut subject = self.subject.lock();
        let current = self.progress.read().current;
        match current {
            Some(initial) => self.binding.run_entry(initial, &mut *subject, event),
            None => tracing::warn!("{}: table has no initial state", self.key),
        }
    }

    /// Runs the initial state's entry hook with the synthetic `start` event.
    pub fn initialise(&self) {
        self.initialise_with(&Event::start());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binding(&self) -> &Arc<Binding<B>> {
        &self.binding
    }

    /// Gives read access to the business object.
    ///
    /// Waits for any in-flight hook; must not be called from the subject's own hooks.
    pub fn with_subject<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        let subject = self.subject.lock();
        f(&*subject)
    }

    fn state_name(&self, id: Option<StateId>) -> Option<String> {
        id.and_then(|id| self.binding.table().state(id))
            .map(|s| s.name().to_string())
    }
}

impl<B: Subject> Advance for Instance<B> {
    fn key(&self) -> &str {
        &self.key
    }

    fn table(&self) -> &Arc<Table> {
        self.binding.table()
    }

    fn current_state(&self) -> Option<String> {
        let current = self.progress.read().current;
        self.state_name(current)
    }

    fn advance(&self, event: &Event) -> AdvanceResult {
        let mut subject = self.subject.lock();
        let (current, was_active) = {
            let progress = self.progress.read();
            (progress.current, progress.status == InstanceStatus::Active)
        };

        let step = engine::advance(&self.binding, &self.key, current, &mut *subject, event);

        let table = self.binding.table();
        let terminal = step.next.map(|id| table.is_terminal(id)).unwrap_or(false);
        let auto_retired = step.outcome.is_transition() && terminal && table.auto_retire();

        let mut progress = self.progress.write();
        progress.current = step.next;
        progress.events_processed += 1;
        if step.outcome.is_transition() {
            progress.transitions_taken += 1;
        }
        if auto_retired {
            progress.status = InstanceStatus::Retired;
        }
        // A hook may have retired the subject while this event ran.
        let retired = was_active && progress.status == InstanceStatus::Retired;
        progress.last_event = Some(event.name().to_string());
        progress.updated_at = now_millis();
        drop(progress);

        AdvanceResult {
            subject: self.key.clone(),
            event: event.name().to_string(),
            state: self.state_name(step.next),
            outcome: step.outcome,
            terminal,
            retired,
        }
    }

    fn probe(&self, event: &Event) -> AdvanceResult {
        let mut subject = self.subject.lock();
        let current = self.progress.read().current;

        let step = engine::probe(&self.binding, &self.key, current, &mut *subject, event);
        let table = self.binding.table();
        let terminal = step.next.map(|id| table.is_terminal(id)).unwrap_or(false);

        AdvanceResult {
            subject: self.key.clone(),
            event: event.name().to_string(),
            state: self.state_name(step.next),
            retired: matches!(step.outcome, Outcome::Transitioned { .. })
                && terminal
                && table.auto_retire(),
            outcome: step.outcome,
            terminal,
        }
    }

    fn status(&self) -> InstanceStatus {
        self.progress.read().status
    }

    fn retire(&self) {
        let mut progress = self.progress.write();
        progress.status = InstanceStatus::Retired;
        progress.updated_at = now_millis();
    }

    fn info(&self) -> InstanceInfo {
        let progress = self.progress.read();
        InstanceInfo {
            key: self.key.clone(),
            class_id: self.binding.table().class_id().to_string(),
            name: self.name.clone(),
            state: self.state_name(progress.current),
            status: progress.status,
            events_processed: progress.events_processed,
            transitions_taken: progress.transitions_taken,
            last_event: progress.last_event.clone(),
            created_at: self.created_at,
            updated_at: progress.updated_at,
        }
    }
}

/// Builds the registry key `CLASS:name`.
pub fn subject_key(class_id: &str, name: &str) -> String {
    format!("{}:{}", class_id, name)
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
