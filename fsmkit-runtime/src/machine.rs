//! Subjects bound to an execution strategy.

use crate::config::DispatchMode;
use crate::error::RuntimeError;
use crate::queue::{EventQueue, Job};
use crate::registry::SubjectRegistry;
use fsmkit_core::{
    Advance, AdvanceResult, AllocationPolicy, Event, InstanceInfo, InstanceStatus, Rejection,
    Table,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::{Arc, Weak};

/// Callback invoked by a queue worker after processing an event that asked
/// for notification.
pub type CompletionCallback = Arc<dyn Fn(&AdvanceResult) + Send + Sync>;

/// How a subject's events reach the transition engine.
#[derive(Clone)]
pub enum Strategy {
    /// On the caller's thread of control.
    Immediate,
    /// Through a queue owned by this subject alone.
    Dedicated(Arc<EventQueue>),
    /// Through a queue shared by every queued subject of the class.
    Shared(Arc<EventQueue>),
}

impl Strategy {
    pub fn mode(&self) -> DispatchMode {
        match self {
            Strategy::Immediate => DispatchMode::Immediate,
            Strategy::Dedicated(_) | Strategy::Shared(_) => DispatchMode::Queued,
        }
    }

    /// Allocation policy of the backing queue, if any.
    pub fn allocation(&self) -> Option<AllocationPolicy> {
        match self {
            Strategy::Immediate => None,
            Strategy::Dedicated(_) => Some(AllocationPolicy::PerInstance),
            Strategy::Shared(_) => Some(AllocationPolicy::PerClass),
        }
    }

    fn queue(&self) -> Option<&Arc<EventQueue>> {
        match self {
            Strategy::Immediate => None,
            Strategy::Dedicated(queue) | Strategy::Shared(queue) => Some(queue),
        }
    }
}

/// What happened to a posted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Posted {
    /// Processed immediately.
    Completed(AdvanceResult),
    /// Accepted into the subject's queue.
    Enqueued,
    /// Refused by validation before enqueueing.
    Rejected(Rejection),
}

impl Posted {
    /// The result, for immediately processed events.
    pub fn result(&self) -> Option<&AdvanceResult> {
        match self {
            Posted::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// A subject instance and the strategy delivering its events.
pub struct Machine {
    instance: Arc<dyn Advance>,
    strategy: Strategy,
    callback: RwLock<Option<CompletionCallback>>,
    registry: Weak<SubjectRegistry>,
}

impl Machine {
    pub(crate) fn new(
        instance: Arc<dyn Advance>,
        strategy: Strategy,
        registry: Weak<SubjectRegistry>,
    ) -> Self {
        Self {
            instance,
            strategy,
            callback: RwLock::new(None),
            registry,
        }
    }

    /// Subject key (`CLASS:name`).
    pub fn key(&self) -> &str {
        self.instance.key()
    }

    pub fn class_id(&self) -> &str {
        self.instance.table().class_id()
    }

    pub fn table(&self) -> &Arc<Table> {
        self.instance.table()
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn mode(&self) -> DispatchMode {
        self.strategy.mode()
    }

    pub fn current_state(&self) -> Option<String> {
        self.instance.current_state()
    }

    pub fn info(&self) -> InstanceInfo {
        self.instance.info()
    }

    pub fn is_retired(&self) -> bool {
        self.instance.status() == InstanceStatus::Retired
    }

    /// Registers the callback run after each queued event that requested notification.
    ///
    /// Immediate subjects return their result from `post` and have no callback.
    pub fn on_completion<F>(&self, callback: F) -> Result<(), RuntimeError>
    where
        F: Fn(&AdvanceResult) + Send + Sync + 'static,
    {
        if self.mode() == DispatchMode::Immediate {
            return Err(RuntimeError::NotQueued(self.key().to_string()));
        }
        *self.callback.write() = Some(Arc::new(callback));
        Ok(())
    }

    /// Posts an event, waiting for buffer space under the queued strategy.
    pub async fn post(self: &Arc<Self>, event: Event) -> Result<Posted, RuntimeError> {
        match self.admit(event)? {
            Admission::Done(posted) => Ok(posted),
            Admission::Enqueue(queue, job) => {
                queue.push(job).await?;
                Ok(Posted::Enqueued)
            }
        }
    }

    /// Posts an event, failing with `QueueFull` instead of waiting.
    pub fn try_post(self: &Arc<Self>, event: Event) -> Result<Posted, RuntimeError> {
        match self.admit(event)? {
            Admission::Done(posted) => Ok(posted),
            Admission::Enqueue(queue, job) => {
                queue.try_push(job)?;
                Ok(Posted::Enqueued)
            }
        }
    }

    /// Posts an event from a thread outside the async runtime, blocking while
    /// the buffer is full.
    pub fn post_blocking(self: &Arc<Self>, event: Event) -> Result<Posted, RuntimeError> {
        match self.admit(event)? {
            Admission::Done(posted) => Ok(posted),
            Admission::Enqueue(queue, job) => {
                queue.push_blocking(job)?;
                Ok(Posted::Enqueued)
            }
        }
    }

    /// Reports where an event would lead without changing state.
    pub fn probe(&self, event: &Event) -> Result<AdvanceResult, RuntimeError> {
        if self.is_retired() {
            return Err(RuntimeError::NotAccepting(self.key().to_string()));
        }
        Ok(self.instance.probe(event))
    }

    /// Retires the subject: removes it from its registry and stops its own
    /// queue, if it has one.
    pub fn retire(&self) {
        self.instance.retire();
        self.detach();
    }

    fn admit(self: &Arc<Self>, event: Event) -> Result<Admission, RuntimeError> {
        if self.is_retired() {
            return Err(RuntimeError::NotAccepting(self.key().to_string()));
        }

        let queue = match self.strategy.queue() {
            Some(queue) => queue,
            None => return Ok(Admission::Done(Posted::Completed(self.deliver(&event)))),
        };

        if let Err(rejection) = event.validate(self.table(), self.key()) {
            tracing::warn!("{}: event '{}' rejected: {}", self.key(), event.name(), rejection);
            return Ok(Admission::Done(Posted::Rejected(rejection)));
        }

        Ok(Admission::Enqueue(
            queue.clone(),
            Job {
                machine: Arc::clone(self),
                event,
            },
        ))
    }

    /// Runs one queued event and notifies the completion callback if asked.
    pub(crate) fn process(&self, event: &Event) -> Option<AdvanceResult> {
        if self.is_retired() {
            tracing::debug!(
                "{}: dropping event '{}' for retired subject",
                self.key(),
                event.name()
            );
            return None;
        }

        let result = self.deliver(event);

        if event.wants_notification() {
            let callback = self.callback.read().clone();
            match callback {
                Some(callback) => callback(&result),
                None => tracing::debug!(
                    "{}: notification requested for '{}' but no callback registered",
                    self.key(),
                    event.name()
                ),
            }
        }

        Some(result)
    }

    fn deliver(&self, event: &Event) -> AdvanceResult {
        let result = self.instance.advance(event);
        if result.retired {
            tracing::info!(
                "{}: retired after '{}' in state '{}'",
                self.key(),
                result.event,
                result.state.as_deref().unwrap_or("?")
            );
            self.detach();
        }
        result
    }

    fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self);
        }
        if let Strategy::Dedicated(queue) = &self.strategy {
            queue.shutdown();
        }
    }
}

enum Admission {
    Done(Posted),
    Enqueue(Arc<EventQueue>, Job),
}
