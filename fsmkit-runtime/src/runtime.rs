//! Runtime facade: tables, subjects and event posting.

use crate::config::{Config, DispatchMode};
use crate::error::RuntimeError;
use crate::machine::{Machine, Posted, Strategy};
use crate::queue::EventQueue;
use crate::registry::{SubjectRegistry, TableRegistry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fsmkit_core::{
    Advance, AdvanceResult, AllocationPolicy, Binding, Event, Instance, InstanceInfo, Subject,
    Table,
};
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type BindingKey = (String, TypeId);

/// Owns the table and subject registries and the queues serving queued subjects.
///
/// Each runtime is independent; tests and embedders construct as many as they need.
pub struct Runtime {
    config: Config,
    tables: TableRegistry,
    subjects: Arc<SubjectRegistry>,
    bindings: DashMap<BindingKey, Arc<dyn Any + Send + Sync>>,
    class_queues: DashMap<String, Arc<EventQueue>>,
    closed: AtomicBool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Runtime {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tables: TableRegistry::new(),
            subjects: Arc::new(SubjectRegistry::new()),
            bindings: DashMap::new(),
            class_queues: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn subjects(&self) -> &SubjectRegistry {
        &self.subjects
    }

    /// Freezes and registers a table.
    pub fn register_table(&self, table: Table) -> Result<Arc<Table>, RuntimeError> {
        self.tables.register(table)
    }

    pub fn table(&self, class_id: &str) -> Result<Arc<Table>, RuntimeError> {
        self.tables
            .get(class_id)
            .ok_or_else(|| RuntimeError::TableNotFound(class_id.to_string()))
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.tables.class_ids()
    }

    /// Creates a subject of `class_id` named `name`.
    ///
    /// The subject starts in the table's initial state, whose entry hook runs
    /// with a `start` event before this returns. Queued subjects get a queue
    /// according to the table's allocation policy.
    pub fn create_subject<B: Subject>(
        &self,
        class_id: &str,
        name: impl Into<String>,
        subject: B,
        mode: DispatchMode,
    ) -> Result<Arc<Machine>, RuntimeError> {
        self.create_subject_with(class_id, name, subject, mode, Event::start())
    }

    /// Like [`Runtime::create_subject`], but the initial entry hook receives
    /// `start` instead of the synthetic `start` event, so callers can seed it
    /// with a payload.
    pub fn create_subject_with<B: Subject>(
        &self,
        class_id: &str,
        name: impl Into<String>,
        subject: B,
        mode: DispatchMode,
        start: Event,
    ) -> Result<Arc<Machine>, RuntimeError> {
        self.ensure_open(class_id)?;
        let table = self.table(class_id)?;
        let instance = Instance::new(name, self.binding::<B>(&table), subject)?;

        let key = instance.key().to_string();
        if self.subjects.contains(&key) {
            return Err(RuntimeError::SubjectExists(key));
        }

        let strategy = self.strategy_for(&table, &key, mode)?;
        instance.initialise_with(&start);

        let machine = Arc::new(Machine::new(
            Arc::new(instance),
            strategy,
            Arc::downgrade(&self.subjects),
        ));
        if let Err(e) = self.subjects.insert(machine.clone()) {
            if let Strategy::Dedicated(queue) = machine.strategy() {
                queue.shutdown();
            }
            return Err(e);
        }

        tracing::debug!(
            "{}: created ({}, {})",
            key,
            mode,
            table.allocation_policy()
        );
        Ok(machine)
    }

    /// Looks up a live subject by key.
    pub fn subject(&self, key: &str) -> Result<Arc<Machine>, RuntimeError> {
        self.subjects
            .get(key)
            .ok_or_else(|| RuntimeError::SubjectNotFound(key.to_string()))
    }

    /// Posts the named event to a subject.
    pub async fn post(&self, key: &str, event: &str) -> Result<Posted, RuntimeError> {
        self.post_event(key, Event::new(event)).await
    }

    pub async fn post_event(&self, key: &str, event: Event) -> Result<Posted, RuntimeError> {
        let machine = self.open_subject(key)?;
        machine.post(event).await
    }

    /// Posts without waiting for queue space.
    pub fn try_post(&self, key: &str, event: Event) -> Result<Posted, RuntimeError> {
        self.open_subject(key)?.try_post(event)
    }

    /// Posts from a thread outside the async runtime.
    pub fn post_blocking(&self, key: &str, event: Event) -> Result<Posted, RuntimeError> {
        self.open_subject(key)?.post_blocking(event)
    }

    /// Dry run: where would the event lead?
    pub fn probe(&self, key: &str, event: &Event) -> Result<AdvanceResult, RuntimeError> {
        self.subject(key)?.probe(event)
    }

    pub fn current_state(&self, key: &str) -> Result<Option<String>, RuntimeError> {
        Ok(self.subject(key)?.current_state())
    }

    /// Describes the live subjects of one class.
    pub fn list_instances(&self, class_id: &str) -> Vec<InstanceInfo> {
        self.subjects.list(class_id)
    }

    /// Registers a completion callback on a queued subject.
    pub fn on_completion<F>(&self, key: &str, callback: F) -> Result<(), RuntimeError>
    where
        F: Fn(&AdvanceResult) + Send + Sync + 'static,
    {
        self.subject(key)?.on_completion(callback)
    }

    /// Removes a subject from the registry, stopping its own queue if it has one.
    pub fn retire(&self, key: &str) -> Result<(), RuntimeError> {
        let machine = self.subject(key)?;
        machine.retire();
        tracing::info!("{}: retired", key);
        Ok(())
    }

    /// Stops accepting events and signals every worker to exit after its
    /// current event.
    pub fn stop(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("runtime stopping");
        }
        for queue in self.queues() {
            queue.shutdown();
        }
    }

    /// Waits for every worker to exit.
    pub async fn join(&self) {
        for queue in self.queues() {
            queue.join().await;
        }
    }

    /// Stops the runtime and waits for its workers.
    pub async fn shutdown(&self) {
        self.stop();
        self.join().await;
        tracing::info!("runtime stopped");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self, target: &str) -> Result<(), RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::NotAccepting(target.to_string()));
        }
        Ok(())
    }

    fn open_subject(&self, key: &str) -> Result<Arc<Machine>, RuntimeError> {
        self.ensure_open(key)?;
        self.subject(key)
    }

    /// Returns the cached binding of `B` to `table`, creating it on first use.
    fn binding<B: Subject>(&self, table: &Arc<Table>) -> Arc<Binding<B>> {
        let key = (table.class_id().to_string(), TypeId::of::<B>());
        let cached = self
            .bindings
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Binding::<B>::new(table.clone())) as Arc<dyn Any + Send + Sync>
            })
            .value()
            .clone();

        cached
            .downcast::<Binding<B>>()
            .unwrap_or_else(|_| Arc::new(Binding::new(table.clone())))
    }

    fn strategy_for(
        &self,
        table: &Arc<Table>,
        key: &str,
        mode: DispatchMode,
    ) -> Result<Strategy, RuntimeError> {
        if mode == DispatchMode::Immediate {
            return Ok(Strategy::Immediate);
        }

        let queue_config = &self.config.queue;
        match table.allocation_policy() {
            AllocationPolicy::PerInstance => Ok(Strategy::Dedicated(EventQueue::start(
                key,
                queue_config.capacity,
                1,
            )?)),
            AllocationPolicy::PerClass => {
                let queue = match self.class_queues.entry(table.class_id().to_string()) {
                    Entry::Occupied(entry) => entry.get().clone(),
                    Entry::Vacant(entry) => {
                        let queue = EventQueue::start(
                            table.class_id(),
                            queue_config.capacity,
                            queue_config.class_workers,
                        )?;
                        entry.insert(queue.clone());
                        queue
                    }
                };
                Ok(Strategy::Shared(queue))
            }
        }
    }

    fn queues(&self) -> Vec<Arc<EventQueue>> {
        let mut queues: Vec<Arc<EventQueue>> = self
            .class_queues
            .iter()
            .map(|q| q.value().clone())
            .collect();
        for machine in self.subjects.machines() {
            if let Strategy::Dedicated(queue) = machine.strategy() {
                queues.push(queue.clone());
            }
        }
        queues
    }
}
