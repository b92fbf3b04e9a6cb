//! # fsmkit-core
//!
//! State transition tables and the engine that drives subjects through them.
//!
//! This crate provides:
//! - The table model: states, transitions, derived event sets
//! - Events with source, target and payload
//! - Hook binding by naming convention
//! - The transition engine (exit, action, entry)
//! - Subject instance state

pub mod engine;
pub mod error;
pub mod event;
pub mod hooks;
pub mod instance;
pub mod table;

pub use engine::{advance, probe, AdvanceResult, Outcome, Step};
pub use error::CoreError;
pub use event::{Event, EventSource, Payload, Rejection};
pub use hooks::{hook_name, Binding, HookKind, HookRegistry, Subject};
pub use instance::{subject_key, Advance, Instance, InstanceInfo, InstanceStatus};
pub use table::{AllocationPolicy, State, StateId, Table, Transition};
