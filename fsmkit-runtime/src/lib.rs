//! # fsmkit-runtime
//!
//! Execution strategies for fsmkit subjects.
//!
//! This crate provides:
//! - Immediate dispatch on the caller's thread
//! - Queued dispatch through bounded FIFO buffers with per-instance or
//!   per-class workers, backpressure and cooperative stop
//! - Completion callbacks for queued subjects
//! - Table and subject registries
//! - YAML/environment configuration

pub mod config;
pub mod error;
pub mod machine;
pub mod queue;
pub mod registry;
pub mod runtime;

pub use config::{Config, ConfigError, DispatchMode, LoggingConfig, QueueConfig};
pub use error::RuntimeError;
pub use machine::{CompletionCallback, Machine, Posted, Strategy};
pub use queue::EventQueue;
pub use registry::{SubjectRegistry, TableRegistry};
pub use runtime::Runtime;
