//! # fsmkit-notation
//!
//! Text notation for fsmkit state transition tables.
//!
//! This crate provides:
//! - A best-effort parser from description text to a [`Table`](fsmkit_core::Table),
//!   reporting problems as line-numbered diagnostics
//! - A renderer from a table back to description text
//! - A generator for `Subject` hook stubs

pub mod error;
pub mod parser;
pub mod render;
pub mod stubs;

pub use error::NotationError;
pub use parser::{parse, parse_file, Diagnostic, Header, ParseOutput, Severity};
pub use render::render;
pub use stubs::{generate, DefaultStubWriter, HookStub, StubOptions, StubWriter};
