//! Adapters Layer - Ports & Adapters Pattern
//!
//! This module contains inbound adapters that drive the domain's
//! [`Interpreter`](crate::domain::Interpreter) port.
//!
//! # Hexagonal Architecture
//! - Inbound adapters: litmus programs → Explorer handlers
//! - Outbound adapters: snapshots and the worker pool live in
//!   `infrastructure`

pub mod catalog;
pub mod litmus;
pub mod runner;

// Re-exports
pub use catalog::{catalog, find};
pub use litmus::{reg, Cmp, Cond, Instruction, LitmusTest, Loc, Operand, Reg, ThreadBuilder};
pub use runner::{verify, LitmusInterpreter};
