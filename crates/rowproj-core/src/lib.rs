#![forbid(unsafe_code)]
//! rowproj-core: shared kernel for the row projector.
//!
//! This crate contains the collaborators a projection is compiled against:
//! fixed-layout schemas, rows with inline storage and a shared out-of-line
//! heap, scalar values, and a small expression arena with its evaluator.
//! There is **no I/O** and **no async** here.
//!
//! Crates that use this:
//! - rowproj-operators: compiles and executes projections over these rows.
//! - rowproj-cli: loads projection documents and drives the projector.

pub mod config;
pub mod error;
pub mod expr;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod row;
pub mod schema;
pub mod types;
