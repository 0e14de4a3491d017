//! Projector error type.
//!
//! Configuration errors are caller bugs (bad field index, recompiling against
//! a different schema pair) and are never worth retrying. Anything raised by
//! the expression evaluator or the typed row writer is carried unchanged in
//! [`ProjectError::Eval`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProjectError>;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("destination field {0} already has a projection step")]
    DuplicateDestination(usize),

    #[error("projection is already compiled; build a new projector to change its steps")]
    Compiled,

    #[error(transparent)]
    Eval(#[from] rowproj_core::error::Error),
}
