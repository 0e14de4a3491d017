#![forbid(unsafe_code)]
//! rowproj-operators: the optimizing row projector.
//!
//! Design intent:
//! - Keep this crate pure and synchronous.
//! - Compilation (`OptimizedProjector::optimize`) does all layout reasoning;
//!   execution (`OptimizedProjector::exec`) is a linear replay of steps with
//!   no type checks of its own.
//! - Expressions are referenced by `ExprId` and evaluated through the
//!   `ExprEvaluator` the caller passes in; the projector never owns them.

pub mod error;
pub mod plan;
pub mod projector;
pub mod step;
pub mod steps;

pub use error::{ProjectError, Result};
pub use plan::{Footprint, ProjectionPlan};
pub use projector::OptimizedProjector;
pub use step::Step;
pub use steps::StepSet;
