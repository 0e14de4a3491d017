//! Convenient re-exports for downstream crates.

pub use crate::config::ProjectorConfig;
pub use crate::error::{Error, Result};
pub use crate::expr::{BinaryOp, Expr, ExprArena, ExprEvaluator, UnaryOp};
pub use crate::hash::Hash256;
pub use crate::id::{ExprId, VarlenHandle};
pub use crate::row::{Row, VarlenHeap};
pub use crate::schema::{DataType, Field, FieldLayout, Schema};
pub use crate::types::Scalar;
