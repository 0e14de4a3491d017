//! A single projection step.

use std::ops::Range;

use rowproj_core::id::ExprId;
use rowproj_core::schema::FieldLayout;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Evaluate `expr` against the source row and store the result into
    /// destination field `dst_index`. `dst` is filled in by compilation.
    Evaluate {
        dst_index: usize,
        dst: Option<FieldLayout>,
        expr: ExprId,
    },
    /// Copy `width` bytes verbatim. Covers destination fields
    /// `dst_index..dst_index + field_count`.
    RawCopy {
        dst_index: usize,
        field_count: usize,
        dst_offset: usize,
        src_offset: usize,
        width: usize,
    },
}

impl Step {
    pub fn evaluate(expr: ExprId, dst_index: usize) -> Self {
        Step::Evaluate {
            dst_index,
            dst: None,
            expr,
        }
    }

    pub fn dst_index(&self) -> usize {
        match self {
            Step::Evaluate { dst_index, .. } | Step::RawCopy { dst_index, .. } => *dst_index,
        }
    }

    pub(crate) fn set_dst_index(&mut self, idx: usize) {
        match self {
            Step::Evaluate { dst_index, .. } | Step::RawCopy { dst_index, .. } => *dst_index = idx,
        }
    }

    /// Destination field indices this step writes.
    pub fn dst_indices(&self) -> Range<usize> {
        match self {
            Step::Evaluate { dst_index, .. } => *dst_index..*dst_index + 1,
            Step::RawCopy {
                dst_index,
                field_count,
                ..
            } => *dst_index..*dst_index + *field_count,
        }
    }

    pub fn expr(&self) -> Option<ExprId> {
        match self {
            Step::Evaluate { expr, .. } => Some(*expr),
            Step::RawCopy { .. } => None,
        }
    }

    pub fn is_raw_copy(&self) -> bool {
        matches!(self, Step::RawCopy { .. })
    }

    /// Extend this raw copy by `next` when both byte ranges continue exactly
    /// where this one ends. Returns false, leaving `self` untouched, otherwise.
    pub(crate) fn try_absorb(&mut self, next: &Step) -> bool {
        let (
            Step::RawCopy {
                dst_index,
                field_count,
                dst_offset,
                src_offset,
                width,
            },
            Step::RawCopy {
                dst_index: next_index,
                field_count: next_count,
                dst_offset: next_dst,
                src_offset: next_src,
                width: next_width,
            },
        ) = (self, next)
        else {
            return false;
        };

        let contiguous = *next_index == *dst_index + *field_count
            && *next_dst == *dst_offset + *width
            && *next_src == *src_offset + *width;
        if contiguous {
            *field_count += next_count;
            *width += next_width;
        }
        contiguous
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Evaluate {
                dst_index,
                dst: Some(l),
                expr,
            } => write!(
                f,
                "Evaluate(field={dst_index}, offset={}, width={}, {expr})",
                l.offset, l.width
            ),
            Step::Evaluate {
                dst_index,
                dst: None,
                expr,
            } => write!(f, "Evaluate(field={dst_index}, {expr})"),
            Step::RawCopy {
                dst_index,
                field_count,
                dst_offset,
                src_offset,
                width,
            } => write!(
                f,
                "RawCopy(fields={}..{}, src={src_offset}, dst={dst_offset}, width={width})",
                dst_index,
                dst_index + field_count
            ),
        }
    }
}
