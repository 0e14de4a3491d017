//! Projection planning surfaces: `Footprint` and `ProjectionPlan`.
//!
//! A `ProjectionPlan` is a serializable snapshot of a projector's steps, used
//! for EXPLAIN output and for hashing a compiled projection.

use rowproj_core::hash::{hash_serde, Hash256};
use serde::{Deserialize, Serialize};

use crate::step::Step;

/// Per-row work model for a compiled projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    /// Bytes moved by raw copies per row.
    pub raw_copy_bytes: usize,
    /// Number of raw copy operations per row.
    pub raw_copies: usize,
    /// Number of expression evaluations per row.
    pub evaluations: usize,
}

impl Footprint {
    pub fn of(steps: &[Step]) -> Self {
        let mut fp = Footprint::default();
        for step in steps {
            match step {
                Step::RawCopy { width, .. } => {
                    fp.raw_copies += 1;
                    fp.raw_copy_bytes += width;
                }
                Step::Evaluate { .. } => fp.evaluations += 1,
            }
        }
        fp
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionPlan {
    pub steps: Vec<Step>,
    pub footprint: Footprint,
    /// Layout fingerprints of the (destination, source) schemas the steps
    /// were compiled against; `None` before compilation.
    pub compiled_for: Option<(Hash256, Hash256)>,
}

impl ProjectionPlan {
    pub fn new(steps: Vec<Step>, compiled_for: Option<(Hash256, Hash256)>) -> Self {
        let footprint = Footprint::of(&steps);
        Self {
            steps,
            footprint,
            compiled_for,
        }
    }

    /// Stable hash of the plan.
    pub fn plan_hash(&self) -> rowproj_core::error::Result<Hash256> {
        hash_serde(self)
    }
}
