//! The projector's step collection.
//!
//! Two concerns are kept apart here:
//! - uniqueness: every destination field index is claimed by at most one step
//!   (`claimed`), checked on insert and on remap;
//! - scan order: [`StepSet::sorted`] orders steps by destination index, and
//!   [`coalesce`] relies only on that order.

use std::collections::BTreeSet;

use rowproj_core::id::ExprId;

use crate::error::{ProjectError, Result};
use crate::step::Step;

#[derive(Debug, Clone, Default)]
pub struct StepSet {
    steps: Vec<Step>,
    claimed: BTreeSet<usize>,
}

impl StepSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an `Evaluate` step. A destination index that already has a step is
    /// rejected with [`ProjectError::DuplicateDestination`]; the set is left
    /// unchanged.
    pub fn insert(&mut self, expr: ExprId, dst_index: usize) -> Result<()> {
        if !self.claimed.insert(dst_index) {
            return Err(ProjectError::DuplicateDestination(dst_index));
        }
        let pos = self
            .steps
            .partition_point(|s| s.dst_index() < dst_index);
        self.steps.insert(pos, Step::evaluate(expr, dst_index));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn as_slice(&self) -> &[Step] {
        &self.steps
    }

    /// Steps in ascending destination-index order.
    pub fn sorted(&self) -> Vec<Step> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(Step::dst_index);
        steps
    }

    /// Every destination index covered, ascending.
    pub fn destination_indices(&self) -> Vec<usize> {
        self.claimed.iter().copied().collect()
    }

    /// Swap in a rewritten step list. The rewrite must cover exactly the
    /// destination indices already claimed.
    pub(crate) fn replace(&mut self, steps: Vec<Step>) -> Result<()> {
        let covered: BTreeSet<usize> = steps.iter().flat_map(Step::dst_indices).collect();
        let count: usize = steps.iter().map(|s| s.dst_indices().len()).sum();
        if covered != self.claimed || count != covered.len() {
            return Err(ProjectError::Config(format!(
                "rewritten steps cover {:?}, expected {:?}",
                covered, self.claimed
            )));
        }
        self.steps = steps;
        Ok(())
    }

    /// Move every step to `f(dst_index)`. The mapping must stay injective.
    /// On error the set is unchanged.
    pub(crate) fn remap(&mut self, f: impl Fn(usize) -> Result<usize>) -> Result<()> {
        let mut steps = self.steps.clone();
        let mut claimed = BTreeSet::new();
        for step in &mut steps {
            let to = f(step.dst_index())?;
            if !claimed.insert(to) {
                return Err(ProjectError::Config(format!(
                    "remapping sends two steps to destination field {to}"
                )));
            }
            step.set_dst_index(to);
        }
        steps.sort_by_key(Step::dst_index);
        self.steps = steps;
        self.claimed = claimed;
        Ok(())
    }
}

/// Merge runs of adjacent raw copies. `steps` must be in ascending
/// destination-index order; evaluate steps are kept as-is and break runs.
pub fn coalesce(steps: Vec<Step>) -> Vec<Step> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());
    for step in steps {
        if let Some(last) = out.last_mut() {
            if last.try_absorb(&step) {
                tracing::trace!(
                    dst_index = step.dst_index(),
                    into = last.dst_index(),
                    "merged raw copy"
                );
                continue;
            }
        }
        out.push(step);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(dst_index: usize, dst_offset: usize, src_offset: usize, width: usize) -> Step {
        Step::RawCopy {
            dst_index,
            field_count: 1,
            dst_offset,
            src_offset,
            width,
        }
    }

    #[test]
    fn test_insert_keeps_destination_order() {
        let mut set = StepSet::new();
        set.insert(ExprId::new(0), 5).unwrap();
        set.insert(ExprId::new(1), 1).unwrap();
        set.insert(ExprId::new(2), 3).unwrap();
        let order: Vec<usize> = set.iter().map(Step::dst_index).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let mut set = StepSet::new();
        set.insert(ExprId::new(0), 2).unwrap();
        let err = set.insert(ExprId::new(1), 2).unwrap_err();
        assert!(matches!(err, ProjectError::DuplicateDestination(2)));
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].expr(), Some(ExprId::new(0)));
    }

    #[test]
    fn test_coalesce_merges_transitively() {
        let merged = coalesce(vec![raw(0, 0, 0, 4), raw(1, 4, 4, 8), raw(2, 12, 12, 8)]);
        assert_eq!(
            merged,
            vec![Step::RawCopy {
                dst_index: 0,
                field_count: 3,
                dst_offset: 0,
                src_offset: 0,
                width: 20,
            }]
        );
    }

    #[test]
    fn test_coalesce_requires_both_sides_contiguous() {
        // Destination contiguous, source not.
        let merged = coalesce(vec![raw(0, 0, 8, 4), raw(1, 4, 0, 4)]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_evaluate_breaks_run() {
        let merged = coalesce(vec![
            raw(0, 0, 0, 4),
            Step::evaluate(ExprId::new(9), 1),
            raw(2, 12, 12, 8),
        ]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_remap_collision_leaves_set_unchanged() {
        let mut set = StepSet::new();
        set.insert(ExprId::new(0), 0).unwrap();
        set.insert(ExprId::new(1), 1).unwrap();
        let err = set.remap(|_| Ok(7)).unwrap_err();
        assert!(matches!(err, ProjectError::Config(_)));
        assert_eq!(set.destination_indices(), vec![0, 1]);
    }
}
