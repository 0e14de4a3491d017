//! Optimized row projector.
//!
//! Accepts a list of expressions to be projected into destination fields and
//! compiles them into as few steps as possible: column references whose
//! source and destination fields share a physical representation become raw
//! byte copies, and runs of copies that are adjacent in both row layouts are
//! merged into one.
//!
//! Lifecycle: build (`new`/`insert_step`), `optimize` once per schema pair,
//! then `exec` once per row pair. An uncompiled projector is still valid; it
//! simply evaluates every step.

use rowproj_core::config::ProjectorConfig;
use rowproj_core::expr::ExprEvaluator;
use rowproj_core::hash::Hash256;
use rowproj_core::id::ExprId;
use rowproj_core::row::Row;
use rowproj_core::schema::{Field, FieldLayout, Schema};

use crate::error::{ProjectError, Result};
use crate::plan::ProjectionPlan;
use crate::step::Step;
use crate::steps::{coalesce, StepSet};

/// Schema pair a projector was compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CompiledLayout {
    dst: Hash256,
    src: Hash256,
    /// Some raw copy carries an out-of-line handle.
    copies_handles: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizedProjector {
    steps: StepSet,
    config: ProjectorConfig,
    compiled: Option<CompiledLayout>,
}

impl OptimizedProjector {
    /// One step per expression: `exprs[i]` is projected into destination
    /// field `i`.
    pub fn new(exprs: &[ExprId]) -> Self {
        let mut projector = Self::default();
        for (dst_index, expr) in exprs.iter().enumerate() {
            // Indices are distinct by construction.
            let _ = projector.steps.insert(*expr, dst_index);
        }
        projector
    }

    pub fn with_config(mut self, config: ProjectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Add a step projecting `expr` into destination field `dst_index`.
    ///
    /// A destination that already has a step is rejected with
    /// [`ProjectError::DuplicateDestination`]; the first step is kept.
    pub fn insert_step(&mut self, expr: ExprId, dst_index: usize) -> Result<()> {
        if self.compiled.is_some() {
            return Err(ProjectError::Compiled);
        }
        self.steps.insert(expr, dst_index)
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// The expression of every step that is still evaluated, in destination
    /// order. Before `optimize` this is one expression per step.
    pub fn exprs(&self) -> Vec<ExprId> {
        self.steps.sorted().iter().filter_map(Step::expr).collect()
    }

    pub fn steps(&self) -> &[Step] {
        self.steps.as_slice()
    }

    /// Every destination field index this projector writes, ascending.
    pub fn destination_indices(&self) -> Vec<usize> {
        self.steps.destination_indices()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn plan(&self) -> ProjectionPlan {
        ProjectionPlan::new(
            self.steps.sorted(),
            self.compiled.map(|c| (c.dst, c.src)),
        )
    }

    /// Compile the steps against a destination and source schema.
    ///
    /// Every destination index must exist in `dst`. Calling this again with
    /// the same schema pair is a no-op; a different pair is rejected, since
    /// raw copies no longer remember the expression they replaced.
    pub fn optimize<E>(&mut self, dst: &Schema, src: &Schema, eval: &E) -> Result<()>
    where
        E: ExprEvaluator + ?Sized,
    {
        if let Some(compiled) = self.compiled {
            if compiled.dst == dst.fingerprint() && compiled.src == src.fingerprint() {
                tracing::trace!("projection already compiled for this schema pair");
                return Ok(());
            }
            tracing::warn!(
                dst = %dst.fingerprint().short(),
                src = %src.fingerprint().short(),
                "rejecting recompilation against a different schema pair"
            );
            return Err(ProjectError::Config(
                "projection was compiled against a different schema pair".into(),
            ));
        }

        let before = self.steps.len();
        let mut resolved = Vec::with_capacity(before);
        let mut copies_handles = false;

        for step in self.steps.sorted() {
            let Step::Evaluate { dst_index, expr, .. } = step else {
                return Err(ProjectError::Config(
                    "uncompiled projection holds a raw copy".into(),
                ));
            };
            let (dst_field, dst_layout) = dst.field_checked(dst_index).map_err(|_| {
                ProjectError::Config(format!(
                    "destination field {dst_index} out of range for schema with {} fields",
                    dst.len()
                ))
            })?;

            match copyable_source(eval, expr, dst_field, dst_layout, src) {
                Some(src_layout) => {
                    copies_handles |= dst_field.data_type.is_handle();
                    resolved.push(Step::RawCopy {
                        dst_index,
                        field_count: 1,
                        dst_offset: dst_layout.offset,
                        src_offset: src_layout.offset,
                        width: dst_layout.width,
                    });
                }
                None => resolved.push(Step::Evaluate {
                    dst_index,
                    dst: Some(dst_layout),
                    expr,
                }),
            }
        }

        let compiled = if self.config.coalesce {
            coalesce(resolved)
        } else {
            resolved
        };
        self.steps.replace(compiled)?;
        self.compiled = Some(CompiledLayout {
            dst: dst.fingerprint(),
            src: src.fingerprint(),
            copies_handles,
        });

        let fp = self.plan().footprint;
        tracing::debug!(
            steps_before = before,
            steps_after = self.steps.len(),
            raw_copies = fp.raw_copies,
            raw_copy_bytes = fp.raw_copy_bytes,
            evaluations = fp.evaluations,
            "projection optimized"
        );
        Ok(())
    }

    /// Project `src` into `dst`.
    ///
    /// Destination fields without a step are left untouched. Errors from the
    /// evaluator or the typed writer are returned as-is.
    pub fn exec<E>(&self, dst: &mut Row, src: &Row, eval: &E) -> Result<()>
    where
        E: ExprEvaluator + ?Sized,
    {
        if let Some(compiled) = self.compiled {
            if self.config.verify_rows {
                verify_rows(&compiled, dst, src)?;
            }
        }

        for step in self.steps.iter() {
            match *step {
                Step::RawCopy {
                    dst_offset,
                    src_offset,
                    width,
                    ..
                } => {
                    let from = src
                        .storage()
                        .get(src_offset..src_offset + width)
                        .ok_or_else(|| short_row("source", src_offset + width))?;
                    dst.storage_mut()
                        .get_mut(dst_offset..dst_offset + width)
                        .ok_or_else(|| short_row("destination", dst_offset + width))?
                        .copy_from_slice(from);
                }
                Step::Evaluate {
                    dst_index, expr, ..
                } => {
                    let value = eval.evaluate(expr, src)?;
                    dst.set(dst_index, &value)?;
                }
            }
        }
        Ok(())
    }

    /// For testing: move every destination index `i` to
    /// `i ^ (1 << bit_to_flip)` so that copies which were adjacent no longer
    /// are. Every index must be below `2^num_bits`.
    pub fn permute_on_index_bit(&mut self, num_bits: u32, bit_to_flip: u32) -> Result<()> {
        if self.compiled.is_some() {
            return Err(ProjectError::Compiled);
        }
        if num_bits >= usize::BITS || bit_to_flip >= num_bits {
            return Err(ProjectError::Config(format!(
                "cannot flip bit {bit_to_flip} of a {num_bits}-bit index"
            )));
        }
        let limit = 1usize << num_bits;
        let mask = 1usize << bit_to_flip;
        self.steps.remap(|idx| {
            if idx >= limit {
                return Err(ProjectError::Config(format!(
                    "destination field {idx} does not fit in {num_bits} bits"
                )));
            }
            Ok(idx ^ mask)
        })
    }
}

/// Source layout for `expr` when it is a column reference whose field has
/// exactly the destination field's representation.
fn copyable_source<E>(
    eval: &E,
    expr: ExprId,
    dst_field: &Field,
    dst_layout: FieldLayout,
    src: &Schema,
) -> Option<FieldLayout>
where
    E: ExprEvaluator + ?Sized,
{
    let src_index = eval.column_ref(expr)?;
    let (src_field, src_layout) = src.field_checked(src_index).ok()?;
    let same = src_field.data_type == dst_field.data_type
        && src_field.nullable == dst_field.nullable
        && src_layout.width == dst_layout.width;
    same.then_some(src_layout)
}

fn verify_rows(compiled: &CompiledLayout, dst: &Row, src: &Row) -> Result<()> {
    if dst.schema().fingerprint() != compiled.dst {
        return Err(ProjectError::Config(
            "destination row does not match the compiled schema layout".into(),
        ));
    }
    if src.schema().fingerprint() != compiled.src {
        return Err(ProjectError::Config(
            "source row does not match the compiled schema layout".into(),
        ));
    }
    if compiled.copies_handles && !dst.heap().same_heap(src.heap()) {
        return Err(ProjectError::Config(
            "rows copy varlen handles but do not share a heap".into(),
        ));
    }
    Ok(())
}

fn short_row(which: &str, needed: usize) -> ProjectError {
    ProjectError::Config(format!("{which} row is shorter than {needed} bytes"))
}
