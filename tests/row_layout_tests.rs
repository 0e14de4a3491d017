//! Row layout, fingerprint and evaluator-seam tests

use std::cell::Cell;
use std::sync::Arc;

use rowproj_core::error::{Error, Result};
use rowproj_core::expr::ExprEvaluator;
use rowproj_core::id::ExprId;
use rowproj_core::row::{Row, VarlenHeap};
use rowproj_core::schema::{DataType, Field, Schema};
use rowproj_core::types::Scalar;
use rowproj_operators::{OptimizedProjector, ProjectionPlan, Step};

#[test]
fn test_layout_is_packed_in_declaration_order() {
    let schema = Schema::new(vec![
        Field::new("flag", DataType::Boolean, false),
        Field::new("n", DataType::Int32, true),
        Field::new("s", DataType::Utf8, false),
        Field::new("d", DataType::Decimal128, true),
    ]);
    let offsets: Vec<usize> = (0..schema.len()).map(|i| schema.offset(i)).collect();
    let widths: Vec<usize> = (0..schema.len()).map(|i| schema.width(i)).collect();
    assert_eq!(offsets, vec![0, 1, 6, 14]);
    assert_eq!(widths, vec![1, 5, 8, 17]);
    assert_eq!(schema.row_len(), 31);
}

#[test]
fn test_fingerprint_tracks_layout_not_names() {
    let a = Schema::new(vec![
        Field::new("x", DataType::Int64, false),
        Field::new("y", DataType::Utf8, true),
    ]);
    let renamed = Schema::new(vec![
        Field::new("p", DataType::Int64, false),
        Field::new("q", DataType::Utf8, true),
    ]);
    let nullability = Schema::new(vec![
        Field::new("x", DataType::Int64, true),
        Field::new("y", DataType::Utf8, true),
    ]);
    let retyped = Schema::new(vec![
        Field::new("x", DataType::Date64, false),
        Field::new("y", DataType::Utf8, true),
    ]);
    assert_eq!(a.fingerprint(), renamed.fingerprint());
    assert_ne!(a.fingerprint(), nullability.fingerprint());
    // Same width, different type.
    assert_ne!(a.fingerprint(), retyped.fingerprint());
}

#[test]
fn test_schema_serde_rebuilds_layout() {
    let schema = Schema::new(vec![
        Field::new("a", DataType::Int32, false),
        Field::new("b", DataType::Float64, true),
    ]);
    let json = serde_json::to_string(&schema).unwrap();
    let back: Schema = serde_json::from_str(&json).unwrap();
    assert_eq!(back, schema);
    assert_eq!(back.offset(1), 4);
}

#[test]
fn test_plan_serializes_for_explain() {
    let schema = Schema::new(vec![
        Field::new("a", DataType::Int32, false),
        Field::new("b", DataType::Int32, false),
    ]);
    let mut arena = rowproj_core::expr::ExprArena::new();
    let exprs = vec![arena.column(0).unwrap(), arena.column(1).unwrap()];
    let mut projector = OptimizedProjector::new(&exprs);
    projector.optimize(&schema, &schema, &arena).unwrap();

    let plan = projector.plan();
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["footprint"]["raw_copy_bytes"], 8);
    let back: ProjectionPlan = serde_json::from_value(json).unwrap();
    assert_eq!(back.plan_hash().unwrap(), plan.plan_hash().unwrap());
}

/// Evaluator that treats every even id as a reference to column `id / 2`
/// and every odd id as the constant 7, counting evaluations.
struct CountingEvaluator {
    calls: Cell<usize>,
}

impl ExprEvaluator for CountingEvaluator {
    fn evaluate(&self, expr: ExprId, row: &Row) -> Result<Scalar> {
        self.calls.set(self.calls.get() + 1);
        match self.column_ref(expr) {
            Some(idx) => row.get(idx),
            None => Ok(Scalar::I64(7)),
        }
    }

    fn column_ref(&self, expr: ExprId) -> Option<usize> {
        (expr.get() % 2 == 0).then_some(expr.index() / 2)
    }
}

#[test]
fn test_compiled_copies_skip_the_evaluator() {
    let schema = Arc::new(Schema::new(
        (0..4)
            .map(|i| Field::new(format!("c{i}"), DataType::Int64, false))
            .collect(),
    ));
    // dst0 <- col0, dst1 <- col1, dst2 <- 7, dst3 <- col3
    let exprs = [ExprId::new(0), ExprId::new(2), ExprId::new(1), ExprId::new(6)];
    let eval = CountingEvaluator {
        calls: Cell::new(0),
    };

    let heap = VarlenHeap::new();
    let src = Row::from_values(
        schema.clone(),
        heap.clone(),
        &[Scalar::I64(1), Scalar::I64(2), Scalar::I64(3), Scalar::I64(4)],
    )
    .unwrap();

    let mut projector = OptimizedProjector::new(&exprs);
    let mut slow = Row::new(schema.clone(), heap.clone());
    projector.exec(&mut slow, &src, &eval).unwrap();
    assert_eq!(eval.calls.get(), 4);

    projector.optimize(&schema, &schema, &eval).unwrap();
    assert!(matches!(
        projector.steps(),
        [
            Step::RawCopy { field_count: 2, .. },
            Step::Evaluate { dst_index: 2, .. },
            Step::RawCopy { field_count: 1, .. },
        ]
    ));

    eval.calls.set(0);
    let mut fast = Row::new(schema.clone(), heap);
    projector.exec(&mut fast, &src, &eval).unwrap();
    assert_eq!(eval.calls.get(), 1);
    assert_eq!(fast.storage(), slow.storage());
    assert_eq!(
        fast.values().unwrap(),
        vec![Scalar::I64(1), Scalar::I64(2), Scalar::I64(7), Scalar::I64(4)]
    );
}

#[test]
fn test_projector_accepts_dyn_evaluator() {
    let schema = Schema::new(vec![Field::new("a", DataType::Int64, false)]);
    let eval = CountingEvaluator {
        calls: Cell::new(0),
    };
    let dyn_eval: &dyn ExprEvaluator = &eval;
    let mut projector = OptimizedProjector::new(&[ExprId::new(0)]);
    projector.optimize(&schema, &schema, dyn_eval).unwrap();
    assert!(projector.steps()[0].is_raw_copy());
}

#[test]
fn test_cast_overflow_is_type_error() {
    let err = Scalar::I64(i64::MAX).cast(DataType::Int32).unwrap_err();
    assert!(matches!(err, Error::Type(_)));
}
