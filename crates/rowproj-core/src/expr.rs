//! Expression trees stored in a caller-owned arena.
//!
//! Nodes reference their children by [`ExprId`]; so does every consumer of an
//! expression (a projection step, for example). Holding an id never implies
//! ownership of the node.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::ExprId;
use crate::row::Row;
use crate::schema::DataType;
use crate::types::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    IsNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a field of the input row by index.
    Column(usize),
    Literal(Scalar),
    Unary {
        op: UnaryOp,
        input: ExprId,
    },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Cast {
        input: ExprId,
        to: DataType,
    },
    /// First non-NULL argument.
    Coalesce(Vec<ExprId>),
}

/// What a projector needs from an expression engine.
pub trait ExprEvaluator {
    /// Evaluate `expr` against `row`.
    fn evaluate(&self, expr: ExprId, row: &Row) -> Result<Scalar>;

    /// If `expr` is a bare column reference, the referenced field index.
    fn column_ref(&self, expr: ExprId) -> Option<usize>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Children must already be in the arena.
    pub fn push(&mut self, expr: Expr) -> Result<ExprId> {
        for child in children(&expr) {
            if child.index() >= self.nodes.len() {
                return Err(Error::Invariant(format!(
                    "child {child} is not in the arena"
                )));
            }
        }
        let id = u32::try_from(self.nodes.len())
            .map_err(|_| Error::Invariant("expression arena is full".into()))?;
        self.nodes.push(expr);
        Ok(ExprId::new(id))
    }

    pub fn column(&mut self, idx: usize) -> Result<ExprId> {
        self.push(Expr::Column(idx))
    }

    pub fn literal(&mut self, value: Scalar) -> Result<ExprId> {
        self.push(Expr::Literal(value))
    }

    pub fn get(&self, id: ExprId) -> Option<&Expr> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: ExprId) -> Result<&Expr> {
        self.get(id)
            .ok_or_else(|| Error::Eval(format!("unknown expression {id}")))
    }

    fn eval(&self, id: ExprId, row: &Row) -> Result<Scalar> {
        match self.node(id)? {
            Expr::Column(idx) => row
                .get(*idx)
                .map_err(|e| Error::Eval(format!("column {idx}: {e}"))),
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Unary { op, input } => {
                let v = self.eval(*input, row)?;
                eval_unary(*op, v)
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(*left, row)?;
                // AND/OR short-circuit on a decisive left side.
                match (op, &l) {
                    (BinaryOp::And, Scalar::Bool(false)) => return Ok(Scalar::Bool(false)),
                    (BinaryOp::Or, Scalar::Bool(true)) => return Ok(Scalar::Bool(true)),
                    _ => {}
                }
                let r = self.eval(*right, row)?;
                eval_binary(*op, l, r)
            }
            Expr::Cast { input, to } => self.eval(*input, row)?.cast(*to),
            Expr::Coalesce(args) => {
                for arg in args {
                    let v = self.eval(*arg, row)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Scalar::Null)
            }
        }
    }
}

impl ExprEvaluator for ExprArena {
    fn evaluate(&self, expr: ExprId, row: &Row) -> Result<Scalar> {
        self.eval(expr, row)
    }

    fn column_ref(&self, expr: ExprId) -> Option<usize> {
        match self.get(expr)? {
            Expr::Column(idx) => Some(*idx),
            _ => None,
        }
    }
}

fn children(expr: &Expr) -> Vec<ExprId> {
    match expr {
        Expr::Column(_) | Expr::Literal(_) => vec![],
        Expr::Unary { input, .. } | Expr::Cast { input, .. } => vec![*input],
        Expr::Binary { left, right, .. } => vec![*left, *right],
        Expr::Coalesce(args) => args.clone(),
    }
}

fn eval_unary(op: UnaryOp, v: Scalar) -> Result<Scalar> {
    match (op, v) {
        (UnaryOp::IsNull, v) => Ok(Scalar::Bool(v.is_null())),
        (_, Scalar::Null) => Ok(Scalar::Null),
        (UnaryOp::Not, Scalar::Bool(b)) => Ok(Scalar::Bool(!b)),
        (UnaryOp::Neg, Scalar::I32(v)) => v
            .checked_neg()
            .map(Scalar::I32)
            .ok_or_else(|| Error::Eval("integer overflow in negation".into())),
        (UnaryOp::Neg, Scalar::I64(v)) => v
            .checked_neg()
            .map(Scalar::I64)
            .ok_or_else(|| Error::Eval("integer overflow in negation".into())),
        (UnaryOp::Neg, Scalar::F32(v)) => Ok(Scalar::F32(-v)),
        (UnaryOp::Neg, Scalar::F64(v)) => Ok(Scalar::F64(-v)),
        (UnaryOp::Neg, Scalar::Decimal(v)) => v
            .checked_neg()
            .map(Scalar::Decimal)
            .ok_or_else(|| Error::Eval("decimal overflow in negation".into())),
        (op, v) => Err(Error::Eval(format!("cannot apply {op:?} to {v:?}"))),
    }
}

fn eval_binary(op: BinaryOp, l: Scalar, r: Scalar) -> Result<Scalar> {
    use BinaryOp::*;
    match op {
        And | Or => eval_logical(op, l, r),
        Eq | NotEq | Lt | LtEq | Gt | GtEq => {
            if l.is_null() || r.is_null() {
                return Ok(Scalar::Null);
            }
            let ord = l
                .compare(&r)
                .ok_or_else(|| Error::Eval(format!("cannot compare {l:?} with {r:?}")))?;
            let b = match op {
                Eq => ord == Ordering::Equal,
                NotEq => ord != Ordering::Equal,
                Lt => ord == Ordering::Less,
                LtEq => ord != Ordering::Greater,
                Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            Ok(Scalar::Bool(b))
        }
        Add | Sub | Mul | Div => eval_arith(op, l, r),
    }
}

fn eval_logical(op: BinaryOp, l: Scalar, r: Scalar) -> Result<Scalar> {
    let as_bool = |v: &Scalar| match v {
        Scalar::Null => Ok(None),
        Scalar::Bool(b) => Ok(Some(*b)),
        other => Err(Error::Eval(format!("expected boolean, got {other:?}"))),
    };
    let (l, r) = (as_bool(&l)?, as_bool(&r)?);
    let out = match op {
        BinaryOp::And => match (l, r) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        _ => match (l, r) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    };
    Ok(out.map(Scalar::Bool).unwrap_or(Scalar::Null))
}

/// Arithmetic widens to the wider operand: Int32 < Int64 < Decimal, and any
/// float operand makes the result Float64 (Float32 only when both are).
fn eval_arith(op: BinaryOp, l: Scalar, r: Scalar) -> Result<Scalar> {
    use Scalar::*;
    if l.is_null() || r.is_null() {
        return Ok(Null);
    }
    let overflow = || Error::Eval(format!("overflow evaluating {op:?}"));
    match (&l, &r) {
        (I32(a), I32(b)) => int_op(op, *a as i128, *b as i128)
            .and_then(|v| i32::try_from(v).map_err(|_| overflow()))
            .map(I32),
        (I32(_) | I64(_), I32(_) | I64(_)) => {
            let (a, b) = (int(&l)?, int(&r)?);
            int_op(op, a, b)
                .and_then(|v| i64::try_from(v).map_err(|_| overflow()))
                .map(I64)
        }
        (I32(_) | I64(_) | Decimal(_), I32(_) | I64(_) | Decimal(_)) => {
            int_op(op, int(&l)?, int(&r)?).map(Decimal)
        }
        (F32(a), F32(b)) => Ok(F32(float_op(op, *a as f64, *b as f64) as f32)),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => Ok(F64(float_op(op, a, b))),
            _ => Err(Error::Eval(format!(
                "cannot apply {op:?} to {l:?} and {r:?}"
            ))),
        },
    }
}

fn int(v: &Scalar) -> Result<i128> {
    match v {
        Scalar::I32(x) => Ok(*x as i128),
        Scalar::I64(x) => Ok(*x as i128),
        Scalar::Decimal(x) => Ok(*x),
        other => Err(Error::Eval(format!("expected integer, got {other:?}"))),
    }
}

fn int_op(op: BinaryOp, a: i128, b: i128) -> Result<i128> {
    let out = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        _ => {
            if b == 0 {
                return Err(Error::Eval("division by zero".into()));
            }
            a.checked_div(b)
        }
    };
    out.ok_or_else(|| Error::Eval(format!("overflow evaluating {op:?}")))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => a / b,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::row::VarlenHeap;
    use crate::schema::{Field, Schema};

    fn row() -> Row {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int32, false),
            Field::new("b", DataType::Int64, true),
        ]));
        Row::from_values(schema, VarlenHeap::new(), &[Scalar::I32(5), Scalar::Null]).unwrap()
    }

    #[test]
    fn test_column_ref_introspection() {
        let mut arena = ExprArena::new();
        let c = arena.column(3).unwrap();
        let lit = arena.literal(Scalar::I32(1)).unwrap();
        let sum = arena
            .push(Expr::Binary {
                op: BinaryOp::Add,
                left: c,
                right: lit,
            })
            .unwrap();
        assert_eq!(arena.column_ref(c), Some(3));
        assert_eq!(arena.column_ref(lit), None);
        assert_eq!(arena.column_ref(sum), None);
    }

    #[test]
    fn test_arithmetic_and_nulls() {
        let mut arena = ExprArena::new();
        let a = arena.column(0).unwrap();
        let b = arena.column(1).unwrap();
        let ten = arena.literal(Scalar::I64(10)).unwrap();
        let a_plus_ten = arena
            .push(Expr::Binary {
                op: BinaryOp::Add,
                left: a,
                right: ten,
            })
            .unwrap();
        let a_plus_b = arena
            .push(Expr::Binary {
                op: BinaryOp::Add,
                left: a,
                right: b,
            })
            .unwrap();
        let coalesced = arena.push(Expr::Coalesce(vec![b, a])).unwrap();

        let r = row();
        assert_eq!(arena.evaluate(a_plus_ten, &r).unwrap(), Scalar::I64(15));
        assert_eq!(arena.evaluate(a_plus_b, &r).unwrap(), Scalar::Null);
        assert_eq!(arena.evaluate(coalesced, &r).unwrap(), Scalar::I32(5));
    }

    #[test]
    fn test_division_by_zero_is_eval_error() {
        let mut arena = ExprArena::new();
        let a = arena.column(0).unwrap();
        let zero = arena.literal(Scalar::I32(0)).unwrap();
        let div = arena
            .push(Expr::Binary {
                op: BinaryOp::Div,
                left: a,
                right: zero,
            })
            .unwrap();
        assert!(matches!(arena.evaluate(div, &row()), Err(Error::Eval(_))));
    }

    #[test]
    fn test_push_rejects_unknown_child() {
        let mut arena = ExprArena::new();
        let err = arena
            .push(Expr::Cast {
                input: ExprId::new(7),
                to: DataType::Int64,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn test_leaves_and_nodes_share_id_allocation() {
        let mut arena = ExprArena::new();
        let a = arena.column(0).unwrap();
        let neg = arena
            .push(Expr::Unary {
                op: UnaryOp::Neg,
                input: a,
            })
            .unwrap();
        let lit = arena.literal(Scalar::Null).unwrap();
        assert_eq!((a.get(), neg.get(), lit.get()), (0, 1, 2));
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.get(lit), Some(&Expr::Literal(Scalar::Null)));
    }
}
