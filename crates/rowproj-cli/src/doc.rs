//! YAML projection documents.
//!
//! Example:
//! ```yaml
//! config: { coalesce: true }
//! destination:
//!   - { name: id,    type: Int32 }
//!   - { name: total, type: Int64 }
//!   - { name: tag,   type: Utf8, nullable: true }
//! source:
//!   - { name: id,    type: Int32 }
//!   - { name: total, type: Int64 }
//!   - { name: tag,   type: Utf8, nullable: true }
//! projections:
//!   - { field: 0, expr: { op: column, index: 0 } }
//!   - field: 1
//!     expr:
//!       op: add
//!       left: { op: column, index: 1 }
//!       right: { op: literal, value: { I64: 1 } }
//!   - { field: 2, expr: { op: column, index: 2 } }
//! rows:
//!   - [ { I32: 1 }, { I64: 10 }, { Str: "a" } ]
//!   - [ { I32: 2 }, { I64: 20 }, "Null" ]
//! ```
//!
//! Scalars (literal values and row cells) are written as single-key maps
//! naming the variant, or as the bare string `"Null"`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rowproj_core::config::ProjectorConfig;
use rowproj_core::expr::{BinaryOp, Expr, ExprArena, UnaryOp};
use rowproj_core::id::ExprId;
use rowproj_core::row::{Row, VarlenHeap};
use rowproj_core::schema::{DataType, Field, Schema};
use rowproj_core::types::Scalar;
use rowproj_operators::{OptimizedProjector, ProjectError};

#[derive(Debug, Error)]
pub enum DocError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid document: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] rowproj_core::error::Error),

    #[error(transparent)]
    Project(#[from] ProjectError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionDoc {
    #[serde(default)]
    pub config: Option<ConfigDef>,
    pub destination: Vec<FieldDef>,
    pub source: Vec<FieldDef>,
    pub projections: Vec<ProjectionDef>,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub rows: Vec<Vec<Scalar>>,
}

/// `config:` block. Keys left out keep whatever the environment set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDef {
    #[serde(default)]
    pub coalesce: Option<bool>,
    #[serde(default)]
    pub verify_rows: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionDef {
    pub field: usize,
    pub expr: ExprNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum ExprNode {
    Column { index: usize },
    Literal { value: Scalar },

    Neg { input: Box<ExprNode> },
    Not { input: Box<ExprNode> },
    IsNull { input: Box<ExprNode> },

    Add { left: Box<ExprNode>, right: Box<ExprNode> },
    Sub { left: Box<ExprNode>, right: Box<ExprNode> },
    Mul { left: Box<ExprNode>, right: Box<ExprNode> },
    Div { left: Box<ExprNode>, right: Box<ExprNode> },
    Eq { left: Box<ExprNode>, right: Box<ExprNode> },
    NotEq { left: Box<ExprNode>, right: Box<ExprNode> },
    Lt { left: Box<ExprNode>, right: Box<ExprNode> },
    LtEq { left: Box<ExprNode>, right: Box<ExprNode> },
    Gt { left: Box<ExprNode>, right: Box<ExprNode> },
    GtEq { left: Box<ExprNode>, right: Box<ExprNode> },
    And { left: Box<ExprNode>, right: Box<ExprNode> },
    Or { left: Box<ExprNode>, right: Box<ExprNode> },

    Cast { input: Box<ExprNode>, to: String },
    Coalesce { args: Vec<ExprNode> },
}

/// A document lowered into schemas, an expression arena and a projector.
pub struct Loaded {
    pub destination: Arc<Schema>,
    pub source: Arc<Schema>,
    pub arena: ExprArena,
    pub projector: OptimizedProjector,
    pub rows: Vec<Vec<Scalar>>,
}

pub fn parse(yaml_src: &str) -> Result<ProjectionDoc, DocError> {
    Ok(serde_yaml::from_str(yaml_src)?)
}

/// Overlay the keys a document sets onto `cfg`.
pub fn apply_doc_config(cfg: &mut ProjectorConfig, doc: &ConfigDef) {
    if let Some(coalesce) = doc.coalesce {
        cfg.coalesce = coalesce;
    }
    if let Some(verify_rows) = doc.verify_rows {
        cfg.verify_rows = verify_rows;
    }
}

fn to_schema(fields: &[FieldDef]) -> Result<Schema, DocError> {
    let fields = fields
        .iter()
        .map(|f| -> Result<Field, DocError> {
            Ok(Field::new(&f.name, DataType::parse(&f.data_type)?, f.nullable))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Schema::new(fields))
}

impl ExprNode {
    fn binary(&self) -> Option<(BinaryOp, &ExprNode, &ExprNode)> {
        let (op, left, right) = match self {
            ExprNode::Add { left, right } => (BinaryOp::Add, left, right),
            ExprNode::Sub { left, right } => (BinaryOp::Sub, left, right),
            ExprNode::Mul { left, right } => (BinaryOp::Mul, left, right),
            ExprNode::Div { left, right } => (BinaryOp::Div, left, right),
            ExprNode::Eq { left, right } => (BinaryOp::Eq, left, right),
            ExprNode::NotEq { left, right } => (BinaryOp::NotEq, left, right),
            ExprNode::Lt { left, right } => (BinaryOp::Lt, left, right),
            ExprNode::LtEq { left, right } => (BinaryOp::LtEq, left, right),
            ExprNode::Gt { left, right } => (BinaryOp::Gt, left, right),
            ExprNode::GtEq { left, right } => (BinaryOp::GtEq, left, right),
            ExprNode::And { left, right } => (BinaryOp::And, left, right),
            ExprNode::Or { left, right } => (BinaryOp::Or, left, right),
            _ => return None,
        };
        Some((op, &**left, &**right))
    }

    fn unary(&self) -> Option<(UnaryOp, &ExprNode)> {
        match self {
            ExprNode::Neg { input } => Some((UnaryOp::Neg, &**input)),
            ExprNode::Not { input } => Some((UnaryOp::Not, &**input)),
            ExprNode::IsNull { input } => Some((UnaryOp::IsNull, &**input)),
            _ => None,
        }
    }
}

fn lower(arena: &mut ExprArena, node: &ExprNode) -> Result<ExprId, DocError> {
    if let Some((op, l, r)) = node.binary() {
        let left = lower(arena, l)?;
        let right = lower(arena, r)?;
        return Ok(arena.push(Expr::Binary { op, left, right })?);
    }
    if let Some((op, input)) = node.unary() {
        let input = lower(arena, input)?;
        return Ok(arena.push(Expr::Unary { op, input })?);
    }
    match node {
        ExprNode::Column { index } => Ok(arena.column(*index)?),
        ExprNode::Literal { value } => Ok(arena.literal(value.clone())?),
        ExprNode::Cast { input, to } => {
            let input = lower(arena, input)?;
            let to = DataType::parse(to)?;
            Ok(arena.push(Expr::Cast { input, to })?)
        }
        ExprNode::Coalesce { args } => {
            let args = args
                .iter()
                .map(|a| lower(arena, a))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(arena.push(Expr::Coalesce(args))?)
        }
        other => Err(DocError::Invalid(format!("cannot lower {other:?}"))),
    }
}

/// Build schemas, expressions and an (uncompiled) projector from `doc`.
pub fn load(doc: &ProjectionDoc, config: ProjectorConfig) -> Result<Loaded, DocError> {
    if doc.projections.is_empty() {
        return Err(DocError::Invalid("no projections".into()));
    }
    let destination = Arc::new(to_schema(&doc.destination)?);
    let source = Arc::new(to_schema(&doc.source)?);

    let mut arena = ExprArena::new();
    let mut projector = OptimizedProjector::default().with_config(config);
    for p in &doc.projections {
        let expr = lower(&mut arena, &p.expr)?;
        projector.insert_step(expr, p.field)?;
    }

    Ok(Loaded {
        destination,
        source,
        arena,
        projector,
        rows: doc.rows.clone(),
    })
}

/// [`load`] and then optimize against the document's schemas.
pub fn compile(doc: &ProjectionDoc, config: ProjectorConfig) -> Result<Loaded, DocError> {
    let mut loaded = load(doc, config)?;
    loaded
        .projector
        .optimize(&loaded.destination, &loaded.source, &loaded.arena)?;
    Ok(loaded)
}

impl Loaded {
    /// EXPLAIN text: layouts, footprint, one line per step, plan hash.
    pub fn explain(&self) -> Result<String, DocError> {
        use std::fmt::Write as _;

        let plan = self.projector.plan();
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "Projection Plan");
        let _ = writeln!(out, "===============");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Destination: {} fields, {} bytes",
            self.destination.len(),
            self.destination.row_len()
        );
        let _ = writeln!(
            out,
            "Source:      {} fields, {} bytes",
            self.source.len(),
            self.source.row_len()
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "Footprint:");
        let _ = writeln!(out, "  Raw copies:  {}", plan.footprint.raw_copies);
        let _ = writeln!(out, "  Bytes:       {}", plan.footprint.raw_copy_bytes);
        let _ = writeln!(out, "  Evaluations: {}", plan.footprint.evaluations);
        let _ = writeln!(out);
        let _ = writeln!(out, "Steps:");
        for (i, step) in plan.steps.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, step);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Plan hash: {}", plan.plan_hash()?);
        Ok(out)
    }

    /// Project every document row through the compiled projector.
    pub fn project_rows(&self) -> Result<Vec<Vec<Scalar>>, DocError> {
        let heap = VarlenHeap::new();
        let mut out = Vec::with_capacity(self.rows.len());
        for values in &self.rows {
            let src = Row::from_values(self.source.clone(), heap.clone(), values)?;
            let mut dst = Row::new(self.destination.clone(), heap.clone());
            self.projector.exec(&mut dst, &src, &self.arena)?;
            out.push(dst.values()?);
        }
        tracing::debug!(rows = out.len(), "projected rows");
        Ok(out)
    }
}
