//! Fixed-layout row schemas.
//!
//! Every field occupies a fixed byte range of the row's inline storage. Fields
//! are packed in declaration order with no padding. A nullable field reserves
//! one leading indicator byte (`1` = NULL) inside its own width, so copying a
//! field's bytes carries its NULL state with it.
//!
//! Variable-length types (`Utf8`, `Binary`) are stored in-row as an 8-byte
//! handle into a [`VarlenHeap`](crate::row::VarlenHeap).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash_bytes, Hash256};

/// Width in bytes of an out-of-line handle stored in-row.
pub const HANDLE_WIDTH: usize = 8;

/// Width in bytes of the NULL indicator carried by nullable fields.
pub const NULL_INDICATOR_WIDTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Boolean = 0,
    Int32 = 1,
    Int64 = 2,
    Float32 = 3,
    Float64 = 4,
    Utf8 = 5,
    Binary = 6,
    Date64 = 7,
    Decimal128 = 8,
}

impl DataType {
    /// Width of the value payload in bytes (excluding any NULL indicator).
    pub const fn value_width(self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Int32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Float64 | DataType::Date64 => 8,
            DataType::Utf8 | DataType::Binary => HANDLE_WIDTH,
            DataType::Decimal128 => 16,
        }
    }

    /// True when the in-row bytes are a handle to out-of-line data.
    pub const fn is_handle(self) -> bool {
        matches!(self, DataType::Utf8 | DataType::Binary)
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "int32" | "int" | "integer" => Ok(DataType::Int32),
            "int64" | "bigint" => Ok(DataType::Int64),
            "float32" | "real" => Ok(DataType::Float32),
            "float64" | "double" => Ok(DataType::Float64),
            "utf8" | "varchar" | "string" => Ok(DataType::Utf8),
            "binary" | "varbinary" => Ok(DataType::Binary),
            "date64" | "timestamp" => Ok(DataType::Date64),
            "decimal128" | "decimal" => Ok(DataType::Decimal128),
            other => Err(Error::Schema(format!("unknown data type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Total in-row width of this field, NULL indicator included.
    pub const fn width(&self) -> usize {
        self.data_type.value_width() + if self.nullable { NULL_INDICATOR_WIDTH } else { 0 }
    }
}

/// Byte range a field occupies in the row storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub offset: usize,
    pub width: usize,
}

impl FieldLayout {
    pub const fn end(&self) -> usize {
        self.offset + self.width
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Field>", into = "Vec<Field>")]
pub struct Schema {
    fields: Vec<Field>,
    layout: Vec<FieldLayout>,
    row_len: usize,
    fingerprint: Hash256,
}

impl From<Vec<Field>> for Schema {
    fn from(fields: Vec<Field>) -> Self {
        Schema::new(fields)
    }
}

impl From<Schema> for Vec<Field> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        let mut layout = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        for f in &fields {
            let width = f.width();
            layout.push(FieldLayout { offset, width });
            offset += width;
        }
        let fingerprint = layout_fingerprint(&fields, &layout);
        Self {
            fields,
            layout,
            row_len: offset,
            fingerprint,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn layout(&self, idx: usize) -> Option<FieldLayout> {
        self.layout.get(idx).copied()
    }

    /// Byte offset of field `idx`. Panics if out of range.
    pub fn offset(&self, idx: usize) -> usize {
        self.layout[idx].offset
    }

    /// Byte width of field `idx`. Panics if out of range.
    pub fn width(&self, idx: usize) -> usize {
        self.layout[idx].width
    }

    pub fn data_type(&self, idx: usize) -> DataType {
        self.fields[idx].data_type
    }

    pub fn nullable(&self, idx: usize) -> bool {
        self.fields[idx].nullable
    }

    /// Length of the inline storage region of a row with this schema.
    pub fn row_len(&self) -> usize {
        self.row_len
    }

    /// Hash of the physical layout (types, nullability, offsets, widths).
    /// Field names do not contribute.
    pub fn fingerprint(&self) -> Hash256 {
        self.fingerprint
    }

    pub fn field_checked(&self, idx: usize) -> Result<(&Field, FieldLayout)> {
        match (self.fields.get(idx), self.layout.get(idx)) {
            (Some(f), Some(l)) => Ok((f, *l)),
            _ => Err(Error::Schema(format!(
                "field index {idx} out of range for schema with {} fields",
                self.fields.len()
            ))),
        }
    }
}

fn layout_fingerprint(fields: &[Field], layout: &[FieldLayout]) -> Hash256 {
    let mut bytes = Vec::with_capacity(fields.len() * 18);
    for (f, l) in fields.iter().zip(layout) {
        bytes.push(f.data_type as u8);
        bytes.push(f.nullable as u8);
        bytes.extend_from_slice(&(l.offset as u64).to_le_bytes());
        bytes.extend_from_slice(&(l.width as u64).to_le_bytes());
    }
    hash_bytes(&bytes)
}
