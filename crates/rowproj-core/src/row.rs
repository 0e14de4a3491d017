//! Fixed-layout rows.
//!
//! A `Row` is a contiguous inline storage region laid out by its [`Schema`],
//! plus a handle to a [`VarlenHeap`] holding out-of-line payloads for
//! `Utf8`/`Binary` fields. The inline region can be read and written as raw
//! bytes; typed access goes through [`Row::get`] and [`Row::set`].
//!
//! Rows exchanged through one projection must share a heap: a raw copy of a
//! handle field copies the handle, not the payload.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::id::VarlenHandle;
use crate::schema::{DataType, Schema, NULL_INDICATOR_WIDTH};
use crate::types::Scalar;

#[derive(Default)]
struct HeapInner {
    payloads: Vec<Arc<[u8]>>,
    interned: HashMap<Arc<[u8]>, VarlenHandle>,
}

/// Shared, append-only, content-interned store for out-of-line payloads.
///
/// Equal payloads always map to the same handle, so two rows holding the same
/// string are byte-identical in their inline storage.
#[derive(Clone, Default)]
pub struct VarlenHeap {
    inner: Arc<RwLock<HeapInner>>,
}

impl VarlenHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bytes: &[u8]) -> Result<VarlenHandle> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| Error::Invariant("varlen heap lock poisoned".into()))?;
        if let Some(h) = inner.interned.get(bytes) {
            return Ok(*h);
        }
        let id = u32::try_from(inner.payloads.len())
            .map_err(|_| Error::Invariant("varlen heap is full".into()))?;
        let handle = VarlenHandle::new(id);
        let payload: Arc<[u8]> = Arc::from(bytes);
        inner.payloads.push(Arc::clone(&payload));
        inner.interned.insert(payload, handle);
        Ok(handle)
    }

    pub fn get(&self, handle: VarlenHandle) -> Result<Arc<[u8]>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| Error::Invariant("varlen heap lock poisoned".into()))?;
        inner
            .payloads
            .get(handle.index())
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("dangling varlen handle {handle}")))
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.payloads.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn same_heap(&self, other: &VarlenHeap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for VarlenHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VarlenHeap").field("len", &self.len()).finish()
    }
}

// In-row handle encoding: 0 is the empty payload, otherwise id + 1.
fn encode_handle(h: Option<VarlenHandle>) -> u64 {
    h.map(|h| h.get() as u64 + 1).unwrap_or(0)
}

fn decode_handle(raw: u64) -> Result<Option<VarlenHandle>> {
    if raw == 0 {
        return Ok(None);
    }
    u32::try_from(raw - 1)
        .map(|v| Some(VarlenHandle::new(v)))
        .map_err(|_| Error::Invariant(format!("corrupt varlen handle {raw}")))
}

#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    data: Vec<u8>,
    heap: VarlenHeap,
}

impl Row {
    /// A fresh row: nullable fields are NULL, everything else zero.
    pub fn new(schema: Arc<Schema>, heap: VarlenHeap) -> Self {
        let mut data = vec![0u8; schema.row_len()];
        for idx in 0..schema.len() {
            if schema.nullable(idx) {
                data[schema.offset(idx)] = 1;
            }
        }
        Self { schema, data, heap }
    }

    pub fn from_values(schema: Arc<Schema>, heap: VarlenHeap, values: &[Scalar]) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(Error::Schema(format!(
                "expected {} values, got {}",
                schema.len(),
                values.len()
            )));
        }
        let mut row = Row::new(schema, heap);
        for (idx, v) in values.iter().enumerate() {
            row.set(idx, v)?;
        }
        Ok(row)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn heap(&self) -> &VarlenHeap {
        &self.heap
    }

    /// Raw inline storage.
    pub fn storage(&self) -> &[u8] {
        &self.data
    }

    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn values(&self) -> Result<Vec<Scalar>> {
        (0..self.schema.len()).map(|i| self.get(i)).collect()
    }

    pub fn is_null(&self, idx: usize) -> Result<bool> {
        let (field, layout) = self.schema.field_checked(idx)?;
        Ok(field.nullable && self.data[layout.offset] != 0)
    }

    pub fn get(&self, idx: usize) -> Result<Scalar> {
        let (field, layout) = self.schema.field_checked(idx)?;
        let mut start = layout.offset;
        if field.nullable {
            if self.data[start] != 0 {
                return Ok(Scalar::Null);
            }
            start += NULL_INDICATOR_WIDTH;
        }
        let bytes = &self.data[start..layout.end()];
        let value = match field.data_type {
            DataType::Boolean => Scalar::Bool(bytes[0] != 0),
            DataType::Int32 => Scalar::I32(i32::from_le_bytes(fixed(bytes)?)),
            DataType::Int64 => Scalar::I64(i64::from_le_bytes(fixed(bytes)?)),
            DataType::Date64 => Scalar::Date64(i64::from_le_bytes(fixed(bytes)?)),
            DataType::Float32 => Scalar::F32(f32::from_le_bytes(fixed(bytes)?)),
            DataType::Float64 => Scalar::F64(f64::from_le_bytes(fixed(bytes)?)),
            DataType::Decimal128 => Scalar::Decimal(i128::from_le_bytes(fixed(bytes)?)),
            DataType::Utf8 | DataType::Binary => {
                let payload = match decode_handle(u64::from_le_bytes(fixed(bytes)?))? {
                    Some(h) => self.heap.get(h)?.to_vec(),
                    None => Vec::new(),
                };
                if field.data_type == DataType::Utf8 {
                    Scalar::Str(String::from_utf8(payload).map_err(|e| {
                        Error::Type(format!("field '{}' holds invalid utf8: {e}", field.name))
                    })?)
                } else {
                    Scalar::Bin(payload)
                }
            }
        };
        Ok(value)
    }

    /// Typed write: coerces `value` to the field's type and encodes NULL.
    pub fn set(&mut self, idx: usize, value: &Scalar) -> Result<()> {
        let (field, layout) = self.schema.field_checked(idx)?;
        let mut start = layout.offset;
        let end = layout.end();

        if value.is_null() {
            if !field.nullable {
                return Err(Error::Type(format!(
                    "cannot store NULL into non-nullable field '{}'",
                    field.name
                )));
            }
            self.data[start] = 1;
            self.data[start + NULL_INDICATOR_WIDTH..end].fill(0);
            return Ok(());
        }

        let value = value.cast(field.data_type)?;
        let encoded: Vec<u8> = match &value {
            Scalar::Bool(b) => vec![*b as u8],
            Scalar::I32(v) => v.to_le_bytes().to_vec(),
            Scalar::I64(v) | Scalar::Date64(v) => v.to_le_bytes().to_vec(),
            Scalar::F32(v) => v.to_le_bytes().to_vec(),
            Scalar::F64(v) => v.to_le_bytes().to_vec(),
            Scalar::Decimal(v) => v.to_le_bytes().to_vec(),
            Scalar::Str(s) => self.varlen_bytes(s.as_bytes())?,
            Scalar::Bin(b) => self.varlen_bytes(b)?,
            Scalar::Null => return Err(Error::Invariant("cast produced NULL".into())),
        };

        if field.nullable {
            self.data[start] = 0;
            start += NULL_INDICATOR_WIDTH;
        }
        if encoded.len() != end - start {
            return Err(Error::Invariant(format!(
                "encoded width {} does not match field '{}' width {}",
                encoded.len(),
                field.name,
                end - start
            )));
        }
        self.data[start..end].copy_from_slice(&encoded);
        Ok(())
    }

    fn varlen_bytes(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let handle = if payload.is_empty() {
            None
        } else {
            Some(self.heap.put(payload)?)
        };
        Ok(encode_handle(handle).to_le_bytes().to_vec())
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::Invariant(format!("expected {N} bytes, found {}", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
        ]))
    }

    #[test]
    fn test_new_row_nullable_fields_start_null() {
        let row = Row::new(schema(), VarlenHeap::new());
        assert_eq!(row.get(0).unwrap(), Scalar::I32(0));
        assert_eq!(row.get(1).unwrap(), Scalar::Null);
        assert!(row.is_null(2).unwrap());
    }

    #[test]
    fn test_set_get_with_coercion() {
        let mut row = Row::new(schema(), VarlenHeap::new());
        row.set(0, &Scalar::I64(42)).unwrap();
        row.set(1, &Scalar::Str("ada".into())).unwrap();
        row.set(2, &Scalar::I32(3)).unwrap();
        assert_eq!(
            row.values().unwrap(),
            vec![Scalar::I32(42), Scalar::Str("ada".into()), Scalar::F64(3.0)]
        );
    }

    #[test]
    fn test_null_into_non_nullable_is_type_error() {
        let mut row = Row::new(schema(), VarlenHeap::new());
        let err = row.set(0, &Scalar::Null).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_heap_interns_equal_payloads() {
        let heap = VarlenHeap::new();
        let mut a = Row::new(schema(), heap.clone());
        let mut b = Row::new(schema(), heap.clone());
        a.set(1, &Scalar::Str("same".into())).unwrap();
        b.set(1, &Scalar::Str("same".into())).unwrap();
        assert_eq!(a.storage(), b.storage());
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_out_of_range_index() {
        let row = Row::new(schema(), VarlenHeap::new());
        assert!(matches!(row.get(9), Err(Error::Schema(_))));
    }
}
