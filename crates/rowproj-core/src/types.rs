//! Scalar values read from and written to rows, plus the coercion rules used
//! by typed writes and `CAST`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Date64(i64),
    /// Unscaled 128-bit decimal.
    Decimal(i128),
}

impl Scalar {
    /// Natural type of this value; `None` for NULL.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I32(_) => Some(DataType::Int32),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F32(_) => Some(DataType::Float32),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Bin(_) => Some(DataType::Binary),
            Scalar::Date64(_) => Some(DataType::Date64),
            Scalar::Decimal(_) => Some(DataType::Decimal128),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Integer view of integral values (booleans count as 0/1).
    fn as_i128(&self) -> Option<i128> {
        match self {
            Scalar::Bool(b) => Some(*b as i128),
            Scalar::I32(v) => Some(*v as i128),
            Scalar::I64(v) | Scalar::Date64(v) => Some(*v as i128),
            Scalar::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating view of any numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::F32(v) => Some(*v as f64),
            Scalar::F64(v) => Some(*v),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    /// Convert to `target`, widening or narrowing as needed. Narrowing that
    /// loses the value is an error, never a silent wrap.
    pub fn cast(&self, target: DataType) -> Result<Scalar> {
        if self.is_null() {
            return Ok(Scalar::Null);
        }
        if self.data_type() == Some(target) {
            return Ok(self.clone());
        }
        let fail = || Error::Type(format!("cannot convert {:?} to {:?}", self, target));

        match target {
            DataType::Boolean => match self {
                Scalar::Str(s) => s.trim().parse::<bool>().map(Scalar::Bool).map_err(|_| fail()),
                other => other.as_i128().map(|v| Scalar::Bool(v != 0)).ok_or_else(fail),
            },
            DataType::Int32 => {
                let v = self.integral(fail)?;
                i32::try_from(v).map(Scalar::I32).map_err(|_| fail())
            }
            DataType::Int64 => {
                let v = self.integral(fail)?;
                i64::try_from(v).map(Scalar::I64).map_err(|_| fail())
            }
            DataType::Date64 => match self {
                Scalar::I32(_) | Scalar::I64(_) => {
                    let v = self.integral(fail)?;
                    i64::try_from(v).map(Scalar::Date64).map_err(|_| fail())
                }
                _ => Err(fail()),
            },
            DataType::Decimal128 => self.integral(fail).map(Scalar::Decimal),
            DataType::Float32 => match self {
                Scalar::Str(s) => s.trim().parse::<f32>().map(Scalar::F32).map_err(|_| fail()),
                other => other.as_f64().map(|v| Scalar::F32(v as f32)).ok_or_else(fail),
            },
            DataType::Float64 => match self {
                Scalar::Str(s) => s.trim().parse::<f64>().map(Scalar::F64).map_err(|_| fail()),
                other => other.as_f64().map(Scalar::F64).ok_or_else(fail),
            },
            DataType::Utf8 => match self {
                Scalar::Bin(b) => String::from_utf8(b.clone())
                    .map(Scalar::Str)
                    .map_err(|_| fail()),
                Scalar::Bool(v) => Ok(Scalar::Str(v.to_string())),
                Scalar::I32(v) => Ok(Scalar::Str(v.to_string())),
                Scalar::I64(v) | Scalar::Date64(v) => Ok(Scalar::Str(v.to_string())),
                Scalar::F32(v) => Ok(Scalar::Str(v.to_string())),
                Scalar::F64(v) => Ok(Scalar::Str(v.to_string())),
                Scalar::Decimal(v) => Ok(Scalar::Str(v.to_string())),
                _ => Err(fail()),
            },
            DataType::Binary => match self {
                Scalar::Str(s) => Ok(Scalar::Bin(s.as_bytes().to_vec())),
                _ => Err(fail()),
            },
        }
    }

    /// Integral value for integer targets: integers pass through, floats
    /// must be finite and are truncated toward zero, strings are parsed.
    fn integral(&self, fail: impl Fn() -> Error) -> Result<i128> {
        match self {
            Scalar::F32(_) | Scalar::F64(_) => {
                let f = self.as_f64().ok_or_else(&fail)?;
                if !f.is_finite() || f.abs() >= i128::MAX as f64 {
                    return Err(fail());
                }
                Ok(f.trunc() as i128)
            }
            Scalar::Str(s) => s.trim().parse::<i128>().map_err(|_| fail()),
            other => other.as_i128().ok_or_else(fail),
        }
    }

    /// SQL-style comparison: `None` when either side is NULL or the values
    /// are not comparable.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        use Scalar::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Bin(a), Bin(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (F32(_) | F64(_), _) | (_, F32(_) | F64(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (a, b) => Some(a.as_i128()?.cmp(&b.as_i128()?)),
        }
    }
}
