//! `PODArray<T>`-style fixed-width vector column (§3).

use crucible_errors::{Code, Error, Result};

use crate::field::Field;
use crate::ty::NumberKind;

/// A contiguous array of one concrete fixed-width numeric representation.
/// The `NumberKind` tag lets the outer `Column` dispatch without a second
/// generic parameter leaking through the whole call stack.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorColumn {
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! for_each_vector_variant {
    ($self:expr, |$values:ident| $body:expr) => {
        match $self {
            VectorColumn::UInt8($values) => $body,
            VectorColumn::UInt16($values) => $body,
            VectorColumn::UInt32($values) => $body,
            VectorColumn::UInt64($values) => $body,
            VectorColumn::Int8($values) => $body,
            VectorColumn::Int16($values) => $body,
            VectorColumn::Int32($values) => $body,
            VectorColumn::Int64($values) => $body,
            VectorColumn::Float32($values) => $body,
            VectorColumn::Float64($values) => $body,
        }
    };
}

impl VectorColumn {
    pub fn empty(kind: NumberKind) -> Self {
        match kind {
            NumberKind::UInt8 => VectorColumn::UInt8(Vec::new()),
            NumberKind::UInt16 => VectorColumn::UInt16(Vec::new()),
            NumberKind::UInt32 => VectorColumn::UInt32(Vec::new()),
            NumberKind::UInt64 => VectorColumn::UInt64(Vec::new()),
            NumberKind::Int8 => VectorColumn::Int8(Vec::new()),
            NumberKind::Int16 => VectorColumn::Int16(Vec::new()),
            NumberKind::Int32 => VectorColumn::Int32(Vec::new()),
            NumberKind::Int64 => VectorColumn::Int64(Vec::new()),
            NumberKind::Float32 => VectorColumn::Float32(Vec::new()),
            NumberKind::Float64 => VectorColumn::Float64(Vec::new()),
        }
    }

    pub fn number_kind(&self) -> NumberKind {
        match self {
            VectorColumn::UInt8(_) => NumberKind::UInt8,
            VectorColumn::UInt16(_) => NumberKind::UInt16,
            VectorColumn::UInt32(_) => NumberKind::UInt32,
            VectorColumn::UInt64(_) => NumberKind::UInt64,
            VectorColumn::Int8(_) => NumberKind::Int8,
            VectorColumn::Int16(_) => NumberKind::Int16,
            VectorColumn::Int32(_) => NumberKind::Int32,
            VectorColumn::Int64(_) => NumberKind::Int64,
            VectorColumn::Float32(_) => NumberKind::Float32,
            VectorColumn::Float64(_) => NumberKind::Float64,
        }
    }

    pub fn size(&self) -> usize {
        for_each_vector_variant!(self, |values| values.len())
    }

    pub fn byte_size(&self) -> usize {
        self.size() * self.number_kind().byte_width()
    }

    pub fn reserve(&mut self, additional: usize) {
        for_each_vector_variant!(self, |values| values.reserve(additional))
    }

    pub fn insert_default(&mut self) {
        match self {
            VectorColumn::UInt8(v) => v.push(0),
            VectorColumn::UInt16(v) => v.push(0),
            VectorColumn::UInt32(v) => v.push(0),
            VectorColumn::UInt64(v) => v.push(0),
            VectorColumn::Int8(v) => v.push(0),
            VectorColumn::Int16(v) => v.push(0),
            VectorColumn::Int32(v) => v.push(0),
            VectorColumn::Int64(v) => v.push(0),
            VectorColumn::Float32(v) => v.push(0.0),
            VectorColumn::Float64(v) => v.push(0.0),
        }
    }

    pub fn get(&self, row: usize) -> Result<Field> {
        self.bounds_check(row)?;
        Ok(match self {
            VectorColumn::UInt8(v) => Field::UInt64(v[row] as u64),
            VectorColumn::UInt16(v) => Field::UInt64(v[row] as u64),
            VectorColumn::UInt32(v) => Field::UInt64(v[row] as u64),
            VectorColumn::UInt64(v) => Field::UInt64(v[row]),
            VectorColumn::Int8(v) => Field::Int64(v[row] as i64),
            VectorColumn::Int16(v) => Field::Int64(v[row] as i64),
            VectorColumn::Int32(v) => Field::Int64(v[row] as i64),
            VectorColumn::Int64(v) => Field::Int64(v[row]),
            VectorColumn::Float32(v) => Field::Float64(v[row] as f64),
            VectorColumn::Float64(v) => Field::Float64(v[row]),
        })
    }

    pub fn insert_from(&mut self, other: &VectorColumn, row: usize) -> Result<()> {
        other.bounds_check(row)?;
        match (self, other) {
            (VectorColumn::UInt8(dst), VectorColumn::UInt8(src)) => dst.push(src[row]),
            (VectorColumn::UInt16(dst), VectorColumn::UInt16(src)) => dst.push(src[row]),
            (VectorColumn::UInt32(dst), VectorColumn::UInt32(src)) => dst.push(src[row]),
            (VectorColumn::UInt64(dst), VectorColumn::UInt64(src)) => dst.push(src[row]),
            (VectorColumn::Int8(dst), VectorColumn::Int8(src)) => dst.push(src[row]),
            (VectorColumn::Int16(dst), VectorColumn::Int16(src)) => dst.push(src[row]),
            (VectorColumn::Int32(dst), VectorColumn::Int32(src)) => dst.push(src[row]),
            (VectorColumn::Int64(dst), VectorColumn::Int64(src)) => dst.push(src[row]),
            (VectorColumn::Float32(dst), VectorColumn::Float32(src)) => dst.push(src[row]),
            (VectorColumn::Float64(dst), VectorColumn::Float64(src)) => dst.push(src[row]),
            _ => {
                return Err(Error::logic(
                    Code::IllegalColumn,
                    "insert_from between mismatched vector representations",
                ))
            }
        }
        Ok(())
    }

    pub fn insert_range_from(&mut self, other: &VectorColumn, start: usize, length: usize) -> Result<()> {
        if start + length > other.size() {
            return Err(Error::logic(Code::PositionOutOfBound, "insert_range_from out of bounds"));
        }
        match (self, other) {
            (VectorColumn::UInt8(dst), VectorColumn::UInt8(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::UInt16(dst), VectorColumn::UInt16(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::UInt32(dst), VectorColumn::UInt32(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::UInt64(dst), VectorColumn::UInt64(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::Int8(dst), VectorColumn::Int8(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::Int16(dst), VectorColumn::Int16(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::Int32(dst), VectorColumn::Int32(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::Int64(dst), VectorColumn::Int64(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::Float32(dst), VectorColumn::Float32(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            (VectorColumn::Float64(dst), VectorColumn::Float64(src)) => {
                dst.extend_from_slice(&src[start..start + length])
            }
            _ => {
                return Err(Error::logic(
                    Code::IllegalColumn,
                    "insert_range_from between mismatched vector representations",
                ))
            }
        }
        Ok(())
    }

    /// Keep row `i` iff `mask[i] != 0`. `result_size_hint >= 0` is an upper
    /// bound used to presize the output; ignored if negative.
    pub fn filter(&self, mask: &[u8], result_size_hint: i64) -> Self {
        macro_rules! filter_variant {
            ($values:expr, $ctor:expr) => {{
                let capacity = if result_size_hint >= 0 {
                    result_size_hint as usize
                } else {
                    $values.len()
                };
                let mut out = Vec::with_capacity(capacity.min($values.len().max(capacity)));
                for (value, keep) in $values.iter().zip(mask.iter()) {
                    if *keep != 0 {
                        out.push(*value);
                    }
                }
                $ctor(out)
            }};
        }
        match self {
            VectorColumn::UInt8(v) => filter_variant!(v, VectorColumn::UInt8),
            VectorColumn::UInt16(v) => filter_variant!(v, VectorColumn::UInt16),
            VectorColumn::UInt32(v) => filter_variant!(v, VectorColumn::UInt32),
            VectorColumn::UInt64(v) => filter_variant!(v, VectorColumn::UInt64),
            VectorColumn::Int8(v) => filter_variant!(v, VectorColumn::Int8),
            VectorColumn::Int16(v) => filter_variant!(v, VectorColumn::Int16),
            VectorColumn::Int32(v) => filter_variant!(v, VectorColumn::Int32),
            VectorColumn::Int64(v) => filter_variant!(v, VectorColumn::Int64),
            VectorColumn::Float32(v) => filter_variant!(v, VectorColumn::Float32),
            VectorColumn::Float64(v) => filter_variant!(v, VectorColumn::Float64),
        }
    }

    pub fn cut(&self, offset: usize, length: usize) -> Self {
        macro_rules! cut_variant {
            ($values:expr, $ctor:expr) => {
                $ctor($values[offset..offset + length].to_vec())
            };
        }
        match self {
            VectorColumn::UInt8(v) => cut_variant!(v, VectorColumn::UInt8),
            VectorColumn::UInt16(v) => cut_variant!(v, VectorColumn::UInt16),
            VectorColumn::UInt32(v) => cut_variant!(v, VectorColumn::UInt32),
            VectorColumn::UInt64(v) => cut_variant!(v, VectorColumn::UInt64),
            VectorColumn::Int8(v) => cut_variant!(v, VectorColumn::Int8),
            VectorColumn::Int16(v) => cut_variant!(v, VectorColumn::Int16),
            VectorColumn::Int32(v) => cut_variant!(v, VectorColumn::Int32),
            VectorColumn::Int64(v) => cut_variant!(v, VectorColumn::Int64),
            VectorColumn::Float32(v) => cut_variant!(v, VectorColumn::Float32),
            VectorColumn::Float64(v) => cut_variant!(v, VectorColumn::Float64),
        }
    }

    fn bounds_check(&self, row: usize) -> Result<()> {
        if row >= self.size() {
            Err(Error::user(
                Code::PositionOutOfBound,
                format!("row {row} out of bounds for column of size {}", self.size()),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_preserves_representation_and_popcount() {
        let col = VectorColumn::UInt32(vec![10, 20, 30, 40]);
        let mask = [1, 0, 1, 0];
        let filtered = col.filter(&mask, -1);
        assert_eq!(filtered, VectorColumn::UInt32(vec![10, 30]));
    }

    #[test]
    fn out_of_bounds_get_is_an_error() {
        let col = VectorColumn::UInt8(vec![1, 2, 3]);
        assert!(col.get(5).is_err());
    }
}
