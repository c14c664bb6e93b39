//! `Column`: a contiguous, typed, length-known vector of values, modeled as
//! a tagged variant of concrete storages (§9 Design Notes) rather than a
//! trait object — dispatch is a `match` at this module's boundary, and the
//! concrete storages monomorphize their own inner loops.

mod array;
mod constant;
mod fixed_string;
mod nullable;
mod string;
mod vector;

pub use array::ArrayColumn;
pub use constant::ConstColumn;
pub use fixed_string::FixedStringColumn;
pub use nullable::NullableColumn;
pub use string::StringColumn;
pub use vector::VectorColumn;

use crucible_errors::{Code, Error, Result};

use crate::field::Field;

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Vector(VectorColumn),
    String(StringColumn),
    FixedString(FixedStringColumn),
    Array(ArrayColumn),
    Nullable(NullableColumn),
    Const(ConstColumn),
}

impl Column {
    pub fn size(&self) -> usize {
        match self {
            Column::Vector(c) => c.size(),
            Column::String(c) => c.size(),
            Column::FixedString(c) => c.size(),
            Column::Array(c) => c.size(),
            Column::Nullable(c) => c.size(),
            Column::Const(c) => c.size(),
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            Column::Vector(c) => c.byte_size(),
            Column::String(c) => c.byte_size(),
            Column::FixedString(c) => c.byte_size(),
            Column::Array(c) => c.byte_size(),
            Column::Nullable(c) => c.byte_size(),
            Column::Const(c) => c.byte_size(),
        }
    }

    /// Boxed access to row `row`. The rare path — bulk code reads columns
    /// through their concrete representation instead.
    pub fn get(&self, row: usize) -> Result<Field> {
        match self {
            Column::Vector(c) => c.get(row),
            Column::String(c) => c.get(row),
            Column::FixedString(c) => c.get(row),
            Column::Array(c) => c.get(row),
            Column::Nullable(c) => c.get(row),
            Column::Const(c) => {
                if row >= c.size() {
                    Err(Error::user(Code::PositionOutOfBound, "row out of bounds"))
                } else {
                    Ok(c.get(row))
                }
            }
        }
    }

    pub fn insert_default(&mut self) {
        match self {
            Column::Vector(c) => c.insert_default(),
            Column::String(c) => c.insert_default(),
            Column::FixedString(c) => c.insert_default(),
            Column::Array(c) => c.insert_default(),
            Column::Nullable(c) => c.insert_default(),
            Column::Const(c) => *c = c.with_size(c.size() + 1),
        }
    }

    pub fn insert_from(&mut self, other: &Column, row: usize) -> Result<()> {
        match (self, other) {
            (Column::Vector(dst), Column::Vector(src)) => dst.insert_from(src, row),
            (Column::String(dst), Column::String(src)) => dst.insert_from(src, row),
            (Column::FixedString(dst), Column::FixedString(src)) => dst.insert_from(src, row),
            (Column::Array(dst), Column::Array(src)) => dst.insert_from(src, row),
            (Column::Nullable(dst), Column::Nullable(src)) => dst.insert_from(src, row),
            (Column::Const(dst), Column::Const(src)) => {
                *dst = dst.with_size(dst.size() + 1);
                let _ = src;
                Ok(())
            }
            _ => Err(Error::logic(
                Code::IllegalColumn,
                "insert_from between mismatched column representations",
            )),
        }
    }

    pub fn insert_range_from(&mut self, other: &Column, start: usize, length: usize) -> Result<()> {
        match (self, other) {
            (Column::Vector(dst), Column::Vector(src)) => dst.insert_range_from(src, start, length),
            (Column::String(dst), Column::String(src)) => dst.insert_range_from(src, start, length),
            (Column::Array(dst), Column::Array(src)) => dst.insert_range_from(src, start, length),
            (Column::Nullable(dst), Column::Nullable(src)) => dst.insert_range_from(src, start, length),
            (Column::Const(dst), Column::Const(_)) => {
                *dst = dst.with_size(dst.size() + length);
                Ok(())
            }
            (Column::FixedString(dst), Column::FixedString(src)) => {
                if start + length > src.size() {
                    return Err(Error::logic(Code::PositionOutOfBound, "insert_range_from out of bounds"));
                }
                for row in start..start + length {
                    dst.insert_from(src, row)?;
                }
                Ok(())
            }
            _ => Err(Error::logic(
                Code::IllegalColumn,
                "insert_range_from between mismatched column representations",
            )),
        }
    }

    /// Returns a new column containing row i iff `mask[i] != 0`. Preserves
    /// the column's concrete representation (§4.1 guarantee).
    pub fn filter(&self, mask: &[u8], result_size_hint: i64) -> Result<Column> {
        if mask.len() != self.size() {
            return Err(Error::logic(
                Code::IllegalTypeOfColumnForFilter,
                format!(
                    "filter mask length {} does not match column size {}",
                    mask.len(),
                    self.size()
                ),
            ));
        }
        Ok(match self {
            Column::Vector(c) => Column::Vector(c.filter(mask, result_size_hint)),
            Column::String(c) => Column::String(c.filter(mask, result_size_hint)),
            Column::FixedString(c) => Column::FixedString(c.filter(mask, result_size_hint)),
            Column::Array(c) => Column::Array(c.filter(mask, result_size_hint)?),
            Column::Nullable(c) => Column::Nullable(c.filter(mask, result_size_hint)?),
            Column::Const(c) => {
                let kept = mask.iter().filter(|&&b| b != 0).count();
                Column::Const(c.with_size(kept))
            }
        })
    }

    /// Zero-copy where the representation allows (vector/fixed-string
    /// slices); otherwise a fresh copy of the requested rows.
    pub fn cut(&self, offset: usize, length: usize) -> Result<Column> {
        if offset + length > self.size() {
            return Err(Error::logic(Code::PositionOutOfBound, "cut out of bounds"));
        }
        Ok(match self {
            Column::Vector(c) => Column::Vector(c.cut(offset, length)),
            Column::FixedString(c) => Column::FixedString(c.cut(offset, length)),
            Column::String(c) => Column::String(c.cut(offset, length)),
            Column::Const(c) => Column::Const(c.with_size(length)),
            Column::Array(_) | Column::Nullable(_) => {
                let mask: Vec<u8> = (0..self.size())
                    .map(|i| u8::from(i >= offset && i < offset + length))
                    .collect();
                self.filter(&mask, length as i64)?
            }
        })
    }

    pub fn convert_to_full_if_const(&self) -> Column {
        match self {
            Column::Const(c) => {
                let mut materialized = empty_column_for_field(c.value());
                for _ in 0..c.size() {
                    push_field(&mut materialized, c.value());
                }
                materialized
            }
            other => other.clone(),
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Column::Const(_))
    }

    pub fn empty_like(&self) -> Column {
        match self {
            Column::Vector(c) => Column::Vector(VectorColumn::empty(c.number_kind())),
            Column::String(_) => Column::String(StringColumn::new()),
            Column::FixedString(c) => Column::FixedString(FixedStringColumn::new(c.width())),
            Column::Array(c) => Column::Array(ArrayColumn::new(c.data().empty_like())),
            Column::Nullable(c) => Column::Nullable(NullableColumn::new(c.nested().empty_like())),
            Column::Const(c) => Column::Const(c.with_size(0)),
        }
    }
}

fn empty_column_for_field(field: &Field) -> Column {
    use crate::ty::NumberKind;
    match field {
        Field::Null => Column::Nullable(NullableColumn::new(Column::Vector(VectorColumn::empty(
            NumberKind::UInt8,
        )))),
        Field::UInt64(_) => Column::Vector(VectorColumn::empty(NumberKind::UInt64)),
        Field::Int64(_) => Column::Vector(VectorColumn::empty(NumberKind::Int64)),
        Field::Float64(_) => Column::Vector(VectorColumn::empty(NumberKind::Float64)),
        Field::String(_) => Column::String(StringColumn::new()),
        _ => Column::Const(ConstColumn::new(field.clone(), 0)),
    }
}

fn push_field(column: &mut Column, field: &Field) {
    match (column, field) {
        (Column::Vector(VectorColumn::UInt64(v)), Field::UInt64(value)) => v.push(*value),
        (Column::Vector(VectorColumn::Int64(v)), Field::Int64(value)) => v.push(*value),
        (Column::Vector(VectorColumn::Float64(v)), Field::Float64(value)) => v.push(*value),
        (Column::String(s), Field::String(bytes)) => s.push(bytes),
        (Column::Nullable(n), Field::Null) => n.push_null(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::NumberKind;

    #[test]
    fn const_materializes_with_repeated_value() {
        let col = Column::Const(ConstColumn::new(Field::UInt64(9), 3));
        let full = col.convert_to_full_if_const();
        assert_eq!(full.size(), 3);
        for row in 0..3 {
            assert_eq!(full.get(row).unwrap(), Field::UInt64(9));
        }
    }

    #[test]
    fn filter_rejects_mismatched_mask_length() {
        let col = Column::Vector(VectorColumn::empty(NumberKind::UInt8));
        assert!(col.filter(&[1, 0], -1).is_err());
    }

    #[test]
    fn cut_is_a_view_of_the_requested_rows() {
        let col = Column::Vector(VectorColumn::UInt32(vec![1, 2, 3, 4, 5]));
        let cut = col.cut(1, 2).unwrap();
        assert_eq!(cut, Column::Vector(VectorColumn::UInt32(vec![2, 3])));
    }
}
