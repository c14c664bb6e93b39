//! Nullable column: a nested column plus a byte bitmap of NULL flags (§3).

use crucible_errors::{Code, Error, Result};

use crate::column::Column;
use crate::field::Field;

#[derive(Debug, Clone, PartialEq)]
pub struct NullableColumn {
    nested: Box<Column>,
    null_map: Vec<u8>,
}

impl NullableColumn {
    pub fn new(nested: Column) -> Self {
        Self {
            nested: Box::new(nested),
            null_map: Vec::new(),
        }
    }

    pub fn nested(&self) -> &Column {
        &self.nested
    }

    pub fn nested_mut(&mut self) -> &mut Column {
        &mut self.nested
    }

    pub fn null_map(&self) -> &[u8] {
        &self.null_map
    }

    pub fn size(&self) -> usize {
        self.null_map.len()
    }

    pub fn byte_size(&self) -> usize {
        self.nested.byte_size() + self.null_map.len()
    }

    pub fn is_null(&self, row: usize) -> Result<bool> {
        self.bounds_check(row)?;
        Ok(self.null_map[row] != 0)
    }

    pub fn get(&self, row: usize) -> Result<Field> {
        if self.is_null(row)? {
            Ok(Field::Null)
        } else {
            self.nested.get(row)
        }
    }

    pub fn push_null(&mut self) {
        self.nested.insert_default();
        self.null_map.push(1);
    }

    pub fn push_value(&mut self, other: &Column, row: usize) -> Result<()> {
        self.nested.insert_from(other, row)?;
        self.null_map.push(0);
        Ok(())
    }

    pub fn insert_default(&mut self) {
        self.push_null();
    }

    pub fn insert_from(&mut self, other: &NullableColumn, row: usize) -> Result<()> {
        other.bounds_check(row)?;
        if other.is_null(row)? {
            self.push_null();
        } else {
            self.push_value(&other.nested, row)?;
        }
        Ok(())
    }

    pub fn insert_range_from(&mut self, other: &NullableColumn, start: usize, length: usize) -> Result<()> {
        if start + length > other.size() {
            return Err(Error::logic(Code::PositionOutOfBound, "insert_range_from out of bounds"));
        }
        for row in start..start + length {
            self.insert_from(other, row)?;
        }
        Ok(())
    }

    pub fn filter(&self, mask: &[u8], result_size_hint: i64) -> Result<Self> {
        let mut out = NullableColumn::new(self.nested.empty_like());
        let capacity = if result_size_hint >= 0 {
            result_size_hint as usize
        } else {
            self.size()
        };
        out.null_map.reserve(capacity);
        for row in 0..self.size() {
            if mask[row] != 0 {
                out.insert_from(self, row)?;
            }
        }
        Ok(out)
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
    use crate::column::VectorColumn;
    use crate::ty::NumberKind;

    #[test]
    fn null_map_reports_nulls() {
        let mut col = NullableColumn::new(Column::Vector(VectorColumn::empty(NumberKind::UInt32)));
        col.push_null();
        let source = Column::Vector(VectorColumn::UInt32(vec![42]));
        col.push_value(&source, 0).unwrap();
        assert!(col.is_null(0).unwrap());
        assert!(!col.is_null(1).unwrap());
        assert_eq!(col.get(1).unwrap(), Field::UInt64(42));
    }
}
