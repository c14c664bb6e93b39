//! Array column: a child column plus an `offsets` array whose `offsets[i]`
//! is one past the last element of row i (§3).

use crucible_errors::{Code, Error, Result};

use crate::column::Column;
use crate::field::Field;

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayColumn {
    data: Box<Column>,
    offsets: Vec<u64>,
}

impl ArrayColumn {
    pub fn new(data: Column) -> Self {
        Self {
            data: Box::new(data),
            offsets: Vec::new(),
        }
    }

    pub fn data(&self) -> &Column {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.offsets.len()
    }

    pub fn byte_size(&self) -> usize {
        self.data.byte_size() + self.offsets.len() * std::mem::size_of::<u64>()
    }

    fn offset_start(&self, row: usize) -> u64 {
        if row == 0 {
            0
        } else {
            self.offsets[row - 1]
        }
    }

    pub fn row_range(&self, row: usize) -> Result<(usize, usize)> {
        self.bounds_check(row)?;
        Ok((self.offset_start(row) as usize, self.offsets[row] as usize))
    }

    pub fn get(&self, row: usize) -> Result<Field> {
        let (start, end) = self.row_range(row)?;
        let mut items = Vec::with_capacity(end - start);
        for i in start..end {
            items.push(self.data.get(i)?);
        }
        Ok(Field::Array(items.into()))
    }

    /// Append one row whose elements are rows `[start, end)` of `self`'s own
    /// child column, which the caller has already populated via
    /// `self.data_mut()`.
    pub fn push_row_end(&mut self, end_offset: u64) {
        self.offsets.push(end_offset);
    }

    pub fn data_mut(&mut self) -> &mut Column {
        &mut self.data
    }

    pub fn insert_default(&mut self) {
        let end = self.offsets.last().copied().unwrap_or(0);
        self.offsets.push(end);
    }

    pub fn insert_from(&mut self, other: &ArrayColumn, row: usize) -> Result<()> {
        let (start, end) = other.row_range(row)?;
        for i in start..end {
            self.data.insert_from(&other.data, i)?;
        }
        let new_end = self.offsets.last().copied().unwrap_or(0) + (end - start) as u64;
        self.offsets.push(new_end);
        Ok(())
    }

    pub fn insert_range_from(&mut self, other: &ArrayColumn, start: usize, length: usize) -> Result<()> {
        if start + length > other.size() {
            return Err(Error::logic(Code::PositionOutOfBound, "insert_range_from out of bounds"));
        }
        for row in start..start + length {
            self.insert_from(other, row)?;
        }
        Ok(())
    }

    pub fn filter(&self, mask: &[u8], result_size_hint: i64) -> Result<Self> {
        let capacity = if result_size_hint >= 0 {
            result_size_hint as usize
        } else {
            self.size()
        };
        let mut out = ArrayColumn::new(self.data.empty_like());
        out.offsets.reserve(capacity);
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
    fn rows_read_back_via_offsets() {
        let mut arr = ArrayColumn::new(Column::Vector(VectorColumn::empty(NumberKind::UInt32)));
        if let Column::Vector(VectorColumn::UInt32(values)) = arr.data_mut() {
            values.extend_from_slice(&[1, 2, 3, 4, 5]);
        }
        arr.push_row_end(2);
        arr.push_row_end(2);
        arr.push_row_end(5);

        assert_eq!(arr.size(), 3);
        assert_eq!(arr.row_range(0).unwrap(), (0, 2));
        assert_eq!(arr.row_range(1).unwrap(), (2, 2));
        assert_eq!(arr.row_range(2).unwrap(), (2, 5));
    }
}
