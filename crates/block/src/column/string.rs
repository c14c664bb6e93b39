//! String column: parallel `chars`/`offsets` arrays (§3). `offsets[i]` is
//! one past the end of row i's trailing NUL; `offsets[-1]` is implicitly 0.

use crucible_errors::{Code, Error, Result};

use crate::field::Field;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringColumn {
    chars: Vec<u8>,
    offsets: Vec<u64>,
}

impl StringColumn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.offsets.len()
    }

    pub fn byte_size(&self) -> usize {
        self.chars.len() + self.offsets.len() * std::mem::size_of::<u64>()
    }

    fn offset_start(&self, row: usize) -> u64 {
        if row == 0 {
            0
        } else {
            self.offsets[row - 1]
        }
    }

    /// Row `row`'s bytes, excluding the trailing NUL.
    pub fn row_bytes(&self, row: usize) -> Result<&[u8]> {
        self.bounds_check(row)?;
        let start = self.offset_start(row) as usize;
        let end = self.offsets[row] as usize;
        // end is one past the NUL; the row's data is [start, end - 1).
        Ok(&self.chars[start..end - 1])
    }

    pub fn get(&self, row: usize) -> Result<Field> {
        Ok(Field::String(std::sync::Arc::from(self.row_bytes(row)?)))
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.chars.extend_from_slice(bytes);
        self.chars.push(0);
        self.offsets.push(self.chars.len() as u64);
    }

    pub fn insert_default(&mut self) {
        self.push(&[]);
    }

    pub fn insert_from(&mut self, other: &StringColumn, row: usize) -> Result<()> {
        self.push(other.row_bytes(row)?);
        Ok(())
    }

    pub fn insert_range_from(&mut self, other: &StringColumn, start: usize, length: usize) -> Result<()> {
        if start + length > other.size() {
            return Err(Error::logic(Code::PositionOutOfBound, "insert_range_from out of bounds"));
        }
        for row in start..start + length {
            self.insert_from(other, row)?;
        }
        Ok(())
    }

    pub fn filter(&self, mask: &[u8], result_size_hint: i64) -> Self {
        let capacity = if result_size_hint >= 0 {
            result_size_hint as usize
        } else {
            self.size()
        };
        let mut out = StringColumn {
            chars: Vec::with_capacity(self.chars.len().min(capacity.saturating_mul(8).max(8))),
            offsets: Vec::with_capacity(capacity),
        };
        for row in 0..self.size() {
            if mask[row] != 0 {
                out.push(self.row_bytes(row).expect("row within bounds"));
            }
        }
        out
    }

    pub fn cut(&self, offset: usize, length: usize) -> Self {
        let mut out = StringColumn::new();
        for row in offset..offset + length {
            out.push(self.row_bytes(row).expect("row within bounds"));
        }
        out
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
    fn offsets_track_nul_terminated_rows() {
        let mut col = StringColumn::new();
        col.push(b"ab");
        col.push(b"");
        col.push(b"xyz");
        assert_eq!(col.row_bytes(0).unwrap(), b"ab");
        assert_eq!(col.row_bytes(1).unwrap(), b"");
        assert_eq!(col.row_bytes(2).unwrap(), b"xyz");
    }

    #[test]
    fn filter_popcount_matches_mask() {
        let mut col = StringColumn::new();
        col.push(b"a");
        col.push(b"bb");
        col.push(b"ccc");
        let filtered = col.filter(&[1, 0, 1], -1);
        assert_eq!(filtered.size(), 2);
        assert_eq!(filtered.row_bytes(0).unwrap(), b"a");
        assert_eq!(filtered.row_bytes(1).unwrap(), b"ccc");
    }

    #[test]
    fn lexicographic_comparison_with_length_tiebreak() {
        let mut col = StringColumn::new();
        col.push(b"ab");
        col.push(b"abc");
        col.push(b"b");
        let a = col.row_bytes(0).unwrap();
        let b = col.row_bytes(1).unwrap();
        assert!(a < b, "\"ab\" should sort before \"abc\" (length tiebreak)");
        assert!(b < col.row_bytes(2).unwrap());
    }
}
