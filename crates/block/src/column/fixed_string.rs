//! FixedString column: a single `chars` buffer of length `row_count * N` (§3).

use std::sync::Arc;

use crucible_errors::{Code, Error, Result};

use crate::field::Field;

#[derive(Debug, Clone, PartialEq)]
pub struct FixedStringColumn {
    width: usize,
    chars: Vec<u8>,
}

impl FixedStringColumn {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            chars: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn size(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.chars.len() / self.width
        }
    }

    pub fn byte_size(&self) -> usize {
        self.chars.len()
    }

    pub fn row_bytes(&self, row: usize) -> Result<&[u8]> {
        self.bounds_check(row)?;
        let start = row * self.width;
        Ok(&self.chars[start..start + self.width])
    }

    pub fn get(&self, row: usize) -> Result<Field> {
        Ok(Field::String(Arc::from(self.row_bytes(row)?)))
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.width {
            return Err(Error::logic(
                Code::IllegalColumn,
                format!(
                    "FixedString({}) got a value of length {}",
                    self.width,
                    bytes.len()
                ),
            ));
        }
        self.chars.extend_from_slice(bytes);
        Ok(())
    }

    pub fn insert_default(&mut self) {
        self.chars.resize(self.chars.len() + self.width, 0);
    }

    pub fn insert_from(&mut self, other: &FixedStringColumn, row: usize) -> Result<()> {
        self.push(other.row_bytes(row)?)
    }

    pub fn filter(&self, mask: &[u8], result_size_hint: i64) -> Self {
        let capacity = if result_size_hint >= 0 {
            result_size_hint as usize
        } else {
            self.size()
        };
        let mut out = FixedStringColumn {
            width: self.width,
            chars: Vec::with_capacity(capacity * self.width),
        };
        for row in 0..self.size() {
            if mask[row] != 0 {
                out.chars
                    .extend_from_slice(self.row_bytes(row).expect("row within bounds"));
            }
        }
        out
    }

    pub fn cut(&self, offset: usize, length: usize) -> Self {
        let start = offset * self.width;
        let end = start + length * self.width;
        FixedStringColumn {
            width: self.width,
            chars: self.chars[start..end].to_vec(),
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
    fn rejects_mismatched_width() {
        let mut col = FixedStringColumn::new(4);
        assert!(col.push(b"abc").is_err());
        assert!(col.push(b"abcd").is_ok());
    }

    #[test]
    fn filter_preserves_width() {
        let mut col = FixedStringColumn::new(2);
        col.push(b"aa").unwrap();
        col.push(b"bb").unwrap();
        col.push(b"cc").unwrap();
        let filtered = col.filter(&[0, 1, 1], -1);
        assert_eq!(filtered.size(), 2);
        assert_eq!(filtered.row_bytes(0).unwrap(), b"bb");
    }
}
