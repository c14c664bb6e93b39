//! Constant column: a logical value plus a row count (§3). Any non-const
//! operator may demand materialization via [`ConstColumn::convert_to_full`].

use crate::field::Field;

#[derive(Debug, Clone, PartialEq)]
pub struct ConstColumn {
    value: Field,
    size: usize,
}

impl ConstColumn {
    pub fn new(value: Field, size: usize) -> Self {
        Self { value, size }
    }

    pub fn value(&self) -> &Field {
        &self.value
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn byte_size(&self) -> usize {
        field_byte_size(&self.value)
    }

    pub fn get(&self, _row: usize) -> Field {
        self.value.clone()
    }

    pub fn with_size(&self, size: usize) -> Self {
        ConstColumn {
            value: self.value.clone(),
            size,
        }
    }
}

fn field_byte_size(field: &Field) -> usize {
    match field {
        Field::Null => 0,
        Field::UInt64(_) | Field::Int64(_) | Field::Float64(_) => 8,
        Field::UInt128(_) | Field::Int128(_) => 16,
        Field::String(bytes) => bytes.len(),
        Field::Array(items) | Field::Tuple(items) => items.iter().map(field_byte_size).sum(),
        Field::Decimal32(_) => 4,
        Field::Decimal64(_) => 8,
        Field::Decimal128(_) => 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_always_returns_the_same_value() {
        let col = ConstColumn::new(Field::UInt64(7), 5);
        assert_eq!(col.size(), 5);
        for row in 0..5 {
            assert_eq!(col.get(row), Field::UInt64(7));
        }
    }
}
