//! `Block`: an ordered sequence of `(name, type, column)` triples, the unit
//! of data interchange between operators (§3).

use crucible_errors::{Code, Error, Result};

use crate::column::Column;
use crate::ty::Type;

#[derive(Debug, Clone)]
pub struct BlockColumn {
    pub name: String,
    pub ty: Type,
    /// `None` prior to evaluation (a function's result slot reserved by
    /// type inference but not yet populated by `execute`).
    pub column: Option<Column>,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    columns: Vec<BlockColumn>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(columns: Vec<BlockColumn>) -> Self {
        Self { columns }
    }

    pub fn push(&mut self, name: impl Into<String>, ty: Type, column: Column) {
        self.columns.push(BlockColumn {
            name: name.into(),
            ty,
            column: Some(column),
        });
    }

    pub fn reserve_slot(&mut self, name: impl Into<String>, ty: Type) {
        self.columns.push(BlockColumn {
            name: name.into(),
            ty,
            column: None,
        });
    }

    pub fn columns(&self) -> &[BlockColumn] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_at(&self, position: usize) -> Result<&Column> {
        let entry = self.columns.get(position).ok_or_else(|| {
            Error::logic(Code::PositionOutOfBound, format!("no column at position {position}"))
        })?;
        entry.column.as_ref().ok_or_else(|| {
            Error::logic(
                Code::LogicalError,
                format!("column '{}' read before it was evaluated", entry.name),
            )
        })
    }

    pub fn set_column_at(&mut self, position: usize, column: Column) -> Result<()> {
        let entry = self.columns.get_mut(position).ok_or_else(|| {
            Error::logic(Code::PositionOutOfBound, format!("no column at position {position}"))
        })?;
        entry.column = Some(column);
        Ok(())
    }

    /// `0` for an empty block with no columns; otherwise the shared row
    /// count of its columns (validated by [`Block::check_consistency`]).
    pub fn num_rows(&self) -> usize {
        self.columns
            .iter()
            .find_map(|c| c.column.as_ref().map(Column::size))
            .unwrap_or(0)
    }

    /// A Block is schema-consistent if every column's actual type equals
    /// its declared type (checked by the caller supplying the column) and
    /// every non-null column has the Block's row count (§3).
    pub fn check_consistency(&self) -> Result<()> {
        let expected_rows = self.num_rows();
        for entry in &self.columns {
            if let Some(column) = &entry.column {
                if column.size() != expected_rows {
                    return Err(Error::logic(
                        Code::LogicalError,
                        format!(
                            "column '{}' has {} rows, block has {}",
                            entry.name,
                            column.size(),
                            expected_rows
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// A new Block with the same columns, each `filter`ed by `mask`.
    pub fn filter(&self, mask: &[u8], result_size_hint: i64) -> Result<Block> {
        let mut out = Block::new();
        for entry in &self.columns {
            let column = entry.column.as_ref().ok_or_else(|| {
                Error::logic(
                    Code::LogicalError,
                    format!("cannot filter unevaluated column '{}'", entry.name),
                )
            })?;
            out.push(entry.name.clone(), entry.ty.clone(), column.filter(mask, result_size_hint)?);
        }
        Ok(out)
    }

    pub fn cut(&self, offset: usize, length: usize) -> Result<Block> {
        let mut out = Block::new();
        for entry in &self.columns {
            let column = entry.column.as_ref().ok_or_else(|| {
                Error::logic(
                    Code::LogicalError,
                    format!("cannot cut unevaluated column '{}'", entry.name),
                )
            })?;
            out.push(entry.name.clone(), entry.ty.clone(), column.cut(offset, length)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::VectorColumn;
    use crate::ty::NumberKind;

    #[test]
    fn consistent_block_has_uniform_row_count() {
        let mut block = Block::new();
        block.push(
            "a",
            Type::Number(NumberKind::UInt32),
            Column::Vector(VectorColumn::UInt32(vec![1, 2, 3])),
        );
        block.push(
            "b",
            Type::Number(NumberKind::UInt32),
            Column::Vector(VectorColumn::UInt32(vec![4, 5, 6])),
        );
        assert_eq!(block.num_rows(), 3);
        assert!(block.check_consistency().is_ok());
    }

    #[test]
    fn inconsistent_row_counts_are_rejected() {
        let mut block = Block::new();
        block.push(
            "a",
            Type::Number(NumberKind::UInt32),
            Column::Vector(VectorColumn::UInt32(vec![1, 2, 3])),
        );
        block.push(
            "b",
            Type::Number(NumberKind::UInt32),
            Column::Vector(VectorColumn::UInt32(vec![4])),
        );
        assert!(block.check_consistency().is_err());
    }

    #[test]
    fn filter_applies_to_every_column() {
        let mut block = Block::new();
        block.push(
            "a",
            Type::Number(NumberKind::UInt32),
            Column::Vector(VectorColumn::UInt32(vec![1, 2, 3])),
        );
        let filtered = block.filter(&[1, 0, 1], -1).unwrap();
        assert_eq!(filtered.num_rows(), 2);
    }
}
