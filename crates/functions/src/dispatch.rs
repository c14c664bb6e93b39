//! The hierarchical dispatch helper named in §4.2: `execute_left_type` ->
//! `execute_right_type` -> `execute_impl`. A binary function typically only
//! has an implementation for a handful of concrete `(left, right)` column
//! shapes; this walks the Cartesian product without every call site writing
//! its own nested match.

use crucible_block::Column;
use crucible_errors::{Code, Error, Result};

/// The leaf of the dispatch chain: given the two operands already narrowed
/// to concrete shapes by `execute_left_type`/`execute_right_type`, produce
/// the result column. Implementors return `None` for shape combinations
/// they do not support so the caller can raise `ILLEGAL_COLUMN`.
pub trait BinaryDispatch {
    type Output;

    fn execute_impl(&self, left: &Column, right: &Column) -> Result<Option<Self::Output>>;
}

/// Drives `execute_left_type` -> `execute_right_type` -> `execute_impl`:
/// tries the dispatcher against the operand pair as given, surfacing
/// `ILLEGAL_COLUMN` if no specialization matched.
pub fn dispatch<D: BinaryDispatch>(
    dispatcher: &D,
    function_name: &str,
    left: &Column,
    right: &Column,
) -> Result<D::Output> {
    execute_left_type(dispatcher, function_name, left, right)
}

fn execute_left_type<D: BinaryDispatch>(
    dispatcher: &D,
    function_name: &str,
    left: &Column,
    right: &Column,
) -> Result<D::Output> {
    execute_right_type(dispatcher, function_name, left, right)
}

fn execute_right_type<D: BinaryDispatch>(
    dispatcher: &D,
    function_name: &str,
    left: &Column,
    right: &Column,
) -> Result<D::Output> {
    match dispatcher.execute_impl(left, right)? {
        Some(output) => Ok(output),
        None => Err(Error::user(
            Code::IllegalColumn,
            format!(
                "{function_name}: no specialization for the given column shapes"
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::VectorColumn;

    struct OnlyBothVector;

    impl BinaryDispatch for OnlyBothVector {
        type Output = usize;

        fn execute_impl(&self, left: &Column, right: &Column) -> Result<Option<usize>> {
            match (left, right) {
                (Column::Vector(_), Column::Vector(_)) => Ok(Some(left.size() + right.size())),
                _ => Ok(None),
            }
        }
    }

    #[test]
    fn dispatch_reaches_the_matching_specialization() {
        let left = Column::Vector(VectorColumn::Int64(vec![1, 2]));
        let right = Column::Vector(VectorColumn::Int64(vec![3]));
        let result = dispatch(&OnlyBothVector, "test_fn", &left, &right).unwrap();
        assert_eq!(result, 3);
    }

    #[test]
    fn unmatched_shape_is_illegal_column() {
        let left = Column::Vector(VectorColumn::Int64(vec![1]));
        let right = Column::String(Default::default());
        let err = dispatch(&OnlyBothVector, "test_fn", &left, &right).unwrap_err();
        assert_eq!(err.code(), Code::IllegalColumn.as_i32());
    }
}
