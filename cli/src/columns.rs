//! Pushes a decoded `Field` onto a concrete `Column`, the text-format
//! counterpart of `crucible-wire-protocol`'s bulk `decode_*` helpers — here
//! the caller already has a single decoded value rather than raw bytes.

use crucible_block::{Column, Field, FixedStringColumn, NullableColumn, StringColumn, VectorColumn};
use crucible_errors::{Code, Error, Result};

pub fn push_field(column: &mut Column, field: Field) -> Result<()> {
    match column {
        Column::Vector(v) => push_vector_field(v, field),
        Column::String(s) => push_string_field(s, &field),
        Column::FixedString(f) => push_fixed_string_field(f, &field),
        Column::Nullable(n) => push_nullable_field(n, field),
        Column::Array(_) | Column::Const(_) => Err(Error::user(
            Code::SyntaxError,
            "array and constant columns are not representable in the CLI's text formats",
        )),
    }
}

fn mismatch(field: &Field) -> Error {
    Error::user(Code::BadTypeOfField, format!("value {field:?} does not match the column's type"))
}

fn push_vector_field(v: &mut VectorColumn, field: Field) -> Result<()> {
    match v {
        VectorColumn::UInt8(values) => values.push(field.as_u64().ok_or_else(|| mismatch(&field))? as u8),
        VectorColumn::UInt16(values) => values.push(field.as_u64().ok_or_else(|| mismatch(&field))? as u16),
        VectorColumn::UInt32(values) => values.push(field.as_u64().ok_or_else(|| mismatch(&field))? as u32),
        VectorColumn::UInt64(values) => values.push(field.as_u64().ok_or_else(|| mismatch(&field))?),
        VectorColumn::Int8(values) => values.push(field.as_i64().ok_or_else(|| mismatch(&field))? as i8),
        VectorColumn::Int16(values) => values.push(field.as_i64().ok_or_else(|| mismatch(&field))? as i16),
        VectorColumn::Int32(values) => values.push(field.as_i64().ok_or_else(|| mismatch(&field))? as i32),
        VectorColumn::Int64(values) => values.push(field.as_i64().ok_or_else(|| mismatch(&field))?),
        VectorColumn::Float32(values) => match field {
            Field::Float64(value) => values.push(value as f32),
            other => return Err(mismatch(&other)),
        },
        VectorColumn::Float64(values) => match field {
            Field::Float64(value) => values.push(value),
            other => return Err(mismatch(&other)),
        },
    }
    Ok(())
}

fn push_string_field(s: &mut StringColumn, field: &Field) -> Result<()> {
    match field.as_str_bytes() {
        Some(bytes) => {
            s.push(bytes);
            Ok(())
        }
        None => Err(mismatch(field)),
    }
}

fn push_fixed_string_field(f: &mut FixedStringColumn, field: &Field) -> Result<()> {
    match field.as_str_bytes() {
        Some(bytes) => f.push(bytes),
        None => Err(mismatch(field)),
    }
}

fn push_nullable_field(n: &mut NullableColumn, field: Field) -> Result<()> {
    if matches!(field, Field::Null) {
        n.push_null();
        return Ok(());
    }
    let mut scratch = n.nested().empty_like();
    push_field(&mut scratch, field)?;
    n.push_value(&scratch, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::NumberKind;

    #[test]
    fn pushes_a_plain_numeric_value() {
        let mut column = Column::Vector(VectorColumn::empty(NumberKind::UInt32));
        push_field(&mut column, Field::UInt64(7)).unwrap();
        assert_eq!(column.get(0).unwrap(), Field::UInt64(7));
    }

    #[test]
    fn pushes_null_and_value_into_a_nullable_column() {
        let mut column = Column::Nullable(NullableColumn::new(Column::Vector(VectorColumn::empty(NumberKind::UInt64))));
        push_field(&mut column, Field::Null).unwrap();
        push_field(&mut column, Field::UInt64(5)).unwrap();
        assert_eq!(column.get(0).unwrap(), Field::Null);
        assert_eq!(column.get(1).unwrap(), Field::UInt64(5));
    }

    #[test]
    fn rejects_a_shape_mismatch() {
        let mut column = Column::Vector(VectorColumn::empty(NumberKind::UInt32));
        assert!(push_field(&mut column, Field::String(std::sync::Arc::from(&b"x"[..]))).is_err());
    }
}
