//! Delimiter-based text I/O for the CLI's local-execution mode (§9). No
//! quoting or escaping beyond the `\N` NULL sentinel `Type::decode_text`/
//! `encode_text` already understand; array/tuple columns are
//! `crucible-wire-protocol`'s domain, not these formats'.

use crucible_block::{Block, Type};
use crucible_errors::{Code, Error, Result};

use crate::columns::push_field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Csv,
    Tsv,
}

impl TextFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "CSV" => Ok(TextFormat::Csv),
            "TSV" | "TABSEPARATED" => Ok(TextFormat::Tsv),
            other => Err(Error::user(Code::UnsupportedParameter, format!("unknown format '{other}'"))),
        }
    }

    fn delimiter(self) -> char {
        match self {
            TextFormat::Csv => ',',
            TextFormat::Tsv => '\t',
        }
    }
}

/// Reads `text` as `format`-delimited rows against `schema`, in schema
/// column order, into one Block.
pub fn read_rows(text: &str, schema: &[(String, Type)], format: TextFormat) -> Result<Block> {
    let delimiter = format.delimiter();
    let mut columns: Vec<_> = schema.iter().map(|(_, ty)| ty.new_empty_column()).collect();

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != schema.len() {
            return Err(Error::user(
                Code::SyntaxError,
                format!("row has {} fields, structure declares {}", fields.len(), schema.len()),
            ));
        }
        for (((_, ty), column), text) in schema.iter().zip(columns.iter_mut()).zip(fields) {
            let field = ty.decode_text(text)?;
            push_field(column, field)?;
        }
    }

    let mut block = Block::new();
    for ((name, ty), column) in schema.iter().zip(columns) {
        block.push(name.clone(), ty.clone(), column);
    }
    Ok(block)
}

/// Writes `block` back out as `format`-delimited rows.
pub fn write_rows(block: &Block, format: TextFormat) -> Result<String> {
    let delimiter = format.delimiter();
    let mut out = String::new();
    for row in 0..block.num_rows() {
        if row > 0 {
            out.push('\n');
        }
        for (position, entry) in block.columns().iter().enumerate() {
            if position > 0 {
                out.push(delimiter);
            }
            let column = block.column_at(position)?;
            out.push_str(&entry.ty.encode_text(&column.get(row)?));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::NumberKind;

    #[test]
    fn round_trips_a_small_tsv_table() {
        let schema = vec![("id".to_owned(), Type::Number(NumberKind::UInt32)), ("name".to_owned(), Type::String)];
        let block = read_rows("1\talice\n2\tbob\n", &schema, TextFormat::Tsv).unwrap();
        assert_eq!(block.num_rows(), 2);
        let text = write_rows(&block, TextFormat::Tsv).unwrap();
        assert_eq!(text, "1\talice\n2\tbob");
    }

    #[test]
    fn rejects_a_row_with_the_wrong_field_count() {
        let schema = vec![("id".to_owned(), Type::Number(NumberKind::UInt32))];
        assert!(read_rows("1,2\n", &schema, TextFormat::Csv).is_err());
    }

    #[test]
    fn nulls_round_trip_through_the_sentinel() {
        let schema = vec![("maybe".to_owned(), Type::Nullable(std::sync::Arc::new(Type::Number(NumberKind::UInt64))))];
        let block = read_rows("\\N\n7\n", &schema, TextFormat::Tsv).unwrap();
        assert_eq!(write_rows(&block, TextFormat::Tsv).unwrap(), "\\N\n7");
    }
}
