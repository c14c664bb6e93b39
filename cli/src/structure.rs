//! Parses a `--structure` string ("name Type, name Type, ...") into a
//! schema — the inverse of `Type::name()` (§3). Only the types a CLI table
//! definition plausibly needs are accepted; `Tuple`/`Enum8`/`Enum16`/
//! `AggregateFunction` are wire/storage-internal shapes with no textual
//! spelling here.

use std::sync::Arc;

use crucible_block::{NumberKind, Type};
use crucible_errors::{Code, Error, Result};

pub fn parse_structure(text: &str) -> Result<Vec<(String, Type)>> {
    split_top_level(text, ',')
        .into_iter()
        .map(|entry| {
            let entry = entry.trim();
            let mut parts = entry.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or_default().trim();
            let ty_text = parts.next().unwrap_or_default().trim();
            if name.is_empty() || ty_text.is_empty() {
                return Err(Error::user(Code::SyntaxError, format!("cannot parse column definition '{entry}'")));
            }
            Ok((name.to_owned(), parse_type(ty_text)?))
        })
        .collect()
}

pub fn parse_type(text: &str) -> Result<Type> {
    let text = text.trim();
    let (name, args) = match text.find('(') {
        Some(open) => {
            let close = text
                .rfind(')')
                .ok_or_else(|| Error::user(Code::SyntaxError, format!("unterminated type '{text}'")))?;
            (&text[..open], Some(&text[open + 1..close]))
        }
        None => (text, None),
    };

    match (name, args) {
        ("UInt8", None) => Ok(Type::Number(NumberKind::UInt8)),
        ("UInt16", None) => Ok(Type::Number(NumberKind::UInt16)),
        ("UInt32", None) => Ok(Type::Number(NumberKind::UInt32)),
        ("UInt64", None) => Ok(Type::Number(NumberKind::UInt64)),
        ("Int8", None) => Ok(Type::Number(NumberKind::Int8)),
        ("Int16", None) => Ok(Type::Number(NumberKind::Int16)),
        ("Int32", None) => Ok(Type::Number(NumberKind::Int32)),
        ("Int64", None) => Ok(Type::Number(NumberKind::Int64)),
        ("Float32", None) => Ok(Type::Number(NumberKind::Float32)),
        ("Float64", None) => Ok(Type::Number(NumberKind::Float64)),
        ("Date", None) => Ok(Type::Date),
        ("DateTime", None) => Ok(Type::DateTime),
        ("String", None) => Ok(Type::String),
        ("FixedString", Some(arg)) => {
            let width: usize = arg
                .trim()
                .parse()
                .map_err(|_| Error::user(Code::SyntaxError, format!("invalid FixedString width '{arg}'")))?;
            Ok(Type::FixedString(width))
        }
        ("Array", Some(arg)) => Ok(Type::Array(Arc::new(parse_type(arg)?))),
        ("Nullable", Some(arg)) => Ok(Type::Nullable(Arc::new(parse_type(arg)?))),
        _ => Err(Error::user(Code::SyntaxError, format!("unsupported type '{text}'"))),
    }
}

fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                current.push(ch);
            }
            c if c == separator && depth == 0 => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_columns() {
        let schema = parse_structure("id UInt32, name String").unwrap();
        assert_eq!(schema[0], ("id".to_owned(), Type::Number(NumberKind::UInt32)));
        assert_eq!(schema[1], ("name".to_owned(), Type::String));
    }

    #[test]
    fn parses_nested_nullable_array() {
        let ty = parse_type("Array(Nullable(Int64))").unwrap();
        assert_eq!(ty.name(), "Array(Nullable(Int64))");
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(parse_type("Decimal32(5)").is_err());
    }
}
