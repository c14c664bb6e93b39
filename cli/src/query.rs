//! The CLI's query surface (§9): a projection list plus an optional single
//! `WHERE` comparison. Deliberately not a SQL parser (Non-goal) — just
//! enough structure to slice a local Block.

use crucible_block::{Block, Column, ConstColumn, Type, VectorColumn};
use crucible_errors::{Code, Error, Result};
use crucible_functions::comparison::{self, CompareOp};

#[derive(Debug, Clone)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub op: CompareOp,
    pub literal: String,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub projection: Projection,
    pub filter: Option<Filter>,
}

/// Parses `"[SELECT] <cols-or-*> [WHERE <col> <op> <literal>]"`.
pub fn parse(text: &str) -> Result<Query> {
    let text = text.trim();
    let (select_part, filter_part) = match split_keyword(text, "WHERE") {
        Some((select, filter)) => (select, Some(filter)),
        None => (text, None),
    };

    let select_part = strip_keyword(select_part, "SELECT");
    let projection = if select_part.trim() == "*" {
        Projection::All
    } else {
        let columns: Vec<String> = select_part.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect();
        if columns.is_empty() {
            return Err(Error::user(Code::SyntaxError, "empty select list"));
        }
        Projection::Columns(columns)
    };

    let filter = filter_part.map(|clause| parse_filter(clause.trim())).transpose()?;
    Ok(Query { projection, filter })
}

fn split_keyword<'a>(text: &'a str, keyword: &str) -> Option<(&'a str, &'a str)> {
    let upper = text.to_uppercase();
    let needle = format!(" {keyword} ");
    upper.find(&needle).map(|index| (&text[..index], &text[index + needle.len()..]))
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> &'a str {
    let trimmed = text.trim();
    let upper = trimmed.to_uppercase();
    let prefix = format!("{keyword} ");
    if upper.starts_with(&prefix) {
        trimmed[prefix.len()..].trim()
    } else {
        trimmed
    }
}

fn parse_filter(clause: &str) -> Result<Filter> {
    const OPERATORS: [(&str, CompareOp); 6] = [
        ("!=", CompareOp::NotEq),
        ("<=", CompareOp::LessOrEq),
        (">=", CompareOp::GreaterOrEq),
        ("=", CompareOp::Eq),
        ("<", CompareOp::Less),
        (">", CompareOp::Greater),
    ];
    for (token, op) in OPERATORS {
        if let Some(index) = clause.find(token) {
            let column = clause[..index].trim().to_owned();
            let literal = clause[index + token.len()..].trim().trim_matches('\'').to_owned();
            if !column.is_empty() {
                return Ok(Filter { column, op, literal });
            }
        }
    }
    Err(Error::user(Code::SyntaxError, format!("cannot parse WHERE clause '{clause}'")))
}

/// Applies `query` to `block` (described by `schema`): filters first,
/// projects second.
pub fn apply(query: &Query, schema: &[(String, Type)], block: Block) -> Result<Block> {
    let block = match &query.filter {
        Some(filter) => apply_filter(filter, schema, block)?,
        None => block,
    };
    match &query.projection {
        Projection::All => Ok(block),
        Projection::Columns(names) => project(names, &block),
    }
}

fn apply_filter(filter: &Filter, schema: &[(String, Type)], block: Block) -> Result<Block> {
    let position = block
        .position_by_name(&filter.column)
        .ok_or_else(|| unknown_column(&filter.column, "WHERE clause"))?;
    let ty = &schema
        .iter()
        .find(|(name, _)| name == &filter.column)
        .ok_or_else(|| unknown_column(&filter.column, "WHERE clause"))?
        .1;

    let literal_field = ty.decode_text(&filter.literal)?;
    let left = block.column_at(position)?;
    let right = Column::Const(ConstColumn::new(literal_field, block.num_rows()));
    let mask = comparison::execute(filter.op, left, &right)?;
    let VectorColumn::UInt8(mask_bytes) = mask else {
        return Err(Error::logic(Code::LogicalError, "comparison::execute always returns a UInt8 mask"));
    };
    block.filter(&mask_bytes, -1)
}

fn project(names: &[String], block: &Block) -> Result<Block> {
    let mut out = Block::new();
    for name in names {
        let position = block.position_by_name(name).ok_or_else(|| unknown_column(name, "SELECT list"))?;
        let entry = &block.columns()[position];
        out.push(entry.name.clone(), entry.ty.clone(), block.column_at(position)?.clone());
    }
    Ok(out)
}

fn unknown_column(name: &str, context: &str) -> Error {
    Error::user(Code::UnsupportedParameter, format!("unknown column '{name}' in {context}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::{Field, NumberKind};

    #[test]
    fn parses_a_projection_and_a_filter() {
        let query = parse("SELECT id, name WHERE id >= 3").unwrap();
        assert!(matches!(query.projection, Projection::Columns(ref cols) if cols == &["id", "name"]));
        let filter = query.filter.unwrap();
        assert_eq!(filter.column, "id");
        assert_eq!(filter.op, CompareOp::GreaterOrEq);
        assert_eq!(filter.literal, "3");
    }

    #[test]
    fn star_selects_everything() {
        let query = parse("*").unwrap();
        assert!(matches!(query.projection, Projection::All));
    }

    #[test]
    fn applies_a_filter_and_projection_to_a_block() {
        let schema = vec![("id".to_owned(), Type::Number(NumberKind::UInt32)), ("name".to_owned(), Type::String)];
        let mut block = Block::new();
        block.push("id", Type::Number(NumberKind::UInt32), Column::Vector(VectorColumn::UInt32(vec![1, 2, 3])));
        let mut names = crucible_block::StringColumn::new();
        names.push(b"a");
        names.push(b"b");
        names.push(b"c");
        block.push("name", Type::String, Column::String(names));

        let query = parse("name WHERE id > 1").unwrap();
        let result = apply(&query, &schema, block).unwrap();
        assert_eq!(result.num_columns(), 1);
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.column_at(0).unwrap().get(0).unwrap(), Field::String(std::sync::Arc::from(&b"b"[..])));
    }
}
