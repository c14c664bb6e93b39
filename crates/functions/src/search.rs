//! Search functions: `position`, `positionUTF8`, and their case-insensitive
//! variants (§4.2). All accept `(haystack: String, needle: constant String)`;
//! a non-constant needle is `ILLEGAL_COLUMN`.

use smallvec::SmallVec;

use crucible_block::{Column, NumberKind, Type, VectorColumn};
use crucible_errors::{Code, Error, Result};

/// Case-folded buffers are almost always short needles/haystack rows, so a
/// stack-resident `SmallVec` avoids a heap allocation per row in the common
/// case.
type FoldedBytes = SmallVec<[u8; 32]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Position,
    PositionUtf8,
    PositionCaseInsensitive,
    PositionCaseInsensitiveUtf8,
}

impl SearchMode {
    fn is_utf8(self) -> bool {
        matches!(
            self,
            SearchMode::PositionUtf8 | SearchMode::PositionCaseInsensitiveUtf8
        )
    }

    fn is_case_insensitive(self) -> bool {
        matches!(
            self,
            SearchMode::PositionCaseInsensitive | SearchMode::PositionCaseInsensitiveUtf8
        )
    }
}

pub fn return_type(arg_types: &[Type]) -> Result<Type> {
    if arg_types.len() != 2 {
        return Err(Error::user(
            Code::NumberOfArgumentsDoesntMatch,
            format!("position expects 2 arguments, got {}", arg_types.len()),
        ));
    }
    for ty in arg_types {
        if !matches!(ty, Type::String | Type::FixedString(_)) {
            return Err(Error::user(
                Code::IllegalTypeOfArgument,
                format!("position expects String arguments, got {}", ty.name()),
            ));
        }
    }
    Ok(Type::Number(NumberKind::UInt64))
}

pub fn execute(mode: SearchMode, haystack: &Column, needle: &Column) -> Result<VectorColumn> {
    if !needle.is_const() {
        return Err(Error::user(
            Code::IllegalColumn,
            "the needle argument to position must be a constant",
        ));
    }
    let needle_field = needle.get(0)?;
    let needle_bytes = needle_field
        .as_str_bytes()
        .ok_or_else(|| Error::logic(Code::BadTypeOfField, "needle is not a string"))?;
    let folded_needle: FoldedBytes = if mode.is_case_insensitive() {
        fold_case(needle_bytes)?
    } else {
        SmallVec::from_slice(needle_bytes)
    };

    let rows = haystack.size();
    let mut result = Vec::with_capacity(rows);
    for row in 0..rows {
        let field = haystack.get(row)?;
        let hay = field
            .as_str_bytes()
            .ok_or_else(|| Error::logic(Code::BadTypeOfField, "haystack is not a string"))?;
        result.push(find_position(hay, &folded_needle, mode)?);
    }
    Ok(VectorColumn::UInt64(result))
}

fn find_position(haystack: &[u8], needle: &[u8], mode: SearchMode) -> Result<u64> {
    if needle.is_empty() {
        return Ok(u64::from(!haystack.is_empty()));
    }
    let byte_pos = if mode.is_case_insensitive() {
        let folded_hay = fold_case(haystack)?;
        find_substring(&folded_hay, needle)
    } else {
        find_substring(haystack, needle)
    };
    let Some(byte_pos) = byte_pos else {
        return Ok(0);
    };
    if mode.is_utf8() {
        Ok(codepoint_position(haystack, byte_pos))
    } else {
        Ok(byte_pos as u64 + 1)
    }
}

/// Plain substring scan. The case-insensitive variants conceptually
/// accelerate this with a 16-wide SIMD prefix compare against both case
/// variants of the needle's first byte before falling back to a full
/// compare on a match candidate; not reproduced byte-for-byte here since the
/// match *position* is the only user-observable output.
fn find_substring(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// 1-based codepoint position of the UTF-8 character starting at
/// `byte_pos`, counted by incrementing for every byte whose top two bits
/// are not `10` (every non-continuation byte), per the documented rule.
fn codepoint_position(haystack: &[u8], byte_pos: usize) -> u64 {
    let mut codepoints = 0u64;
    for &byte in &haystack[..=byte_pos] {
        if byte & 0b1100_0000 != 0b1000_0000 {
            codepoints += 1;
        }
    }
    codepoints
}

/// Lowercases `bytes` as UTF-8 and rejects the fold if it changed the byte
/// length, since the case-insensitive scan assumes a 1:1 byte mapping
/// between the original and folded haystack.
fn fold_case(bytes: &[u8]) -> Result<FoldedBytes> {
    let s = std::str::from_utf8(bytes).map_err(|_| {
        Error::user(
            Code::UnsupportedParameter,
            "case-insensitive search requires valid UTF-8",
        )
    })?;
    let mut folded = FoldedBytes::new();
    for c in s.chars() {
        for lower in c.to_lowercase() {
            let mut buf = [0u8; 4];
            folded.extend_from_slice(lower.encode_utf8(&mut buf).as_bytes());
        }
    }
    if folded.len() != s.len() {
        return Err(Error::user(
            Code::UnsupportedParameter,
            "case folding changed the byte length of the string",
        ));
    }
    Ok(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::{Column, ConstColumn, Field, StringColumn};

    fn string_column(values: &[&str]) -> Column {
        let mut col = StringColumn::default();
        for v in values {
            col.push(v.as_bytes());
        }
        Column::String(col)
    }

    fn const_needle(value: &str) -> Column {
        Column::Const(ConstColumn::new(Field::String(value.as_bytes().into()), 1))
    }

    #[test]
    fn position_is_1_based_byte_offset() {
        let haystack = string_column(&["hello world"]);
        let needle = const_needle("world");
        let result = execute(SearchMode::Position, &haystack, &needle).unwrap();
        assert_eq!(result, VectorColumn::UInt64(vec![7]));
    }

    #[test]
    fn position_returns_zero_when_not_found() {
        let haystack = string_column(&["hello"]);
        let needle = const_needle("xyz");
        let result = execute(SearchMode::Position, &haystack, &needle).unwrap();
        assert_eq!(result, VectorColumn::UInt64(vec![0]));
    }

    #[test]
    fn position_utf8_counts_codepoints_not_bytes() {
        // "héllo" - 'é' is a 2-byte codepoint, so "llo" starts at codepoint 3.
        let haystack = string_column(&["h\u{e9}llo"]);
        let needle = const_needle("llo");
        let result = execute(SearchMode::PositionUtf8, &haystack, &needle).unwrap();
        assert_eq!(result, VectorColumn::UInt64(vec![3]));
    }

    #[test]
    fn case_insensitive_position_matches_regardless_of_case() {
        let haystack = string_column(&["Hello World"]);
        let needle = const_needle("world");
        let result = execute(SearchMode::PositionCaseInsensitive, &haystack, &needle).unwrap();
        assert_eq!(result, VectorColumn::UInt64(vec![7]));
    }

    #[test]
    fn non_constant_needle_is_rejected() {
        let haystack = string_column(&["hello"]);
        let needle = string_column(&["hello"]);
        let err = execute(SearchMode::Position, &haystack, &needle).unwrap_err();
        assert_eq!(err.code(), Code::IllegalColumn.as_i32());
    }
}
