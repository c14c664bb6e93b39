//! `Field`: a tagged single-value union used only at type boundaries —
//! constants, `Column::get(row)`, aggregation GENERIC keys, Keeper payload
//! parsing. Never the representation for bulk column data (§3).

use std::sync::Arc;

use crate::ty::Decimal;

/// A single tagged value. Non-POD variants (`String`, `Array`, `Tuple`,
/// `Decimal`) own their payload; `Array`/`Tuple` are reference-counted so
/// cloning a `Field` (common when materializing constant columns) doesn't
/// recursively deep-copy nested values.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    UInt64(u64),
    Int64(i64),
    UInt128(u128),
    Int128(i128),
    Float64(f64),
    String(Arc<[u8]>),
    Array(Arc<[Field]>),
    Tuple(Arc<[Field]>),
    Decimal32(Decimal<i32>),
    Decimal64(Decimal<i64>),
    Decimal128(Decimal<i128>),
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Whether this variant is a "POD" scalar (no heap payload). Mirrors
    /// the source's `tag < MIN_NON_POD` fast path: non-POD variants
    /// (`[MIN_NON_POD, ..]`) are the ones needing destructor dispatch in
    /// the reference implementation; in Rust this is informational only
    /// (`Drop` handles it uniformly) but call sites use it to decide
    /// whether to route allocation through a [`FieldArena`].
    pub fn is_pod(&self) -> bool {
        !matches!(
            self,
            Field::String(_) | Field::Array(_) | Field::Tuple(_) | Field::Decimal128(_)
        )
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Field::UInt64(v) => Some(v),
            Field::Int64(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Field::Int64(v) => Some(v),
            Field::UInt64(v) if v <= i64::MAX as u64 => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_str_bytes(&self) -> Option<&[u8]> {
        match self {
            Field::String(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Groups Field allocations behind one bump allocator instead of one heap
/// allocation per Field, for the cases that mint many Fields in bulk: GENERIC
/// aggregation keys and Keeper payload parsing (§9 Design Notes).
///
/// The arena only owns byte buffers; `Field::String` values built from it
/// still use `Arc<[u8]>` for the field itself (so a `Field` can be handed
/// out and stored independently of the arena's lifetime), but the backing
/// bytes for many fields created in one pass share allocator pages rather
/// than each doing its own `malloc`.
pub struct FieldArena {
    bump: bumpalo::Bump,
}

impl FieldArena {
    pub fn new() -> Self {
        Self {
            bump: bumpalo::Bump::new(),
        }
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bump: bumpalo::Bump::with_capacity(bytes),
        }
    }

    /// Allocate `data` in the arena and wrap it as a `Field::String`.
    pub fn string(&self, data: &[u8]) -> Field {
        let slot = self.bump.alloc_slice_copy(data);
        Field::String(Arc::from(&*slot))
    }

    pub fn reset(&mut self) {
        self.bump.reset();
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

impl Default for FieldArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_string_field_matches_input() {
        let arena = FieldArena::new();
        let field = arena.string(b"hello");
        assert_eq!(field.as_str_bytes(), Some(&b"hello"[..]));
    }

    #[test]
    fn pod_classification() {
        assert!(Field::UInt64(1).is_pod());
        assert!(Field::Null.is_pod());
        assert!(!Field::String(Arc::from(&b""[..])).is_pod());
        assert!(!Field::Array(Arc::from(Vec::new())).is_pod());
    }

    #[test]
    fn numeric_conversion_cross_signedness() {
        assert_eq!(Field::Int64(-1).as_u64(), None);
        assert_eq!(Field::UInt64(5).as_i64(), Some(5));
    }
}
