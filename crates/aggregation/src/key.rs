//! Group-by key extraction and variant selection (§4.3.1).

use std::hash::{Hash, Hasher};

use crucible_block::{Field, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    WithoutKey,
    Key64,
    KeyString,
    Hashed,
    Generic,
}

/// Picks the variant for a query's group-by key types, per the table in
/// §4.3.1. Selection happens once, on the first Block, and is sticky for
/// the rest of the query.
pub fn select_variant(key_types: &[Type]) -> VariantKind {
    match key_types {
        [] => VariantKind::WithoutKey,
        [single] if is_non_float_number(single) => VariantKind::Key64,
        [single] if matches!(single, Type::String | Type::FixedString(_)) => VariantKind::KeyString,
        many if many.len() > 1 && many.iter().all(is_non_float_number) && packed_width(many) <= 16 => {
            VariantKind::Hashed
        }
        _ => VariantKind::Generic,
    }
}

fn is_non_float_number(ty: &Type) -> bool {
    match ty {
        Type::Number(kind) => !kind.is_float(),
        Type::Date | Type::DateTime => true,
        _ => false,
    }
}

fn width_of(ty: &Type) -> usize {
    match ty {
        Type::Number(kind) => kind.byte_width(),
        Type::Date => 2,
        Type::DateTime => 4,
        _ => usize::MAX,
    }
}

fn packed_width(key_types: &[Type]) -> usize {
    key_types.iter().map(width_of).fold(0usize, |acc, w| acc.saturating_add(w))
}

/// Bit-packs up to 16 bytes' worth of non-float numeric key fields into a
/// `u128`, MSB-first by key position, for the HASHED variant.
pub fn pack_u128(fields: &[Field]) -> Option<u128> {
    let mut packed: u128 = 0;
    for field in fields {
        let (bits, width) = match *field {
            Field::UInt64(v) => (v as u128, 8),
            Field::Int64(v) => (v as u64 as u128, 8),
            _ => return None,
        };
        packed = packed.checked_shl((width * 8) as u32)?.wrapping_add(bits);
    }
    Some(packed)
}

pub fn as_u64_key(field: &Field) -> Option<u64> {
    match *field {
        Field::UInt64(v) => Some(v),
        Field::Int64(v) => Some(v as u64),
        _ => None,
    }
}

pub fn as_string_key(field: &Field) -> Option<&[u8]> {
    field.as_str_bytes()
}

/// Wraps `Vec<Field>` with a `Hash`/`Eq` impl suitable for the GENERIC
/// variant's hash map. Float fields compare with `f64`'s own `PartialEq`
/// (so `NaN` keys are unequal to everything including themselves) but hash
/// by bit pattern, since `Hash` has no such escape hatch; the mismatch only
/// matters for the pathological case of grouping by a `NaN`-valued column,
/// where it degrades to "every `NaN` row gets its own group" rather than
/// panicking or merging rows that shouldn't merge.
#[derive(Debug, Clone)]
pub struct GenericKey(pub Vec<Field>);

impl PartialEq for GenericKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| fields_key_equal(a, b))
    }
}

impl Eq for GenericKey {}

impl Hash for GenericKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for field in &self.0 {
            hash_field(field, state);
        }
    }
}

fn fields_key_equal(a: &Field, b: &Field) -> bool {
    match (a, b) {
        // Delegates to `f64`'s own `PartialEq`, so `NaN` keys are unequal
        // to everything including themselves.
        (Field::Float64(x), Field::Float64(y)) => x == y,
        _ => a == b,
    }
}

fn hash_field<H: Hasher>(field: &Field, state: &mut H) {
    std::mem::discriminant(field).hash(state);
    match field {
        Field::Null => {}
        Field::UInt64(v) => v.hash(state),
        Field::Int64(v) => v.hash(state),
        Field::UInt128(v) => v.hash(state),
        Field::Int128(v) => v.hash(state),
        Field::Float64(v) => v.to_bits().hash(state),
        Field::String(bytes) => bytes.hash(state),
        Field::Array(items) | Field::Tuple(items) => {
            for item in items.iter() {
                hash_field(item, state);
            }
        }
        Field::Decimal32(d) => (d.value, d.scale).hash(state),
        Field::Decimal64(d) => (d.value, d.scale).hash(state),
        Field::Decimal128(d) => (d.value, d.scale).hash(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::NumberKind;

    #[test]
    fn no_keys_selects_without_key() {
        assert_eq!(select_variant(&[]), VariantKind::WithoutKey);
    }

    #[test]
    fn single_integer_key_selects_key_64() {
        assert_eq!(
            select_variant(&[Type::Number(NumberKind::Int32)]),
            VariantKind::Key64
        );
    }

    #[test]
    fn single_string_key_selects_key_string() {
        assert_eq!(select_variant(&[Type::String]), VariantKind::KeyString);
    }

    #[test]
    fn two_small_integer_keys_select_hashed() {
        assert_eq!(
            select_variant(&[
                Type::Number(NumberKind::UInt32),
                Type::Number(NumberKind::UInt32)
            ]),
            VariantKind::Hashed
        );
    }

    #[test]
    fn float_key_selects_generic() {
        assert_eq!(
            select_variant(&[Type::Number(NumberKind::Float64)]),
            VariantKind::Generic
        );
    }

    #[test]
    fn generic_key_equality_treats_nan_as_unequal_to_itself() {
        let nan_key = GenericKey(vec![Field::Float64(f64::NAN)]);
        assert_ne!(nan_key, nan_key.clone());
    }

    #[test]
    fn generic_key_hash_is_stable_across_clones() {
        use std::collections::hash_map::DefaultHasher;
        let key = GenericKey(vec![Field::Int64(7), Field::String(b"x"[..].into())]);
        let mut h1 = DefaultHasher::new();
        key.hash(&mut h1);
        let mut h2 = DefaultHasher::new();
        key.clone().hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }
}
