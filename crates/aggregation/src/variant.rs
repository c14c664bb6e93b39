//! Variant-selected hash tables, per-Block processing, conversion, and
//! merge (§4.3.1, §4.3.3, §4.3.4).

use std::hash::Hash;
use std::sync::Arc;

use hashbrown::HashMap;

use crucible_block::{Block, Column, Field, StringColumn, Type, VectorColumn};
use crucible_errors::{Code, Error, Result};

use crate::function::{AggregateFunction, AggregateState};
use crate::key::{as_string_key, as_u64_key, pack_u128, select_variant, GenericKey, VariantKind};

/// What happens when a query's hash table exceeds `max_rows_to_group_by`
/// (§4.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowMode {
    /// Fail the query with `TOO_MUCH_ROWS`.
    Throw,
    /// Stop reading further Blocks; the result so far stands.
    Break,
    /// Stop inserting new keys; existing keys keep accumulating.
    Any,
}

/// Whether the engine should keep pulling Blocks after processing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Stop,
}

type States = Vec<AggregateState>;

enum ProbeResult<'a> {
    Found(&'a mut States),
    /// The table is at capacity under `BREAK`: stop reading further Blocks.
    Stopped,
    /// The table is at capacity under `ANY` and this is a new key: drop
    /// the row, existing keys are unaffected.
    Dropped,
}

/// The hash table selected for one query, per the table in §4.3.1. Variant
/// selection is sticky: once a query has picked one on its first Block, it
/// must not switch (`process_block` enforces this).
pub enum AggregatedDataVariants {
    WithoutKey(Option<States>),
    Key64(HashMap<u64, States>),
    /// Key bytes are heap-owned per entry rather than arena-backed: a
    /// boxed slice still needs its own allocation at the point it's handed
    /// to the map, so bump-allocating a throwaway copy first (as the
    /// reference implementation does, where the arena pointer *is* the
    /// storage) would only add a redundant copy in Rust's ownership model.
    KeyString(HashMap<Box<[u8]>, States>),
    Hashed(HashMap<u128, (Vec<Field>, States)>),
    Generic(HashMap<GenericKey, States>),
}

impl AggregatedDataVariants {
    pub fn new(kind: VariantKind) -> Self {
        match kind {
            VariantKind::WithoutKey => AggregatedDataVariants::WithoutKey(None),
            VariantKind::Key64 => AggregatedDataVariants::Key64(HashMap::new()),
            VariantKind::KeyString => AggregatedDataVariants::KeyString(HashMap::new()),
            VariantKind::Hashed => AggregatedDataVariants::Hashed(HashMap::new()),
            VariantKind::Generic => AggregatedDataVariants::Generic(HashMap::new()),
        }
    }

    pub fn kind(&self) -> VariantKind {
        match self {
            AggregatedDataVariants::WithoutKey(_) => VariantKind::WithoutKey,
            AggregatedDataVariants::Key64(_) => VariantKind::Key64,
            AggregatedDataVariants::KeyString(_) => VariantKind::KeyString,
            AggregatedDataVariants::Hashed(_) => VariantKind::Hashed,
            AggregatedDataVariants::Generic(_) => VariantKind::Generic,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            AggregatedDataVariants::WithoutKey(state) => usize::from(state.is_some()),
            AggregatedDataVariants::Key64(map) => map.len(),
            AggregatedDataVariants::KeyString(map) => map.len(),
            AggregatedDataVariants::Hashed(map) => map.len(),
            AggregatedDataVariants::Generic(map) => map.len(),
        }
    }

    /// Processes one Block: materializes key columns, hash-probes
    /// (insert-or-find), constructs default states for newly-inserted
    /// keys, then evaluates `add` for every aggregate function on every row
    /// (§4.3.3).
    pub fn process_block(
        &mut self,
        block: &Block,
        key_positions: &[usize],
        functions: &[Box<dyn AggregateFunction>],
        arg_positions: &[Vec<usize>],
        max_rows_to_group_by: Option<usize>,
        overflow_mode: OverflowMode,
    ) -> Result<ControlFlow> {
        let expected = select_variant_for_positions(key_positions, block)?;
        if expected != self.kind() {
            return Err(Error::logic(
                Code::LogicalError,
                "aggregation variant changed mid-query",
            ));
        }

        let rows = block.num_rows();
        for row in 0..rows {
            let key_fields: Vec<Field> = key_positions
                .iter()
                .map(|&pos| block.column_at(pos).and_then(|c| c.get(row)))
                .collect::<Result<_>>()?;

            match self.probe(&key_fields, functions, max_rows_to_group_by, overflow_mode)? {
                ProbeResult::Stopped => return Ok(ControlFlow::Stop),
                ProbeResult::Dropped => continue,
                ProbeResult::Found(states) => {
                    for (index, function) in functions.iter().enumerate() {
                        let args: Vec<Field> = arg_positions[index]
                            .iter()
                            .map(|&pos| block.column_at(pos).and_then(|c| c.get(row)))
                            .collect::<Result<_>>()?;
                        function.add(&mut states[index], &args)?;
                    }
                }
            }
        }
        Ok(ControlFlow::Continue)
    }

    /// Inserts or finds the state row for `key_fields`, applying the
    /// overflow policy when the key is new and the table is already at
    /// `max_rows_to_group_by`.
    fn probe<'a>(
        &'a mut self,
        key_fields: &[Field],
        functions: &[Box<dyn AggregateFunction>],
        max_rows_to_group_by: Option<usize>,
        overflow_mode: OverflowMode,
    ) -> Result<ProbeResult<'a>> {
        let at_capacity = |size: usize| matches!(max_rows_to_group_by, Some(max) if size >= max);

        match self {
            AggregatedDataVariants::WithoutKey(state) => {
                if state.is_none() {
                    *state = Some(default_states(functions));
                }
                Ok(ProbeResult::Found(state.as_mut().unwrap()))
            }
            AggregatedDataVariants::Key64(map) => {
                let key = as_u64_key(&key_fields[0])
                    .ok_or_else(|| Error::logic(Code::BadTypeOfField, "KEY_64 key is not an integer"))?;
                probe_map(map, key, functions, at_capacity, overflow_mode)
            }
            AggregatedDataVariants::KeyString(map) => {
                let key = as_string_key(&key_fields[0])
                    .ok_or_else(|| Error::logic(Code::BadTypeOfField, "KEY_STRING key is not a string"))?
                    .to_vec()
                    .into_boxed_slice();
                probe_map(map, key, functions, at_capacity, overflow_mode)
            }
            AggregatedDataVariants::Hashed(map) => {
                let key = pack_u128(key_fields)
                    .ok_or_else(|| Error::logic(Code::BadTypeOfField, "HASHED key does not fit in 128 bits"))?;
                if !map.contains_key(&key) {
                    if at_capacity(map.len()) {
                        return match overflow_mode {
                            OverflowMode::Throw => Err(Error::user(Code::TooMuchRows, "max_rows_to_group_by exceeded")),
                            OverflowMode::Break => Ok(ProbeResult::Stopped),
                            OverflowMode::Any => Ok(ProbeResult::Dropped),
                        };
                    }
                    map.insert(key, (key_fields.to_vec(), default_states(functions)));
                }
                Ok(ProbeResult::Found(&mut map.get_mut(&key).unwrap().1))
            }
            AggregatedDataVariants::Generic(map) => {
                let key = GenericKey(key_fields.to_vec());
                probe_map(map, key, functions, at_capacity, overflow_mode)
            }
        }
    }

    /// Materializes the variant into a Block: the first N columns are keys
    /// (insertion-hash order; order is not promised), the next M columns
    /// are serialized-state columns, one per aggregate function (§4.3.4).
    pub fn convert_to_block(
        &self,
        key_names: &[String],
        key_types: &[Type],
        functions: &[(String, Box<dyn AggregateFunction>)],
    ) -> Result<Block> {
        let mut key_rows: Vec<Vec<Field>> = Vec::new();
        let mut state_rows: Vec<&States> = Vec::new();

        match self {
            AggregatedDataVariants::WithoutKey(state) => {
                if let Some(states) = state {
                    key_rows.push(Vec::new());
                    state_rows.push(states);
                }
            }
            AggregatedDataVariants::Key64(map) => {
                for (key, states) in map {
                    key_rows.push(vec![Field::UInt64(*key)]);
                    state_rows.push(states);
                }
            }
            AggregatedDataVariants::KeyString(map) => {
                for (key, states) in map {
                    key_rows.push(vec![Field::String(Arc::from(&key[..]))]);
                    state_rows.push(states);
                }
            }
            AggregatedDataVariants::Hashed(map) => {
                for (fields, states) in map.values() {
                    key_rows.push(fields.clone());
                    state_rows.push(states);
                }
            }
            AggregatedDataVariants::Generic(map) => {
                for (key, states) in map {
                    key_rows.push(key.0.clone());
                    state_rows.push(states);
                }
            }
        }

        let mut block = Block::new();
        for (position, (name, ty)) in key_names.iter().zip(key_types).enumerate() {
            let mut column = ty.new_empty_column();
            for row in &key_rows {
                push_key_value(&mut column, &row[position])?;
            }
            block.push(name.clone(), ty.clone(), column);
        }
        for (index, (name, function)) in functions.iter().enumerate() {
            let ty = Type::AggregateState {
                function: function.name().into(),
                arg_types: Arc::from([]),
            };
            let mut col = StringColumn::default();
            for states in &state_rows {
                let mut buf = bytes::BytesMut::new();
                function.serialize(&states[index], &mut buf);
                col.push(&buf);
            }
            block.push(name.clone(), ty, Column::String(col));
        }
        Ok(block)
    }

    /// Combines `other` into `self`: for each of `other`'s entries, probe
    /// into `self`, merging on hit and splicing the state on miss (§4.3.4).
    /// Mixing variants of different kinds is
    /// `CANNOT_MERGE_DIFFERENT_AGGREGATED_DATA_VARIANTS`.
    pub fn merge(&mut self, other: AggregatedDataVariants, functions: &[Box<dyn AggregateFunction>]) -> Result<()> {
        if self.kind() != other.kind() {
            return Err(Error::logic(
                Code::CannotMergeDifferentAggregatedDataVariants,
                "cannot merge aggregation variants of different kinds",
            ));
        }
        match (self, other) {
            (AggregatedDataVariants::WithoutKey(a), AggregatedDataVariants::WithoutKey(b)) => {
                if let Some(b_states) = b {
                    match a {
                        Some(a_states) => merge_states(a_states, &b_states, functions)?,
                        None => *a = Some(b_states),
                    }
                }
                Ok(())
            }
            (AggregatedDataVariants::Key64(a), AggregatedDataVariants::Key64(b)) => merge_maps(a, b, functions),
            (AggregatedDataVariants::KeyString(a), AggregatedDataVariants::KeyString(b)) => merge_maps(a, b, functions),
            (AggregatedDataVariants::Generic(a), AggregatedDataVariants::Generic(b)) => merge_maps(a, b, functions),
            (AggregatedDataVariants::Hashed(a), AggregatedDataVariants::Hashed(b)) => {
                for (key, (fields, states)) in b {
                    match a.get_mut(&key) {
                        Some((_, existing)) => merge_states(existing, &states, functions)?,
                        None => {
                            a.insert(key, (fields, states));
                        }
                    }
                }
                Ok(())
            }
            _ => unreachable!("kind() equality already checked above"),
        }
    }
}

/// Writes a single `Field` key value into a freshly-typed key column.
/// `Field` only ever carries `UInt64`/`Int64`/`Float64` for numbers (the
/// original column width is erased at the `Column::get` boundary, §9), so
/// this narrows back down to the destination column's concrete element
/// width.
fn push_key_value(column: &mut Column, field: &Field) -> Result<()> {
    match column {
        Column::Vector(vector) => push_vector_value(vector, field),
        Column::String(s) => {
            let bytes = field
                .as_str_bytes()
                .ok_or_else(|| Error::logic(Code::BadTypeOfField, "expected a string key field"))?;
            s.push(bytes);
            Ok(())
        }
        Column::FixedString(fs) => {
            let bytes = field
                .as_str_bytes()
                .ok_or_else(|| Error::logic(Code::BadTypeOfField, "expected a string key field"))?;
            fs.push(bytes)
        }
        _ => Err(Error::logic(
            Code::LogicalError,
            "unsupported group-by key column representation",
        )),
    }
}

fn push_vector_value(vector: &mut VectorColumn, field: &Field) -> Result<()> {
    if let (VectorColumn::Float32(values), Field::Float64(v)) = (&mut *vector, field) {
        values.push(*v as f32);
        return Ok(());
    }
    if let (VectorColumn::Float64(values), Field::Float64(v)) = (&mut *vector, field) {
        values.push(*v);
        return Ok(());
    }
    let wide: i128 = match *field {
        Field::UInt64(v) => v as i128,
        Field::Int64(v) => v as i128,
        _ => {
            return Err(Error::logic(
                Code::BadTypeOfField,
                "expected a numeric key field",
            ))
        }
    };
    match vector {
        VectorColumn::UInt8(values) => values.push(wide as u8),
        VectorColumn::UInt16(values) => values.push(wide as u16),
        VectorColumn::UInt32(values) => values.push(wide as u32),
        VectorColumn::UInt64(values) => values.push(wide as u64),
        VectorColumn::Int8(values) => values.push(wide as i8),
        VectorColumn::Int16(values) => values.push(wide as i16),
        VectorColumn::Int32(values) => values.push(wide as i32),
        VectorColumn::Int64(values) => values.push(wide as i64),
        VectorColumn::Float32(_) | VectorColumn::Float64(_) => {
            return Err(Error::logic(
                Code::BadTypeOfField,
                "expected a float key field",
            ))
        }
    }
    Ok(())
}

fn merge_maps<K: Hash + Eq>(
    a: &mut HashMap<K, States>,
    b: HashMap<K, States>,
    functions: &[Box<dyn AggregateFunction>],
) -> Result<()> {
    for (key, states) in b {
        match a.get_mut(&key) {
            Some(existing) => merge_states(existing, &states, functions)?,
            None => {
                a.insert(key, states);
            }
        }
    }
    Ok(())
}

fn merge_states(a: &mut States, b: &States, functions: &[Box<dyn AggregateFunction>]) -> Result<()> {
    for ((state, other), function) in a.iter_mut().zip(b.iter()).zip(functions) {
        function.merge(state, other)?;
    }
    Ok(())
}

fn default_states(functions: &[Box<dyn AggregateFunction>]) -> States {
    functions.iter().map(|f| f.create_empty_state()).collect()
}

fn probe_map<'a, K: Hash + Eq + Clone>(
    map: &'a mut HashMap<K, States>,
    key: K,
    functions: &[Box<dyn AggregateFunction>],
    at_capacity: impl Fn(usize) -> bool,
    overflow_mode: OverflowMode,
) -> Result<ProbeResult<'a>> {
    if !map.contains_key(&key) {
        if at_capacity(map.len()) {
            return match overflow_mode {
                OverflowMode::Throw => Err(Error::user(Code::TooMuchRows, "max_rows_to_group_by exceeded")),
                OverflowMode::Break => Ok(ProbeResult::Stopped),
                OverflowMode::Any => Ok(ProbeResult::Dropped),
            };
        }
        map.insert(key.clone(), default_states(functions));
    }
    Ok(ProbeResult::Found(map.get_mut(&key).unwrap()))
}

fn select_variant_for_positions(key_positions: &[usize], block: &Block) -> Result<VariantKind> {
    let key_types: Vec<Type> = key_positions
        .iter()
        .map(|&pos| block.columns().get(pos).map(|c| c.ty.clone()))
        .collect::<Option<_>>()
        .ok_or_else(|| Error::logic(Code::PositionOutOfBound, "key position out of range"))?;
    Ok(select_variant(&key_types))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Count;

    #[test]
    fn without_key_accumulates_a_single_state() {
        let mut variant = AggregatedDataVariants::new(VariantKind::WithoutKey);
        let functions: Vec<Box<dyn AggregateFunction>> = vec![Box::new(Count)];
        match variant.probe(&[], &functions, None, OverflowMode::Throw).unwrap() {
            ProbeResult::Found(states) => assert_eq!(states.len(), 1),
            _ => panic!("expected Found"),
        }
        assert_eq!(variant.size(), 1);
    }

    #[test]
    fn key_64_inserts_new_keys_and_finds_existing_ones() {
        let mut variant = AggregatedDataVariants::new(VariantKind::Key64);
        let functions: Vec<Box<dyn AggregateFunction>> = vec![Box::new(Count)];
        variant.probe(&[Field::UInt64(1)], &functions, None, OverflowMode::Throw).unwrap();
        variant.probe(&[Field::UInt64(1)], &functions, None, OverflowMode::Throw).unwrap();
        variant.probe(&[Field::UInt64(2)], &functions, None, OverflowMode::Throw).unwrap();
        assert_eq!(variant.size(), 2);
    }

    #[test]
    fn throw_overflow_mode_fails_once_capacity_is_exceeded() {
        let mut variant = AggregatedDataVariants::new(VariantKind::Key64);
        let functions: Vec<Box<dyn AggregateFunction>> = vec![Box::new(Count)];
        variant.probe(&[Field::UInt64(1)], &functions, Some(1), OverflowMode::Throw).unwrap();
        let err = variant
            .probe(&[Field::UInt64(2)], &functions, Some(1), OverflowMode::Throw)
            .unwrap_err();
        assert_eq!(err.code(), Code::TooMuchRows.as_i32());
    }

    #[test]
    fn any_overflow_mode_drops_new_keys_but_keeps_updating_existing_ones() {
        let mut variant = AggregatedDataVariants::new(VariantKind::Key64);
        let functions: Vec<Box<dyn AggregateFunction>> = vec![Box::new(Count)];
        variant.probe(&[Field::UInt64(1)], &functions, Some(1), OverflowMode::Any).unwrap();
        let dropped = variant.probe(&[Field::UInt64(2)], &functions, Some(1), OverflowMode::Any).unwrap();
        assert!(matches!(dropped, ProbeResult::Dropped));
        assert_eq!(variant.size(), 1);
    }

    #[test]
    fn merging_mismatched_variant_kinds_is_rejected() {
        let mut a = AggregatedDataVariants::new(VariantKind::Key64);
        let b = AggregatedDataVariants::new(VariantKind::KeyString);
        let functions: Vec<Box<dyn AggregateFunction>> = vec![Box::new(Count)];
        let err = a.merge(b, &functions).unwrap_err();
        assert_eq!(err.code(), Code::CannotMergeDifferentAggregatedDataVariants.as_i32());
    }

    #[test]
    fn merging_key_64_variants_combines_matching_keys() {
        let mut a = AggregatedDataVariants::new(VariantKind::Key64);
        let mut b = AggregatedDataVariants::new(VariantKind::Key64);
        let functions: Vec<Box<dyn AggregateFunction>> = vec![Box::new(Count)];
        a.probe(&[Field::UInt64(1)], &functions, None, OverflowMode::Throw).unwrap();
        b.probe(&[Field::UInt64(1)], &functions, None, OverflowMode::Throw).unwrap();
        b.probe(&[Field::UInt64(1)], &functions, None, OverflowMode::Throw).unwrap();
        b.probe(&[Field::UInt64(2)], &functions, None, OverflowMode::Throw).unwrap();
        a.merge(b, &functions).unwrap();
        assert_eq!(a.size(), 2);
        if let AggregatedDataVariants::Key64(map) = &a {
            assert_eq!(map[&1][0], AggregateState::Count(3));
        } else {
            panic!("expected Key64 variant");
        }
    }

    #[test]
    fn process_block_accumulates_count_per_key() {
        let mut block = Block::new();
        block.push(
            "k".to_string(),
            Type::Number(crucible_block::NumberKind::UInt64),
            Column::Vector(VectorColumn::UInt64(vec![1, 1, 2])),
        );
        let mut variant = AggregatedDataVariants::new(VariantKind::Key64);
        let functions: Vec<Box<dyn AggregateFunction>> = vec![Box::new(Count)];
        let arg_positions = vec![Vec::new()];
        variant
            .process_block(&block, &[0], &functions, &arg_positions, None, OverflowMode::Throw)
            .unwrap();
        if let AggregatedDataVariants::Key64(map) = &variant {
            assert_eq!(map[&1][0], AggregateState::Count(2));
            assert_eq!(map[&2][0], AggregateState::Count(1));
        } else {
            panic!("expected Key64 variant");
        }
    }
}
