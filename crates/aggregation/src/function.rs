//! The aggregate function contract (§4.3.2): `create_empty_state`, `add`,
//! `merge`, `serialize`, `deserialize`. States are opaque to the engine —
//! it only ever passes a state back to the function that produced it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crucible_block::Field;
use crucible_errors::{Code, Error, Result};

/// An accumulator. The engine stores these in its hash tables but never
/// inspects them; only the owning `AggregateFunction` interprets them.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    Count(u64),
    SumInt(i128),
    SumFloat(f64),
    /// Running min/max, `None` until the first non-null input arrives.
    Extremum(Option<Field>),
}

pub trait AggregateFunction: Send + Sync {
    fn name(&self) -> &str;

    fn create_empty_state(&self) -> AggregateState;

    fn add(&self, state: &mut AggregateState, args: &[Field]) -> Result<()>;

    /// Fast path for `count`, avoiding per-row dispatch (§4.3.2). The
    /// default falls back to calling `add` once per unit; only `count`
    /// needs to override this since it is the only aggregate whose `add`
    /// ignores its arguments.
    fn add_delta(&self, state: &mut AggregateState, n: u64) -> Result<()> {
        for _ in 0..n {
            self.add(state, &[])?;
        }
        Ok(())
    }

    fn merge(&self, state: &mut AggregateState, other: &AggregateState) -> Result<()>;

    fn serialize(&self, state: &AggregateState, buf: &mut BytesMut);

    fn deserialize(&self, buf: &mut Bytes) -> Result<AggregateState>;
}

fn state_mismatch(name: &str) -> Error {
    Error::logic(
        Code::LogicalError,
        format!("{name}: aggregate state shape mismatch"),
    )
}

fn truncated(name: &str) -> Error {
    Error::io(
        Code::CannotReadAllData,
        format!("{name}: truncated aggregate state"),
    )
}

/// Row count, ignoring argument values entirely.
pub struct Count;

impl AggregateFunction for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn create_empty_state(&self) -> AggregateState {
        AggregateState::Count(0)
    }

    fn add(&self, state: &mut AggregateState, _args: &[Field]) -> Result<()> {
        match state {
            AggregateState::Count(n) => {
                *n += 1;
                Ok(())
            }
            _ => Err(state_mismatch(self.name())),
        }
    }

    fn add_delta(&self, state: &mut AggregateState, n: u64) -> Result<()> {
        match state {
            AggregateState::Count(c) => {
                *c += n;
                Ok(())
            }
            _ => Err(state_mismatch(self.name())),
        }
    }

    fn merge(&self, state: &mut AggregateState, other: &AggregateState) -> Result<()> {
        match (state, other) {
            (AggregateState::Count(a), AggregateState::Count(b)) => {
                *a += b;
                Ok(())
            }
            _ => Err(state_mismatch(self.name())),
        }
    }

    fn serialize(&self, state: &AggregateState, buf: &mut BytesMut) {
        if let AggregateState::Count(n) = state {
            buf.put_u64_le(*n);
        }
    }

    fn deserialize(&self, buf: &mut Bytes) -> Result<AggregateState> {
        if buf.remaining() < 8 {
            return Err(truncated(self.name()));
        }
        Ok(AggregateState::Count(buf.get_u64_le()))
    }
}

fn field_as_f64(field: &Field) -> Option<f64> {
    match *field {
        Field::UInt64(v) => Some(v as f64),
        Field::Int64(v) => Some(v as f64),
        Field::Float64(v) => Some(v),
        _ => None,
    }
}

/// Sums its single numeric argument; integer inputs accumulate exactly in
/// `i128`, any float input switches the running total to `f64`.
pub struct Sum;

impl AggregateFunction for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn create_empty_state(&self) -> AggregateState {
        AggregateState::SumInt(0)
    }

    fn add(&self, state: &mut AggregateState, args: &[Field]) -> Result<()> {
        let arg = args
            .first()
            .ok_or_else(|| Error::user(Code::NumberOfArgumentsDoesntMatch, "sum expects 1 argument"))?;
        match (&mut *state, arg) {
            (AggregateState::SumInt(acc), Field::UInt64(v)) => {
                *acc += *v as i128;
                Ok(())
            }
            (AggregateState::SumInt(acc), Field::Int64(v)) => {
                *acc += *v as i128;
                Ok(())
            }
            (AggregateState::SumInt(acc), Field::Float64(v)) => {
                *state = AggregateState::SumFloat(*acc as f64 + v);
                Ok(())
            }
            (AggregateState::SumFloat(acc), _) => {
                let v = field_as_f64(arg)
                    .ok_or_else(|| Error::logic(Code::BadTypeOfField, "sum expects a numeric field"))?;
                *acc += v;
                Ok(())
            }
            _ => Err(state_mismatch(self.name())),
        }
    }

    fn merge(&self, state: &mut AggregateState, other: &AggregateState) -> Result<()> {
        match (&mut *state, other) {
            (AggregateState::SumInt(a), AggregateState::SumInt(b)) => {
                *a += b;
                Ok(())
            }
            (AggregateState::SumInt(a), AggregateState::SumFloat(b)) => {
                *state = AggregateState::SumFloat(*a as f64 + b);
                Ok(())
            }
            (AggregateState::SumFloat(a), AggregateState::SumInt(b)) => {
                *a += *b as f64;
                Ok(())
            }
            (AggregateState::SumFloat(a), AggregateState::SumFloat(b)) => {
                *a += b;
                Ok(())
            }
            _ => Err(state_mismatch(self.name())),
        }
    }

    fn serialize(&self, state: &AggregateState, buf: &mut BytesMut) {
        match state {
            AggregateState::SumInt(v) => {
                buf.put_u8(0);
                buf.put_i128_le(*v);
            }
            AggregateState::SumFloat(v) => {
                buf.put_u8(1);
                buf.put_f64_le(*v);
            }
            _ => unreachable!("sum only produces SumInt/SumFloat states"),
        }
    }

    fn deserialize(&self, buf: &mut Bytes) -> Result<AggregateState> {
        if buf.remaining() < 1 {
            return Err(truncated(self.name()));
        }
        match buf.get_u8() {
            0 if buf.remaining() >= 16 => Ok(AggregateState::SumInt(buf.get_i128_le())),
            1 if buf.remaining() >= 8 => Ok(AggregateState::SumFloat(buf.get_f64_le())),
            0 | 1 => Err(truncated(self.name())),
            tag => Err(Error::io(
                Code::CorruptedData,
                format!("sum: unknown state tag {tag}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumKind {
    Min,
    Max,
}

/// Running minimum or maximum of its single argument, by field ordering
/// (numeric by value, strings lexicographically with length tiebreak).
pub struct Extremum(pub ExtremumKind);

impl Extremum {
    fn better(&self, candidate: &Field, current: &Field) -> bool {
        let ordering = compare_fields(candidate, current);
        match self.0 {
            ExtremumKind::Min => ordering.is_lt(),
            ExtremumKind::Max => ordering.is_gt(),
        }
    }
}

fn compare_fields(a: &Field, b: &Field) -> std::cmp::Ordering {
    match (a, b) {
        (Field::String(x), Field::String(y)) => {
            let common = x.len().min(y.len());
            match x[..common].cmp(&y[..common]) {
                std::cmp::Ordering::Equal => x.len().cmp(&y.len()),
                other => other,
            }
        }
        _ => {
            let (x, y) = (field_as_f64(a), field_as_f64(b));
            x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)
        }
    }
}

impl AggregateFunction for Extremum {
    fn name(&self) -> &str {
        match self.0 {
            ExtremumKind::Min => "min",
            ExtremumKind::Max => "max",
        }
    }

    fn create_empty_state(&self) -> AggregateState {
        AggregateState::Extremum(None)
    }

    fn add(&self, state: &mut AggregateState, args: &[Field]) -> Result<()> {
        let arg = args
            .first()
            .ok_or_else(|| Error::user(Code::NumberOfArgumentsDoesntMatch, format!("{} expects 1 argument", self.name())))?;
        if arg.is_null() {
            return Ok(());
        }
        match state {
            AggregateState::Extremum(current) => {
                let replace = match current {
                    None => true,
                    Some(existing) => self.better(arg, existing),
                };
                if replace {
                    *current = Some(arg.clone());
                }
                Ok(())
            }
            _ => Err(state_mismatch(self.name())),
        }
    }

    fn merge(&self, state: &mut AggregateState, other: &AggregateState) -> Result<()> {
        match (state, other) {
            (AggregateState::Extremum(a), AggregateState::Extremum(Some(b))) => {
                let replace = match a {
                    None => true,
                    Some(existing) => self.better(b, existing),
                };
                if replace {
                    *a = Some(b.clone());
                }
                Ok(())
            }
            (AggregateState::Extremum(_), AggregateState::Extremum(None)) => Ok(()),
            _ => Err(state_mismatch(self.name())),
        }
    }

    fn serialize(&self, state: &AggregateState, buf: &mut BytesMut) {
        match state {
            AggregateState::Extremum(Some(Field::Int64(v))) => {
                buf.put_u8(1);
                buf.put_i64_le(*v);
            }
            AggregateState::Extremum(Some(Field::UInt64(v))) => {
                buf.put_u8(2);
                buf.put_u64_le(*v);
            }
            AggregateState::Extremum(Some(Field::Float64(v))) => {
                buf.put_u8(3);
                buf.put_f64_le(*v);
            }
            AggregateState::Extremum(Some(Field::String(bytes))) => {
                buf.put_u8(4);
                buf.put_u32_le(bytes.len() as u32);
                buf.put_slice(bytes);
            }
            _ => buf.put_u8(0),
        }
    }

    fn deserialize(&self, buf: &mut Bytes) -> Result<AggregateState> {
        if buf.remaining() < 1 {
            return Err(truncated(self.name()));
        }
        let value = match buf.get_u8() {
            0 => None,
            1 if buf.remaining() >= 8 => Some(Field::Int64(buf.get_i64_le())),
            2 if buf.remaining() >= 8 => Some(Field::UInt64(buf.get_u64_le())),
            3 if buf.remaining() >= 8 => Some(Field::Float64(buf.get_f64_le())),
            4 if buf.remaining() >= 4 => {
                let len = buf.get_u32_le() as usize;
                if buf.remaining() < len {
                    return Err(truncated(self.name()));
                }
                let bytes = buf.copy_to_bytes(len);
                Some(Field::String(std::sync::Arc::from(&bytes[..])))
            }
            1..=4 => return Err(truncated(self.name())),
            tag => {
                return Err(Error::io(
                    Code::CorruptedData,
                    format!("{}: unknown state tag {tag}", self.name()),
                ))
            }
        };
        Ok(AggregateState::Extremum(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_add_delta_matches_repeated_add() {
        let count = Count;
        let mut via_delta = count.create_empty_state();
        count.add_delta(&mut via_delta, 5).unwrap();
        let mut via_add = count.create_empty_state();
        for _ in 0..5 {
            count.add(&mut via_add, &[]).unwrap();
        }
        assert_eq!(via_delta, via_add);
    }

    #[test]
    fn sum_switches_to_float_on_first_float_input() {
        let sum = Sum;
        let mut state = sum.create_empty_state();
        sum.add(&mut state, &[Field::Int64(3)]).unwrap();
        sum.add(&mut state, &[Field::Float64(1.5)]).unwrap();
        assert_eq!(state, AggregateState::SumFloat(4.5));
    }

    #[test]
    fn sum_state_roundtrips_through_serialize() {
        let sum = Sum;
        let mut state = sum.create_empty_state();
        sum.add(&mut state, &[Field::Int64(42)]).unwrap();
        let mut buf = bytes::BytesMut::new();
        sum.serialize(&state, &mut buf);
        let mut frozen = buf.freeze();
        let decoded = sum.deserialize(&mut frozen).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn extremum_min_tracks_the_smallest_value_and_ignores_nulls() {
        let min = Extremum(ExtremumKind::Min);
        let mut state = min.create_empty_state();
        for v in [5i64, 2, 9] {
            min.add(&mut state, &[Field::Int64(v)]).unwrap();
        }
        min.add(&mut state, &[Field::Null]).unwrap();
        assert_eq!(state, AggregateState::Extremum(Some(Field::Int64(2))));
    }

    #[test]
    fn extremum_merge_keeps_the_more_extreme_of_two_states() {
        let max = Extremum(ExtremumKind::Max);
        let mut a = AggregateState::Extremum(Some(Field::Int64(3)));
        let b = AggregateState::Extremum(Some(Field::Int64(7)));
        max.merge(&mut a, &b).unwrap();
        assert_eq!(a, AggregateState::Extremum(Some(Field::Int64(7))));
    }
}
