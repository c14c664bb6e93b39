//! Binary codec used for on-disk `Field`/`Block` storage, Keeper snapshot
//! payloads, and Raft log entries (§3, §6). Mirrors the shape of the
//! teacher's `restate_encoding` crate: a pair of traits plus a derive
//! macro, rather than pulling in a general-purpose serde backend for
//! formats that need exact control over byte layout (fixed-width
//! integers, length-prefixed strings, no self-describing envelope).

pub use crucible_encoding_derive::{StorageDecode, StorageEncode};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of buffer, needed {needed} more bytes")]
    UnexpectedEof { needed: usize },
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
    #[error("invalid tag {tag} for {type_name}")]
    InvalidTag { tag: u32, type_name: &'static str },
}

/// Encode `self` by appending to `buf`. Never fails: callers size `buf`
/// ahead of time or let it grow.
pub trait StorageEncode {
    fn encode(&self, buf: &mut BytesMut);

    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Decode `Self` from the front of `buf`, advancing it past the bytes
/// consumed. `buf` may contain trailing data belonging to the next value.
pub trait StorageDecode: Sized {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError>;

    fn from_bytes(mut bytes: Bytes) -> Result<Self, DecodeError> {
        Self::decode(&mut bytes)
    }
}

fn require(buf: &Bytes, needed: usize) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        Err(DecodeError::UnexpectedEof { needed })
    } else {
        Ok(())
    }
}

macro_rules! impl_fixed_width {
    ($ty:ty, $put:ident, $get:ident) => {
        impl StorageEncode for $ty {
            fn encode(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }
        }

        impl StorageDecode for $ty {
            fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
                require(buf, std::mem::size_of::<$ty>())?;
                Ok(buf.$get())
            }
        }
    };
}

impl_fixed_width!(u8, put_u8, get_u8);
impl_fixed_width!(i8, put_i8, get_i8);
impl_fixed_width!(u16, put_u16_le, get_u16_le);
impl_fixed_width!(i16, put_i16_le, get_i16_le);
impl_fixed_width!(u32, put_u32_le, get_u32_le);
impl_fixed_width!(i32, put_i32_le, get_i32_le);
impl_fixed_width!(u64, put_u64_le, get_u64_le);
impl_fixed_width!(i64, put_i64_le, get_i64_le);
impl_fixed_width!(f32, put_f32_le, get_f32_le);
impl_fixed_width!(f64, put_f64_le, get_f64_le);

impl StorageEncode for bool {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(*self as u8);
    }
}

impl StorageDecode for bool {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        require(buf, 1)?;
        Ok(buf.get_u8() != 0)
    }
}

/// Length-prefixed (u32 LE) byte string, matching the varint-free framing
/// the original ZooKeeper/RaftKeeper wire protocol uses for `Stat`/`ACL`
/// payloads (§6).
impl StorageEncode for Vec<u8> {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u32).encode(buf);
        buf.put_slice(self);
    }
}

impl StorageDecode for Vec<u8> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        require(buf, len)?;
        Ok(buf.copy_to_bytes(len).to_vec())
    }
}

impl StorageEncode for String {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u32).encode(buf);
        buf.put_slice(self.as_bytes());
    }
}

impl StorageDecode for String {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        require(buf, len)?;
        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

impl<T: StorageEncode> StorageEncode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u32).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: StorageDecode> StorageDecode for Vec<T> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        let mut items = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            items.push(T::decode(buf)?);
        }
        Ok(items)
    }
}

impl<T: StorageEncode> StorageEncode for Option<T> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Some(value) => {
                true.encode(buf);
                value.encode(buf);
            }
            None => false.encode(buf),
        }
    }
}

impl<T: StorageDecode> StorageDecode for Option<T> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        if bool::decode(buf)? {
            Ok(Some(T::decode(buf)?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(StorageEncode, StorageDecode, Debug, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
        label: String,
    }

    #[test]
    fn primitives_roundtrip() {
        let mut buf = BytesMut::new();
        42u32.encode(&mut buf);
        (-7i64).encode(&mut buf);
        true.encode(&mut buf);
        let mut bytes = buf.freeze();
        assert_eq!(u32::decode(&mut bytes).unwrap(), 42);
        assert_eq!(i64::decode(&mut bytes).unwrap(), -7);
        assert!(bool::decode(&mut bytes).unwrap());
    }

    #[test]
    fn derived_struct_roundtrips() {
        let point = Point {
            x: 10,
            y: -20,
            label: "mark".to_owned(),
        };
        let bytes = point.to_bytes();
        let decoded = Point::from_bytes(bytes).unwrap();
        assert_eq!(point, decoded);
    }

    #[test]
    fn vec_and_option_roundtrip() {
        let values: Vec<Option<u32>> = vec![Some(1), None, Some(3)];
        let mut buf = BytesMut::new();
        values.encode(&mut buf);
        let mut bytes = buf.freeze();
        let decoded = Vec::<Option<u32>>::decode(&mut bytes).unwrap();
        assert_eq!(values, decoded);
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        let mut buf = BytesMut::new();
        42u32.encode(&mut buf);
        let mut bytes = buf.freeze().slice(0..2);
        assert!(matches!(
            u32::decode(&mut bytes),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }
}
