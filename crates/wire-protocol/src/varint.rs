//! LEB128-style variable-length integers, used for string lengths and
//! packet discriminants (§6). The teacher's own wire codecs
//! (`NetworkMessage::serialize`/`deserialize`) hand-roll their framing
//! directly against `bytes::{Buf, BufMut}` rather than reach for a crate;
//! this does the same for the one primitive the ZooKeeper-derived codecs
//! elsewhere in this workspace don't need.

use bytes::{Buf, BufMut};
use crucible_errors::{Code, Error, Result};

pub fn put_uvarint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            break;
        }
        buf.put_u8(byte | 0x80);
    }
}

pub fn get_uvarint(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        if !buf.has_remaining() {
            return Err(eof());
        }
        if shift >= 64 {
            return Err(Error::user(Code::ArgumentOutOfBound, "varint longer than 64 bits"));
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(value)
}

pub fn put_string(buf: &mut impl BufMut, s: &[u8]) {
    put_uvarint(buf, s.len() as u64);
    buf.put_slice(s);
}

pub fn get_string(buf: &mut impl Buf) -> Result<Vec<u8>> {
    let len = get_uvarint(buf)? as usize;
    if buf.remaining() < len {
        return Err(eof());
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn eof() -> Error {
    Error::io(Code::UnexpectedEndOfFile, "unexpected end of buffer reading varint/string")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn small_values_round_trip_in_one_byte() {
        let mut buf = BytesMut::new();
        put_uvarint(&mut buf, 5);
        assert_eq!(buf.len(), 1);
        let mut frozen = buf.freeze();
        assert_eq!(get_uvarint(&mut frozen).unwrap(), 5);
    }

    #[test]
    fn large_values_span_multiple_bytes() {
        let mut buf = BytesMut::new();
        put_uvarint(&mut buf, 300);
        assert_eq!(buf.len(), 2);
        let mut frozen = buf.freeze();
        assert_eq!(get_uvarint(&mut frozen).unwrap(), 300);
    }

    #[test]
    fn strings_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, b"hello world");
        let mut frozen = buf.freeze();
        assert_eq!(get_string(&mut frozen).unwrap(), b"hello world");
    }
}
