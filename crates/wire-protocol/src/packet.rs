//! Client <-> server query protocol packet kinds (§6/§8): length-prefixed
//! frames, one varint discriminant per packet followed by a kind-specific
//! body. Block payloads (`Data`/`Totals`/`Extremes`) delegate to
//! [`crate::block_codec`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crucible_block::{Block, Type};
use crucible_errors::{Code, Error, Result};

use crate::block_codec::{decode_block, encode_block};
use crate::varint::{get_string, get_uvarint, put_string, put_uvarint};

/// Client-to-server and server-to-client packet discriminants. Numbering
/// follows the order they're introduced in §6/§8; client and server each
/// only ever send a subset of these, but both use the same tag space so a
/// misrouted packet fails loudly rather than silently decoding as the
/// wrong kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum PacketKind {
    Hello = 0,
    Query = 1,
    Data = 2,
    Exception = 3,
    Progress = 4,
    Pong = 5,
    EndOfStream = 6,
    ProfileInfo = 7,
    Totals = 8,
    Extremes = 9,
    PartUuids = 10,
}

impl PacketKind {
    fn from_u64(raw: u64) -> Result<Self> {
        Ok(match raw {
            0 => PacketKind::Hello,
            1 => PacketKind::Query,
            2 => PacketKind::Data,
            3 => PacketKind::Exception,
            4 => PacketKind::Progress,
            5 => PacketKind::Pong,
            6 => PacketKind::EndOfStream,
            7 => PacketKind::ProfileInfo,
            8 => PacketKind::Totals,
            9 => PacketKind::Extremes,
            10 => PacketKind::PartUuids,
            other => return Err(Error::user(Code::UnsupportedParameter, format!("unknown packet kind {other}"))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HelloPacket {
    pub client_name: String,
    pub client_version_major: u64,
    pub client_version_minor: u64,
    pub default_database: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct QueryPacket {
    pub query_id: String,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct ProgressPacket {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
}

#[derive(Debug, Clone)]
pub struct ExceptionPacket {
    pub code: i32,
    pub name: String,
    pub message: String,
}

/// A decoded packet. `Data`/`Totals`/`Extremes` carry a `Block` decoded
/// against a schema the caller must already know (from a prior `Data`
/// packet's header or the query's result type), matching
/// [`crate::block_codec::decode_block`]'s contract.
#[derive(Debug, Clone)]
pub enum Packet {
    Hello(HelloPacket),
    Query(QueryPacket),
    Data(Block),
    Exception(ExceptionPacket),
    Progress(ProgressPacket),
    Pong,
    EndOfStream,
    Totals(Block),
    Extremes(Block),
}

pub fn encode_packet(buf: &mut BytesMut, packet: &Packet) -> Result<()> {
    match packet {
        Packet::Hello(hello) => {
            put_uvarint(buf, PacketKind::Hello as u64);
            put_string(buf, hello.client_name.as_bytes());
            put_uvarint(buf, hello.client_version_major);
            put_uvarint(buf, hello.client_version_minor);
            put_string(buf, hello.default_database.as_bytes());
            put_string(buf, hello.user.as_bytes());
            put_string(buf, hello.password.as_bytes());
        }
        Packet::Query(query) => {
            put_uvarint(buf, PacketKind::Query as u64);
            put_string(buf, query.query_id.as_bytes());
            put_string(buf, query.query.as_bytes());
        }
        Packet::Data(block) => {
            put_uvarint(buf, PacketKind::Data as u64);
            encode_block(buf, block)?;
        }
        Packet::Exception(exc) => {
            put_uvarint(buf, PacketKind::Exception as u64);
            buf.put_i32_le(exc.code);
            put_string(buf, exc.name.as_bytes());
            put_string(buf, exc.message.as_bytes());
        }
        Packet::Progress(progress) => {
            put_uvarint(buf, PacketKind::Progress as u64);
            put_uvarint(buf, progress.rows);
            put_uvarint(buf, progress.bytes);
            put_uvarint(buf, progress.total_rows);
        }
        Packet::Pong => put_uvarint(buf, PacketKind::Pong as u64),
        Packet::EndOfStream => put_uvarint(buf, PacketKind::EndOfStream as u64),
        Packet::Totals(block) => {
            put_uvarint(buf, PacketKind::Totals as u64);
            encode_block(buf, block)?;
        }
        Packet::Extremes(block) => {
            put_uvarint(buf, PacketKind::Extremes as u64);
            encode_block(buf, block)?;
        }
    }
    Ok(())
}

/// Decodes one packet from `buf`. `block_schema` is consulted only for the
/// `Data`/`Totals`/`Extremes` kinds; pass an empty slice for packets known
/// not to carry a Block.
pub fn decode_packet(buf: &mut Bytes, block_schema: &[(String, Type)]) -> Result<Packet> {
    let kind = PacketKind::from_u64(get_uvarint(buf)?)?;
    Ok(match kind {
        PacketKind::Hello => Packet::Hello(HelloPacket {
            client_name: decode_utf8(buf)?,
            client_version_major: get_uvarint(buf)?,
            client_version_minor: get_uvarint(buf)?,
            default_database: decode_utf8(buf)?,
            user: decode_utf8(buf)?,
            password: decode_utf8(buf)?,
        }),
        PacketKind::Query => Packet::Query(QueryPacket {
            query_id: decode_utf8(buf)?,
            query: decode_utf8(buf)?,
        }),
        PacketKind::Data => Packet::Data(decode_block(buf, block_schema)?),
        PacketKind::Exception => Packet::Exception(ExceptionPacket {
            code: need(buf, 4)?.get_i32_le(),
            name: decode_utf8(buf)?,
            message: decode_utf8(buf)?,
        }),
        PacketKind::Progress => Packet::Progress(ProgressPacket {
            rows: get_uvarint(buf)?,
            bytes: get_uvarint(buf)?,
            total_rows: get_uvarint(buf)?,
        }),
        PacketKind::Pong => Packet::Pong,
        PacketKind::EndOfStream => Packet::EndOfStream,
        PacketKind::Totals => Packet::Totals(decode_block(buf, block_schema)?),
        PacketKind::Extremes => Packet::Extremes(decode_block(buf, block_schema)?),
        PacketKind::ProfileInfo | PacketKind::PartUuids => {
            return Err(Error::logic(Code::LogicalError, "ProfileInfo/PartUUIDs decoding not implemented"));
        }
    })
}

fn decode_utf8(buf: &mut Bytes) -> Result<String> {
    Ok(String::from_utf8_lossy(&get_string(buf)?).into_owned())
}

fn need(buf: &mut Bytes, n: usize) -> Result<&mut Bytes> {
    if buf.remaining() < n {
        Err(Error::io(Code::UnexpectedEndOfFile, "unexpected end of buffer decoding packet"))
    } else {
        Ok(buf)
    }
}

/// Prefixes `body` with its length as a 4-byte little-endian frame header,
/// the same outer framing `crucible-keeper-raft`'s segmented log and the
/// ZooKeeper wire protocol both use for their own records.
pub fn frame(body: &[u8]) -> BytesMut {
    let mut framed = BytesMut::with_capacity(4 + body.len());
    framed.put_u32_le(body.len() as u32);
    framed.put_slice(body);
    framed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::{Column, NumberKind, VectorColumn};

    #[test]
    fn hello_round_trips() {
        let hello = Packet::Hello(HelloPacket {
            client_name: "crucible-cli".to_owned(),
            client_version_major: 1,
            client_version_minor: 0,
            default_database: "default".to_owned(),
            user: "default".to_owned(),
            password: String::new(),
        });
        let mut buf = BytesMut::new();
        encode_packet(&mut buf, &hello).unwrap();
        let decoded = decode_packet(&mut buf.freeze(), &[]).unwrap();
        match decoded {
            Packet::Hello(h) => assert_eq!(h.client_name, "crucible-cli"),
            other => panic!("expected Hello, got {other:?}"),
        }
    }

    #[test]
    fn data_packet_round_trips_a_block() {
        let mut block = Block::new();
        block.push("n", Type::Number(NumberKind::UInt32), Column::Vector(VectorColumn::UInt32(vec![1, 2])));
        let packet = Packet::Data(block);

        let mut buf = BytesMut::new();
        encode_packet(&mut buf, &packet).unwrap();

        let schema = vec![("n".to_owned(), Type::Number(NumberKind::UInt32))];
        let decoded = decode_packet(&mut buf.freeze(), &schema).unwrap();
        match decoded {
            Packet::Data(block) => assert_eq!(block.num_rows(), 2),
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn exception_round_trips() {
        let packet = Packet::Exception(ExceptionPacket { code: 47, name: "DB::Exception".to_owned(), message: "boom".to_owned() });
        let mut buf = BytesMut::new();
        encode_packet(&mut buf, &packet).unwrap();
        let decoded = decode_packet(&mut buf.freeze(), &[]).unwrap();
        match decoded {
            Packet::Exception(exc) => {
                assert_eq!(exc.code, 47);
                assert_eq!(exc.message, "boom");
            }
            other => panic!("expected Exception, got {other:?}"),
        }
    }

    #[test]
    fn frame_prefixes_length() {
        let framed = frame(b"abc");
        assert_eq!(&framed[..4], &3u32.to_le_bytes());
        assert_eq!(&framed[4..], b"abc");
    }
}
