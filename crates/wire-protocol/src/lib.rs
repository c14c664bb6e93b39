//! The client/Keeper-facing query wire protocol (§6/§8): length-prefixed
//! packet frames ([`packet`]) carrying Blocks serialized column-by-column
//! ([`block_codec`]), plus the varint primitives ([`varint`]) the ZK-shaped
//! codecs elsewhere in this workspace don't need.

pub mod block_codec;
pub mod packet;
pub mod varint;

pub use block_codec::{decode_block, encode_block};
pub use packet::{decode_packet, encode_packet, frame, ExceptionPacket, HelloPacket, Packet, PacketKind, ProgressPacket, QueryPacket};
