//! Wire encoding for Raft peer messages, matching the teacher's
//! `crates/metadata-store/src/raft/mod.rs` exactly: `raft::prelude::Message`
//! wire-serialized with `protobuf`, behind a small `NetworkMessage` trait
//! so the transport layer (here: [`crate::forward::LeaderForwarder`])
//! never needs to know it's carrying a Raft message specifically.

use bytes::{Buf, BufMut};
use protobuf::Message as ProtobufMessage;

pub trait NetworkMessage {
    fn to(&self) -> u64;
    fn serialize<B: BufMut>(&self, buffer: &mut B);
    fn deserialize<B: Buf>(buffer: &mut B) -> anyhow::Result<Self>
    where
        Self: Sized;
}

impl NetworkMessage for raft::prelude::Message {
    fn to(&self) -> u64 {
        self.to
    }

    fn serialize<B: BufMut>(&self, buffer: &mut B) {
        let mut writer = buffer.writer();
        self.write_to_writer(&mut writer).expect("should be able to write message");
    }

    fn deserialize<B: Buf>(buffer: &mut B) -> anyhow::Result<Self> {
        use anyhow::Context;
        ProtobufMessage::parse_from_reader(&mut buffer.reader()).context("failed deserializing message")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn raft_message_round_trips_through_serialize_deserialize() {
        let mut message = raft::prelude::Message::default();
        message.to = 7;
        message.from = 3;
        message.term = 2;

        let mut buf = BytesMut::new();
        message.serialize(&mut buf);
        let decoded = raft::prelude::Message::deserialize(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.to, 7);
        assert_eq!(decoded.from, 3);
        assert_eq!(decoded.term, 2);
    }
}
