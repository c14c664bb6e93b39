mod errors;

pub use errors::ClientError;

use std::io::{Read, Write};
use std::net::TcpStream;

use bytes::{Bytes, BytesMut};

use crucible_block::{Block, Type};
use crucible_wire_protocol::{decode_packet, encode_packet, frame, HelloPacket, Packet, QueryPacket};

use crate::build_info;

/// A blocking client for a running `crucible-server`'s query listener
/// (§6/§8): one Hello/Query exchange, then a stream of `Data` Blocks until
/// `EndOfStream` or `Exception`. The CLI's local-execution mode never goes
/// through this; it's only exercised by `--host`.
pub struct RemoteClient {
    stream: TcpStream,
}

impl RemoteClient {
    pub fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(ClientError::connect)?;
        Ok(Self { stream })
    }

    fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        let mut buf = BytesMut::new();
        encode_packet(&mut buf, packet).map_err(ClientError::protocol)?;
        self.stream.write_all(&frame(&buf)).map_err(ClientError::connect)
    }

    fn recv(&mut self, block_schema: &[(String, Type)]) -> Result<Packet, ClientError> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).map_err(ClientError::connect)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).map_err(ClientError::connect)?;
        decode_packet(&mut Bytes::from(body), block_schema).map_err(ClientError::protocol)
    }

    /// Runs one query against `result_schema` (the caller must already know
    /// the shape of the rows it expects back — the wire protocol carries
    /// the schema in the `Data` header's names/types, not a self-describing
    /// one, matching `crucible-wire-protocol::decode_block`'s contract).
    /// Returns every `Data` block received before `EndOfStream`.
    pub fn run_query(&mut self, query: &str, result_schema: &[(String, Type)]) -> Result<Vec<Block>, ClientError> {
        self.send(&Packet::Hello(HelloPacket {
            client_name: "crucible-cli".to_owned(),
            client_version_major: build_info::CRUCIBLE_CLI_VERSION_MAJOR.parse().unwrap_or(0),
            client_version_minor: build_info::CRUCIBLE_CLI_VERSION_MINOR.parse().unwrap_or(0),
            default_database: "default".to_owned(),
            user: "default".to_owned(),
            password: String::new(),
        }))?;
        match self.recv(&[])? {
            Packet::Hello(_) => {}
            Packet::Exception(exc) => return Err(ClientError::remote(exc.code, exc.message)),
            other => return Err(ClientError::protocol_message(format!("unexpected response to Hello: {other:?}"))),
        }

        self.send(&Packet::Query(QueryPacket { query_id: "1".to_owned(), query: query.to_owned() }))?;

        let mut blocks = Vec::new();
        loop {
            match self.recv(result_schema)? {
                Packet::Data(block) => blocks.push(block),
                Packet::Progress(_) => {}
                Packet::EndOfStream => break,
                Packet::Exception(exc) => return Err(ClientError::remote(exc.code, exc.message)),
                other => return Err(ClientError::protocol_message(format!("unexpected packet: {other:?}"))),
            }
        }
        Ok(blocks)
    }
}
