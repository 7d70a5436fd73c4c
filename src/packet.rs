// SPDX-License-Identifier: MIT

//! The game packet: `magic: u16 | type: u8 | size: u8 | payload`, big-endian.
//!
//! The codec knows nothing about transports. Stream packets get a length prefix from
//! [`crate::framing`]; datagrams carry exactly one packet each.

use crate::error::{DecodeError, ProtocolError};

pub const PACKET_MAGIC: u16 = 0x5254;
pub const HEADER_LEN: usize = 4;
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    ServerHello = 1,
    ClientHello = 2,
    Ok = 3,
    Ping = 5,
    Pong = 6,
    ChatMessage = 7,
    HelloUdp = 10,
    Input = 11,
    Shoot = 13,
    JoinLobby = 15,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        let kind = match value {
            1 => Self::ServerHello,
            2 => Self::ClientHello,
            3 => Self::Ok,
            5 => Self::Ping,
            6 => Self::Pong,
            7 => Self::ChatMessage,
            10 => Self::HelloUdp,
            11 => Self::Input,
            13 => Self::Shoot,
            15 => Self::JoinLobby,
            _ => return None,
        };
        Some(kind)
    }
}

/// A decoded packet. The type byte is kept raw so that packets this client has no handler for
/// still decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind as u8,
            payload: payload.into(),
        }
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u8(self.kind)
    }
}

pub fn encode(kind: PacketType, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::InvalidPayloadSize(payload.len()));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&PACKET_MAGIC.to_be_bytes());
    out.push(kind as u8);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decode one packet.
///
/// The payload is cut at the declared size. Bytes past it are ignored, since servers may pad, and
/// a body shorter than declared yields whatever bytes are there.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::TooShort(bytes.len()));
    }

    let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
    if magic != PACKET_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }

    let kind = bytes[2];
    let declared = bytes[3] as usize;
    let body = &bytes[HEADER_LEN..];

    Ok(Packet {
        kind,
        payload: body[..declared.min(body.len())].to_vec(),
    })
}
