// SPDX-License-Identifier: MIT

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::framing::MAX_FRAME_BODY;
use crate::packet::MAX_PAYLOAD;

/// Encoding failures. These point at a caller bug: every payload this crate builds is bounded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload of {0} bytes exceeds the {max} byte limit", max = MAX_PAYLOAD)]
    InvalidPayloadSize(usize),
    #[error("frame body of {0} bytes exceeds the {max} byte limit", max = MAX_FRAME_BODY)]
    FrameTooLarge(usize),
}

/// Reasons an inbound frame body is not a packet. The frame is dropped, the stream stays up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("bad magic {0:#06x}")]
    BadMagic(u16),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("could not connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("no identity received within {0:?}")]
    NoIdentity(Duration),
    #[error("server closed the stream during the handshake")]
    PeerClosed,
    #[error("handshake send failed: {0}")]
    Send(#[from] SendError),
    #[error("handshake read failed: {0}")]
    Io(#[from] io::Error),
}
