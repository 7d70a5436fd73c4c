// SPDX-License-Identifier: MIT

//! Length-prefixed framing for the stream channel: `length: u16 (big-endian) | body`.

use crate::error::ProtocolError;

pub const LEN_PREFIX: usize = 2;
pub const MAX_FRAME_BODY: usize = u16::MAX as usize;

pub fn frame(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if body.len() > MAX_FRAME_BODY {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }

    let mut out = Vec::with_capacity(LEN_PREFIX + body.len());
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Split every complete frame off the front of `buf`.
///
/// Returns the frame bodies in arrival order and the number of bytes they used. Anything after
/// that is an incomplete frame and must be kept for the next read.
pub fn try_extract_frames(buf: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let mut frames = Vec::new();
    let mut offset = 0;

    while buf.len() - offset >= LEN_PREFIX {
        let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
        let end = offset + LEN_PREFIX + len;
        if buf.len() < end {
            break;
        }
        frames.push(buf[offset + LEN_PREFIX..end].to_vec());
        offset = end;
    }

    (frames, offset)
}

/// Raw stream bytes waiting to become frames. Owned by whoever reads the stream.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    bytes: Vec<u8>,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Remove and return every complete frame body, leaving any partial frame in place.
    pub fn drain_frames(&mut self) -> Vec<Vec<u8>> {
        let (frames, consumed) = try_extract_frames(&self.bytes);
        self.bytes.drain(..consumed);
        frames
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
