// SPDX-License-Identifier: MIT

use log::*;

use std::fmt;
use std::io;
use std::time::Duration;

use crate::endpoints::ConnectionEndpoints;
use crate::framing::ReceiveBuffer;
use crate::packet::{self, Packet, PacketType};
use crate::reactor::Readiness;
use crate::session::{SessionShared, StopReason};

/// How long one readiness wait may block before the stop flag is checked again.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

const READ_CHUNK: usize = 4096;

/// What a single poll saw on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Idle,
    /// This many frames were handled.
    Frames(usize),
    /// The peer closed the stream. Frames that arrived before the close were still handled.
    PeerClosed,
}

/// Reads the stream, cuts it into frames and acts on each packet in arrival order.
///
/// Owns the receive buffer; nothing else ever touches it. The handshake drives it first, then it
/// moves to its own thread for the rest of the session.
pub struct Dispatcher {
    buffer: ReceiveBuffer,
    chunk: Box<[u8]>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            buffer: ReceiveBuffer::new(),
            chunk: vec![0; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Run until the stop signal is raised or the peer goes away.
    pub fn run(mut self, endpoints: &ConnectionEndpoints, shared: &SessionShared) {
        let mut readiness = Readiness::new(endpoints.stream_fd());
        debug!(
            "dispatcher started ({})",
            if readiness.uses_ring() { "io_uring" } else { "sleep polling" }
        );

        while !shared.stop.is_raised() {
            match self.poll_once(endpoints, shared, &mut readiness, POLL_TIMEOUT) {
                Ok(Inbound::PeerClosed) => {
                    info!("server at {} closed the stream", endpoints.remote());
                    shared.stop.raise(StopReason::PeerClosed);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("stream read failed: {e}");
                    shared.stop.raise(StopReason::PeerClosed);
                }
            }
        }

        debug!("dispatcher stopped");
    }

    /// Wait up to `timeout` for data, drain the socket and handle every complete frame.
    pub fn poll_once(
        &mut self,
        endpoints: &ConnectionEndpoints,
        shared: &SessionShared,
        readiness: &mut Readiness,
        timeout: Duration,
    ) -> io::Result<Inbound> {
        if !readiness.wait(timeout)? {
            return Ok(Inbound::Idle);
        }

        let mut closed = false;
        loop {
            match endpoints.try_recv(&mut self.chunk) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => self.buffer.extend(&self.chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    closed = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let frames = self.buffer.drain_frames();
        let handled = frames.len();
        for body in frames {
            handle_frame(&body, endpoints, shared);
        }

        Ok(match (closed, handled) {
            (true, _) => Inbound::PeerClosed,
            (false, 0) => Inbound::Idle,
            (false, n) => Inbound::Frames(n),
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

fn handle_frame(body: &[u8], endpoints: &ConnectionEndpoints, shared: &SessionShared) {
    let packet = match packet::decode(body) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("dropping malformed frame: {e}");
            shared.stats.record_dropped_frame();
            return;
        }
    };

    match packet.packet_type() {
        Some(PacketType::Ok) => handle_ok(&packet, shared),
        Some(PacketType::Ping) => handle_ping(packet, endpoints, shared),
        kind => trace!("ignoring packet type {} ({kind:?})", packet.kind),
    }
}

fn handle_ok(packet: &Packet, shared: &SessionShared) {
    let [hi, lo, ..] = packet.payload.as_slice() else {
        debug!("OK packet without an identity ({} bytes)", packet.payload.len());
        return;
    };

    let id = u16::from_be_bytes([*hi, *lo]);
    match shared.assign_identity(id) {
        Ok(()) => info!("server assigned player id {id}"),
        Err(current) => debug!("ignoring OK for id {id}, already playing as {current}"),
    }
}

fn handle_ping(packet: Packet, endpoints: &ConnectionEndpoints, shared: &SessionShared) {
    trace!("ping with {} byte payload", packet.payload.len());
    match endpoints.send_stream_packet(PacketType::Pong, &packet.payload) {
        Ok(()) => shared.stats.record_pong(),
        Err(e) => warn!("could not answer ping: {e}"),
    }
    shared.record_ping(packet.payload);
}
