// SPDX-License-Identifier: MIT

use log::*;
use rand::Rng;

use std::fmt;
use std::time::Duration;

use crate::config::{Rate, ascii_bytes};
use crate::endpoints::ConnectionEndpoints;
use crate::error::SendError;
use crate::packet::PacketType;
use crate::session::SessionShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficKind {
    /// Stream chat message.
    Chat,
    /// Datagram movement input.
    Input,
    /// Datagram shot.
    Shoot,
}

impl fmt::Display for TrafficKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Input => write!(f, "input"),
            Self::Shoot => write!(f, "shoot"),
        }
    }
}

/// What every generator of a session shares.
#[derive(Debug, Clone, Copy)]
pub struct TrafficContext<'a> {
    pub endpoints: &'a ConnectionEndpoints,
    pub shared: &'a SessionShared,
    /// Sanitized bot name.
    pub name: &'a str,
}

/// Emits one kind of traffic at a fixed interval until the session stops.
pub struct Generator<R> {
    kind: TrafficKind,
    interval: Duration,
    rng: R,
}

impl<R: Rng> Generator<R> {
    /// `None` when `rate` disables this stream.
    pub fn new(kind: TrafficKind, rate: Rate, rng: R) -> Option<Self> {
        let interval = rate.interval()?;
        Some(Self {
            kind,
            interval,
            rng,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn run(mut self, ctx: &TrafficContext) {
        let Some(player_id) = ctx.shared.wait_for_identity() else {
            return;
        };
        debug!(
            "{}: {} generator started, one packet every {:?}",
            ctx.name, self.kind, self.interval
        );

        while !ctx.shared.stop.is_raised() {
            match self.emit(player_id, ctx) {
                Ok(()) => ctx.shared.stats.record_sent(self.kind),
                Err(SendError::Protocol(e)) => error!("{}: cannot encode {}: {e}", ctx.name, self.kind),
                Err(SendError::Io(e)) if self.kind == TrafficKind::Chat => {
                    warn!("{}: chat send failed, stopping chat: {e}", ctx.name);
                    break;
                }
                Err(SendError::Io(e)) => trace!("{}: {} datagram lost: {e}", ctx.name, self.kind),
            }

            if ctx.shared.stop.wait_timeout(self.interval).is_some() {
                break;
            }
        }

        debug!("{}: {} generator stopped", ctx.name, self.kind);
    }

    fn emit(&mut self, player_id: u16, ctx: &TrafficContext) -> Result<(), SendError> {
        match self.kind {
            TrafficKind::Chat => ctx
                .endpoints
                .send_stream_packet(PacketType::ChatMessage, &ascii_bytes(&chat_message(ctx.name))),
            TrafficKind::Input => {
                let payload = random_input(player_id, &mut self.rng);
                ctx.endpoints
                    .send_datagram_packet(PacketType::Input, &payload)
            }
            TrafficKind::Shoot => {
                let payload = random_shot(player_id, &mut self.rng);
                ctx.endpoints
                    .send_datagram_packet(PacketType::Shoot, &payload)
            }
        }
    }
}

pub fn chat_message(name: &str) -> String {
    format!("bot {name} ping")
}

/// Low 8 bits of `value`, so negative velocities go out in two's complement.
pub fn wrap_i8(value: i32) -> u8 {
    (value & 0xff) as u8
}

/// `player_id: u16 | 0 | 0 | vel_x | vel_y | direction`.
pub fn input_payload(player_id: u16, vel_x: i32, vel_y: i32, direction: i32) -> [u8; 7] {
    let [hi, lo] = player_id.to_be_bytes();
    [
        hi,
        lo,
        0,
        0,
        wrap_i8(vel_x),
        wrap_i8(vel_y),
        wrap_i8(direction),
    ]
}

/// `player_id: u16 | 0 | 0 | vel_x | vel_y`.
pub fn shoot_payload(player_id: u16, vel_x: i32, vel_y: i32) -> [u8; 6] {
    let [hi, lo] = player_id.to_be_bytes();
    [hi, lo, 0, 0, wrap_i8(vel_x), wrap_i8(vel_y)]
}

/// Wander in any direction: both velocities in -5..=5, direction code 0..=3.
pub fn random_input(player_id: u16, rng: &mut impl Rng) -> [u8; 7] {
    input_payload(
        player_id,
        rng.gen_range(-5..=5),
        rng.gen_range(-5..=5),
        rng.gen_range(0..=3),
    )
}

/// Shots lean forward: x in 2..=5, y in -1..=1.
pub fn random_shot(player_id: u16, rng: &mut impl Rng) -> [u8; 6] {
    shoot_payload(player_id, rng.gen_range(2..=5), rng.gen_range(-1..=1))
}
