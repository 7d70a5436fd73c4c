// SPDX-License-Identifier: MIT

use log::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use crate::config::BotConfig;
use crate::error::HandshakeError;
use crate::handshake::{Bootstrapped, Handshake};
use crate::reactor::IDLE_BACKOFF;
use crate::traffic::{Generator, TrafficContext, TrafficKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationElapsed,
    PeerClosed,
}

/// Cooperative shutdown flag. The first reason raised sticks.
#[derive(Debug, Default)]
pub struct StopSignal {
    reason: Mutex<Option<StopReason>>,
    cond: Condvar,
}

impl StopSignal {
    pub fn raise(&self, reason: StopReason) {
        let mut current = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_none() {
            *current = Some(reason);
            self.cond.notify_all();
        }
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_raised(&self) -> bool {
        self.reason().is_some()
    }

    /// Sleep for `timeout` unless stop is raised first. Returns the reason if it was.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<StopReason> {
        let guard = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |reason| reason.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[derive(Debug, Default)]
pub struct SessionStats {
    chat: AtomicU64,
    input: AtomicU64,
    shoot: AtomicU64,
    pong: AtomicU64,
    dropped_frames: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub chat: u64,
    pub input: u64,
    pub shoot: u64,
    pub pong: u64,
    pub dropped_frames: u64,
}

impl SessionStats {
    pub fn record_sent(&self, kind: TrafficKind) {
        let counter = match kind {
            TrafficKind::Chat => &self.chat,
            TrafficKind::Input => &self.input,
            TrafficKind::Shoot => &self.shoot,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pong(&self) {
        self.pong.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chat: self.chat.load(Ordering::Relaxed),
            input: self.input.load(Ordering::Relaxed),
            shoot: self.shoot.load(Ordering::Relaxed),
            pong: self.pong.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
        }
    }
}

/// The mutable part of a client session, shared by the dispatcher and every generator.
///
/// The identity is written once, by the dispatcher. The stop signal is raised by the lifecycle
/// when the duration runs out or by the dispatcher when the server goes away.
#[derive(Debug, Default)]
pub struct SessionShared {
    identity: OnceLock<u16>,
    pub stop: StopSignal,
    pub stats: SessionStats,
    last_ping: Mutex<Vec<u8>>,
}

impl SessionShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<u16> {
        self.identity.get().copied()
    }

    /// Set the player id. Once set it never changes; a later attempt gets the current id back.
    pub fn assign_identity(&self, id: u16) -> Result<(), u16> {
        self.identity
            .set(id)
            .map_err(|_| self.identity().unwrap_or(id))
    }

    /// Block until an identity is assigned. `None` if the session stops first.
    pub fn wait_for_identity(&self) -> Option<u16> {
        loop {
            if let Some(id) = self.identity() {
                return Some(id);
            }
            if self.stop.wait_timeout(IDLE_BACKOFF).is_some() {
                return None;
            }
        }
    }

    pub fn record_ping(&self, payload: Vec<u8>) {
        *self.last_ping.lock().unwrap_or_else(PoisonError::into_inner) = payload;
    }

    pub fn last_ping(&self) -> Vec<u8> {
        self.last_ping
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub name: String,
    pub player_id: u16,
    pub stats: StatsSnapshot,
    pub stop_reason: StopReason,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = &self.stats;
        write!(
            f,
            "{} (player {}): {} chat, {} input, {} shoot, {} pong, {} dropped frames; {}",
            self.name,
            self.player_id,
            s.chat,
            s.input,
            s.shoot,
            s.pong,
            s.dropped_frames,
            match self.stop_reason {
                StopReason::DurationElapsed => "ran to completion",
                StopReason::PeerClosed => "server closed the connection",
            }
        )
    }
}

/// One full bot session: handshake, concurrent traffic for `config.duration`, then a joined
/// shutdown.
pub fn run(config: &BotConfig) -> Result<SessionReport, HandshakeError> {
    let shared = SessionShared::new();
    let mut handshake = Handshake::new(config);
    let Bootstrapped {
        endpoints,
        dispatcher,
        player_id,
    } = handshake.run(&shared)?;

    info!(
        "{} joined lobby {:?} as player {player_id}, running for {:?}",
        config.name, config.lobby, config.duration
    );

    let ctx = TrafficContext {
        endpoints: &endpoints,
        shared: &shared,
        name: &config.name,
    };

    let generators: Vec<_> = [
        (TrafficKind::Chat, config.chat_rate),
        (TrafficKind::Input, config.input_rate),
        (TrafficKind::Shoot, config.shoot_rate),
    ]
    .into_iter()
    .enumerate()
    .filter_map(|(stream, (kind, rate))| {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream as u64)),
            None => StdRng::from_entropy(),
        };
        Generator::new(kind, rate, rng)
    })
    .collect();

    let stop_reason = thread::scope(|s| {
        s.spawn(|| dispatcher.run(&endpoints, &shared));
        for generator in generators {
            let ctx = &ctx;
            s.spawn(move || generator.run(ctx));
        }

        if shared.stop.wait_timeout(config.duration).is_none() {
            shared.stop.raise(StopReason::DurationElapsed);
        }
        shared.stop.reason()
    });

    let report = SessionReport {
        name: config.name.clone(),
        player_id,
        stats: shared.stats.snapshot(),
        stop_reason: stop_reason.unwrap_or(StopReason::DurationElapsed),
    };
    info!("session over: {report}");
    Ok(report)
}
