// SPDX-License-Identifier: MIT

//! Bootstrap of one bot connection, strictly in order:
//! connect, ClientHello, wait for the OK carrying our id, JoinLobby, then the UDP hello that
//! ties our datagram source address to that id.

use log::*;

use std::fmt;
use std::time::Instant;

use crate::config::{BotConfig, ascii_bytes};
use crate::dispatcher::{Dispatcher, Inbound, POLL_TIMEOUT};
use crate::endpoints::ConnectionEndpoints;
use crate::error::HandshakeError;
use crate::packet::PacketType;
use crate::reactor::Readiness;
use crate::session::SessionShared;

/// Sent ahead of the name in ClientHello.
pub const PROTOCOL_TAG: &str = "toto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Connecting,
    HelloSent,
    AwaitingIdentity,
    LobbyJoined,
    UdpRegistered,
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything a finished handshake hands over to the session.
#[derive(Debug)]
pub struct Bootstrapped {
    pub endpoints: ConnectionEndpoints,
    /// Carries any bytes that arrived after the OK.
    pub dispatcher: Dispatcher,
    pub player_id: u16,
}

pub struct Handshake<'a> {
    config: &'a BotConfig,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    pub fn new(config: &'a BotConfig) -> Self {
        Self {
            config,
            state: HandshakeState::Connecting,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Drive every step. Any failure leaves the handshake in [`HandshakeState::Failed`].
    pub fn run(&mut self, shared: &SessionShared) -> Result<Bootstrapped, HandshakeError> {
        self.drive(shared).inspect_err(|e| {
            warn!(
                "{}: handshake failed while {}: {e}",
                self.config.name, self.state
            );
            self.state = HandshakeState::Failed;
        })
    }

    fn drive(&mut self, shared: &SessionShared) -> Result<Bootstrapped, HandshakeError> {
        let config = self.config;

        let endpoints =
            ConnectionEndpoints::connect(&config.host, config.port, config.connect_timeout)
                .map_err(|source| HandshakeError::Connect {
                    target: config.target(),
                    source,
                })?;
        debug!("{}: connected to {}", config.name, endpoints.remote());

        let hello = format!("{PROTOCOL_TAG}|{}", config.name);
        endpoints.send_stream_packet(PacketType::ClientHello, &ascii_bytes(&hello))?;
        self.advance(HandshakeState::HelloSent);

        self.advance(HandshakeState::AwaitingIdentity);
        let mut dispatcher = Dispatcher::new();
        let player_id = self.await_identity(&endpoints, &mut dispatcher, shared)?;

        endpoints.send_stream_packet(PacketType::JoinLobby, &ascii_bytes(&config.lobby))?;
        self.advance(HandshakeState::LobbyJoined);

        endpoints.send_datagram_packet(PacketType::HelloUdp, &udp_hello_payload(player_id))?;
        self.advance(HandshakeState::UdpRegistered);

        Ok(Bootstrapped {
            endpoints,
            dispatcher,
            player_id,
        })
    }

    fn await_identity(
        &self,
        endpoints: &ConnectionEndpoints,
        dispatcher: &mut Dispatcher,
        shared: &SessionShared,
    ) -> Result<u16, HandshakeError> {
        let timeout = self.config.identity_timeout;
        let deadline = Instant::now() + timeout;
        let mut readiness = Readiness::new(endpoints.stream_fd());

        loop {
            if let Some(id) = shared.identity() {
                return Ok(id);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HandshakeError::NoIdentity(timeout));
            }

            let inbound =
                dispatcher.poll_once(endpoints, shared, &mut readiness, remaining.min(POLL_TIMEOUT))?;
            if inbound == Inbound::PeerClosed {
                return Err(HandshakeError::PeerClosed);
            }
        }
    }

    fn advance(&mut self, next: HandshakeState) {
        debug!("{}: handshake {} -> {next}", self.config.name, self.state);
        self.state = next;
    }
}

/// `player_id: u16 | 0u8 | 0u8`.
pub fn udp_hello_payload(player_id: u16) -> [u8; 4] {
    let [hi, lo] = player_id.to_be_bytes();
    [hi, lo, 0, 0]
}
