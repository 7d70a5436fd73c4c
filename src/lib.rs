// SPDX-License-Identifier: MIT

//! Load generator for the Mystic-Type game server.
//!
//! Each bot opens a TCP control stream and a UDP data socket to the server, performs the
//! hello/identity/lobby/UDP-registration handshake, then answers keepalives while sending chat,
//! movement and shooting traffic at fixed rates until its run time is over.

pub mod config;
pub mod dispatcher;
pub mod endpoints;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod packet;
pub mod reactor;
pub mod session;
pub mod traffic;

pub use config::{BotConfig, Rate};
pub use error::{DecodeError, HandshakeError, ProtocolError, SendError};
pub use session::{SessionReport, StopReason, run};
