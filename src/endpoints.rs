// SPDX-License-Identifier: MIT

use log::*;

use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::SendError;
use crate::framing;
use crate::packet::{self, PacketType};

/// The two sockets of one bot: a TCP stream for control traffic and a UDP socket connected to
/// the same server address for real-time state.
///
/// The stream stays in blocking mode so that writers never see `WouldBlock`; the reader side uses
/// per-call `MSG_DONTWAIT` instead.
#[derive(Debug)]
pub struct ConnectionEndpoints {
    reader: TcpStream,
    writer: Mutex<TcpStream>,
    datagram: UdpSocket,
    remote: SocketAddr,
}

impl ConnectionEndpoints {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match Self::connect_addr(addr, timeout) {
                Ok(endpoints) => return Ok(endpoints),
                Err(e) => {
                    debug!("connect to {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }

    fn connect_addr(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;

        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let datagram = UdpSocket::bind(local)?;
        datagram.connect(addr)?;

        Ok(Self {
            writer: Mutex::new(stream.try_clone()?),
            reader: stream,
            datagram,
            remote: addr,
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn stream_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Write raw bytes to the stream. Concurrent callers are serialized so frames never
    /// interleave.
    pub fn send_stream(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(bytes)
    }

    /// Best effort: the network may drop it, and that is fine.
    pub fn send_datagram(&self, bytes: &[u8]) -> io::Result<()> {
        self.datagram.send(bytes).map(|_| ())
    }

    /// Encode, frame and send one packet on the stream.
    pub fn send_stream_packet(&self, kind: PacketType, payload: &[u8]) -> Result<(), SendError> {
        let bytes = framing::frame(&packet::encode(kind, payload)?)?;
        trace!("stream -> {kind:?} ({} byte payload)", payload.len());
        Ok(self.send_stream(&bytes)?)
    }

    /// Encode and send one packet as a single datagram.
    pub fn send_datagram_packet(&self, kind: PacketType, payload: &[u8]) -> Result<(), SendError> {
        let bytes = packet::encode(kind, payload)?;
        trace!("datagram -> {kind:?} ({} byte payload)", payload.len());
        Ok(self.send_datagram(&bytes)?)
    }

    /// Read whatever the stream has without blocking. `Ok(0)` means the peer closed the stream;
    /// no data yet is an error of kind `WouldBlock`.
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: buf is valid for writes of buf.len() bytes for the whole call.
        let n = unsafe {
            libc::recv(
                self.reader.as_raw_fd(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                libc::MSG_DONTWAIT,
            )
        };

        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}
