#![allow(dead_code)]

use mystic_stress::framing::{self, ReceiveBuffer};
use mystic_stress::packet::{self, Packet, PacketType};

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(20);

/// What the fake server does with a connection.
#[derive(Default, Clone)]
pub struct Script {
    /// Written right after the ClientHello arrives, one write per entry.
    pub after_hello: Vec<Vec<u8>>,
    /// Hang up when this packet type arrives.
    pub close_on: Option<PacketType>,
}

/// A TCP listener and a UDP socket on the same port, recording every packet they receive.
pub struct MockServer {
    pub port: u16,
    stream_log: Arc<Mutex<Vec<Packet>>>,
    datagram_log: Arc<Mutex<Vec<Packet>>>,
    done: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

pub struct Captured {
    pub stream: Vec<Packet>,
    pub datagrams: Vec<Packet>,
}

impl Captured {
    pub fn stream_of(&self, kind: PacketType) -> Vec<&Packet> {
        self.stream
            .iter()
            .filter(|p| p.packet_type() == Some(kind))
            .collect()
    }

    pub fn datagrams_of(&self, kind: PacketType) -> Vec<&Packet> {
        self.datagrams
            .iter()
            .filter(|p| p.packet_type() == Some(kind))
            .collect()
    }
}

impl MockServer {
    pub fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let udp = UdpSocket::bind(("127.0.0.1", port)).unwrap();

        let stream_log = Arc::new(Mutex::new(Vec::new()));
        let datagram_log = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicBool::new(false));

        let tcp_thread = {
            let log = Arc::clone(&stream_log);
            let done = Arc::clone(&done);
            thread::spawn(move || serve_stream(listener, script, log, done))
        };
        let udp_thread = {
            let log = Arc::clone(&datagram_log);
            let done = Arc::clone(&done);
            thread::spawn(move || serve_datagrams(udp, log, done))
        };

        Self {
            port,
            stream_log,
            datagram_log,
            done,
            threads: vec![tcp_thread, udp_thread],
        }
    }

    /// Stop serving and hand back everything received. Call after the bot is gone.
    pub fn finish(mut self) -> Captured {
        // Give in-flight datagrams a moment to land.
        thread::sleep(Duration::from_millis(100));
        self.done.store(true, Ordering::Release);
        for thread in self.threads.drain(..) {
            thread.join().unwrap();
        }

        Captured {
            stream: self.stream_log.lock().unwrap().clone(),
            datagrams: self.datagram_log.lock().unwrap().clone(),
        }
    }
}

fn serve_stream(
    listener: TcpListener,
    script: Script,
    log: Arc<Mutex<Vec<Packet>>>,
    done: Arc<AtomicBool>,
) {
    listener.set_nonblocking(true).unwrap();
    let mut stream = loop {
        match listener.accept() {
            Ok((stream, _)) => break stream,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if done.load(Ordering::Acquire) {
                    return;
                }
                thread::sleep(TICK);
            }
            Err(e) => panic!("accept failed: {e}"),
        }
    };
    stream.set_nonblocking(false).unwrap();
    stream.set_read_timeout(Some(TICK)).unwrap();

    let mut buffer = ReceiveBuffer::new();
    let mut chunk = [0; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => buffer.extend(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if done.load(Ordering::Acquire) {
                    return;
                }
                continue;
            }
            Err(_) => return,
        }

        for body in buffer.drain_frames() {
            let Ok(packet) = packet::decode(&body) else {
                continue;
            };
            let kind = packet.packet_type();
            log.lock().unwrap().push(packet);

            if kind == Some(PacketType::ClientHello) {
                for bytes in &script.after_hello {
                    stream.write_all(bytes).unwrap();
                    stream.flush().unwrap();
                    thread::sleep(Duration::from_millis(5));
                }
            }
            if kind.is_some() && kind == script.close_on {
                return;
            }
        }
    }
}

fn serve_datagrams(udp: UdpSocket, log: Arc<Mutex<Vec<Packet>>>, done: Arc<AtomicBool>) {
    udp.set_read_timeout(Some(TICK)).unwrap();
    let mut buf = [0; 2048];
    while !done.load(Ordering::Acquire) {
        match udp.recv_from(&mut buf) {
            Ok((n, _)) => {
                if let Ok(packet) = packet::decode(&buf[..n]) {
                    log.lock().unwrap().push(packet);
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => panic!("udp recv failed: {e}"),
        }
    }
}

pub fn stream_frame(kind: PacketType, payload: &[u8]) -> Vec<u8> {
    framing::frame(&packet::encode(kind, payload).unwrap()).unwrap()
}

pub fn ok_frame(player_id: u16) -> Vec<u8> {
    stream_frame(PacketType::Ok, &player_id.to_be_bytes())
}

pub fn ping_frame(payload: &[u8]) -> Vec<u8> {
    stream_frame(PacketType::Ping, payload)
}

pub fn bad_magic_frame() -> Vec<u8> {
    framing::frame(&[0xde, 0xad, PacketType::Ok as u8, 2, 0x00, 0x07]).unwrap()
}
