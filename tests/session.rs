mod common;

use common::{MockServer, Script, bad_magic_frame, ok_frame, ping_frame};
use mystic_stress::handshake::{Handshake, HandshakeState};
use mystic_stress::packet::PacketType;
use mystic_stress::session::SessionShared;
use mystic_stress::{BotConfig, HandshakeError, Rate, StopReason};

use std::time::{Duration, Instant};

fn config_for(server: &MockServer, name: &str) -> BotConfig {
    let mut config = BotConfig::new("127.0.0.1", server.port, "PUBLIC", name);
    config.identity_timeout = Duration::from_secs(2);
    config.seed = Some(1234);
    config
}

fn replies(frames: &[Vec<u8>]) -> Script {
    Script {
        after_hello: frames.to_vec(),
        ..Script::default()
    }
}

#[test]
fn handshake_registers_udp_with_assigned_id() {
    let server = MockServer::start(replies(&[ok_frame(42)]));
    let config = config_for(&server, "Pl@yer_One!!");

    let shared = SessionShared::new();
    let mut handshake = Handshake::new(&config);
    let bootstrapped = handshake.run(&shared).unwrap();

    assert_eq!(handshake.state(), HandshakeState::UdpRegistered);
    assert_eq!(bootstrapped.player_id, 42);
    assert_eq!(shared.identity(), Some(42));
    drop(bootstrapped);

    let captured = server.finish();
    let kinds: Vec<_> = captured.stream.iter().map(|p| p.packet_type()).collect();
    assert_eq!(
        kinds,
        [Some(PacketType::ClientHello), Some(PacketType::JoinLobby)]
    );
    assert_eq!(captured.stream[0].payload, b"toto|Plyer_One");
    assert_eq!(captured.stream[1].payload, b"PUBLIC");

    let hello = captured.datagrams_of(PacketType::HelloUdp);
    assert_eq!(hello.len(), 1);
    assert_eq!(hello[0].payload, [0x00, 0x2a, 0, 0]);
}

#[test]
fn silent_server_times_out_the_handshake() {
    let server = MockServer::start(Script::default());
    let mut config = config_for(&server, "quiet");
    config.identity_timeout = Duration::from_millis(300);
    config.input_rate = Rate(50.0);

    let start = Instant::now();
    let err = mystic_stress::run(&config).unwrap_err();
    assert!(matches!(err, HandshakeError::NoIdentity(_)), "{err}");
    assert!(start.elapsed() >= Duration::from_millis(300));

    let captured = server.finish();
    assert!(captured.stream_of(PacketType::JoinLobby).is_empty());
    assert!(captured.datagrams.is_empty());
}

#[test]
fn connect_failure_is_reported() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = BotConfig::new("127.0.0.1", port, "PUBLIC", "nobody");

    let err = mystic_stress::run(&config).unwrap_err();
    assert!(matches!(err, HandshakeError::Connect { .. }), "{err}");
}

#[test]
fn second_ok_does_not_change_identity() {
    let server = MockServer::start(replies(&[ok_frame(42), ok_frame(7)]));
    let mut config = config_for(&server, "dup");
    config.duration = Duration::from_millis(400);
    config.input_rate = Rate(50.0);

    let report = mystic_stress::run(&config).unwrap();
    assert_eq!(report.player_id, 42);
    assert!(report.stats.input > 0);

    let captured = server.finish();
    let inputs = captured.datagrams_of(PacketType::Input);
    assert!(!inputs.is_empty());
    for input in inputs {
        assert_eq!(&input.payload[..4], &[0x00, 0x2a, 0, 0]);
        assert_eq!(input.payload.len(), 7);
    }
}

#[test]
fn every_ping_gets_one_matching_pong() {
    let last_ping = ping_frame(&[9; 200]);
    let (head, tail) = last_ping.split_at(3);
    let server = MockServer::start(replies(&[
        ok_frame(42),
        ping_frame(&[1, 2, 3]),
        bad_magic_frame(),
        ping_frame(&[]),
        head.to_vec(),
        tail.to_vec(),
    ]));
    let mut config = config_for(&server, "ponger");
    config.duration = Duration::from_millis(500);

    let report = mystic_stress::run(&config).unwrap();
    assert_eq!(report.player_id, 42);
    assert_eq!(report.stats.pong, 3);
    assert_eq!(report.stats.dropped_frames, 1);
    assert_eq!(report.stop_reason, StopReason::DurationElapsed);

    let captured = server.finish();
    let pongs: Vec<_> = captured
        .stream_of(PacketType::Pong)
        .into_iter()
        .map(|p| p.payload.clone())
        .collect();
    assert_eq!(pongs, [vec![1, 2, 3], vec![], vec![9; 200]]);
}

#[test]
fn disabled_chat_sends_nothing() {
    let server = MockServer::start(replies(&[ok_frame(1)]));
    let mut config = config_for(&server, "mute");
    config.duration = Duration::from_secs(2);
    config.chat_rate = Rate(0.0);
    config.shoot_rate = Rate(10.0);

    let report = mystic_stress::run(&config).unwrap();
    assert_eq!(report.stats.chat, 0);
    assert!(report.stats.shoot > 0);

    let captured = server.finish();
    assert!(captured.stream_of(PacketType::ChatMessage).is_empty());
    for shot in captured.datagrams_of(PacketType::Shoot) {
        assert_eq!(shot.payload.len(), 6);
        assert!((2..=5).contains(&(shot.payload[4] as i8)));
    }
}

#[test]
fn chat_follows_its_rate() {
    let server = MockServer::start(replies(&[ok_frame(1)]));
    let mut config = config_for(&server, "Chatty");
    config.duration = Duration::from_secs(2);
    config.chat_rate = Rate(5.0);

    let report = mystic_stress::run(&config).unwrap();
    assert!(
        (8..=12).contains(&report.stats.chat),
        "sent {} chat messages",
        report.stats.chat
    );

    let captured = server.finish();
    let chats = captured.stream_of(PacketType::ChatMessage);
    assert_eq!(chats.len() as u64, report.stats.chat);
    assert_eq!(chats[0].payload, b"bot Chatty ping");
}

#[test]
fn server_hangup_ends_the_session_early() {
    let server = MockServer::start(Script {
        after_hello: vec![ok_frame(3)],
        close_on: Some(PacketType::JoinLobby),
    });
    let mut config = config_for(&server, "dropped");
    config.duration = Duration::from_secs(30);
    config.chat_rate = Rate(20.0);
    config.input_rate = Rate(20.0);

    let start = Instant::now();
    let report = mystic_stress::run(&config).unwrap();
    assert_eq!(report.stop_reason, StopReason::PeerClosed);
    assert!(start.elapsed() < Duration::from_secs(10));

    server.finish();
}
