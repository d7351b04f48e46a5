//! End-to-end tests of `ServerManager` over real UDP and TCP sockets.
//!
//! A runtime is built with `build_server` on ephemeral ports; plain std
//! sockets play the remote nodes.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rovecomm_core::protocol::{system, HEADER_SIZE};
use rovecomm_core::{decode_packet, encode_packet, ElementType, Endpoint, Packet};
use rovecomm_node::application::dispatch::{RuntimeState, ServerManager};
use rovecomm_node::application::transport::Protocols;
use rovecomm_node::infrastructure::network::build_server;
use rovecomm_node::infrastructure::storage::config::NodeConfig;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn running_server() -> ServerManager {
    let mut config = NodeConfig::default();
    config.network.udp_port = 0;
    config.network.tcp_port = 0;
    config.network.poll_interval_ms = 1;
    let server = build_server(&config, Arc::new(config.manifest()));
    server.init().expect("runtime starts");
    server
}

fn udp_endpoint(server: &ServerManager) -> String {
    format!("127.0.0.1:{}", server.udp_port().expect("udp bound"))
}

fn udp_peer() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind peer");
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("read timeout");
    socket
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

// ── Ping ──────────────────────────────────────────────────────────────────────

#[test]
fn test_udp_ping_is_answered_with_ping_reply() {
    // Arrange
    let server = running_server();
    let peer = udp_peer();
    let ping = Packet::new(system::PING, ElementType::UInt8, &[1u8, 2]).unwrap();

    // Act
    peer.send_to(&encode_packet(&ping), udp_endpoint(&server))
        .expect("send ping");
    let mut buf = [0u8; 64];
    let (len, _) = peer.recv_from(&mut buf).expect("reply within timeout");
    let reply = decode_packet(&buf[..len]).expect("valid reply");

    // Assert
    assert_eq!(reply.data_id(), system::PING_REPLY);
    assert_eq!(reply.payload(), &[1, 2]);
}

#[test]
fn test_tcp_ping_is_answered_on_the_same_connection() {
    // Arrange
    let server = running_server();
    let port = server.tcp_port().expect("tcp bound");
    let mut client = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    client
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("read timeout");

    // Act
    client
        .write_all(&encode_packet(&Packet::empty(system::PING)))
        .expect("send ping");
    let mut header = [0u8; HEADER_SIZE];
    client.read_exact(&mut header).expect("reply header");

    // Assert: an empty PING_REPLY frame.
    assert_eq!(decode_packet(&header).unwrap().data_id(), system::PING_REPLY);
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[test]
fn test_claimed_packets_skip_the_queue_and_others_are_queued() {
    // Arrange
    let server = running_server();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    server.set_callback(2000, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let peer = udp_peer();
    let target = udp_endpoint(&server);

    // Act
    for packet in [
        Packet::new(2000, ElementType::UInt8, &[1u8]).unwrap(),
        Packet::new(4000, ElementType::Int32, &[-5i32]).unwrap(),
    ] {
        peer.send_to(&encode_packet(&packet), &target).expect("send");
    }

    // Assert
    assert!(wait_until(|| hits.load(Ordering::SeqCst) == 1 && server.pending() == 1));
    let queued = server.next().expect("unclaimed packet");
    assert_eq!(queued.data_id(), 4000);
    assert_eq!(queued.elements::<i32>().unwrap(), vec![-5]);
    assert_eq!(
        queued.source(),
        Some(Endpoint::try_from(peer.local_addr().unwrap()).unwrap())
    );
    assert!(server.next().is_none());
}

#[test]
fn test_wildcard_callback_sees_every_packet() {
    // Arrange
    let server = running_server();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    server.set_callback(system::ANY, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let peer = udp_peer();
    let target = udp_endpoint(&server);

    // Act
    for data_id in [4001u16, 4002, 4003] {
        let packet = Packet::new(data_id, ElementType::UInt8, &[0u8]).unwrap();
        peer.send_to(&encode_packet(&packet), &target).expect("send");
    }

    // Assert
    assert!(wait_until(|| seen.load(Ordering::SeqCst) == 3));
    assert_eq!(server.pending(), 0);
}

// ── Subscriptions through the runtime ─────────────────────────────────────────

#[test]
fn test_two_runtimes_exchange_packets_after_subscribing() {
    // Arrange
    let publisher = running_server();
    let subscriber = running_server();
    let publisher_udp = Endpoint::new([127, 0, 0, 1], publisher.udp_port().unwrap());
    let publisher_tcp = Endpoint::new([127, 0, 0, 1], publisher.tcp_port().unwrap());
    let sources = Arc::new(Mutex::new(HashSet::new()));
    let recorder = Arc::clone(&sources);
    subscriber.set_callback(2101, move |packet| {
        if packet.elements::<f32>().map(|v| v == [12.5]).unwrap_or(false) {
            if let Some(source) = packet.source() {
                recorder.lock().unwrap().insert(source);
            }
        }
    });

    // Act
    assert_eq!(subscriber.subscribe_to(publisher_udp, Protocols::UDP), 1);
    assert_eq!(subscriber.subscribe_to(publisher_tcp, Protocols::TCP), 1);
    let reached_both = wait_until(|| {
        publisher
            .write_elements(2101, ElementType::Float32, &[12.5f32], Protocols::ALL)
            .expect("matches manifest")
            == 2
    });

    // Assert: one copy came from each of the publisher's transports.
    assert!(reached_both);
    assert!(wait_until(|| {
        let sources = sources.lock().unwrap();
        sources.contains(&publisher_udp) && sources.contains(&publisher_tcp)
    }));
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[test]
fn test_shutdown_releases_both_ports() {
    // Arrange
    let server = running_server();
    let udp_port = server.udp_port().unwrap();

    // Act
    server.shutdown();

    // Assert
    assert_eq!(server.state(), RuntimeState::Stopped);
    assert_eq!(server.udp_port(), None);
    assert_eq!(server.tcp_port(), None);
    assert!(UdpSocket::bind(("0.0.0.0", udp_port)).is_ok());
}
