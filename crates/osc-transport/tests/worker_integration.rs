//! Integration tests for the network workers over loopback sockets.

use std::io::{Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use osc_core::{encode_message, frame, FrameDecoder, FrameMode, LogKind, NetworkEvent, Packet};
use osc_transport::infrastructure::network::{
    TcpClientWorker, UdpReceiveWorker, UdpSendWorker, WorkerTiming,
};
use rosc::OscType;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn timing(reconnect_delay: Duration) -> WorkerTiming {
    WorkerTiming {
        reconnect_delay,
        poll_interval: Duration::from_millis(10),
        recv_timeout: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(1),
        idle_sleep: Duration::from_millis(1),
        write_timeout: Duration::from_secs(1),
    }
}

fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

// ── UDP ───────────────────────────────────────────────────────────────────────

#[test]
fn test_udp_send_worker_to_receive_worker_preserves_order() {
    // Arrange
    let port = free_udp_port();
    let mut rx = UdpReceiveWorker::new(timing(Duration::from_millis(100)));
    rx.start("127.0.0.1", port).unwrap();
    let mut tx = UdpSendWorker::new(timing(Duration::from_millis(100)));
    tx.start("127.0.0.1", port).unwrap();

    // Wait until the listener is bound before sending for real
    let mut log = Vec::new();
    let mut packets = Vec::new();
    assert!(wait_for(Duration::from_secs(3), || {
        rx.flush(&mut log, &mut packets);
        log.iter().any(|m| m.text.ends_with("socket bound"))
    }));

    // Act
    for i in 0..20 {
        let packet = encode_message("/seq", vec![OscType::Int(i)]).unwrap();
        assert!(tx.send(packet));
    }
    let all_arrived = wait_for(Duration::from_secs(3), || {
        rx.flush(&mut log, &mut packets);
        packets.len() >= 20
    });
    tx.stop();
    rx.stop();

    // Assert – loopback UDP does not reorder
    assert!(all_arrived, "only {} packets arrived", packets.len());
    for (i, packet) in packets.iter().enumerate() {
        let expected = encode_message("/seq", vec![OscType::Int(i as i32)]).unwrap();
        assert_eq!(packet, &expected);
    }
    let first_line = format!("IN  [127.0.0.1:{port}] /seq, 0(i)");
    assert!(log.iter().any(|m| m.kind == LogKind::Recv && m.text == first_line));
    assert_eq!(tx.stats().packets_sent, 20);
    assert_eq!(rx.stats().packets_received, 20);
}

#[test]
fn test_udp_receive_reconnect_attempts_follow_delay() {
    // Arrange – the port stays occupied for the whole test
    let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();
    let mut rx = UdpReceiveWorker::new(timing(Duration::from_millis(200)));

    // Act
    rx.start("127.0.0.1", port).unwrap();
    thread::sleep(Duration::from_millis(1_000));
    rx.stop();

    // Assert – one attempt at t=0, then one per 200 ms
    let attempts = rx.stats().connect_attempts;
    assert!((3..=7).contains(&attempts), "attempts = {attempts}");
}

#[test]
fn test_udp_send_reconnect_attempts_follow_delay() {
    // Arrange – the target never resolves
    let mut tx = UdpSendWorker::new(timing(Duration::from_millis(200)));

    // Act
    tx.start("host.invalid", 8000).unwrap();
    thread::sleep(Duration::from_millis(1_000));
    tx.stop();

    // Assert – one attempt at t=0, then at most one per 200 ms
    let attempts = tx.stats().connect_attempts;
    assert!((2..=7).contains(&attempts), "attempts = {attempts}");
    let (log, _, events) = tx.drain().into_parts();
    assert!(events.is_empty());
    assert!(log
        .iter()
        .any(|m| m.kind == LogKind::Error && m.text.starts_with("udp output host.invalid:8000")));
    assert!(log.iter().any(|m| m.text == "udp output host.invalid:8000 reconnecting in 0..."));
}

#[test]
fn test_stop_during_reconnect_sleep_returns_promptly() {
    // Arrange
    let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();
    let mut rx = UdpReceiveWorker::new(timing(Duration::from_secs(30)));
    rx.start("127.0.0.1", port).unwrap();
    assert!(wait_for(Duration::from_secs(2), || rx.stats().connect_attempts >= 1));
    thread::sleep(Duration::from_millis(50));

    // Act
    let started = Instant::now();
    rx.stop();

    // Assert
    assert!(started.elapsed() < Duration::from_millis(500), "{:?}", started.elapsed());
}

// ── TCP ───────────────────────────────────────────────────────────────────────

/// Accepts one connection and echoes every byte back until the peer closes.
fn spawn_echo_server() -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            }
        }
    });
    (port, handle)
}

#[test]
fn test_tcp_echo_round_trip_in_both_frame_modes() {
    for mode in [FrameMode::PacketLength, FrameMode::Slip] {
        // Arrange
        let (port, server) = spawn_echo_server();
        let mut client = TcpClientWorker::new(timing(Duration::from_millis(100)));
        client.start("127.0.0.1", port, mode).unwrap();

        // Act – payloads include the SLIP special bytes
        let payloads: Vec<Vec<u8>> = vec![
            b"plain".to_vec(),
            vec![0xC0, 0xDB, 0x00, 0xC0],
            encode_message("/eos/ping", vec![]).unwrap().into_vec(),
        ];
        for payload in &payloads {
            assert!(client.send(Packet::from_slice(payload)));
        }

        let mut log = Vec::new();
        let mut packets = Vec::new();
        let mut events = Vec::new();
        let echoed = wait_for(Duration::from_secs(3), || {
            client.flush(&mut log, &mut packets, &mut events);
            packets.len() >= payloads.len()
        });
        client.stop();
        server.join().unwrap();

        // Assert
        assert!(echoed, "{mode}: only {} packets echoed", packets.len());
        let bodies: Vec<Vec<u8>> = packets.iter().map(|p| p.as_bytes().to_vec()).collect();
        assert_eq!(bodies, payloads, "{mode}");
        assert_eq!(events.first(), Some(&NetworkEvent::Connected));
    }
}

#[test]
fn test_tcp_frames_split_byte_by_byte_are_reassembled() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = TcpClientWorker::new(timing(Duration::from_millis(100)));
    client.start("127.0.0.1", port, FrameMode::PacketLength).unwrap();
    let (mut peer, _) = listener.accept().unwrap();
    peer.set_nodelay(true).unwrap();

    let mut wire = frame(FrameMode::PacketLength, b"first").unwrap();
    wire.extend(frame(FrameMode::PacketLength, b"second").unwrap());

    // Act
    for byte in &wire {
        peer.write_all(std::slice::from_ref(byte)).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    // Assert
    let mut log = Vec::new();
    let mut packets = Vec::new();
    let mut events = Vec::new();
    assert!(wait_for(Duration::from_secs(3), || {
        client.flush(&mut log, &mut packets, &mut events);
        packets.len() >= 2
    }));
    client.stop();
    assert_eq!(packets[0].as_bytes(), b"first");
    assert_eq!(packets[1].as_bytes(), b"second");
}

#[test]
fn test_tcp_reconnects_after_peer_closes() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = TcpClientWorker::new(timing(Duration::from_millis(100)));
    client.start("127.0.0.1", port, FrameMode::Slip).unwrap();

    // Act – accept and drop twice
    let (first, _) = listener.accept().unwrap();
    drop(first);
    let (second, _) = listener.accept().unwrap();

    // Assert
    let mut events = Vec::new();
    assert!(wait_for(Duration::from_secs(3), || {
        let (_, _, mut drained) = client.drain().into_parts();
        events.append(&mut drained);
        events.len() >= 3
    }));
    drop(second);
    client.stop();
    assert_eq!(
        &events[..3],
        &[NetworkEvent::Connected, NetworkEvent::Disconnected, NetworkEvent::Connected]
    );
    assert!(client.stats().connect_attempts >= 2);
}

#[test]
fn test_tcp_client_sends_framed_osc_to_listener() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = TcpClientWorker::new(timing(Duration::from_millis(100)));
    client.start("127.0.0.1", port, FrameMode::Slip).unwrap();
    let (mut peer, _) = listener.accept().unwrap();
    peer.set_read_timeout(Some(Duration::from_millis(50))).unwrap();

    // Act
    let packet = encode_message("/eos/key/go_0", vec![OscType::Float(1.0)]).unwrap();
    let expected = packet.as_bytes().to_vec();
    assert!(client.send(packet));

    let mut decoder = FrameDecoder::new(FrameMode::Slip);
    let mut received = None;
    let mut buf = [0u8; 256];
    let deadline = Instant::now() + Duration::from_secs(3);
    while received.is_none() && Instant::now() < deadline {
        if let Ok(n) = peer.read(&mut buf) {
            decoder.push(&buf[..n]);
        }
        received = decoder.next_frame().unwrap();
    }
    client.stop();

    // Assert
    assert_eq!(received.unwrap().as_bytes(), &expected[..]);
}

#[test]
fn test_tcp_reset_with_queued_packets_disconnects_and_reconnects() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = TcpClientWorker::new(timing(Duration::from_millis(100)));
    client.start("127.0.0.1", port, FrameMode::Slip).unwrap();
    let (first, _) = listener.accept().unwrap();

    // Act – queue traffic, then abort the connection with RST
    for i in 0..5 {
        assert!(client.send(encode_message("/queued", vec![OscType::Int(i)]).unwrap()));
    }
    thread::sleep(Duration::from_millis(30));
    socket2::SockRef::from(&first)
        .set_linger(Some(Duration::ZERO))
        .unwrap();
    drop(first);
    let (second, _) = listener.accept().unwrap();

    // Assert
    let mut log = Vec::new();
    let mut packets = Vec::new();
    let mut events = Vec::new();
    assert!(wait_for(Duration::from_secs(3), || {
        client.flush(&mut log, &mut packets, &mut events);
        events.len() >= 3
    }));
    drop(second);
    client.stop();
    assert_eq!(
        &events[..3],
        &[NetworkEvent::Connected, NetworkEvent::Disconnected, NetworkEvent::Connected]
    );
    let receive_failed = format!("tcp client 127.0.0.1:{port} receive failed");
    let send_failed = format!("TCPOUT [127.0.0.1:{port}] send failed");
    assert!(log.iter().any(|m| m.kind == LogKind::Error
        && (m.text.starts_with(&receive_failed) || m.text.starts_with(&send_failed))));
}

#[test]
fn test_tcp_unreachable_target_logs_error_and_retries() {
    // Arrange – 10.255.255.1 either blackholes (connect timeout) or is
    // unroutable (immediate error); both are failed attempts
    let mut config = timing(Duration::from_millis(50));
    config.connect_timeout = Duration::from_millis(200);
    let mut client = TcpClientWorker::new(config);

    // Act
    client.start("10.255.255.1", 9, FrameMode::Slip).unwrap();
    let retried = wait_for(Duration::from_secs(3), || client.stats().connect_attempts >= 2);
    client.stop();

    // Assert
    assert!(retried);
    let (log, _, events) = client.drain().into_parts();
    assert!(events.is_empty());
    let failed = "tcp client 10.255.255.1:9 failed";
    assert!(log.iter().any(|m| m.kind == LogKind::Error && m.text.starts_with(failed)));
}

#[test]
fn test_stop_while_connecting_returns_well_before_connect_timeout() {
    // Arrange
    let mut config = timing(Duration::from_secs(30));
    config.connect_timeout = Duration::from_secs(10);
    let mut client = TcpClientWorker::new(config);
    client.start("10.255.255.1", 9, FrameMode::PacketLength).unwrap();
    assert!(wait_for(Duration::from_secs(2), || client.stats().connect_attempts >= 1));
    thread::sleep(Duration::from_millis(50));

    // Act
    let started = Instant::now();
    client.stop();

    // Assert
    assert!(started.elapsed() < Duration::from_millis(500), "{:?}", started.elapsed());
    assert!(!client.is_running());
    let (log, _, _) = client.drain().into_parts();
    assert_eq!(log.last().unwrap().text, "tcp client 10.255.255.1:9 thread ended");
}
