//! End-to-end data-plane proxy scenarios, driven purely through the public
//! API: `proxy::run` loops wired together over loopback UDP sockets, with
//! directly-constructed `Session`s standing in for a completed handshake
//! (the handshake itself is covered by `handshake::engine`'s own tests).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secure_tunnel::core::Role;
use secure_tunnel::crypto::Session;
use secure_tunnel::frame::encode;
use secure_tunnel::proxy::{self, ProxyConfig};
use secure_tunnel::registry::AeadAlgorithm;
use secure_tunnel::status::StatusSnapshot;
use tokio::net::UdpSocket;
use tokio::sync::watch;

fn free_addr() -> SocketAddr {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}

fn paired_sessions(peer_pin: SocketAddr) -> (Session, Session) {
    let k_d2g = vec![0xAAu8; 32];
    let k_g2d = vec![0xBBu8; 32];
    let suite_id = "ML-KEM-768+ML-DSA-65+AES-256-GCM".to_string();
    let drone = Session::new(
        1,
        suite_id.clone(),
        0,
        AeadAlgorithm::Aes256Gcm,
        Role::Drone,
        k_d2g.clone(),
        k_g2d.clone(),
        peer_pin,
    );
    let gcs = Session::new(
        1,
        suite_id,
        0,
        AeadAlgorithm::Aes256Gcm,
        Role::Gcs,
        k_d2g,
        k_g2d,
        peer_pin,
    );
    (drone, gcs)
}

struct TwoSidedHarness {
    drone_encrypted: SocketAddr,
    gcs_encrypted: SocketAddr,
    drone_plaintext_tx: SocketAddr,
    gcs_plaintext_rx: SocketAddr,
    drone_session_tx: watch::Sender<Option<Arc<Session>>>,
    gcs_session_tx: watch::Sender<Option<Arc<Session>>>,
    _drone_shutdown_tx: watch::Sender<bool>,
    _gcs_shutdown_tx: watch::Sender<bool>,
    _tmp: tempfile::TempDir,
}

async fn spawn_two_sided() -> TwoSidedHarness {
    let drone_encrypted = free_addr();
    let gcs_encrypted = free_addr();
    let drone_plaintext_tx = free_addr();
    let drone_plaintext_rx = free_addr();
    let gcs_plaintext_tx = free_addr();
    let gcs_plaintext_rx = free_addr();

    let tmp = tempfile::tempdir().unwrap();

    let (drone_session_tx, drone_session_rx) = watch::channel(None);
    let (gcs_session_tx, gcs_session_rx) = watch::channel(None);
    let (drone_shutdown_tx, drone_shutdown_rx) = watch::channel(false);
    let (gcs_shutdown_tx, gcs_shutdown_rx) = watch::channel(false);

    let drone_config = ProxyConfig {
        plaintext_tx: drone_plaintext_tx,
        plaintext_rx: drone_plaintext_rx,
        encrypted_bind: drone_encrypted,
        peer_addr: gcs_encrypted,
        strict_peer_match: true,
        outbound_rate_limit_pps: None,
        status_write_interval: Duration::from_millis(20),
        status_path: tmp.path().join("drone_status.json"),
        rekey_grace: Duration::from_millis(100),
    };
    let gcs_config = ProxyConfig {
        plaintext_tx: gcs_plaintext_tx,
        plaintext_rx: gcs_plaintext_rx,
        encrypted_bind: gcs_encrypted,
        peer_addr: drone_encrypted,
        strict_peer_match: true,
        outbound_rate_limit_pps: None,
        status_write_interval: Duration::from_millis(20),
        status_path: tmp.path().join("gcs_status.json"),
        rekey_grace: Duration::from_millis(100),
    };

    tokio::spawn(proxy::run(drone_config, drone_session_rx, drone_shutdown_rx));
    tokio::spawn(proxy::run(gcs_config, gcs_session_rx, gcs_shutdown_rx));

    TwoSidedHarness {
        drone_encrypted,
        gcs_encrypted,
        drone_plaintext_tx,
        gcs_plaintext_rx,
        drone_session_tx,
        gcs_session_tx,
        _drone_shutdown_tx: drone_shutdown_tx,
        _gcs_shutdown_tx: gcs_shutdown_tx,
        _tmp: tmp,
    }
}

/// E1: a clean round trip once both sides have an active, paired session.
#[tokio::test]
async fn clean_round_trip_delivers_plaintext() {
    let harness = spawn_two_sided().await;
    let (drone_session, gcs_session) = paired_sessions(harness.gcs_encrypted);
    harness.drone_session_tx.send(Some(Arc::new(drone_session))).unwrap();
    harness.gcs_session_tx.send(Some(Arc::new(gcs_session))).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let app = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let app_rx = UdpSocket::bind(harness.gcs_plaintext_rx).await.unwrap();
    app.send_to(b"mavlink heartbeat", harness.drone_plaintext_tx)
        .await
        .unwrap();

    let mut buf = [0u8; 256];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), app_rx.recv_from(&mut buf))
        .await
        .expect("timed out waiting for delivery")
        .unwrap();
    assert_eq!(&buf[..len], b"mavlink heartbeat");
}

/// A one-sided harness that runs just the receiving end of the proxy, so
/// crafted datagrams can be injected directly onto its encrypted socket
/// without a peer proxy also bound to that address.
struct ReceiverHarness {
    encrypted_bind: SocketAddr,
    plaintext_rx: SocketAddr,
    status_path: PathBuf,
    _session_tx: watch::Sender<Option<Arc<Session>>>,
    _shutdown_tx: watch::Sender<bool>,
    _tmp: tempfile::TempDir,
}

async fn spawn_receiver(strict_peer_match: bool, pinned_peer: SocketAddr, session: Session) -> ReceiverHarness {
    let encrypted_bind = free_addr();
    let plaintext_tx = free_addr();
    let plaintext_rx = free_addr();
    let tmp = tempfile::tempdir().unwrap();
    let status_path = tmp.path().join("status.json");

    let (session_tx, session_rx) = watch::channel(Some(Arc::new(session)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let config = ProxyConfig {
        plaintext_tx,
        plaintext_rx,
        encrypted_bind,
        peer_addr: pinned_peer,
        strict_peer_match,
        outbound_rate_limit_pps: None,
        status_write_interval: Duration::from_millis(20),
        status_path: status_path.clone(),
        rekey_grace: Duration::from_millis(100),
    };
    tokio::spawn(proxy::run(config, session_rx, shutdown_rx));
    tokio::time::sleep(Duration::from_millis(20)).await;

    ReceiverHarness {
        encrypted_bind,
        plaintext_rx,
        status_path,
        _session_tx: session_tx,
        _shutdown_tx: shutdown_tx,
        _tmp: tmp,
    }
}

/// E2: replaying a previously-accepted ciphertext is dropped and counted,
/// while a fresh sequence right after it still gets through.
#[tokio::test]
async fn replayed_datagram_is_dropped_and_counted() {
    let sender_addr = free_addr();
    let (drone_session, gcs_session) = paired_sessions(sender_addr);
    let harness = spawn_receiver(false, sender_addr, gcs_session).await;

    let app_rx = UdpSocket::bind(harness.plaintext_rx).await.unwrap();
    let sender = UdpSocket::bind(sender_addr).await.unwrap();

    let (seq, ct) = drone_session.seal_outbound(b"frame one").unwrap();
    let datagram = encode(drone_session.suite_family(), drone_session.epoch(), seq, &ct);

    sender.send_to(&datagram, harness.encrypted_bind).await.unwrap();
    let mut buf = [0u8; 256];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), app_rx.recv_from(&mut buf))
        .await
        .expect("first delivery timed out")
        .unwrap();
    assert_eq!(&buf[..len], b"frame one");

    // Replay the identical datagram: must not be delivered a second time.
    sender.send_to(&datagram, harness.encrypted_bind).await.unwrap();
    let result = tokio::time::timeout(Duration::from_millis(200), app_rx.recv_from(&mut buf)).await;
    assert!(result.is_err(), "replayed datagram must not be delivered");

    // A fresh sequence still goes through: replay rejection is per-sequence.
    let (seq2, ct2) = drone_session.seal_outbound(b"frame two").unwrap();
    let datagram2 = encode(drone_session.suite_family(), drone_session.epoch(), seq2, &ct2);
    sender.send_to(&datagram2, harness.encrypted_bind).await.unwrap();
    let (len2, _) = tokio::time::timeout(Duration::from_secs(2), app_rx.recv_from(&mut buf))
        .await
        .expect("second delivery timed out")
        .unwrap();
    assert_eq!(&buf[..len2], b"frame two");

    tokio::time::sleep(Duration::from_millis(60)).await;
    let snapshot = StatusSnapshot::read(&harness.status_path).unwrap();
    assert_eq!(snapshot.frames_in, 2);
    assert_eq!(snapshot.drops.replay, 1);
}

/// E3: a correctly-sealed frame arriving from an address other than the
/// pinned peer is dropped under strict peer matching, without ever
/// reaching the AEAD open step.
#[tokio::test]
async fn spoofed_source_address_is_dropped() {
    let pinned_peer = free_addr();
    let impostor_addr = free_addr();
    let (drone_session, gcs_session) = paired_sessions(pinned_peer);
    let harness = spawn_receiver(true, pinned_peer, gcs_session).await;

    let app_rx = UdpSocket::bind(harness.plaintext_rx).await.unwrap();
    let impostor = UdpSocket::bind(impostor_addr).await.unwrap();

    let (seq, ct) = drone_session.seal_outbound(b"spoofed frame").unwrap();
    let datagram = encode(drone_session.suite_family(), drone_session.epoch(), seq, &ct);
    impostor.send_to(&datagram, harness.encrypted_bind).await.unwrap();

    let mut buf = [0u8; 256];
    let result = tokio::time::timeout(Duration::from_millis(200), app_rx.recv_from(&mut buf)).await;
    assert!(result.is_err(), "spoofed-source datagram must not be delivered");

    tokio::time::sleep(Duration::from_millis(60)).await;
    let snapshot = StatusSnapshot::read(&harness.status_path).unwrap();
    assert_eq!(snapshot.drops.peer, 1);
    assert_eq!(snapshot.frames_in, 0);
}

/// E4: a tampered ciphertext fails AEAD verification and is dropped without
/// advancing the replay window, so a later retransmission of the genuine
/// frame at the same sequence still succeeds.
#[tokio::test]
async fn tampered_ciphertext_is_dropped_without_blocking_retransmit() {
    let sender_addr = free_addr();
    let (drone_session, gcs_session) = paired_sessions(sender_addr);
    let harness = spawn_receiver(false, sender_addr, gcs_session).await;

    let app_rx = UdpSocket::bind(harness.plaintext_rx).await.unwrap();
    let sender = UdpSocket::bind(sender_addr).await.unwrap();

    let (seq, mut ct) = drone_session.seal_outbound(b"frame").unwrap();
    let last = ct.len() - 1;
    ct[last] ^= 0xFF;
    let tampered = encode(drone_session.suite_family(), drone_session.epoch(), seq, &ct);
    sender.send_to(&tampered, harness.encrypted_bind).await.unwrap();

    let mut buf = [0u8; 256];
    let result = tokio::time::timeout(Duration::from_millis(200), app_rx.recv_from(&mut buf)).await;
    assert!(result.is_err(), "tampered datagram must not be delivered");

    tokio::time::sleep(Duration::from_millis(60)).await;
    let snapshot = StatusSnapshot::read(&harness.status_path).unwrap();
    assert_eq!(snapshot.drops.auth, 1);
}
