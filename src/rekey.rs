//! Rekey Coordinator (C9): drives suite rotation on both sides, performs
//! synchronized epoch transitions, and records per-suite timing.
//!
//! The Drone is always the decider: it walks an ordered suite catalog,
//! issuing `StartSuite` once and `PrepareRekey` before every subsequent
//! suite. The GCS follows, reacting to whatever the control channel says.
//! Both sides publish freshly-produced [`Session`]s to the proxy loop
//! through a `watch` channel; installing a new Session on that channel *is*
//! the atomic swap spec section 4.7 requires.

use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::control::{sync_as_drone, sync_as_gcs, ControlChannel, ControlMessage};
use crate::core::{RekeyError, EPOCH_INITIAL};
use crate::crypto::{Session, StaticIdentity};
use crate::handshake::HandshakeEngine;
use crate::registry::SuiteRegistry;
use crate::status::{DropCounters, StatusSnapshot};

/// One step of the drone's benchmark suite walk: a suite to run for
/// `duration` before moving (via `PrepareRekey`) to the next one.
#[derive(Debug, Clone)]
pub struct SuiteStep {
    /// Suite id to negotiate.
    pub suite_id: String,
    /// How long to stay on this suite before rekeying to the next.
    pub duration: Duration,
}

/// Per-suite benchmark record, appended to the JSON-lines suite log on
/// every suite transition (spec section 3, `SuiteRunRecord`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteRunRecord {
    /// Suite id this record covers.
    pub suite_id: String,
    /// Epoch this suite ran under.
    pub epoch: u32,
    /// When this suite's Session became active.
    pub started_at: DateTime<Utc>,
    /// When this suite's run ended (rekey or stop).
    pub ended_at: DateTime<Utc>,
    /// How long the handshake that produced this suite's Session took.
    pub handshake_duration_ms: u64,
    /// Frames delivered inbound during this suite's run.
    pub frames_in: u64,
    /// Frames sent outbound during this suite's run.
    pub frames_out: u64,
    /// Drop counters accumulated during this suite's run.
    pub drops: DropCounters,
    /// Measured blackout before this suite became active, if it was a rekey.
    pub rekey_blackout_ms: Option<u64>,
    /// Whether this suite ran to completion without a fatal error.
    pub success: bool,
}

/// Append one record to the JSON-lines suite log at `path`.
pub fn append_suite_record(path: &Path, record: &SuiteRunRecord) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")
}

/// How this coordinator opens the TCP stream a single suite handshake runs
/// over. The long-lived control channel is a separate, already-open
/// connection; each handshake (initial or rekey) gets its own fresh stream
/// so handshake framing never interleaves with control messages.
enum HandshakeTransport {
    /// Drone: dial the peer's control address again for each handshake.
    Drone { dial_addr: SocketAddr },
    /// GCS: accept the next incoming connection for each handshake.
    Gcs { listener: TcpListener },
}

impl HandshakeTransport {
    async fn open(&mut self) -> Result<TcpStream, std::io::Error> {
        match self {
            HandshakeTransport::Drone { dial_addr } => TcpStream::connect(*dial_addr).await,
            HandshakeTransport::Gcs { listener } => {
                let (stream, peer) = listener.accept().await?;
                info!(%peer, "accepted fresh handshake connection");
                Ok(stream)
            }
        }
    }
}

/// Shared coordinator state for both roles.
pub struct RekeyCoordinator<'a> {
    identity: &'a StaticIdentity,
    registry: &'a SuiteRegistry,
    transport: HandshakeTransport,
    encrypted_peer_addr: SocketAddr,
    handshake_deadline: Duration,
    rekey_grace: Duration,
    suite_log_path: std::path::PathBuf,
    status_path: std::path::PathBuf,
    session_tx: watch::Sender<Option<Arc<Session>>>,
    epoch: u32,
}

impl<'a> RekeyCoordinator<'a> {
    /// Build a coordinator for the drone side, which dials `dial_addr` to
    /// open each handshake's fresh stream.
    #[allow(clippy::too_many_arguments)]
    pub fn new_drone(
        identity: &'a StaticIdentity,
        registry: &'a SuiteRegistry,
        dial_addr: SocketAddr,
        encrypted_peer_addr: SocketAddr,
        handshake_deadline: Duration,
        rekey_grace: Duration,
        suite_log_path: std::path::PathBuf,
        status_path: std::path::PathBuf,
        session_tx: watch::Sender<Option<Arc<Session>>>,
    ) -> Self {
        Self {
            identity,
            registry,
            transport: HandshakeTransport::Drone { dial_addr },
            encrypted_peer_addr,
            handshake_deadline,
            rekey_grace,
            suite_log_path,
            status_path,
            session_tx,
            epoch: EPOCH_INITIAL - 1,
        }
    }

    /// Build a coordinator for the GCS side, which accepts each
    /// handshake's fresh stream on `listener`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_gcs(
        identity: &'a StaticIdentity,
        registry: &'a SuiteRegistry,
        listener: TcpListener,
        encrypted_peer_addr: SocketAddr,
        handshake_deadline: Duration,
        rekey_grace: Duration,
        suite_log_path: std::path::PathBuf,
        status_path: std::path::PathBuf,
        session_tx: watch::Sender<Option<Arc<Session>>>,
    ) -> Self {
        Self {
            identity,
            registry,
            transport: HandshakeTransport::Gcs { listener },
            encrypted_peer_addr,
            handshake_deadline,
            rekey_grace,
            suite_log_path,
            status_path,
            session_tx,
            epoch: EPOCH_INITIAL - 1,
        }
    }

    async fn run_handshake_as_drone(&mut self, suite_id: &str) -> Result<(Session, u64), RekeyError> {
        self.epoch += 1;
        let mut stream = self.transport.open().await.map_err(HandshakeErrorFromIo)?;
        let engine = HandshakeEngine::new(self.identity, self.registry);
        let started = Instant::now();
        let session = engine
            .run_initiator(
                &mut stream,
                suite_id,
                self.epoch,
                self.encrypted_peer_addr,
                self.handshake_deadline,
            )
            .await?;
        Ok((session, started.elapsed().as_millis() as u64))
    }

    async fn run_handshake_as_gcs(&mut self) -> Result<(Session, u64), RekeyError> {
        self.epoch += 1;
        let mut stream = self.transport.open().await.map_err(HandshakeErrorFromIo)?;
        let engine = HandshakeEngine::new(self.identity, self.registry);
        let started = Instant::now();
        let session = engine
            .run_responder(
                &mut stream,
                self.epoch,
                self.encrypted_peer_addr,
                self.handshake_deadline,
            )
            .await?;
        Ok((session, started.elapsed().as_millis() as u64))
    }

    fn install_session(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let _ = self.session_tx.send(Some(session.clone()));
        session
    }

    fn read_status(&self) -> StatusSnapshot {
        StatusSnapshot::read(&self.status_path).unwrap_or_else(|_| StatusSnapshot::initial())
    }
}

/// Adapts a raw I/O error from opening a handshake stream into the
/// `HandshakeError::Io` variant so it composes with `?` inside
/// `RekeyError::Handshake`.
struct HandshakeErrorFromIo(std::io::Error);
impl From<HandshakeErrorFromIo> for RekeyError {
    fn from(e: HandshakeErrorFromIo) -> Self {
        RekeyError::Handshake(crate::core::HandshakeError::Io(e.0))
    }
}
impl From<std::io::Error> for HandshakeErrorFromIo {
    fn from(e: std::io::Error) -> Self {
        HandshakeErrorFromIo(e)
    }
}

/// Drive the drone side of a benchmark run: `StartSuite` on the first
/// entry, then `PrepareRekey` before every subsequent one, sleeping
/// `duration` on each suite's active Session before moving on.
pub async fn run_drone(
    coordinator: &mut RekeyCoordinator<'_>,
    control: &mut ControlChannel<TcpStream>,
    catalog: &[SuiteStep],
) -> Result<(), RekeyError> {
    if catalog.is_empty() {
        return Ok(());
    }

    let offset_ns = sync_as_drone(control).await?;
    info!(offset_ns, "chronos clock offset established");

    let mut previous_blackout_ms = None;

    for (index, step) in catalog.iter().enumerate() {
        if index == 0 {
            control
                .send(&ControlMessage::StartSuite {
                    suite_id: step.suite_id.clone(),
                })
                .await?;
        }

        let before = coordinator.read_status();
        let last_send_at = Instant::now();
        let (session, handshake_ms) = coordinator.run_handshake_as_drone(&step.suite_id).await?;
        let epoch = session.epoch();
        let started_at = Utc::now();
        coordinator.install_session(session);
        let blackout_ms = previous_blackout_ms.take().or_else(|| {
            if index == 0 {
                None
            } else {
                Some(last_send_at.elapsed().as_millis() as u64)
            }
        });

        info!(suite_id = %step.suite_id, epoch, handshake_ms, "suite active");
        tokio::time::sleep(step.duration).await;

        let is_last = index + 1 == catalog.len();
        if is_last {
            control.send(&ControlMessage::StopSuite).await?;
        } else {
            let next = &catalog[index + 1];
            let cutover_local_ns = now_unix_ns() + Duration::from_millis(50).as_nanos() as i64;
            let cutover_gcs_ns = cutover_local_ns + offset_ns;
            control
                .send(&ControlMessage::PrepareRekey {
                    next_suite_id: next.suite_id.clone(),
                    cutover_at_unix_ms: cutover_gcs_ns / 1_000_000,
                })
                .await?;
            let remaining = Duration::from_nanos((cutover_local_ns - now_unix_ns()).max(0) as u64);
            tokio::time::sleep(remaining).await;
        }

        let after = coordinator.read_status();
        let record = SuiteRunRecord {
            suite_id: step.suite_id.clone(),
            epoch,
            started_at,
            ended_at: Utc::now(),
            handshake_duration_ms: handshake_ms,
            frames_in: after.frames_in.saturating_sub(before.frames_in),
            frames_out: after.frames_out.saturating_sub(before.frames_out),
            drops: diff_drops(&before.drops, &after.drops),
            rekey_blackout_ms: blackout_ms,
            success: true,
        };
        if let Err(e) = append_suite_record(&coordinator.suite_log_path, &record) {
            warn!(error = %e, "failed to append suite run record");
        }
        previous_blackout_ms = Some(0);
    }

    tokio::time::sleep(coordinator.rekey_grace).await;
    Ok(())
}

/// Drive the GCS side: react to the drone's control messages until
/// `StopSuite` or the control channel is lost.
pub async fn run_gcs(
    coordinator: &mut RekeyCoordinator<'_>,
    control: &mut ControlChannel<TcpStream>,
) -> Result<(), RekeyError> {
    sync_as_gcs(control).await?;

    loop {
        let message = control.recv().await?;
        match message {
            ControlMessage::StartSuite { suite_id } => {
                let (session, handshake_ms) = coordinator.run_handshake_as_gcs().await?;
                info!(suite_id, epoch = session.epoch(), handshake_ms, "suite active");
                coordinator.install_session(session);
            }
            ControlMessage::PrepareRekey {
                next_suite_id,
                cutover_at_unix_ms,
            } => {
                let remaining_ns = cutover_at_unix_ms * 1_000_000 - now_unix_ns();
                if remaining_ns > 0 {
                    tokio::time::sleep(Duration::from_nanos(remaining_ns as u64)).await;
                }
                let (session, handshake_ms) = coordinator.run_handshake_as_gcs().await?;
                info!(
                    suite_id = next_suite_id,
                    epoch = session.epoch(),
                    handshake_ms,
                    "rekeyed to next suite"
                );
                coordinator.install_session(session);
            }
            ControlMessage::QueryStatus => {
                let snapshot = coordinator.read_status();
                control
                    .send(&ControlMessage::StatusReport { snapshot })
                    .await?;
            }
            ControlMessage::StopSuite => {
                tokio::time::sleep(coordinator.rekey_grace).await;
                return Ok(());
            }
            ControlMessage::Error { message } => {
                return Err(RekeyError::UnexpectedMessage(message));
            }
            other => {
                return Err(RekeyError::UnexpectedMessage(format!(
                    "unexpected message in this state: {other:?}"
                )));
            }
        }
    }
}

fn diff_drops(before: &DropCounters, after: &DropCounters) -> DropCounters {
    DropCounters {
        no_session: after.no_session.saturating_sub(before.no_session),
        rate_limit: after.rate_limit.saturating_sub(before.rate_limit),
        peer: after.peer.saturating_sub(before.peer),
        header: after.header.saturating_sub(before.header),
        epoch: after.epoch.saturating_sub(before.epoch),
        replay: after.replay.saturating_sub(before.replay),
        auth: after.auth.saturating_sub(before.auth),
    }
}

fn now_unix_ns() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_drops_subtracts_each_reason() {
        let before = DropCounters {
            no_session: 1,
            rate_limit: 2,
            peer: 3,
            header: 4,
            epoch: 5,
            replay: 6,
            auth: 7,
        };
        let after = DropCounters {
            no_session: 3,
            rate_limit: 2,
            peer: 10,
            header: 4,
            epoch: 5,
            replay: 9,
            auth: 7,
        };
        let diff = diff_drops(&before, &after);
        assert_eq!(diff.no_session, 2);
        assert_eq!(diff.rate_limit, 0);
        assert_eq!(diff.peer, 7);
        assert_eq!(diff.replay, 3);
    }

    #[test]
    fn append_suite_record_writes_one_json_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suites.jsonl");
        let record = SuiteRunRecord {
            suite_id: "ML-KEM-768+ML-DSA-65+AES-256-GCM".into(),
            epoch: 1,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            handshake_duration_ms: 12,
            frames_in: 100,
            frames_out: 100,
            drops: DropCounters::default(),
            rekey_blackout_ms: None,
            success: true,
        };
        append_suite_record(&path, &record).unwrap();
        append_suite_record(&path, &record).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let parsed: SuiteRunRecord = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.suite_id, record.suite_id);
    }
}
