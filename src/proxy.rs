//! Data-Plane Proxy (C7): the single-threaded cooperative event loop that
//! multiplexes the loopback plaintext socket and the routable encrypted
//! socket, sealing/opening frames through whichever [`Session`] is current.
//!
//! The Session is the only structure shared between the handshake/rekey
//! task and this loop. It is published as an `Arc<Session>` on a `watch`
//! channel; `Session`'s counters are interior-mutable, so a single pointer
//! swap on this loop's side is the entire handoff — no lock spans the two
//! tasks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::core::{ProxyError, ReplayOutcome, PROXY_TICK_INTERVAL};
use crate::crypto::{Session, AEAD_TAG_LEN};
use crate::frame::{decode, encode};
use crate::status::StatusSnapshot;

/// Static configuration for one proxy loop instance.
pub struct ProxyConfig {
    /// Loopback address the application sends outbound datagrams to, and
    /// the proxy binds to read them from.
    pub plaintext_tx: SocketAddr,
    /// Loopback address the proxy delivers decrypted inbound datagrams to.
    pub plaintext_rx: SocketAddr,
    /// Routable address the encrypted socket binds to.
    pub encrypted_bind: SocketAddr,
    /// Pinned peer address on the encrypted side.
    pub peer_addr: SocketAddr,
    /// Enforce that inbound encrypted datagrams come from `peer_addr`.
    pub strict_peer_match: bool,
    /// Outbound rate limit in packets per second; `None` is unlimited.
    pub outbound_rate_limit_pps: Option<u32>,
    /// How often to export a status snapshot.
    pub status_write_interval: Duration,
    /// Where to export the status snapshot.
    pub status_path: PathBuf,
    /// How long a previous epoch's Session remains acceptable for inbound
    /// frames after a rekey swap.
    pub rekey_grace: Duration,
}

struct GracedSession {
    session: Arc<Session>,
    expires_at: Instant,
}

/// Minimal token-bucket limiter refilled once per proxy tick.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_tick: f64,
}

impl TokenBucket {
    fn new(pps: u32, tick: Duration) -> Self {
        let capacity = pps as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_tick: capacity * tick.as_secs_f64(),
        }
    }

    fn refill(&mut self) {
        self.tokens = (self.tokens + self.refill_per_tick).min(self.capacity);
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Runs the proxy loop until `shutdown` fires. Callers that need a bounded
/// drain should wrap this call in `tokio::time::timeout`.
///
/// `session_rx` carries the current `Arc<Session>`, published by the
/// handshake engine and later by the rekey coordinator; `None` means no
/// Session has been established yet.
pub async fn run(
    config: ProxyConfig,
    mut session_rx: watch::Receiver<Option<Arc<Session>>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ProxyError> {
    let plaintext_socket = UdpSocket::bind(config.plaintext_tx).await?;
    let encrypted_socket = UdpSocket::bind(config.encrypted_bind).await?;

    let mut current: Option<Arc<Session>> = session_rx.borrow().clone();
    let mut previous: Option<GracedSession> = None;

    let mut rate_limiter = config
        .outbound_rate_limit_pps
        .map(|pps| TokenBucket::new(pps, PROXY_TICK_INTERVAL));

    let mut tick = interval(PROXY_TICK_INTERVAL);
    let mut last_status_write = Instant::now();

    let mut snapshot = StatusSnapshot::initial();
    let mut plaintext_buf = vec![0u8; 65536];
    let mut encrypted_buf = vec![0u8; 65536];

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("proxy loop received shutdown signal");
                    break;
                }
            }

            changed = session_rx.changed() => {
                if changed.is_err() {
                    debug!("session watch channel closed");
                    continue;
                }
                if let Some(new_session) = session_rx.borrow_and_update().clone() {
                    info!(epoch = new_session.epoch(), "installing new session");
                    if let Some(old) = current.take() {
                        previous = Some(GracedSession {
                            session: old,
                            expires_at: Instant::now() + config.rekey_grace,
                        });
                    }
                    snapshot.epoch = new_session.epoch();
                    snapshot.suite_id = Some(new_session.suite_id().to_string());
                    current = Some(new_session);
                }
            }

            result = plaintext_socket.recv_from(&mut plaintext_buf) => {
                let (len, _from) = result?;
                handle_outbound(
                    &plaintext_buf[..len],
                    current.as_deref(),
                    &encrypted_socket,
                    config.peer_addr,
                    &mut rate_limiter,
                    &mut snapshot,
                ).await?;
            }

            result = encrypted_socket.recv_from(&mut encrypted_buf) => {
                let (len, from) = result?;
                handle_inbound(
                    &encrypted_buf[..len],
                    from,
                    config.strict_peer_match,
                    config.peer_addr,
                    current.as_deref(),
                    &previous,
                    &plaintext_socket,
                    config.plaintext_rx,
                    &mut snapshot,
                ).await?;
            }

            _ = tick.tick() => {
                if let Some(bucket) = rate_limiter.as_mut() {
                    bucket.refill();
                }
                if let Some(graced) = &previous {
                    if Instant::now() >= graced.expires_at {
                        previous = None;
                    }
                }
                if last_status_write.elapsed() >= config.status_write_interval {
                    snapshot.generated_at = chrono::Utc::now();
                    if let Err(e) = snapshot.write_atomic(&config.status_path) {
                        warn!(error = %e, "failed to write status snapshot");
                    }
                    last_status_write = Instant::now();
                }
            }
        }
    }

    snapshot.generated_at = chrono::Utc::now();
    let _ = snapshot.write_atomic(&config.status_path);
    Ok(())
}

async fn handle_outbound(
    plaintext: &[u8],
    current: Option<&Session>,
    encrypted_socket: &UdpSocket,
    peer_addr: SocketAddr,
    rate_limiter: &mut Option<TokenBucket>,
    snapshot: &mut StatusSnapshot,
) -> Result<(), ProxyError> {
    let Some(session) = current else {
        snapshot.drops.no_session += 1;
        return Ok(());
    };

    if let Some(bucket) = rate_limiter.as_mut() {
        if !bucket.try_consume() {
            snapshot.drops.rate_limit += 1;
            return Ok(());
        }
    }

    let (seq, ciphertext) = match session.seal_outbound(plaintext) {
        Ok(v) => v,
        Err(_) => {
            snapshot.drops.no_session += 1;
            return Ok(());
        }
    };
    let datagram = encode(session.suite_family(), session.epoch(), seq, &ciphertext);
    encrypted_socket.send_to(&datagram, peer_addr).await?;

    snapshot.frames_out += 1;
    snapshot.bytes_out += plaintext.len() as u64;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_inbound(
    datagram: &[u8],
    from: SocketAddr,
    strict_peer_match: bool,
    peer_addr: SocketAddr,
    current: Option<&Session>,
    previous: &Option<GracedSession>,
    plaintext_socket: &UdpSocket,
    plaintext_rx: SocketAddr,
    snapshot: &mut StatusSnapshot,
) -> Result<(), ProxyError> {
    if strict_peer_match && from != peer_addr {
        snapshot.drops.peer += 1;
        return Ok(());
    }

    let decoded = match decode(datagram, AEAD_TAG_LEN) {
        Ok(d) => d,
        Err(_) => {
            snapshot.drops.header += 1;
            return Ok(());
        }
    };

    let target: &Session = if current.is_some_and(|s| s.epoch() == decoded.epoch) {
        current.unwrap()
    } else if previous
        .as_ref()
        .is_some_and(|g| g.session.epoch() == decoded.epoch && Instant::now() < g.expires_at)
    {
        previous.as_ref().unwrap().session.as_ref()
    } else {
        snapshot.drops.epoch += 1;
        return Ok(());
    };

    match target.replay_check(decoded.sequence) {
        ReplayOutcome::Replay | ReplayOutcome::TooOld => {
            snapshot.drops.replay += 1;
            return Ok(());
        }
        ReplayOutcome::Accept => {}
    }

    let plaintext = match target.open_inbound(decoded.sequence, decoded.body) {
        Ok(p) => p,
        Err(_) => {
            snapshot.drops.auth += 1;
            return Ok(());
        }
    };

    plaintext_socket.send_to(&plaintext, plaintext_rx).await?;
    snapshot.frames_in += 1;
    snapshot.bytes_in += plaintext.len() as u64;
    Ok(())
}
