//! Chronos clock-offset exchange (spec section 4.8): a 3-message NTP-style
//! round trip the Drone uses to compute `cutover_at` timestamps the GCS can
//! honor on its own clock.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::core::ControlError;

use super::channel::ControlChannel;
use super::messages::ControlMessage;

fn now_unix_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_nanos() as i64
}

/// Run the drone side of the exchange over an already-authenticated
/// channel, returning the estimated offset in nanoseconds: add this to a
/// drone-clock timestamp to get the corresponding GCS-clock timestamp.
pub async fn sync_as_drone<S>(channel: &mut ControlChannel<S>) -> Result<i64, ControlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let t1 = now_unix_ns();
    channel
        .send(&ControlMessage::ChronosSync {
            t_drone_send_unix_ns: t1,
        })
        .await?;

    let reply = channel.recv().await?;
    let (t2, t3) = match reply {
        ControlMessage::ChronosSyncReply {
            t_gcs_recv_unix_ns,
            t_gcs_send_unix_ns,
        } => (t_gcs_recv_unix_ns, t_gcs_send_unix_ns),
        _ => return Err(ControlError::PeerError("expected ChronosSyncReply".into())),
    };
    let t4 = now_unix_ns();

    Ok(((t2 - t1) + (t3 - t4)) / 2)
}

/// Run the GCS side of the exchange: wait for a `ChronosSync`, reply with
/// its own receive/send timestamps. Returns nothing; the GCS does not need
/// the offset itself, only the drone does (it computes `cutover_at`).
pub async fn sync_as_gcs<S>(channel: &mut ControlChannel<S>) -> Result<(), ControlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = channel.recv().await?;
    let t2 = now_unix_ns();
    if !matches!(request, ControlMessage::ChronosSync { .. }) {
        return Err(ControlError::PeerError("expected ChronosSync".into()));
    }
    let t3 = now_unix_ns();
    channel
        .send(&ControlMessage::ChronosSyncReply {
            t_gcs_recv_unix_ns: t2,
            t_gcs_send_unix_ns: t3,
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offset_exchange_completes_over_loopback_duplex() {
        let (drone_stream, gcs_stream) = tokio::io::duplex(4096);
        let mut drone_channel = ControlChannel::new(drone_stream);
        let mut gcs_channel = ControlChannel::new(gcs_stream);

        let drone_task = tokio::spawn(async move { sync_as_drone(&mut drone_channel).await });
        let gcs_task = tokio::spawn(async move { sync_as_gcs(&mut gcs_channel).await });

        let (drone_result, gcs_result) = tokio::join!(drone_task, gcs_task);
        gcs_result.unwrap().unwrap();
        // Two loopback clocks should measure an offset within a few
        // milliseconds of zero.
        let offset_ns = drone_result.unwrap().unwrap();
        assert!(offset_ns.abs() < 50_000_000);
    }
}
