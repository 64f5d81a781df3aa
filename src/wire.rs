//! Length-prefixed canonical-JSON message framing shared by the handshake
//! stream and the control channel: each message is a 4-byte big-endian
//! length followed by that many bytes of `serde_json` output. Field order
//! in the derived `Serialize` impls is the wire's canonical order, so both
//! sides produce byte-identical transcripts from identical structs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Messages longer than this are rejected before allocating a buffer for
/// them; generous enough for any handshake or control message this crate
/// defines, small enough to bound an attacker's memory pressure.
pub const MAX_MESSAGE_LEN: u32 = 1 << 20;

/// Serialize `message` and write it length-prefixed to `stream`.
///
/// Returns the exact bytes written (length prefix + payload) so callers
/// that need to feed the same bytes into a transcript don't have to
/// re-serialize.
pub async fn write_message<W, T>(stream: &mut W, message: &T) -> std::io::Result<Vec<u8>>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "message too large"))?;
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&payload);
    stream.write_all(&framed).await?;
    Ok(framed)
}

/// Read a length-prefixed message from `stream` and deserialize it.
///
/// Returns the exact bytes read (length prefix + payload) alongside the
/// decoded value, for transcript accumulation.
pub async fn read_message<R, T>(stream: &mut R) -> std::io::Result<(T, Vec<u8>)>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("message length {len} exceeds maximum {MAX_MESSAGE_LEN}"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    let value = serde_json::from_slice(&payload)?;

    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&len_buf);
    framed.extend_from_slice(&payload);
    Ok((value, framed))
}
