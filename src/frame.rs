//! Frame Codec (C3): on-wire header encode/decode for the data-plane UDP
//! transport. This module owns serialization only — it never touches AEAD
//! key material, it only produces the header bytes that double as AAD and
//! splits a datagram into header fields plus ciphertext body.

use crate::core::{HeaderError, FRAME_HEADER_SIZE, FRAME_MAGIC, FRAME_VERSION};

/// A decoded frame header plus a view of the ciphertext body.
#[derive(Debug, PartialEq)]
pub struct DecodedFrame<'a> {
    /// Informational suite-family tag; callers must check it matches the
    /// selected Session's suite before trusting the frame further.
    pub suite_family: u8,
    /// Epoch this frame claims to belong to.
    pub epoch: u32,
    /// Sequence number within that epoch.
    pub sequence: u64,
    /// `ciphertext || tag`, unvalidated.
    pub body: &'a [u8],
    /// The exact header bytes, reused as AEAD associated data.
    pub aad: [u8; FRAME_HEADER_SIZE],
}

/// Build the 15-byte frame header. This is also used verbatim as AEAD AAD.
pub fn header_bytes(suite_family: u8, epoch: u32, sequence: u64) -> [u8; FRAME_HEADER_SIZE] {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[0] = FRAME_MAGIC;
    header[1] = FRAME_VERSION;
    header[2] = suite_family;
    header[3..7].copy_from_slice(&epoch.to_be_bytes());
    header[7..15].copy_from_slice(&sequence.to_be_bytes());
    header
}

/// Encode a complete datagram: header followed by `ciphertext_with_tag`.
pub fn encode(suite_family: u8, epoch: u32, sequence: u64, ciphertext_with_tag: &[u8]) -> Vec<u8> {
    let header = header_bytes(suite_family, epoch, sequence);
    let mut datagram = Vec::with_capacity(FRAME_HEADER_SIZE + ciphertext_with_tag.len());
    datagram.extend_from_slice(&header);
    datagram.extend_from_slice(ciphertext_with_tag);
    datagram
}

/// Decode a datagram's header, leaving AEAD verification to the caller.
///
/// `min_tag_len` is the selected AEAD's tag length; datagrams shorter than
/// `header + min_tag_len` are rejected before any crypto is attempted.
pub fn decode(datagram: &[u8], min_tag_len: usize) -> Result<DecodedFrame<'_>, HeaderError> {
    let min_len = FRAME_HEADER_SIZE + min_tag_len;
    if datagram.len() < min_len {
        return Err(HeaderError::TooShort {
            len: datagram.len(),
            min: min_len,
        });
    }

    let magic = datagram[0];
    if magic != FRAME_MAGIC {
        return Err(HeaderError::BadMagic(magic));
    }

    let version = datagram[1];
    if version != FRAME_VERSION {
        return Err(HeaderError::UnsupportedVersion(version));
    }

    let suite_family = datagram[2];
    let epoch = u32::from_be_bytes(datagram[3..7].try_into().unwrap());
    let sequence = u64::from_be_bytes(datagram[7..15].try_into().unwrap());

    let mut aad = [0u8; FRAME_HEADER_SIZE];
    aad.copy_from_slice(&datagram[..FRAME_HEADER_SIZE]);

    Ok(DecodedFrame {
        suite_family,
        epoch,
        sequence,
        body: &datagram[FRAME_HEADER_SIZE..],
        aad,
    })
}
