//! The control channel (C8): a long-lived authenticated stream carrying
//! [`ControlMessage`]s between Drone and GCS for the life of a benchmark
//! run. Authenticates once, mutually, at open time, using the same
//! signature identities as the handshake.

use rand_core::{OsRng, RngCore};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::core::ControlError;
use crate::crypto::StaticIdentity;
use crate::wire::{read_message, write_message};

use super::messages::{AuthChallenge, AuthResponse, ControlMessage};

const CHALLENGE_LEN: usize = 32;

/// A control channel bound to an open stream, after which [`Self::send`]
/// and [`Self::recv`] exchange [`ControlMessage`]s.
pub struct ControlChannel<S> {
    stream: S,
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream. Call an `authenticate_*` method
    /// before sending or receiving [`ControlMessage`]s.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Authenticate as the listener (GCS): challenge the peer first, then
    /// answer the peer's challenge.
    pub async fn authenticate_listener(
        &mut self,
        identity: &StaticIdentity,
    ) -> Result<(), ControlError> {
        let mut our_nonce = vec![0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut our_nonce);
        write_message(&mut self.stream, &AuthChallenge { nonce: our_nonce.clone() }).await?;

        let (response, _): (AuthResponse, Vec<u8>) = read_message(&mut self.stream).await?;
        identity
            .verify_peer(&our_nonce, &response.signature)
            .map_err(|_| ControlError::AuthFailed)?;

        let (challenge, _): (AuthChallenge, Vec<u8>) = read_message(&mut self.stream).await?;
        let signature = identity.sign(&challenge.nonce);
        write_message(&mut self.stream, &AuthResponse { signature }).await?;
        Ok(())
    }

    /// Authenticate as the initiator (Drone): answer the peer's challenge
    /// first, then challenge the peer.
    pub async fn authenticate_initiator(
        &mut self,
        identity: &StaticIdentity,
    ) -> Result<(), ControlError> {
        let (challenge, _): (AuthChallenge, Vec<u8>) = read_message(&mut self.stream).await?;
        let signature = identity.sign(&challenge.nonce);
        write_message(&mut self.stream, &AuthResponse { signature }).await?;

        let mut our_nonce = vec![0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut our_nonce);
        write_message(&mut self.stream, &AuthChallenge { nonce: our_nonce.clone() }).await?;

        let (response, _): (AuthResponse, Vec<u8>) = read_message(&mut self.stream).await?;
        identity
            .verify_peer(&our_nonce, &response.signature)
            .map_err(|_| ControlError::AuthFailed)?;
        Ok(())
    }

    /// Send a control message.
    pub async fn send(&mut self, message: &ControlMessage) -> Result<(), ControlError> {
        write_message(&mut self.stream, message).await?;
        Ok(())
    }

    /// Receive the next control message.
    pub async fn recv(&mut self) -> Result<ControlMessage, ControlError> {
        let (message, _) = read_message(&mut self.stream).await?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SignatureAlgorithm;

    fn paired_identities() -> (StaticIdentity, StaticIdentity) {
        let gcs_kp = crate::crypto::signature_keygen(SignatureAlgorithm::MlDsa65);
        let drone = StaticIdentity::generate(SignatureAlgorithm::MlDsa65, gcs_kp.public_key);
        let gcs = StaticIdentity::generate(SignatureAlgorithm::MlDsa65, drone.public_key().to_vec());
        (drone, gcs)
    }

    #[tokio::test]
    async fn mutual_authentication_succeeds_for_paired_identities() {
        let (drone_identity, gcs_identity) = paired_identities();
        let (drone_stream, gcs_stream) = tokio::io::duplex(4096);
        let mut drone_channel = ControlChannel::new(drone_stream);
        let mut gcs_channel = ControlChannel::new(gcs_stream);

        let drone_task = tokio::spawn(async move {
            drone_channel
                .authenticate_initiator(&drone_identity)
                .await
                .map(|_| drone_channel)
        });
        let gcs_task = tokio::spawn(async move {
            gcs_channel
                .authenticate_listener(&gcs_identity)
                .await
                .map(|_| gcs_channel)
        });

        let (drone_result, gcs_result) = tokio::join!(drone_task, gcs_task);
        let mut drone_channel = drone_result.unwrap().unwrap();
        let mut gcs_channel = gcs_result.unwrap().unwrap();

        drone_channel
            .send(&ControlMessage::StartSuite {
                suite_id: "ML-KEM-768+ML-DSA-65+AES-256-GCM".into(),
            })
            .await
            .unwrap();
        let received = gcs_channel.recv().await.unwrap();
        assert!(matches!(received, ControlMessage::StartSuite { .. }));
    }

    #[tokio::test]
    async fn authentication_fails_for_unpaired_identity() {
        let (_drone_identity, gcs_identity) = paired_identities();
        let impostor =
            StaticIdentity::generate(SignatureAlgorithm::MlDsa65, vec![0u8; 8]);
        let (drone_stream, gcs_stream) = tokio::io::duplex(4096);
        let mut drone_channel = ControlChannel::new(drone_stream);
        let mut gcs_channel = ControlChannel::new(gcs_stream);

        let drone_task =
            tokio::spawn(async move { drone_channel.authenticate_initiator(&impostor).await });
        let gcs_task =
            tokio::spawn(async move { gcs_channel.authenticate_listener(&gcs_identity).await });

        let (drone_result, gcs_result) = tokio::join!(drone_task, gcs_task);
        assert!(drone_result.unwrap().is_err() || gcs_result.unwrap().is_err());
    }
}
