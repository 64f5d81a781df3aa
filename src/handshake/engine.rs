//! Handshake Engine (C5): executes the KEM + signature protocol over a
//! reliable stream and emits a [`Session`]. The GCS is always the
//! listener/responder; the Drone is always the initiator.

use std::net::SocketAddr;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::core::{HandshakeError, Role};
use crate::crypto::{
    kdf_expand, kdf_extract, kem_decapsulate, kem_encapsulate, kem_keygen, Session, StaticIdentity,
};
use crate::registry::SuiteRegistry;
use crate::transcript::HandshakeTranscript;
use crate::wire::{read_message, write_message};

use super::messages::{ClientHello, ClientKemCt, Finished, ServerHello, PROTOCOL_VERSION};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 32;

/// Runs the handshake for one side. Stateless: every call carries its own
/// identity/registry references and targets a fresh stream.
pub struct HandshakeEngine<'a> {
    identity: &'a StaticIdentity,
    registry: &'a SuiteRegistry,
}

impl<'a> HandshakeEngine<'a> {
    /// Build an engine bound to this process's identity and suite catalog.
    pub fn new(identity: &'a StaticIdentity, registry: &'a SuiteRegistry) -> Self {
        Self { identity, registry }
    }

    /// Run the drone side of the handshake for `suite_id` at `epoch`,
    /// bounded by `deadline`. `peer_addr` is pinned into the resulting
    /// Session.
    pub async fn run_initiator<S>(
        &self,
        stream: &mut S,
        suite_id: &str,
        epoch: u32,
        peer_addr: SocketAddr,
        deadline: Duration,
    ) -> Result<Session, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        timeout(
            deadline,
            self.run_initiator_inner(stream, suite_id, epoch, peer_addr),
        )
        .await
        .map_err(|_| HandshakeError::Timeout)?
    }

    async fn run_initiator_inner<S>(
        &self,
        stream: &mut S,
        suite_id: &str,
        epoch: u32,
        peer_addr: SocketAddr,
    ) -> Result<Session, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let suite = self
            .registry
            .by_id(suite_id)
            .map_err(|e| HandshakeError::UnknownSuite(e.0))?;

        let mut transcript = HandshakeTranscript::new();
        let mut nonce_c = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_c);

        let client_hello = ClientHello {
            protocol_version: PROTOCOL_VERSION,
            nonce_c: nonce_c.clone(),
            suite_id: suite_id.to_string(),
        };
        let client_hello_bytes = write_message(stream, &client_hello).await?;
        transcript.extend(&client_hello_bytes);

        let (server_hello, server_hello_bytes): (ServerHello, Vec<u8>) =
            read_message(stream).await?;
        transcript.extend(&server_hello_bytes);

        if server_hello.suite_id_echo != suite_id {
            return Err(HandshakeError::UnknownSuite(server_hello.suite_id_echo));
        }
        if server_hello.sig_pk_fingerprint != self.identity.peer_fingerprint_bytes() {
            return Err(HandshakeError::FingerprintMismatch);
        }

        let mut server_hello_signed = Vec::new();
        server_hello_signed.extend_from_slice(&client_hello_bytes);
        server_hello_signed.extend_from_slice(&server_hello.nonce_s);
        server_hello_signed.extend_from_slice(suite_id.as_bytes());
        server_hello_signed.extend_from_slice(&server_hello.kem_pk);
        self.identity
            .verify_peer(&server_hello_signed, &server_hello.signature)
            .map_err(|_| HandshakeError::SignatureInvalid)?;

        let (kem_ct, kem_ss) = kem_encapsulate(suite.kem, &server_hello.kem_pk)
            .map_err(|_| HandshakeError::DecapsulationFailed)?;

        let mut kem_ct_signed = Vec::new();
        kem_ct_signed.extend_from_slice(&server_hello_bytes);
        kem_ct_signed.extend_from_slice(&kem_ct);
        let signature = self.identity.sign(&kem_ct_signed);

        let client_kem_ct = ClientKemCt {
            kem_ct: kem_ct.clone(),
            signature,
        };
        let client_kem_ct_bytes = write_message(stream, &client_kem_ct).await?;
        transcript.extend(&client_kem_ct_bytes);

        let schedule = derive_key_schedule(&nonce_c, &server_hello.nonce_s, &kem_ss, suite_id, epoch)?;
        finish_handshake(stream, &mut transcript, &schedule).await?;

        Ok(Session::new(
            epoch,
            suite_id.to_string(),
            suite.ordering_index as u8,
            suite.aead,
            Role::Drone,
            schedule.k_d2g,
            schedule.k_g2d,
            peer_addr,
        ))
    }

    /// Run the GCS side of the handshake, bounded by `deadline`. The suite
    /// is whatever the drone proposes in its `ClientHello`; `epoch` must be
    /// agreed out of band (the coordinator tells both sides which epoch
    /// this handshake produces).
    pub async fn run_responder<S>(
        &self,
        stream: &mut S,
        epoch: u32,
        peer_addr: SocketAddr,
        deadline: Duration,
    ) -> Result<Session, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        timeout(deadline, self.run_responder_inner(stream, epoch, peer_addr))
            .await
            .map_err(|_| HandshakeError::Timeout)?
    }

    async fn run_responder_inner<S>(
        &self,
        stream: &mut S,
        epoch: u32,
        peer_addr: SocketAddr,
    ) -> Result<Session, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut transcript = HandshakeTranscript::new();

        let (client_hello, client_hello_bytes): (ClientHello, Vec<u8>) =
            read_message(stream).await?;
        transcript.extend(&client_hello_bytes);

        if client_hello.protocol_version != PROTOCOL_VERSION {
            return Err(HandshakeError::VersionMismatch {
                local: PROTOCOL_VERSION,
                peer: client_hello.protocol_version,
            });
        }

        let suite = self
            .registry
            .by_id(&client_hello.suite_id)
            .map_err(|e| HandshakeError::UnknownSuite(e.0))?;

        let mut nonce_s = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_s);
        let ephemeral = kem_keygen(suite.kem);

        let mut server_hello_signed = Vec::new();
        server_hello_signed.extend_from_slice(&client_hello_bytes);
        server_hello_signed.extend_from_slice(&nonce_s);
        server_hello_signed.extend_from_slice(client_hello.suite_id.as_bytes());
        server_hello_signed.extend_from_slice(&ephemeral.public_key);
        let signature = self.identity.sign(&server_hello_signed);

        let server_hello = ServerHello {
            nonce_s: nonce_s.clone(),
            suite_id_echo: client_hello.suite_id.clone(),
            kem_pk: ephemeral.public_key.clone(),
            sig_pk_fingerprint: self.identity.fingerprint_bytes(),
            signature,
        };
        let server_hello_bytes = write_message(stream, &server_hello).await?;
        transcript.extend(&server_hello_bytes);

        let (client_kem_ct, client_kem_ct_bytes): (ClientKemCt, Vec<u8>) =
            read_message(stream).await?;
        transcript.extend(&client_kem_ct_bytes);

        let mut kem_ct_signed = Vec::new();
        kem_ct_signed.extend_from_slice(&server_hello_bytes);
        kem_ct_signed.extend_from_slice(&client_kem_ct.kem_ct);
        self.identity
            .verify_peer(&kem_ct_signed, &client_kem_ct.signature)
            .map_err(|_| HandshakeError::SignatureInvalid)?;

        let kem_ss = kem_decapsulate(suite.kem, &ephemeral.secret_key, &client_kem_ct.kem_ct)
            .map_err(|_| HandshakeError::DecapsulationFailed)?;

        let schedule = derive_key_schedule(
            &client_hello.nonce_c,
            &nonce_s,
            &kem_ss,
            &client_hello.suite_id,
            epoch,
        )?;
        finish_handshake(stream, &mut transcript, &schedule).await?;

        Ok(Session::new(
            epoch,
            client_hello.suite_id,
            suite.ordering_index as u8,
            suite.aead,
            Role::Gcs,
            schedule.k_d2g,
            schedule.k_g2d,
            peer_addr,
        ))
    }
}

struct KeySchedule {
    k_d2g: Vec<u8>,
    k_g2d: Vec<u8>,
    prk_exporter: [u8; 32],
}

fn derive_key_schedule(
    nonce_c: &[u8],
    nonce_s: &[u8],
    kem_ss: &[u8],
    suite_id: &str,
    epoch: u32,
) -> Result<KeySchedule, HandshakeError> {
    let mut salt = Vec::with_capacity(nonce_c.len() + nonce_s.len());
    salt.extend_from_slice(nonce_c);
    salt.extend_from_slice(nonce_s);
    let prk = kdf_extract(&salt, kem_ss);

    let epoch_bytes = epoch.to_be_bytes();
    let aead_key_len = crate::crypto::AEAD_KEY_LEN;

    let mut d2g_info = Vec::new();
    d2g_info.extend_from_slice(b"d2g|");
    d2g_info.extend_from_slice(suite_id.as_bytes());
    d2g_info.extend_from_slice(&epoch_bytes);
    let k_d2g = kdf_expand(&prk, &d2g_info, aead_key_len)?;

    let mut g2d_info = Vec::new();
    g2d_info.extend_from_slice(b"g2d|");
    g2d_info.extend_from_slice(suite_id.as_bytes());
    g2d_info.extend_from_slice(&epoch_bytes);
    let k_g2d = kdf_expand(&prk, &g2d_info, aead_key_len)?;

    let mut exp_info = Vec::new();
    exp_info.extend_from_slice(b"exp|");
    exp_info.extend_from_slice(suite_id.as_bytes());
    let exporter = kdf_expand(&prk, &exp_info, 32)?;
    let mut prk_exporter = [0u8; 32];
    prk_exporter.copy_from_slice(&exporter);

    Ok(KeySchedule {
        k_d2g,
        k_g2d,
        prk_exporter,
    })
}

async fn finish_handshake<S>(
    stream: &mut S,
    transcript: &mut HandshakeTranscript,
    schedule: &KeySchedule,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let expected_mac = finished_mac(&schedule.prk_exporter, &transcript.digest());

    let own_finished = Finished {
        mac: expected_mac.clone(),
    };
    write_message(stream, &own_finished).await?;

    let (peer_finished, _bytes): (Finished, Vec<u8>) = read_message(stream).await?;
    if peer_finished.mac != expected_mac {
        return Err(HandshakeError::FinishedMismatch);
    }
    Ok(())
}

fn finished_mac(prk_exporter: &[u8; 32], transcript_digest: &[u8; 32]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(prk_exporter).expect("HMAC accepts any key length");
    mac.update(b"finished");
    mac.update(transcript_digest);
    mac.finalize().into_bytes().to_vec()
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
    async fn full_handshake_produces_matching_sessions() {
        let (drone_identity, gcs_identity) = paired_identities();
        let registry = SuiteRegistry::default_catalog();
        let suite_id = registry.iter_ordered().next().unwrap().suite_id.clone();

        let drone_engine = HandshakeEngine::new(&drone_identity, &registry);
        let gcs_engine = HandshakeEngine::new(&gcs_identity, &registry);

        let (mut drone_stream, mut gcs_stream) = tokio::io::duplex(1 << 16);
        let peer_addr: SocketAddr = "127.0.0.1:46011".parse().unwrap();
        let deadline = Duration::from_secs(5);

        let suite_id_for_drone = suite_id.clone();
        let drone_fut = drone_engine.run_initiator(
            &mut drone_stream,
            &suite_id_for_drone,
            1,
            peer_addr,
            deadline,
        );
        let gcs_fut = gcs_engine.run_responder(&mut gcs_stream, 1, peer_addr, deadline);

        let (drone_result, gcs_result) = tokio::join!(drone_fut, gcs_fut);
        let drone_session = drone_result.unwrap();
        let gcs_session = gcs_result.unwrap();

        assert_eq!(drone_session.epoch(), gcs_session.epoch());
        assert_eq!(drone_session.suite_id(), gcs_session.suite_id());

        let (seq, ct) = drone_session.seal_outbound(b"telemetry").unwrap();
        let pt = gcs_session.open_inbound(seq, &ct).unwrap();
        assert_eq!(pt, b"telemetry");
    }
}
