//! Ground control station entrypoint (C14): accepts the drone's control
//! connection, authenticates it, and runs the rekey coordinator and
//! data-plane proxy side by side until the drone ends the suite walk.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use secure_tunnel::control::ControlChannel;
use secure_tunnel::core::{ControlError, LoggingConfig, TunnelConfig, TunnelError};
use secure_tunnel::crypto::StaticIdentity;
use secure_tunnel::proxy::{self, ProxyConfig};
use secure_tunnel::registry::{SignatureAlgorithm, SuiteRegistry};
use secure_tunnel::rekey::{self, RekeyCoordinator};

/// Secure Tunnel ground control station proxy.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "gcs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a fresh signature identity and save it under the
    /// configured identity path, pairing it with the drone's public key.
    Init {
        /// Path to a file containing the drone's raw public key bytes.
        peer_public_key: PathBuf,
        /// Signature algorithm to generate under.
        #[arg(long, value_enum, default_value_t = SigAlgArg::MlDsa65)]
        algorithm: SigAlgArg,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum SigAlgArg {
    MlDsa44,
    MlDsa65,
    MlDsa87,
}

impl From<SigAlgArg> for SignatureAlgorithm {
    fn from(value: SigAlgArg) -> Self {
        match value {
            SigAlgArg::MlDsa44 => SignatureAlgorithm::MlDsa44,
            SigAlgArg::MlDsa65 => SignatureAlgorithm::MlDsa65,
            SigAlgArg::MlDsa87 => SignatureAlgorithm::MlDsa87,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!(error = %e, "gcs exiting with error");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), TunnelError> {
    let config = TunnelConfig::load(&cli.config)?;
    init_tracing(&config.logging);

    if let Some(Command::Init {
        peer_public_key,
        algorithm,
    }) = cli.command
    {
        let peer_key = std::fs::read(&peer_public_key).map_err(|source| {
            secure_tunnel::core::IdentityError::Read {
                path: peer_public_key.display().to_string(),
                source,
            }
        })?;
        let identity = StaticIdentity::generate(algorithm.into(), peer_key);
        identity.save(&config.identity_path)?;
        info!(fingerprint = %identity.fingerprint(), "generated gcs identity");
        return Ok(());
    }

    let identity = StaticIdentity::load(&config.identity_path)?;
    let registry = SuiteRegistry::default_catalog();

    let listener = TcpListener::bind(config.control_bind)
        .await
        .map_err(ControlError::Io)?;
    info!(addr = %config.control_bind, "listening for drone control connection");

    let (control_stream, peer) = listener.accept().await.map_err(ControlError::Io)?;
    info!(%peer, "drone connected");

    let mut control = ControlChannel::new(control_stream);
    control.authenticate_listener(&identity).await?;
    info!("control channel authenticated");

    let encrypted_peer_addr = SocketAddr::new(
        config.peer_address.ip(),
        secure_tunnel::core::DEFAULT_DRONE_ENCRYPTED_PORT,
    );

    let (session_tx, session_rx) = watch::channel(None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let proxy_config = ProxyConfig {
        plaintext_tx: config.plaintext_tx,
        plaintext_rx: config.plaintext_rx,
        encrypted_bind: config.encrypted_bind,
        peer_addr: encrypted_peer_addr,
        strict_peer_match: config.strict_peer_match,
        outbound_rate_limit_pps: config.outbound_rate_limit_pps,
        status_write_interval: config.status_write_interval,
        status_path: config.status_path.clone(),
        rekey_grace: config.rekey_grace,
    };

    let proxy_task = tokio::spawn(proxy::run(proxy_config, session_rx, shutdown_rx));

    let mut coordinator = RekeyCoordinator::new_gcs(
        &identity,
        &registry,
        listener,
        encrypted_peer_addr,
        config.handshake_deadline,
        config.rekey_grace,
        config.suite_log_path.clone(),
        config.status_path.clone(),
        session_tx,
    );

    let result = tokio::select! {
        r = rekey::run_gcs(&mut coordinator, &mut control) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = proxy_task.await.map_err(|e| {
        TunnelError::Proxy(secure_tunnel::core::ProxyError::Io(std::io::Error::other(
            e.to_string(),
        )))
    })??;

    result?;
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&logging.filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
