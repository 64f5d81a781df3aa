//! Drone companion-computer entrypoint (C14): dials the GCS's control
//! connection, authenticates it, and drives the suite walk as the rekey
//! decider while the data-plane proxy runs alongside it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{error, info};

use secure_tunnel::core::{ControlError, LoggingConfig, TunnelConfig, TunnelError};
use secure_tunnel::control::ControlChannel;
use secure_tunnel::crypto::StaticIdentity;
use secure_tunnel::proxy::{self, ProxyConfig};
use secure_tunnel::registry::{SignatureAlgorithm, SuiteRegistry};
use secure_tunnel::rekey::{self, RekeyCoordinator, SuiteStep};

/// How long a suite in the default single-suite run is allowed to stay
/// active before the tunnel would otherwise cut over on its own. Set high
/// enough that in practice only `ctrl-c` ends the run.
const INDEFINITE_RUN_DURATION: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Secure Tunnel drone companion-computer proxy.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "drone.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single suite until interrupted (the default when no
    /// subcommand is given).
    Run {
        /// Suite id to negotiate. Defaults to the registry's first suite.
        #[arg(long)]
        suite: Option<String>,
    },
    /// Walk an ordered list of suites, rekeying from one to the next after
    /// each runs for `duration_secs`, recording a [`SuiteRunRecord`] per
    /// suite to the configured suite log.
    Bench {
        /// Suite ids to walk, in order. Defaults to the full registry.
        suites: Vec<String>,
        /// How long each suite runs before rekeying to the next.
        #[arg(long, default_value_t = 30)]
        duration_secs: u64,
    },
    /// Generate a fresh signature identity and save it under the
    /// configured identity path, pairing it with the GCS's public key.
    Init {
        /// Path to a file containing the GCS's raw public key bytes.
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
            error!(error = %e, "drone exiting with error");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), TunnelError> {
    let config = TunnelConfig::load(&cli.config)?;
    init_tracing(&config.logging);

    let command = cli.command.unwrap_or(Command::Run { suite: None });

    if let Command::Init {
        peer_public_key,
        algorithm,
    } = &command
    {
        let peer_key = std::fs::read(peer_public_key).map_err(|source| {
            secure_tunnel::core::IdentityError::Read {
                path: peer_public_key.display().to_string(),
                source,
            }
        })?;
        let identity = StaticIdentity::generate((*algorithm).into(), peer_key);
        identity.save(&config.identity_path)?;
        info!(fingerprint = %identity.fingerprint(), "generated drone identity");
        return Ok(());
    }

    let identity = StaticIdentity::load(&config.identity_path)?;
    let registry = SuiteRegistry::default_catalog();

    let catalog = match &command {
        Command::Run { suite } => {
            let suite_id = suite.clone().unwrap_or_else(|| {
                registry
                    .iter_ordered()
                    .next()
                    .expect("default catalog is never empty")
                    .suite_id
                    .clone()
            });
            vec![SuiteStep {
                suite_id,
                duration: INDEFINITE_RUN_DURATION,
            }]
        }
        Command::Bench {
            suites,
            duration_secs,
        } => {
            let suite_ids = if suites.is_empty() {
                registry
                    .iter_ordered()
                    .map(|s| s.suite_id.clone())
                    .collect()
            } else {
                suites.clone()
            };
            suite_ids
                .into_iter()
                .map(|suite_id| SuiteStep {
                    suite_id,
                    duration: Duration::from_secs(*duration_secs),
                })
                .collect()
        }
        Command::Init { .. } => unreachable!("handled above"),
    };

    let control_stream = TcpStream::connect(config.control_bind)
        .await
        .map_err(ControlError::Io)?;
    info!(addr = %config.control_bind, "connected to gcs control channel");

    let mut control = ControlChannel::new(control_stream);
    control.authenticate_initiator(&identity).await?;
    info!("control channel authenticated");

    let encrypted_peer_addr = SocketAddr::new(
        config.peer_address.ip(),
        secure_tunnel::core::DEFAULT_GCS_ENCRYPTED_PORT,
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

    let mut coordinator = RekeyCoordinator::new_drone(
        &identity,
        &registry,
        config.control_bind,
        encrypted_peer_addr,
        config.handshake_deadline,
        config.rekey_grace,
        config.suite_log_path.clone(),
        config.status_path.clone(),
        session_tx,
    );

    let result = tokio::select! {
        r = rekey::run_drone(&mut coordinator, &mut control, &catalog) => r,
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
