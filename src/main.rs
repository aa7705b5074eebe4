use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error};

use z2m_health::duration::{format_duration, parse_duration};
use z2m_health::logging::init_logging;
use z2m_health::{probe, ExitReason, ProbeStatus, SignalListener, WatchdogConfig};

#[derive(Parser, Debug)]
#[command(name = "z2m-health")]
#[command(about = "Liveness watchdog for zigbee2mqtt device traffic")]
#[command(version)]
struct Args {
    /// Optional TOML config file; environment variables override it
    #[arg(short, long, env = "Z2M_HEALTH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exit 0 if the liveness marker exists, 1 otherwise
    Probe {
        /// Path of the liveness marker
        #[arg(long, env = "HEALTH_FILE_PATH", default_value = "/tmp/liveness")]
        path: PathBuf,

        /// Also require the marker to be modified within this age (e.g. "90s", "2m")
        #[arg(long)]
        max_age: Option<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    match args.command {
        Some(Command::Probe { path, max_age }) => probe_marker(&path, max_age.as_deref()),
        None => run_watchdog(args.config.as_deref()),
    }
}

/// Check the liveness marker (container health check entry point)
fn probe_marker(path: &Path, max_age: Option<&str>) -> ExitCode {
    let max_age = match max_age.map(parse_duration).transpose() {
        Ok(max_age) => max_age,
        Err(e) => {
            eprintln!("Invalid --max-age: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match probe(path, max_age) {
        Ok(status) => {
            match status {
                ProbeStatus::Alive => {}
                ProbeStatus::Missing => eprintln!("{} does not exist", path.display()),
                ProbeStatus::Stale { age } => eprintln!(
                    "{} last refreshed {} ago",
                    path.display(),
                    format_duration(age)
                ),
            }
            ExitCode::from(status.exit_code())
        }
        Err(e) => {
            eprintln!("Failed to check {}: {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}

/// Run the watchdog until a signal or a fatal connection failure
fn run_watchdog(config_path: Option<&Path>) -> ExitCode {
    let config = match WatchdogConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.log) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&config) {
        Ok(reason) => ExitCode::from(reason.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &WatchdogConfig) -> Result<ExitReason> {
    debug!(
        "Start with check interval {}",
        format_duration(config.check_interval)
    );
    debug!("Broker settings: {:?}", config.broker);

    // Build a tokio runtime
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let signals = SignalListener::install().context("Failed to install signal handlers")?;
        supervise(config, signals).await
    })
}

#[cfg(feature = "mqtt")]
async fn supervise(config: &WatchdogConfig, signals: SignalListener) -> Result<ExitReason> {
    use std::sync::Arc;

    use tracing::info;
    use z2m_health::{MqttTransport, Supervisor, SystemClock};

    let broker = &config.broker;
    info!(
        "Connecting to {}:{} as {}",
        broker.host, broker.port, broker.client_id
    );

    let transport = MqttTransport::builder()
        .host(broker.host.as_str())
        .port(broker.port)
        .client_id(broker.client_id.as_str())
        .credentials(broker.username.as_str(), broker.password.as_str())
        .keep_alive(broker.keep_alive)
        .build()
        .context("Failed to create MQTT client")?;

    let supervisor = Supervisor::new(config, Arc::new(SystemClock));
    Ok(supervisor.run(transport, signals.recv()).await)
}

#[cfg(not(feature = "mqtt"))]
async fn supervise(_config: &WatchdogConfig, _signals: SignalListener) -> Result<ExitReason> {
    anyhow::bail!("z2m-health was built without the mqtt feature; no transport is available")
}
