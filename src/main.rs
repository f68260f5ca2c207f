/* Access-control daemon entry point.
 *
 * Wires together the authenticator, the physical actuator stand-in, and one
 * `ConnectionManager` per configured serial endpoint, then runs forever. */
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use access_controller::clock::{self, SystemClock};
use access_controller::physical::{self, LoggingPhysicalActions};
use access_controller::terminal::connection::Endpoint;
use access_controller::{authenticator, supervisor};

/// Access-control daemon for gate, upstairs, elevator and admin terminals.
#[derive(Parser)]
#[command(name = "access-controller", version, about)]
struct Cli {
    /// Path to the users CSV file.
    #[arg(long, default_value = "/var/access/users.csv")]
    users: PathBuf,

    /// Write logs to this file instead of stdout.
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// One or more `<device>[:<baud>]` serial endpoints, one per terminal.
    #[arg(required = true)]
    endpoints: Vec<String>,
}

fn init_tracing(logfile: &Option<PathBuf>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

fn parse_endpoints(raw: &[String]) -> Result<Vec<Endpoint>> {
    raw.iter()
        .map(|s| s.parse::<Endpoint>().with_context(|| format!("invalid endpoint {s:?}")))
        .collect()
}

async fn run(cli: Cli) -> Result<()> {
    let endpoints = parse_endpoints(&cli.endpoints)?;

    let clock: Arc<dyn clock::Clock> = Arc::new(SystemClock);
    let authenticator = authenticator::Authenticator::load(cli.users.clone(), clock.clone())
        .with_context(|| format!("loading users from {}", cli.users.display()))?;
    let authenticator = Arc::new(authenticator);

    let physical: Arc<dyn physical::PhysicalActions> = Arc::new(LoggingPhysicalActions);

    info!(endpoints = ?cli.endpoints, users = %cli.users.display(), "starting access controller");
    supervisor::run(endpoints, authenticator, physical, clock).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    /* clap's default `error::exit()` uses exit code 2 for usage errors, but
     * we want exit 1 when no endpoints are given, so usage errors are
     * printed and exited manually instead of via `Cli::parse()`. */
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1)
        }
    };

    if let Err(e) = init_tracing(&cli.logfile) {
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
