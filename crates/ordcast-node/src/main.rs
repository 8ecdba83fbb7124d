//! ordcast-node: one member of a replicated currency cluster.
//!
//! Each node generates random currency updates, multicasts them through the
//! ordering engine and applies every delivered update. Since all nodes
//! deliver the same updates in the same order, they all end with the same
//! value.

use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ordcast::{AppHandle, EngineConfig, OrderingEngine};
use ordcast_core::{Message, MessageKind, ProcessId};
use ordcast_net::{BootstrapConfig, Roster};

mod currency;

use currency::{random_update, CurrencyValue};

/// ordcast-node - replicated currency over total-order multicast
#[derive(Parser, Debug)]
#[command(name = "ordcast-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Process id, used as the timestamp suffix
    pid: i32,

    /// Number of updates to generate
    iterations: u32,

    /// Logical clock increment per event
    clock_step: u64,

    /// Path to the peer roster
    #[arg(long, default_value = "info.txt")]
    roster: PathBuf,

    /// Address to listen on. Defaults to the roster entry ranked `pid`
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Seconds to wait for objections to an exit probe
    #[arg(long, default_value_t = 10)]
    grace_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let pid = ProcessId::new(cli.pid);
    if pid.is_sentinel() {
        bail!("process id {} is reserved", cli.pid);
    }

    let listen = match cli.listen {
        Some(addr) => addr,
        None => default_listen_addr(&cli)?,
    };
    let bootstrap = BootstrapConfig::new(cli.roster.clone(), listen);
    let config = EngineConfig::new(pid, cli.clock_step)
        .with_grace_interval(Duration::from_secs(cli.grace_secs));

    info!(pid = %pid, %listen, "Starting the middleware");
    let (engine, mut app) = OrderingEngine::bootstrap(config, &bootstrap)
        .await
        .context("cluster bootstrap failed")?;
    let engine = engine.spawn();

    app.wait_ready()
        .await
        .context("engine stopped before it became ready")?;

    let value = run_app(&mut app, cli.iterations).await?;
    let (sell, buy) = value.value();
    info!("Final currency value is [{},{}]", sell, buy);

    let report = engine.await.context("engine task failed")??;
    info!(
        delivered = report.delivered,
        sent = report.sent,
        received = report.received,
        anomalies = report.anomalies,
        exit_attempts = report.exit_attempts,
        "done"
    );
    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
    Ok(())
}

fn default_listen_addr(cli: &Cli) -> Result<SocketAddr> {
    let roster = Roster::load(&cli.roster)?;
    let rank = usize::try_from(cli.pid).context("process id must not be negative")?;
    match roster.members().get(rank) {
        Some(addr) => Ok(*addr),
        None => bail!(
            "roster {} has {} members, no entry for rank {}; pass --listen",
            cli.roster.display(),
            roster.len(),
            rank
        ),
    }
}

/// Generate updates, then keep applying deliveries until the exit message.
async fn run_app(app: &mut AppHandle, iterations: u32) -> Result<CurrencyValue> {
    let mut value = CurrencyValue::new();
    let mut rng = StdRng::from_entropy();

    for _ in 0..iterations {
        let pause = Duration::from_millis(rng.gen_range(0..1000));
        tokio::time::sleep(pause).await;

        app.submit(random_update(&mut rng))?;

        while let Some(message) = app.try_recv() {
            apply(&mut value, &message);
        }
    }

    info!("Done with update generation");
    app.finish();

    while let Some(message) = app.recv().await {
        if app.is_exit(&message) {
            return Ok(value);
        }
        apply(&mut value, &message);
    }
    bail!("engine stopped without an exit message")
}

fn apply(value: &mut CurrencyValue, message: &Message) {
    match (message.kind(), message.payload()) {
        (MessageKind::Update, Some(payload)) => {
            if let Err(e) = value.apply(payload.values(), message.timestamp()) {
                error!(ts = %message.timestamp(), "{}", e);
            }
        }
        (kind, _) => error!(
            "Message type '{}' is not expected in application layer",
            kind.tag()
        ),
    }
}
