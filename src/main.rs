//! Operator CLI for inspecting and repairing persisted bridge sessions.
//!
//! All logic lives in the library; this binary only wires paths to the
//! stores. Model-driven iteration is launched by the surrounding tooling,
//! not from here.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use review_bridge::bridge::{
    BridgeConfig, BridgeSession, CircuitBreaker, CircuitBreakerRecord, FileStore, SessionRecord,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the session record (overrides BRIDGE_SESSION_PATH)
    #[arg(long)]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a fresh session record in PREFLIGHT
    Init {
        /// Stable bridge identifier; generated when omitted
        #[arg(long)]
        bridge_id: Option<String>,
        /// Maximum review iterations
        #[arg(long, default_value_t = 5)]
        depth: u32,
    },
    /// Print the session and breaker status
    Status,
    /// Re-arm a tripped circuit breaker (history is kept)
    ResetBreaker,
}

fn session_path(args: &Args) -> anyhow::Result<PathBuf> {
    if let Some(path) = &args.session {
        return Ok(path.clone());
    }
    std::env::var("BRIDGE_SESSION_PATH")
        .map(PathBuf::from)
        .context("no --session flag and BRIDGE_SESSION_PATH is unset")
}

/// Breaker record lives next to the session it guards.
fn breaker_path(session: &PathBuf) -> PathBuf {
    session.with_extension("breaker.json")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let path = session_path(&args)?;

    match args.command {
        Command::Init { bridge_id, depth } => {
            let bridge_id =
                bridge_id.unwrap_or_else(|| format!("br-{}", uuid::Uuid::new_v4().simple()));
            let store = FileStore::<SessionRecord>::new(&path);
            let session = BridgeSession::init(store, bridge_id.as_str(), BridgeConfig::new(depth))?;
            println!("{}", session.read()?.status_line());
        }
        Command::Status => {
            let store = FileStore::<SessionRecord>::new(&path);
            let session = BridgeSession::resume(store)?;
            let record = session.read()?;
            println!("{}", record.status_line());

            let breaker_store = FileStore::<CircuitBreakerRecord>::new(breaker_path(&path));
            if breaker_store.path().exists() {
                let breaker = CircuitBreaker::open(breaker_store)?;
                let record = breaker.read()?;
                println!(
                    "breaker: {:?} cycles={} trips={}",
                    record.state,
                    record.triggers.cycle_count.current,
                    record.history.len()
                );
            }
        }
        Command::ResetBreaker => {
            let breaker_store = FileStore::<CircuitBreakerRecord>::new(breaker_path(&path));
            let breaker = CircuitBreaker::open(breaker_store)?;
            breaker.reset()?;
            println!("breaker re-armed; history preserved");
        }
    }

    Ok(())
}
