//! bacrw
//!
//! Reads and writes BACnet properties on a simulated device.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bacnet_rw::{DispatchLoop, ReadOptions, Session, SimulatedDevice};

use config::Config;

/// BACnet ReadProperty / WriteProperty client
#[derive(Parser, Debug)]
#[command(name = "bacrw")]
#[command(about = "BACnet ReadProperty / WriteProperty client", long_about = None)]
struct Args {
    /// Simulated device description (TOML)
    #[arg(short, long)]
    device: PathBuf,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vendor used to resolve vendor-specific properties
    #[arg(long)]
    vendor_id: Option<u16>,

    /// Reply timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the session notes after the command
    #[arg(long)]
    notes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// <address> <object-type> <instance> <property> [array-index]
    Read {
        #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
        tokens: Vec<String>,
    },
    /// <address> (<object-type> <instance> (<property> [array-index])+)+
    ReadMultiple {
        #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
        tokens: Vec<String>,
    },
    /// <address> <object-type> <instance> <property> <value> [array-index|-] [priority]
    Write {
        #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
        tokens: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())
        .await
        .context("Failed to load config")?;
    if let Some(vendor_id) = args.vendor_id {
        config.vendor_id = vendor_id;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting bacrw v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(config.registry().context("Invalid vendor properties")?);
    let device = SimulatedDevice::load(&args.device, registry.as_ref())
        .await
        .with_context(|| format!("Failed to load device from {}", args.device.display()))?;
    info!("Loaded device {}", device.device());

    let gateway = DispatchLoop::spawn(device, config.gateway())
        .context("Failed to start dispatch loop")?;
    let session = Session::new(Arc::new(gateway), registry);
    session.start();

    let result = run(&session, &args.command, config.vendor_id).await;
    session.stop();

    let mut output = result?;
    if args.notes {
        output = serde_json::json!({
            "result": output,
            "notes": session.notes().entries(),
        });
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(session: &Session, command: &Command, vendor_id: u16) -> Result<serde_json::Value> {
    let started = Instant::now();
    let output = match command {
        Command::Read { tokens } => {
            let options = ReadOptions {
                vendor_id,
                ..Default::default()
            };
            let value = session.read_with(&tokens.join(" "), options).await?;
            value.to_json()
        }
        Command::ReadMultiple { tokens } => {
            let values = session.read_multiple(&tokens.join(" ")).await?;
            serde_json::Value::Array(
                values
                    .iter()
                    .map(|value| value.as_ref().map_or(serde_json::Value::Null, |v| v.to_json()))
                    .collect(),
            )
        }
        Command::Write { tokens } => {
            let outcome = session.write_with(&tokens.join(" "), vendor_id).await?;
            serde_json::json!({ "outcome": outcome })
        }
    };
    info!("Completed in {:?}", started.elapsed());
    Ok(output)
}
