//! ChainSub CLI — inspect and exercise resumable subscriptions.
//!
//! # Commands
//! ```text
//! chainsub channels --id <ID> --from-block <N> [--transactions] [--mempool]
//! chainsub decode   --channel <NAME> --json <PAYLOAD>
//! chainsub simulate --id <ID> --from-block <N> [--blocks 5,3,7]
//! chainsub url      [--config <file>]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chainsub_client::SubscriberConfig;
use chainsub_core::{ChannelPlan, ChannelRole, ControlEvent, Encoding, TransactionEvent};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cmd_simulate;

#[derive(Parser)]
#[command(
    name = "chainsub",
    about = "Resumable blockchain event subscriptions — ChainSub CLI",
    long_about = "
ChainSub CLI: derive channel plans, decode connection-level payloads and
run a simulated subscription session against an in-memory broker.

ENVIRONMENT VARIABLES:
  RUST_LOG    log filter (default: info, or debug with --verbose)
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// JSON config file (SubscriberConfig)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the channel names a subscription would use
    Channels {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 0)]
        from_block: u64,
        /// Handler receives confirmed transactions
        #[arg(long)]
        transactions: bool,
        /// Handler receives mempool transactions
        #[arg(long)]
        mempool: bool,
        /// Channel prefix (default: from config, else "query:")
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Decode a connection-level JSON payload as routed by channel name
    Decode {
        #[arg(long)]
        channel: String,
        /// Raw JSON payload
        #[arg(long)]
        json: String,
    },

    /// Run a session against an in-memory broker, forcing one reconnect
    Simulate {
        #[arg(long, default_value = "demo")]
        id: String,
        #[arg(long, default_value_t = 0)]
        from_block: u64,
        /// Control confirmations to feed before the reconnect
        #[arg(long, value_delimiter = ',', default_value = "5,3,7")]
        blocks: Vec<u64>,
    },

    /// Print the websocket URL for the configured server
    Url,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Channels {
            id,
            from_block,
            transactions,
            mempool,
            prefix,
        } => cmd_channels(
            prefix.as_deref().unwrap_or(&config.channel_prefix),
            &id,
            from_block,
            transactions,
            mempool,
        ),

        Commands::Decode { channel, json } => cmd_decode(&channel, &json),

        Commands::Simulate { id, from_block, blocks } => {
            cmd_simulate::run(config, &id, from_block, &blocks).await
        }

        Commands::Url => {
            println!("{}", config.websocket_url());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<SubscriberConfig> {
    match path {
        Some(path) => SubscriberConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(SubscriberConfig::default()),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_channels(prefix: &str, id: &str, from_block: u64, transactions: bool, mempool: bool) -> Result<()> {
    let plan = ChannelPlan::new(prefix, id, from_block, transactions, mempool);
    for (role, name) in plan.iter() {
        println!("{:<8} {}", role.as_str(), name);
    }
    Ok(())
}

fn cmd_decode(channel: &str, payload: &str) -> Result<()> {
    let role = ChannelRole::from_channel_name(channel);
    let decoded = match role {
        ChannelRole::Control => {
            serde_json::to_value(Encoding::Json.decode::<ControlEvent>(payload.as_bytes())?)?
        }
        ChannelRole::Main | ChannelRole::Mempool => {
            serde_json::to_value(Encoding::Json.decode::<TransactionEvent>(payload.as_bytes())?)?
        }
    };
    println!("Role:   {role}");
    println!("Record: {}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}
