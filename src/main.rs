//! lockprov - Provisioning station for USB HID smart locks
//!
//! Reads a lock's identity, has it generate a CSR, and installs the issued
//! certificate, device private key and CA chain.

mod bundle;
mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lockprov")]
#[command(about = "Provision smart locks over their USB HID interface")]
#[command(version)]
struct Cli {
    /// YAML config file (defaults to $LOCKPROV_CONFIG when set)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for the lock to be plugged in
    #[arg(short, long, default_value = "30")]
    wait_secs: u64,

    /// Print raw report traffic
    #[arg(long)]
    traffic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print connect/disconnect events until interrupted
    Watch,

    /// Read the lock's MAC address and IMEI
    Info,

    /// Have the lock generate a CSR
    Csr {
        /// Write the CSR to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run the full provisioning sequence
    Provision {
        /// YAML bundle with certificate, privateKey, ca and rootCA
        #[arg(short, long)]
        bundle: PathBuf,

        /// Also write the lock's CSR to this file
        #[arg(long)]
        csr_out: Option<PathBuf>,
    },

    /// List stored lock records
    Records,

    /// Print the wire frame for a raw command (hex)
    Frame {
        /// Command bytes, e.g. "00014000"
        hex: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Framing needs no device and no configuration
    if let Commands::Frame { hex } = &cli.command {
        if let Err(e) = commands::print_frame(hex) {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    tracing::debug!("Configuration: {:?}", config);

    if let Err(e) = commands::execute(cli, config).await {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }

    Ok(())
}
