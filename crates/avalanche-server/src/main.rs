// ============================================
// File: crates/avalanche-server/src/main.rs
// ============================================
//! # Avalanche Server Entry Point
//!
//! ## Creation Reason
//! Main entry point for the game-server binary.
//! Handles CLI parsing, logging setup, and server startup.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration loading and validation
//! - Server execution
//!
//! ## Usage
//! ```bash
//! avalanche-server start                      # Run with /etc/avalanche/server.toml
//! avalanche-server start -c ./server.toml     # Run with a local config
//! avalanche-server validate                   # Check and print the effective config
//! avalanche-server keygen                     # Draw one exchange for client debugging
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A missing config file means defaults, a broken one is an error
//! - `RUST_LOG` overrides `[logging].level`
//! - The subscriber is installed once, after the config is read. Nothing
//!   may log before that point.
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used until a config has been read, and when none can be.
const DEFAULT_LOG_LEVEL: &str = "info";

use avalanche_core::crypto::PrimeSource;
use avalanche_server::{Server, ServerConfig};

// ============================================
// CLI Definition
// ============================================

/// Avalanche game server
#[derive(Parser, Debug)]
#[command(name = "avalanche-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server
    Start {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/avalanche/server.toml")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/avalanche/server.toml")]
        config: PathBuf,
    },

    /// Run the server half of one key exchange and print its values
    #[command(hide = true)]
    Keygen {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/avalanche/server.toml")]
        config: PathBuf,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { config } => cmd_start(&config).await,
        Commands::Validate { config } => cmd_validate(&config).await,
        Commands::Keygen { config } => cmd_keygen(&config).await,
    };

    if let Err(e) = result {
        // No-op when the command already installed one.
        init_logging(DEFAULT_LOG_LEVEL);
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Starts the server.
async fn cmd_start(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    init_logging(&config.logging.level);
    announce_defaults(config_path);

    let server = Server::bind(config).await?;
    info!("Listening on {}", server.local_addr());
    server.run().await?;

    Ok(())
}

/// Validates the configuration and prints the effective settings.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    let config = ServerConfig::load(config_path).await?;
    init_logging(&config.logging.level);

    println!("Configuration is valid: {}", config_path.display());
    println!();
    println!("{}", config.to_toml());
    Ok(())
}

/// Draws one prime and prints the values a client would receive.
async fn cmd_keygen(config_path: &Path) -> anyhow::Result<()> {
    let config = load_or_default_config(config_path).await?;
    init_logging(&config.logging.level);
    announce_defaults(config_path);
    let exchange_config = &config.key_exchange;

    let primes = PrimeSource::spawn(exchange_config.prime_bits, 1);
    let mut exchange = exchange_config.template()?;
    tokio::time::timeout(exchange_config.exchange_timeout(), exchange.compute_public_key(&primes))
        .await??;

    println!("p       = {}", exchange_config.primitive_root);
    println!("g       = {}", exchange_config.generator);
    println!("public  = {}", exchange.public_value_hex().unwrap_or_default());
    println!("cipher  = {:?}", config.cipher.kind);
    println!("key     = {}", hex::encode(config.cipher.initial_key.as_bytes()));
    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Builds the log filter. `RUST_LOG`, when set and valid, wins over `level`.
fn log_filter(env_directives: Option<&str>, level: &str) -> EnvFilter {
    env_directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

/// Installs the tracing subscriber. Returns `false` if one is already set.
fn init_logging(level: &str) -> bool {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(log_filter(env.as_deref(), level))
        .try_init()
        .is_ok()
}

/// Loads config, or defaults if the file does not exist.
async fn load_or_default_config(path: &Path) -> anyhow::Result<ServerConfig> {
    if path.exists() {
        Ok(ServerConfig::load(path).await?)
    } else {
        Ok(ServerConfig::default())
    }
}

fn announce_defaults(path: &Path) {
    if !path.exists() {
        info!("Config file {} not found, using defaults", path.display());
    }
}

// ============================================
// Tests
// ============================================
