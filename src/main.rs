//! Topic Consumer - configuration check tool
//!
//! Loads a consumer configuration, validates it, resolves the connection
//! string and reports what would be provisioned. Never contacts a broker
//! and never prints credentials.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use topic_consumer::config::ConsumerConfiguration;
use topic_consumer::error::sanitize_error_message;
use topic_consumer::observability::init_default_logging;
use topic_consumer::{ReceiveMode, SubscriptionDescriptor};
use tracing::{error, info};

/// Topic subscription consumer tooling
#[derive(Parser)]
#[command(name = "topic-consumer")]
#[command(about = "Validate topic subscription consumer configuration")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "TOPIC_CONSUMER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and report what would be provisioned
    Check {
        /// Print the subscription descriptor and filter
        #[arg(long)]
        show: bool,

        /// Consumer variant that would be built
        #[arg(long, value_enum, default_value_t = Mode::Simple)]
        mode: Mode,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Receive-and-delete (at-most-once)
    Simple,
    /// Peek-lock with complete/abandon (at-least-once)
    Transactional,
}

impl From<Mode> for ReceiveMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Simple => ReceiveMode::ReceiveAndDelete,
            Mode::Transactional => ReceiveMode::PeekLock,
        }
    }
}

#[derive(Serialize)]
struct CheckReport<'a> {
    namespace: String,
    receive_mode: ReceiveMode,
    descriptor: SubscriptionDescriptor,
    filter: Option<&'a str>,
}

fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(
                "Failed to load configuration: {}",
                sanitize_error_message(&e.to_string())
            );
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Check { show, mode } => handle_check_command(&config, show, mode.into()),
    };

    if let Err(e) = result {
        error!("Command failed: {}", sanitize_error_message(&e.to_string()));
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ConsumerConfiguration, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ConsumerConfiguration::load_from_file(path)?)
        }
        None => {
            // Try default locations
            for path_str in ["consumer.toml", "config/consumer.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ConsumerConfiguration::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Provide one with -c/--config or create consumer.toml".into())
        }
    }
}

fn handle_check_command(
    config: &ConsumerConfiguration,
    show: bool,
    mode: ReceiveMode,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = config.connection_string()?;
    let filter = config.sql_filter();

    if show {
        let report = CheckReport {
            namespace: connection.namespace().to_string(),
            receive_mode: mode,
            descriptor: SubscriptionDescriptor::new(
                &config.topic,
                &config.subscription,
                config.time_to_expire(),
            ),
            filter: filter.as_ref().map(|f| f.expression()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    info!(
        topic = %config.topic,
        subscription = %config.subscription,
        mode = %mode,
        "Configuration validation complete"
    );
    Ok(())
}
