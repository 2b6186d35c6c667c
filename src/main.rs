use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

use minthawk::config::LoggingConfig;
use minthawk::{runtime, AppConfig};

#[derive(Parser)]
#[command(
    name = "minthawk",
    version,
    about = "Bonding-curve token sniper for Solana launch platforms"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the trader
    Run {
        /// Path to the bot configuration file
        #[arg(long, default_value = "config/bot.toml")]
        config: PathBuf,
    },
    /// Validate a configuration file and exit
    Validate {
        #[arg(long, default_value = "config/bot.toml")]
        config: PathBuf,
    },
}

fn init_logging(
    config: &LoggingConfig,
    name: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.file {
        let appender = tracing_appender::rolling::daily("logs", format!("{name}.log"));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);
        if config.json {
            registry
                .with(tracing_subscriber::fmt::layer().json().boxed())
                .with(file_layer.json().boxed())
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().boxed())
                .with(file_layer.boxed())
                .init();
        }
        Some(guard)
    } else {
        if config.json {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = AppConfig::load(&config)?;
            let _guard = init_logging(&config.logging, &config.name);
            runtime::run(config).await?;
        }
        Command::Validate { config } => {
            let config = AppConfig::load(&config)?;
            match config.validate() {
                Ok(()) => println!("Configuration OK"),
                Err(errors) => {
                    eprintln!("Configuration invalid:");
                    for error in errors {
                        eprintln!("  - {error}");
                    }
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
