//! kopek - cost-aware chat proxy for OpenRouter
//!
//! A local proxy that relays chat completions to OpenRouter, streams
//! tokens live, and prices every exchange in rubles.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kopek::config::Config;

#[derive(Parser)]
#[command(name = "kopek")]
#[command(about = "Cost-aware chat proxy for OpenRouter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

/// Load config, falling back to defaults when the file is absent.
fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Ok(Config::from_file(path)?)
    } else {
        tracing::info!(config = %path, "Config file not found, using defaults");
        Ok(Config::parse_str("")?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kopek=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            tracing::info!(config = %config, "Loading configuration");
            let mut config = load_config(&config)?;

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            kopek::proxy::run_server(config).await
        }

        Commands::Check { config } => {
            tracing::info!(config = %config, "Checking configuration");
            let config = Config::from_file(&config)?;
            println!("Configuration OK");
            println!("  listen:     {}", config.server.listen);
            println!("  chat_url:   {}", config.upstream.chat_url);
            println!("  models_url: {}", config.upstream.models_url);
            println!("  usd_to_rub: {}", config.pricing.usd_to_rub);
            println!(
                "  api_key:    {}",
                if config.upstream.api_key.is_some() {
                    "configured"
                } else {
                    "missing"
                }
            );
            Ok(())
        }
    }
}
