//! Standalone repository server binary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use repub_logging::LogSettings;
use repub_server::config::TokenConfig;
use repub_server::{run_server, Config};

#[derive(Parser)]
#[command(name = "repub-server")]
#[command(about = "Hosted pub package repository server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the repository server
    Start {
        /// JSON configuration file
        #[arg(long, default_value = "repub.json")]
        config: PathBuf,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for archives and the package catalog
        #[arg(long)]
        data: Option<PathBuf>,

        /// Public base URL used in generated links
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Validate configuration and print the effective settings
    CheckConfig {
        /// JSON configuration file
        #[arg(long, default_value = "repub.json")]
        config: PathBuf,
    },
}

/// File, then environment, then command line.
fn effective_config(path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.apply_env(std::env::vars());
    Ok(config)
}

fn print_config(config: &Config) {
    println!("host:            {}", config.server.host);
    println!("port:            {}", config.server.port);
    println!("base url:        {}", config.server.base_url);
    println!("data directory:  {}", config.storage.data_dir.display());
    println!("max upload:      {} MiB", config.limits.max_upload_size_mb);
    println!("upload ttl:      {} s", config.limits.pending_upload_ttl_secs);
    println!("log level:       {}", config.log_level);
    println!("read tokens:     {}", token_names(&config.auth.read_tokens));
    println!("write tokens:    {}", token_names(&config.auth.write_tokens));
}

/// Token names only, values stay secret.
fn token_names(tokens: &[TokenConfig]) -> String {
    tokens
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            host,
            port,
            data,
            base_url,
        } => {
            let mut config = effective_config(&config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data) = data {
                config.storage.data_dir = data;
            }
            if let Some(base_url) = base_url {
                config.server.base_url = base_url;
            }
            config.validate().context("Invalid configuration")?;

            let mut settings = LogSettings::from_env();
            settings.level = config.log_level.clone();
            let _guard = repub_logging::init_with(&settings);

            info!(version = env!("CARGO_PKG_VERSION"), "repub-server starting");
            run_server(config).await
        }

        Commands::CheckConfig { config } => {
            let config = effective_config(&config)?;
            config.validate().context("Invalid configuration")?;
            print_config(&config);
            println!("configuration OK");
            Ok(())
        }
    }
}
