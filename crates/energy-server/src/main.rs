use anyhow::{Context, Result};
use clap::Parser;
use energy_config::{CountriesMode, RuntimeConfig, StoreBackend};
use std::path::PathBuf;

/// Renewable-energy share API with webhook notifications
#[derive(Parser)]
#[command(name = "energy-api")]
#[command(version)]
#[command(about = "Renewable-energy share API with webhook notifications", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Durable store backend: none, memory, fs, s3
    #[arg(long, value_name = "BACKEND")]
    store_backend: Option<StoreBackend>,

    /// Directory for the filesystem store (implies --store-backend fs)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Read neighbours from this JSON file instead of the REST Countries service
    #[arg(long, value_name = "FILE")]
    static_countries: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    apply_cli_overrides(&mut config, &cli)?;
    config.validate().context("Invalid configuration")?;

    display_startup_info(&config);

    energy_server::run_with_config(config).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) -> Result<()> {
    if let Some(port) = cli.port {
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }

    if let Some(backend) = cli.store_backend {
        config.store.backend = backend;
    }

    if let Some(dir) = &cli.data_dir {
        if config.store.backend != StoreBackend::Fs && config.store.backend != StoreBackend::None {
            anyhow::bail!(
                "--data-dir only works with the filesystem store, but backend is '{}'",
                config.store.backend
            );
        }
        config.store.backend = StoreBackend::Fs;
        let fs = config.store.fs.get_or_insert_with(Default::default);
        fs.path = dir.to_string_lossy().to_string();
    }

    if let Some(path) = &cli.static_countries {
        config.countries.mode = CountriesMode::Static;
        config.countries.static_path = path.to_string_lossy().to_string();
    }

    Ok(())
}

fn display_startup_info(config: &RuntimeConfig) {
    // Tracing is not installed yet
    eprintln!("energy-api {}", env!("CARGO_PKG_VERSION"));
    eprintln!("  listen:     {}", config.server.listen_addr);
    eprintln!("  dataset:    {}", config.dataset.csv_path);
    eprintln!("  countries:  {}", config.countries.mode);
    eprintln!("  store:      {}", config.store.backend);
}
