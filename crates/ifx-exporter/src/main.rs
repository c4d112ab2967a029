//! ifx-exporter - Informix performance counter exporter
//!
//! Polls the configured Informix instances on a fixed interval and serves
//! the latest counter values to Prometheus.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use ifx_collector::{CATALOG, ExporterConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "ifx-exporter")]
#[command(about = "Prometheus exporter for Informix performance counters")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the exporter
    Run {
        /// Path to config file
        #[arg(
            short,
            long,
            env = "IFX_EXPORTER_CONFIG",
            default_value = "/etc/ifx-exporter/config.toml"
        )]
        config: PathBuf,
    },

    /// Validate a config file and print a summary
    CheckConfig {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/ifx-exporter/config.toml")]
        config: PathBuf,
    },

    /// List every exported counter
    Catalog,

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "/etc/ifx-exporter/config.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive("ifx_exporter=info".parse()?)
        .add_directive("ifx_collector=info".parse()?);
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }

    match cli.command {
        Commands::Run { config } => {
            run_exporter(config).await?;
        }

        Commands::CheckConfig { config } => {
            check_config(&config)?;
        }

        Commands::Catalog => {
            print_catalog();
        }

        Commands::InitConfig { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

async fn run_exporter(config_path: PathBuf) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting ifx-exporter");

    let config = ExporterConfig::from_file(&config_path)?;
    info!(
        instances = config.instances.len(),
        listen = %config.server.listen,
        interval_secs = config.scrape.interval_secs,
        on_pull = config.scrape.on_pull,
        "loaded config"
    );

    #[cfg(feature = "odbc")]
    {
        ifx_exporter::Exporter::start(&config, ifx_exporter::odbc::OdbcConnector)
            .run_until(shutdown_signal())
            .await?;
        Ok(())
    }

    #[cfg(not(feature = "odbc"))]
    {
        let _ = config;
        Err(ifx_exporter::ExporterError::DriverUnavailable.into())
    }
}

#[cfg(feature = "odbc")]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = ExporterConfig::from_file(path)?;

    println!("Config {} is valid", path.display());
    println!();
    println!("  Instances:");
    for instance in &config.instances {
        println!("    {}", instance.name);
    }
    println!(
        "  Retry: {} attempts, {} ms ({:?})",
        config.retry.max_attempts, config.retry.delay_ms, config.retry.backoff
    );
    if config.scrape.on_pull {
        println!("  Scrape: on every pull");
    } else {
        println!("  Scrape: every {}s", config.scrape.interval_secs);
    }
    println!("  Listen: {}", config.server.listen);
    println!("  Namespace: {}", config.server.namespace);

    Ok(())
}

fn print_catalog() {
    let width = CATALOG.iter().map(|def| def.name.len()).max().unwrap_or(0);
    for def in CATALOG {
        println!("{:width$}  {}", def.name, def.help);
    }
    println!();
    println!("{} counters", CATALOG.len());
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    ExporterConfig::sample().save(output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Edit the [[instances]] entries, then run:");
    println!("  ifx-exporter run --config {}", output.display());

    Ok(())
}
