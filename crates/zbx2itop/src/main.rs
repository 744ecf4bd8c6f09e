//! zbx2itop binary.
//!
//! Exports Zabbix hosts to iTop-compatible CSV files.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zbx2itop_core::{
    ExportConfig, ExportOptions, Exporter, OutputReport, ZabbixClient, ZabbixHost,
};

#[derive(Parser)]
#[command(name = "zbx2itop")]
#[command(
    version,
    about = "Export Zabbix hosts to iTop-compatible CSV (filters + Zabbix to iTop mapping)",
    long_about = None
)]
struct Cli {
    /// Config file
    #[arg(long, value_name = "PATH", required_unless_present = "list_fields")]
    config: Option<PathBuf>,

    /// Enable debugging
    #[arg(long)]
    debug: bool,

    /// Skip existing output files
    #[arg(long)]
    skip_existing: bool,

    /// Only process this output (can be repeated)
    #[arg(long = "output", value_name = "NAME")]
    outputs: Vec<String>,

    /// Write CSV files but do not run import commands
    #[arg(long)]
    no_import: bool,

    /// List the host items available to map and template columns, then exit
    #[arg(long)]
    list_fields: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "info,zbx2itop=debug,zbx2itop_core=debug"
    } else {
        "warn,zbx2itop=info,zbx2itop_core=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn summary_lines(reports: &[OutputReport]) -> Vec<String> {
    let mut lines = Vec::new();
    for report in reports {
        lines.push(format!(
            "{}: {} ({} rows, {} filtered, {} duplicates) -> {}",
            report.name,
            report.status,
            report.rows,
            report.filtered,
            report.duplicates,
            report.outfile.display()
        ));
        if let Some(import) = &report.import {
            lines.push(match import.exit_code {
                Some(code) => format!("  import exited with {}", code),
                None if import.timed_out => "  import timed out".to_string(),
                None => "  import terminated by signal".to_string(),
            });
        }
    }
    lines
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_fields {
        println!("{}", ZabbixHost::describe());
        return Ok(());
    }

    dotenvy::dotenv().ok();
    init_tracing(cli.debug);

    let config_path = cli.config.context("--config is required")?;
    let config = ExportConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    tracing::debug!(options = ?config.options, outputs = config.outputs.len(), "Configuration loaded");

    let mut client = ZabbixClient::new(&config.options).context("Failed to create Zabbix client")?;
    client
        .login(&config.options)
        .await
        .with_context(|| format!("Failed to log in to {}", client.endpoint()))?;

    let options = ExportOptions {
        skip_existing: cli.skip_existing,
        run_imports: !cli.no_import,
        only: cli.outputs,
    };

    let run = Exporter::new(&client, options).run(&config).await;

    if let Err(e) = client.logout().await {
        tracing::warn!(error = %e, "Logout failed");
    }

    for line in summary_lines(&run.reports) {
        println!("{}", line);
    }
    run.into_result().context("Export failed")?;
    Ok(())
}
