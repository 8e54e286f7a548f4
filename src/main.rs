//! Entry point for sci-data-viewer.
//! Parses the CLI, sets up logging on stderr and prints exactly one JSON envelope on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use sci_data_viewer::cli::{Args, Command};
use sci_data_viewer::config::Settings;
use sci_data_viewer::envelope::{startup_error, Envelope, VersionsResult};
use sci_data_viewer::service::Inspector;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("invalid log filter '{}'", level))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

/// Logging and settings; a failure here still yields a JSON envelope.
fn startup(args: &Args) -> Result<Settings> {
    init_logging(&args.log_level)?;
    Settings::load_optional(args.config.as_deref()).context("failed to load settings")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = match startup(&args) {
        Ok(settings) => settings,
        Err(e) => {
            println!("{}", startup_error(format!("{:#}", e)).to_json());
            return Err(e);
        }
    };
    debug!(?settings, "settings ready");
    let inspector = Inspector::new(settings);

    let json = match args.command {
        Command::Info { file } => inspector.file_info(&file).to_json(),
        Command::Plot {
            file,
            variable,
            plot_type,
            style,
        } => inspector
            .create_plot(&file, &variable, &plot_type, style.as_deref())
            .to_json(),
        Command::Versions => {
            let envelope: Envelope<VersionsResult, ()> = Envelope::Result(VersionsResult {
                versions: inspector.versions(),
            });
            envelope.to_json()
        }
    };

    println!("{}", json);
    info!("done");
    Ok(())
}
