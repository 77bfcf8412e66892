mod check;
mod config;
mod fetch;
mod metric;
mod parser;
mod render;

use check::{CheckError, CheckState};
use clap::error::ErrorKind;
use clap::Parser;
use config::{OutputFormat, Overrides, StatisticsFormat};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Reads BIND nameserver statistics (text dump, XML or JSON statistics
/// channel) and prints them as Graphite or Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "bind-stats-check", version, about)]
pub struct Cli {
    /// Statistics format to read (default: file)
    #[arg(short = 'f', long, env = "STATISTICS_FORMAT", value_enum)]
    statistics_format: Option<StatisticsFormat>,

    /// Statistics file path (named.stats, or a saved XML/JSON document)
    #[arg(short = 'p', long, env = "STATISTICS_FILEPATH")]
    statistics_filepath: Option<PathBuf>,

    /// Statistics channel IP address
    #[arg(short = 'a', long, env = "STATISTICS_IP")]
    statistics_ip: Option<String>,

    /// Statistics channel port
    #[arg(short = 'P', long, env = "STATISTICS_PORT")]
    statistics_port: Option<u32>,

    /// Output format (default: graphite)
    #[arg(short, long, env = "OUTPUT_FORMAT", value_enum)]
    output_format: Option<OutputFormat>,

    /// Graphite path prefix (default: bind.dns)
    #[arg(long)]
    graphite_prefix: Option<String>,

    /// Drop zero-valued metrics
    #[arg(long)]
    skip_zero: bool,

    /// HTTP request timeout in seconds (default: 10)
    #[arg(long)]
    timeout: Option<u64>,

    /// Config file path
    #[arg(short, long, default_value = "bind-stats-check.toml")]
    config: PathBuf,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            statistics_format: self.statistics_format,
            file_path: self.statistics_filepath.clone(),
            ip: self.statistics_ip.clone(),
            port: self.statistics_port,
            timeout_secs: self.timeout,
            output_format: self.output_format,
            graphite_prefix: self.graphite_prefix.clone(),
            skip_zero: self.skip_zero,
        }
    }
}

/// The UNKNOWN status line for an argument error. Help and version requests
/// are not errors and yield `None`.
fn argument_error(e: &clap::Error) -> Option<String> {
    match e.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => None,
        _ => {
            let rendered = e.to_string();
            let message = rendered.lines().next().unwrap_or_default();
            let message = message.strip_prefix("error: ").unwrap_or(message);
            Some(format!("{}: {message}", CheckState::Unknown))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match argument_error(&e) {
            Some(line) => {
                println!("{line}");
                return ExitCode::from(CheckState::Unknown.exit_code());
            }
            None => e.exit(),
        },
    };

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let result = match config::load_config(&cli.config) {
        Ok(file_config) => {
            let config = file_config.merge(cli.overrides());
            tracing::debug!(?config, "resolved configuration");
            check::run(&config).await
        }
        Err(e) => Err(CheckError::Config(e)),
    };

    match result {
        Ok(lines) => {
            let mut out = std::io::stdout().lock();
            for line in &lines {
                if let Err(e) = writeln!(out, "{line}") {
                    tracing::error!(error = %e, "failed to write metrics");
                    return ExitCode::from(CheckState::Critical.exit_code());
                }
            }
            ExitCode::from(CheckState::Ok.exit_code())
        }
        Err(e) => {
            let state = e.state();
            tracing::error!(error = %e, %state, "check failed");
            println!("{state}: {e}");
            ExitCode::from(state.exit_code())
        }
    }
}
