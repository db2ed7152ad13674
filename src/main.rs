mod clock;
mod config;
mod locale;
mod parse;
mod processor;
mod raw_log;
mod runner;
mod signals;
mod status;
#[cfg(test)]
mod testutil;
mod watchdog;

use clap::Parser;
use config::PingwatchConfig;
use std::path::PathBuf;

const USAGE: &str = "\
Example usage:

  ping -D 8.8.8.8 | pingwatch

To store to file next to stdout:

  ping -D 8.8.8.8 | pingwatch | tee -a ping.log

The '-D' argument to ping is optional, as some versions of ping do not have it.
When SIGUSR1 is received, the last input line is printed to stderr.";

/// Reads the output of a continuous ping from stdin and forwards only the
/// interesting lines to stdout: slow or missing replies, skipped sequence
/// numbers, duplicates, filtered or unreachable notices, and silence.
#[derive(Parser, Debug)]
#[command(name = "pingwatch", version, about, after_help = USAGE)]
pub struct Cli {
    /// Round-trip times exceeding T ms are reported (default: 500)
    #[arg(short = 't', long, value_name = "T")]
    max_time_ms: Option<f64>,

    /// strftime format for the human-readable timestamp (default: "%Y-%m-%d %H:%M:%S")
    #[arg(long)]
    fmt: Option<String>,

    /// If H > 0 and nothing was reported within H seconds, print a still-alive message
    #[arg(long, value_name = "H")]
    heartbeat_interval: Option<f64>,

    /// Report when the sequence number advances by more than N (default: 1)
    #[arg(long, value_name = "N")]
    allowed_seq_diff: Option<u32>,

    /// Append every received line to this file, prefixing a timestamp if ping lacked -D
    #[arg(long, value_name = "FILE")]
    raw_log_file: Option<PathBuf>,

    /// Warn when ping printed nothing for this many seconds (default: 60)
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Config file path (default: pingwatch.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Overlay command-line flags on top of file/default settings.
    fn apply_overrides(&self, config: &mut PingwatchConfig) {
        if let Some(ms) = self.max_time_ms {
            config.filter.max_time_ms = ms;
        }
        if let Some(fmt) = &self.fmt {
            config.filter.timestamp_format = fmt.clone();
        }
        if let Some(secs) = self.heartbeat_interval {
            config.heartbeat.interval_secs = secs;
        }
        if let Some(diff) = self.allowed_seq_diff {
            config.filter.allowed_seq_diff = diff;
        }
        if let Some(path) = &self.raw_log_file {
            config.raw_log.path = Some(path.clone());
        }
        if let Some(secs) = self.timeout {
            config.watchdog.timeout_secs = secs;
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<PingwatchConfig, config::ConfigError> {
    let mut config = PingwatchConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn print_settings(config: &PingwatchConfig) {
    println!("pingwatch v{}", env!("CARGO_PKG_VERSION"));
    println!("max_time_ms       = {}", config.filter.max_time_ms);
    println!("timestamp_format  = {:?}", config.filter.timestamp_format);
    println!("allowed_seq_diff  = {}", config.filter.allowed_seq_diff);
    println!("heartbeat         = {} s", config.heartbeat.interval_secs);
    println!("watchdog_timeout  = {} s", config.watchdog.timeout_secs);
    match &config.raw_log.path {
        Some(path) => println!("raw_log           = {}", path.display()),
        None => println!("raw_log           = (none)"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "pingwatch=debug"
    } else {
        "pingwatch=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pingwatch: {e}");
            std::process::exit(1);
        }
    };

    if cli.dry_run {
        print_settings(&config);
        return;
    }

    let code = match runner::run(&config).await {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("pingwatch: {e}");
            1
        }
    };
    // The blocking stdin reader may still be parked in a read after a
    // shutdown signal; exiting here skips waiting on it.
    std::process::exit(code);
}
