/// Main loop: read ping lines, classify each, reset the watchdog, repeat.
use crate::config::{ConfigError, PingwatchConfig};
use crate::locale;
use crate::processor::{LineVerdict, Sinks, StreamProcessor};
use crate::raw_log::{self, RawLogError};
use crate::signals::SignalHandler;
use crate::status::StatusBoard;
use crate::watchdog::Watchdog;
use std::future::Future;
use std::io::{self, IsTerminal};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Line counts for one run, logged at exit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub lines: u64,
    pub anomalies: u64,
    pub unparseable: u64,
}

impl RunSummary {
    fn record(&mut self, verdict: LineVerdict) {
        self.lines += 1;
        match verdict {
            LineVerdict::Anomaly => self.anomalies += 1,
            LineVerdict::Unparseable => self.unparseable += 1,
            LineVerdict::Normal => {}
        }
    }
}

/// Why the read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfInput,
    Signal(&'static str),
}

/// Errors that abort a run.
#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    /// stdin is a terminal rather than a pipe from ping.
    InteractiveStdin,
    RawLog(RawLogError),
    Signals { source: io::Error },
    /// Reading input or writing output failed.
    Io { source: io::Error },
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "{e}"),
            RunError::InteractiveStdin => write!(
                f,
                "stdin is a terminal; pipe ping output in instead \
                 (e.g. `ping -D 8.8.8.8 | pingwatch`), see --help"
            ),
            RunError::RawLog(e) => write!(f, "{e}"),
            RunError::Signals { source } => {
                write!(f, "failed to install signal handlers: {}", source)
            }
            RunError::Io { source } => write!(f, "I/O error: {}", source),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::InteractiveStdin => None,
            RunError::RawLog(e) => Some(e),
            RunError::Signals { source } => Some(source),
            RunError::Io { source } => Some(source),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        RunError::Config(e)
    }
}

impl From<RawLogError> for RunError {
    fn from(e: RawLogError) -> Self {
        RunError::RawLog(e)
    }
}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        RunError::Io { source: e }
    }
}

/// Feed every line of `reader` through `processor` until EOF or `shutdown`.
///
/// Each line is processed completely before the watchdog is reset and the
/// next line is read. Invalid UTF-8 is replaced rather than rejected.
pub async fn drive<R, S>(
    mut reader: R,
    processor: &mut StreamProcessor,
    watchdog: &Watchdog,
    shutdown: S,
) -> io::Result<(RunSummary, StopReason)>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = &'static str>,
{
    tokio::pin!(shutdown);
    let mut summary = RunSummary::default();
    let mut buf = Vec::new();

    let reason = loop {
        // read_until keeps partial data in `buf` if the shutdown branch wins.
        let read = tokio::select! {
            biased;
            signal = &mut shutdown => break StopReason::Signal(signal),
            read = reader.read_until(b'\n', &mut buf) => read?,
        };
        if read == 0 {
            break StopReason::EndOfInput;
        }

        let line = String::from_utf8_lossy(&buf);
        let verdict = processor.process(&line)?;
        tracing::trace!(code = verdict.code(), "line classified");
        summary.record(verdict);
        watchdog.reset();
        buf.clear();
    };

    Ok((summary, reason))
}

/// Wire everything up from a validated config and run until stdin closes.
pub async fn run(config: &PingwatchConfig) -> Result<RunSummary, RunError> {
    if io::stdin().is_terminal() {
        return Err(RunError::InteractiveStdin);
    }

    locale::warn_if_localized();

    let mut sinks = Sinks::stdio();
    if let Some(path) = &config.raw_log.path {
        sinks.raw_log = Some(Box::new(raw_log::open(path)?));
    }

    let board = StatusBoard::new();
    let mut signals = SignalHandler::install(board.clone(), Box::new(io::stderr()))
        .map_err(|e| RunError::Signals { source: e })?;

    let settings = config.filter_settings();
    let watchdog = Watchdog::start(
        config.watchdog_timeout(),
        settings.timestamp_format.clone(),
        Box::new(io::stdout()),
    );
    let mut processor = StreamProcessor::new(settings, sinks, board);

    tracing::info!(
        max_time_ms = config.filter.max_time_ms,
        heartbeat_interval = config.heartbeat.interval_secs,
        allowed_seq_diff = config.filter.allowed_seq_diff,
        watchdog_timeout_secs = config.watchdog.timeout_secs,
        "pingwatch reading from stdin"
    );

    let reader = BufReader::new(tokio::io::stdin());
    let result = drive(reader, &mut processor, &watchdog, signals.shutdown()).await;
    watchdog.stop();
    let (summary, reason) = result?;

    tracing::info!(
        reason = ?reason,
        lines = summary.lines,
        anomalies = summary.anomalies,
        unparseable = summary.unparseable,
        "pingwatch finished"
    );
    Ok(summary)
}
