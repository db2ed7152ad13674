/// Line-by-line anomaly classification for a continuous ping stream.
///
/// One `StreamProcessor` lives for the whole run. Each call to `process`
/// handles a single line to completion: raw-log copy, anomaly output,
/// missed-sequence report, heartbeat, and state update.
use crate::clock;
use crate::parse;
use crate::status::StatusBoard;
use std::io::{self, Write};

/// Sequence numbers wrap to 0 after 65535.
pub const SEQUENCE_MODULUS: u64 = 65536;

/// Classification of a single input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineVerdict {
    /// No `seq=` marker; the line was reported and otherwise dropped.
    Unparseable,
    /// At least one anomaly was reported for this line.
    Anomaly,
    /// Nothing to report (includes the startup banner).
    Normal,
}

impl LineVerdict {
    /// Numeric code: -1 unparseable, 1 anomaly, 0 normal.
    pub fn code(self) -> i32 {
        match self {
            LineVerdict::Unparseable => -1,
            LineVerdict::Anomaly => 1,
            LineVerdict::Normal => 0,
        }
    }
}

/// Immutable classification thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    /// Round-trip times strictly above this are anomalous.
    pub max_round_trip_ms: f64,
    /// strftime format for human-readable timestamps.
    pub timestamp_format: String,
    /// Seconds without a report before a heartbeat; 0 disables.
    pub heartbeat_interval: f64,
    /// Largest sequence increment that is not reported as missed packets.
    pub allowed_sequence_gap: u32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            max_round_trip_ms: 500.0,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            heartbeat_interval: 0.0,
            allowed_sequence_gap: 1,
        }
    }
}

/// Output destinations for the processor.
pub struct Sinks {
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
    /// Heartbeat target; falls back to `stdout` when `None`.
    pub heartbeat: Option<Box<dyn Write + Send>>,
    /// Timestamp-complete copy of every accepted line.
    pub raw_log: Option<Box<dyn Write + Send>>,
}

impl Sinks {
    /// Process stdout/stderr, no heartbeat redirection, no raw log.
    pub fn stdio() -> Self {
        Self {
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
            heartbeat: None,
            raw_log: None,
        }
    }
}

pub struct StreamProcessor {
    settings: FilterSettings,
    sinks: Sinks,
    status: StatusBoard,
    last_seen_sequence: Option<u32>,
    last_report_time: f64,
}

impl StreamProcessor {
    /// Create a processor. The heartbeat clock starts now.
    pub fn new(settings: FilterSettings, sinks: Sinks, status: StatusBoard) -> Self {
        Self {
            settings,
            sinks,
            status,
            last_seen_sequence: None,
            last_report_time: clock::now_unix(),
        }
    }

    /// Sequence number of the last parsed line, `None` before the first one.
    #[allow(dead_code)]
    pub fn last_seen_sequence(&self) -> Option<u32> {
        self.last_seen_sequence
    }

    /// Unix time of the last anomaly or heartbeat output.
    #[allow(dead_code)]
    pub fn last_report_time(&self) -> f64 {
        self.last_report_time
    }

    /// Shared status board this processor publishes to.
    #[allow(dead_code)]
    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Write the latest line and its timestamp to the status channel (stderr).
    #[allow(dead_code)]
    pub fn report_status(&mut self) -> io::Result<()> {
        self.status.report(&mut self.sinks.stderr)
    }

    /// Classify one line and write whatever it warrants.
    ///
    /// Only I/O failures on the sinks are errors; malformed input is
    /// reported as [`LineVerdict::Unparseable`].
    pub fn process(&mut self, line: &str) -> io::Result<LineVerdict> {
        let line = line.trim_end();

        if parse::is_banner(line) {
            tracing::debug!(line, "ignoring ping banner");
            return Ok(LineVerdict::Normal);
        }

        let embedded = parse::timestamp(line);
        let timestamp = embedded.unwrap_or_else(clock::now_unix);
        let display = clock::render_timestamp(timestamp, &self.settings.timestamp_format);
        self.status.publish(&display, line);

        if let Some(raw_log) = self.sinks.raw_log.as_mut() {
            if embedded.is_some() {
                writeln!(raw_log, "{line}")?;
            } else {
                writeln!(raw_log, "[{timestamp:.6}] {line}")?;
            }
        }

        let Some(seq) = parse::sequence(line) else {
            let msg = format!("No sequence number found in line \"{line}\"");
            writeln!(self.sinks.stdout, "{msg}")?;
            writeln!(self.sinks.stderr, "{msg}")?;
            return Ok(LineVerdict::Unparseable);
        };

        let mut anomalous = false;

        let too_slow = match parse::round_trip_ms(line) {
            Some(ms) => ms > self.settings.max_round_trip_ms,
            None => true,
        };
        if too_slow || parse::has_suffix_after_round_trip(line) {
            tracing::debug!(seq, "round-trip anomaly");
            writeln!(self.sinks.stdout, "{display} {line}")?;
            self.last_report_time = timestamp;
            anomalous = true;
        }

        if let Some(last) = self.last_seen_sequence {
            if let Some(report) = missed_sequence_report(last, seq, self.settings.allowed_sequence_gap)
            {
                tracing::debug!(last, seq, "sequence gap");
                writeln!(self.sinks.stdout, "{display} {report}")?;
                self.last_report_time = timestamp;
                anomalous = true;
            }
        }

        let interval = self.settings.heartbeat_interval;
        if interval > 0.0 && timestamp - self.last_report_time > interval {
            let sink = self
                .sinks
                .heartbeat
                .as_mut()
                .unwrap_or(&mut self.sinks.stdout);
            writeln!(
                sink,
                "No anomalies found in the last {interval} s. Last input was at {display}"
            )?;
            self.last_report_time = timestamp;
        }

        self.last_seen_sequence = Some(seq);

        Ok(if anomalous {
            LineVerdict::Anomaly
        } else {
            LineVerdict::Normal
        })
    }
}

/// Missed-packet message when `seq` jumps further past `last` than allowed.
///
/// The threshold wraps at 65536 but the count does not, so a jump across
/// the wrap boundary is either silently accepted or reported with a
/// negative count.
pub fn missed_sequence_report(last: u32, seq: u32, allowed_gap: u32) -> Option<String> {
    let expected_max = (u64::from(last) + u64::from(allowed_gap)) % SEQUENCE_MODULUS;
    if u64::from(seq) <= expected_max {
        return None;
    }
    let first_missed = i64::from(last) + 1;
    let last_missed = i64::from(seq) - 1;
    let missed = i64::from(seq) - first_missed;
    if missed == 1 {
        Some(format!("Missed icmp_seq {first_missed}"))
    } else {
        Some(format!(
            "Missed icmp_seq {first_missed} to {last_missed} ({missed} packets)"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SharedBuf;

    struct Harness {
        processor: StreamProcessor,
        stdout: SharedBuf,
        stderr: SharedBuf,
        heartbeat: SharedBuf,
        raw_log: SharedBuf,
    }

    fn harness(settings: FilterSettings) -> Harness {
        harness_with(settings, false, false)
    }

    fn harness_with(settings: FilterSettings, redirect_heartbeat: bool, raw: bool) -> Harness {
        let stdout = SharedBuf::new();
        let stderr = SharedBuf::new();
        let heartbeat = SharedBuf::new();
        let raw_log = SharedBuf::new();
        let sinks = Sinks {
            stdout: stdout.boxed(),
            stderr: stderr.boxed(),
            heartbeat: redirect_heartbeat.then(|| heartbeat.boxed()),
            raw_log: raw.then(|| raw_log.boxed()),
        };
        Harness {
            processor: StreamProcessor::new(settings, sinks, StatusBoard::new()),
            stdout,
            stderr,
            heartbeat,
            raw_log,
        }
    }

    fn epoch_settings() -> FilterSettings {
        FilterSettings {
            timestamp_format: "%s".to_string(),
            ..Default::default()
        }
    }

    fn reply(ts: u64, seq: u32, rtt: &str) -> String {
        format!("[{ts}.000000] 64 bytes from 8.8.8.8: icmp_seq={seq} ttl=118 time={rtt} ms")
    }

    /// A timestamp comfortably in the past so heartbeats never fire by accident.
    const T0: u64 = 1_597_166_438;

    #[test]
    fn test_verdict_codes() {
        assert_eq!(LineVerdict::Unparseable.code(), -1);
        assert_eq!(LineVerdict::Anomaly.code(), 1);
        assert_eq!(LineVerdict::Normal.code(), 0);
    }

    #[test]
    fn test_banner_is_normal_and_mutates_nothing() {
        let mut h = harness_with(epoch_settings(), false, true);
        let before = h.processor.last_report_time();
        let verdict = h
            .processor
            .process("PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n")
            .unwrap();
        assert_eq!(verdict, LineVerdict::Normal);
        assert_eq!(h.processor.last_seen_sequence(), None);
        assert_eq!(h.processor.last_report_time(), before);
        assert_eq!(h.processor.status().snapshot().raw_line, "");
        assert!(h.stdout.contents().is_empty());
        assert!(h.raw_log.contents().is_empty());
    }

    #[test]
    fn test_clean_consecutive_lines_produce_no_output() {
        let mut h = harness(epoch_settings());
        assert_eq!(
            h.processor.process(&reply(T0, 1, "14.2")).unwrap(),
            LineVerdict::Normal
        );
        assert_eq!(
            h.processor.process(&reply(T0 + 1, 2, "13.8")).unwrap(),
            LineVerdict::Normal
        );
        assert!(h.stdout.contents().is_empty());
        assert!(h.stderr.contents().is_empty());
        assert_eq!(h.processor.last_seen_sequence(), Some(2));
    }

    #[test]
    fn test_missing_sequence_is_unparseable() {
        let mut h = harness(epoch_settings());
        h.processor.process(&reply(T0, 4, "10")).unwrap();
        let line = format!("[{T0}.5] 64 bytes from 8.8.8.8: ttl=118 time=10 ms");
        assert_eq!(
            h.processor.process(&line).unwrap(),
            LineVerdict::Unparseable
        );
        assert_eq!(h.processor.last_seen_sequence(), Some(4));
        let expected = format!("No sequence number found in line \"{line}\"");
        assert_eq!(h.stdout.lines(), vec![expected.clone()]);
        assert_eq!(h.stderr.lines(), vec![expected]);
    }

    #[test]
    fn test_unparseable_line_keeps_report_time() {
        let mut h = harness(epoch_settings());
        let before = h.processor.last_report_time();
        h.processor.process("garbage without marker").unwrap();
        assert_eq!(h.processor.last_report_time(), before);
        assert_eq!(h.processor.last_seen_sequence(), None);
    }

    #[test]
    fn test_threshold_boundary() {
        let mut h = harness(FilterSettings {
            max_round_trip_ms: 100.0,
            ..epoch_settings()
        });
        assert_eq!(
            h.processor.process(&reply(T0, 1, "100")).unwrap(),
            LineVerdict::Normal
        );
        assert_eq!(
            h.processor.process(&reply(T0, 2, "100.001")).unwrap(),
            LineVerdict::Anomaly
        );
        assert_eq!(
            h.stdout.lines(),
            vec![format!("{T0} {}", reply(T0, 2, "100.001"))]
        );
    }

    #[test]
    fn test_comma_decimal_round_trip() {
        let mut h = harness(FilterSettings {
            max_round_trip_ms: 14.0,
            ..epoch_settings()
        });
        assert_eq!(
            h.processor.process(&reply(T0, 1, "14,2")).unwrap(),
            LineVerdict::Anomaly
        );
    }

    #[test]
    fn test_dup_suffix_is_anomaly_below_threshold() {
        let mut h = harness(FilterSettings {
            max_round_trip_ms: 1000.0,
            ..epoch_settings()
        });
        h.processor.process(&reply(T0, 876, "20")).unwrap();
        let dup = format!("{} (DUP!)", reply(T0 + 1, 877, "244"));
        assert_eq!(h.processor.process(&dup).unwrap(), LineVerdict::Anomaly);
        assert_eq!(h.stdout.lines(), vec![format!("{} {dup}", T0 + 1)]);
    }

    #[test]
    fn test_missing_round_trip_is_anomaly() {
        let mut h = harness(epoch_settings());
        let line = format!("[{T0}.934841] From 10.0.0.1 icmp_seq=14 Packet filtered");
        assert_eq!(h.processor.process(&line).unwrap(), LineVerdict::Anomaly);
        assert_eq!(h.stdout.lines(), vec![format!("{T0} {line}")]);
        assert!((h.processor.last_report_time() - (T0 as f64 + 0.934841)).abs() < 1e-6);
    }

    #[test]
    fn test_trailing_newline_is_stripped() {
        let mut h = harness(epoch_settings());
        let line = format!("[{T0}] From 10.0.0.1 icmp_seq=13317 Destination Host Unreachable\r\n");
        h.processor.process(&line).unwrap();
        assert_eq!(
            h.stdout.contents(),
            format!("{T0} {}\n", line.trim_end())
        );
    }

    #[test]
    fn test_missed_range_report() {
        let mut h = harness(epoch_settings());
        h.processor.process(&reply(T0, 5, "10")).unwrap();
        assert_eq!(
            h.processor.process(&reply(T0 + 3, 8, "10")).unwrap(),
            LineVerdict::Anomaly
        );
        assert_eq!(
            h.stdout.lines(),
            vec![format!("{} Missed icmp_seq 6 to 7 (2 packets)", T0 + 3)]
        );
        assert_eq!(h.processor.last_seen_sequence(), Some(8));
        assert_eq!(h.processor.last_report_time(), (T0 + 3) as f64);
    }

    #[test]
    fn test_missed_single_report() {
        let mut h = harness(epoch_settings());
        h.processor.process(&reply(T0, 5, "10")).unwrap();
        h.processor.process(&reply(T0 + 2, 7, "10")).unwrap();
        assert_eq!(
            h.stdout.lines(),
            vec![format!("{} Missed icmp_seq 6", T0 + 2)]
        );
    }

    #[test]
    fn test_latency_and_gap_both_reported() {
        let mut h = harness(epoch_settings());
        h.processor.process(&reply(T0, 1, "10")).unwrap();
        let slow = reply(T0 + 3, 4, "900");
        assert_eq!(h.processor.process(&slow).unwrap(), LineVerdict::Anomaly);
        assert_eq!(
            h.stdout.lines(),
            vec![
                format!("{} {slow}", T0 + 3),
                format!("{} Missed icmp_seq 2 to 3 (2 packets)", T0 + 3),
            ]
        );
    }

    #[test]
    fn test_allowed_gap_suppresses_small_jumps() {
        let mut h = harness(FilterSettings {
            allowed_sequence_gap: 3,
            ..epoch_settings()
        });
        h.processor.process(&reply(T0, 5, "10")).unwrap();
        assert_eq!(
            h.processor.process(&reply(T0 + 3, 8, "10")).unwrap(),
            LineVerdict::Normal
        );
        assert_eq!(
            h.processor.process(&reply(T0 + 7, 12, "10")).unwrap(),
            LineVerdict::Anomaly
        );
        assert_eq!(
            h.stdout.lines(),
            vec![format!("{} Missed icmp_seq 9 to 11 (3 packets)", T0 + 7)]
        );
    }

    #[test]
    fn test_first_line_never_reports_gap() {
        let mut h = harness(epoch_settings());
        assert_eq!(
            h.processor.process(&reply(T0, 500, "10")).unwrap(),
            LineVerdict::Normal
        );
    }

    #[test]
    fn test_wrap_to_zero_is_consecutive() {
        let mut h = harness(epoch_settings());
        h.processor.process(&reply(T0, 65535, "10")).unwrap();
        assert_eq!(
            h.processor.process(&reply(T0 + 1, 0, "10")).unwrap(),
            LineVerdict::Normal
        );
        assert_eq!(h.processor.last_seen_sequence(), Some(0));
    }

    #[test]
    fn test_wrap_boundary_loss_goes_unreported() {
        // 65535 and 0 were lost, but the wrapped threshold (65535) hides it.
        let mut h = harness(epoch_settings());
        h.processor.process(&reply(T0, 65534, "10")).unwrap();
        assert_eq!(
            h.processor.process(&reply(T0 + 3, 1, "10")).unwrap(),
            LineVerdict::Normal
        );
        assert!(h.stdout.contents().is_empty());
    }

    #[test]
    fn test_wrap_boundary_negative_count() {
        // Only 0 was lost, but the unwrapped count goes negative.
        let mut h = harness(epoch_settings());
        h.processor.process(&reply(T0, 65535, "10")).unwrap();
        assert_eq!(
            h.processor.process(&reply(T0 + 2, 1, "10")).unwrap(),
            LineVerdict::Anomaly
        );
        assert_eq!(
            h.stdout.lines(),
            vec![format!(
                "{} Missed icmp_seq 65536 to 0 (-65535 packets)",
                T0 + 2
            )]
        );
    }

    #[test]
    fn test_missed_sequence_report_pure() {
        assert_eq!(missed_sequence_report(5, 6, 1), None);
        assert_eq!(missed_sequence_report(5, 5, 1), None);
        assert_eq!(missed_sequence_report(5, 3, 1), None);
        assert_eq!(
            missed_sequence_report(5, 7, 1).as_deref(),
            Some("Missed icmp_seq 6")
        );
        assert_eq!(
            missed_sequence_report(5, 8, 1).as_deref(),
            Some("Missed icmp_seq 6 to 7 (2 packets)")
        );
        assert_eq!(missed_sequence_report(65534, 1, 1), None);
    }

    #[test]
    fn test_heartbeat_fires_once_per_crossing() {
        let mut h = harness(FilterSettings {
            heartbeat_interval: 10.0,
            ..epoch_settings()
        });
        // Future timestamps: well past the construction-time report clock.
        let base = clock::now_unix().floor() as u64 + 1000;

        assert_eq!(
            h.processor.process(&reply(base, 1, "10")).unwrap(),
            LineVerdict::Normal
        );
        assert_eq!(h.processor.last_report_time(), base as f64);
        h.processor.process(&reply(base + 1, 2, "10")).unwrap();
        h.processor.process(&reply(base + 10, 3, "10")).unwrap();
        assert_eq!(
            h.stdout.lines(),
            vec![format!(
                "No anomalies found in the last 10 s. Last input was at {base}"
            )]
        );

        h.processor.process(&reply(base + 11, 4, "10")).unwrap();
        assert_eq!(h.stdout.lines().len(), 2);
        assert_eq!(h.processor.last_report_time(), (base + 11) as f64);
    }

    #[test]
    fn test_anomaly_resets_heartbeat_clock() {
        let mut h = harness(FilterSettings {
            heartbeat_interval: 10.0,
            ..epoch_settings()
        });
        let base = clock::now_unix().floor() as u64 + 1000;
        h.processor.process(&reply(base, 1, "900")).unwrap();
        assert_eq!(h.stdout.lines().len(), 1);
        h.processor.process(&reply(base + 5, 2, "10")).unwrap();
        assert_eq!(h.stdout.lines().len(), 1);
    }

    #[test]
    fn test_heartbeat_disabled_by_zero_interval() {
        let mut h = harness(epoch_settings());
        let base = clock::now_unix().floor() as u64 + 1000;
        h.processor.process(&reply(base, 1, "10")).unwrap();
        assert!(h.stdout.contents().is_empty());
    }

    #[test]
    fn test_heartbeat_redirected_to_own_sink() {
        let mut h = harness_with(
            FilterSettings {
                heartbeat_interval: 10.0,
                ..epoch_settings()
            },
            true,
            false,
        );
        let base = clock::now_unix().floor() as u64 + 1000;
        h.processor.process(&reply(base, 1, "10")).unwrap();
        assert!(h.stdout.contents().is_empty());
        assert_eq!(h.heartbeat.lines().len(), 1);
    }

    #[test]
    fn test_raw_log_keeps_bracketed_lines_verbatim() {
        let mut h = harness_with(epoch_settings(), false, true);
        let line = reply(T0, 1, "10");
        h.processor.process(&format!("{line}\n")).unwrap();
        assert_eq!(h.raw_log.contents(), format!("{line}\n"));
    }

    #[test]
    fn test_raw_log_prefixes_missing_timestamp() {
        let mut h = harness_with(epoch_settings(), false, true);
        let line = "64 bytes from 8.8.8.8: icmp_seq=1 ttl=118 time=14.2 ms";
        let before = clock::now_unix();
        h.processor.process(line).unwrap();
        let after = clock::now_unix();

        let logged = h.raw_log.contents();
        let rest = logged.strip_prefix('[').unwrap();
        let (ts, tail) = rest.split_once("] ").unwrap();
        let ts: f64 = ts.parse().unwrap();
        assert!(ts >= before - 1e-6 && ts <= after + 1e-6);
        assert_eq!(tail, format!("{line}\n"));
    }

    #[test]
    fn test_raw_log_receives_unparseable_lines() {
        let mut h = harness_with(epoch_settings(), false, true);
        h.processor.process(&format!("[{T0}] garbage")).unwrap();
        assert_eq!(h.raw_log.contents(), format!("[{T0}] garbage\n"));
    }

    #[test]
    fn test_status_reflects_latest_line() {
        let mut h = harness(epoch_settings());
        h.processor.process(&reply(T0, 1, "10")).unwrap();
        let latest = reply(T0 + 1, 2, "11");
        h.processor.process(&latest).unwrap();
        h.processor.report_status().unwrap();
        assert_eq!(
            h.stderr.lines(),
            vec![format!("Last line at {}: \"{latest}\"", T0 + 1)]
        );
        // Reporting is read-only.
        assert_eq!(h.processor.last_seen_sequence(), Some(2));
    }

    #[test]
    fn test_status_includes_unparseable_line() {
        let mut h = harness(epoch_settings());
        h.processor.process(&format!("[{T0}] no marker")).unwrap();
        let snap = h.processor.status().snapshot();
        assert_eq!(snap.raw_line, format!("[{T0}] no marker"));
        assert_eq!(snap.display_timestamp, T0.to_string());
    }
}
