/// Status snapshot of the most recent input line, for on-demand dumps.
///
/// The processor replaces the whole `(timestamp, line)` pair in one store,
/// so a dump triggered from another task never sees the two halves of
/// different lines.
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Rendered timestamp and raw text of the latest accepted line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub display_timestamp: String,
    pub raw_line: String,
}

/// Shared handle to the latest snapshot. Cloning shares the same slot.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    slot: Arc<Mutex<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new snapshot, replacing the previous one.
    pub fn publish(&self, display_timestamp: &str, raw_line: &str) {
        let snapshot = StatusSnapshot {
            display_timestamp: display_timestamp.to_string(),
            raw_line: raw_line.to_string(),
        };
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write `Last line at <timestamp>: "<line>"` to `out`.
    pub fn report(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let snapshot = self.snapshot();
        writeln!(
            out,
            "Last line at {}: \"{}\"",
            snapshot.display_timestamp, snapshot.raw_line
        )?;
        out.flush()
    }
}
