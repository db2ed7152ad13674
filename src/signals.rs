/// Signal handling for status dumps and graceful shutdown.
///
/// SIGUSR1: print the latest status snapshot to stderr, without touching
/// line processing (a dedicated task reads the published snapshot).
/// SIGINT / SIGTERM: resolve `shutdown()` so the driver can stop reading,
/// disarm the watchdog and exit cleanly.
use crate::status::StatusBoard;
use std::io::{self, Write};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;

pub struct SignalHandler {
    status_task: JoinHandle<()>,
    sigint: Signal,
    sigterm: Signal,
}

impl SignalHandler {
    /// Install all handlers. Status dumps go to `status_sink`.
    pub fn install(
        board: StatusBoard,
        status_sink: Box<dyn Write + Send>,
    ) -> io::Result<SignalHandler> {
        let sigusr1 = signal(SignalKind::user_defined1())?;
        let sigint = signal(SignalKind::interrupt())?;
        let sigterm = signal(SignalKind::terminate())?;
        let status_task = tokio::spawn(status_loop(sigusr1, board, status_sink));
        Ok(SignalHandler {
            status_task,
            sigint,
            sigterm,
        })
    }

    /// Wait for SIGINT or SIGTERM; returns the signal name.
    pub async fn shutdown(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
        }
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.status_task.abort();
    }
}

async fn status_loop(mut sigusr1: Signal, board: StatusBoard, mut sink: Box<dyn Write + Send>) {
    while sigusr1.recv().await.is_some() {
        if let Err(e) = board.report(&mut sink) {
            tracing::warn!(error = %e, "failed to write status report");
        }
    }
}
