/// Input-inactivity monitor for the ping stream.
///
/// Runs as a background tokio task. If `reset()` is not called within
/// `timeout`, writes a warning and starts another `timeout` countdown,
/// repeating until the next `reset()` or `stop()`. The task holds no
/// runtime alive on its own: it is aborted on drop and discarded when the
/// runtime shuts down.
use crate::clock;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Shared {
    /// Cleared by `stop()`; checked under the sink lock before every warning.
    armed: AtomicBool,
    /// Wakes the timer task to restart (or park) its countdown.
    rearm: Notify,
    sink: Mutex<Box<dyn Write + Send>>,
}

pub struct Watchdog {
    shared: Arc<Shared>,
    timeout: Duration,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Spawn the timer task and arm it for `timeout`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(timeout: Duration, format: String, sink: Box<dyn Write + Send>) -> Self {
        let shared = Arc::new(Shared {
            armed: AtomicBool::new(true),
            rearm: Notify::new(),
            sink: Mutex::new(sink),
        });
        let task = tokio::spawn(run(Arc::clone(&shared), timeout, format));
        tracing::debug!(timeout_secs = timeout.as_secs_f64(), "watchdog armed");
        Self {
            shared,
            timeout,
            task,
        }
    }

    /// Restart the countdown from now. Re-arms a stopped watchdog.
    pub fn reset(&self) {
        self.shared.armed.store(true, Ordering::Release);
        self.shared.rearm.notify_one();
    }

    /// Disarm. Once this returns no further warning is written until `reset()`.
    pub fn stop(&self) {
        // Taking the sink lock waits out a warning that is mid-write.
        let _sink = self
            .shared
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.shared.armed.store(false, Ordering::Release);
        self.shared.rearm.notify_one();
        tracing::debug!("watchdog stopped");
    }

    #[allow(dead_code)]
    pub fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }

    #[allow(dead_code)]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(shared: Arc<Shared>, timeout: Duration, format: String) {
    loop {
        if !shared.armed.load(Ordering::Acquire) {
            shared.rearm.notified().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(timeout) => fire(&shared, timeout, &format),
            _ = shared.rearm.notified() => {}
        }
    }
}

fn fire(shared: &Shared, timeout: Duration, format: &str) {
    let mut sink = shared.sink.lock().unwrap_or_else(PoisonError::into_inner);
    if !shared.armed.load(Ordering::Acquire) {
        return;
    }
    let now = clock::render_timestamp(clock::now_unix(), format);
    let result = writeln!(
        sink,
        "{now} No result line from ping received for {} seconds",
        timeout.as_secs_f64()
    )
    .and_then(|()| sink.flush());
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to write watchdog warning");
    }
}
