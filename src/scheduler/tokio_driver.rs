//! Async driver for applications that already run a tokio runtime.
//!
//! This module requires the `tokio` feature flag:
//!
//! ```toml
//! [dependencies]
//! handheld-link = { version = "0.1", features = ["tokio"] }
//! ```

use std::future::Future;

use tracing::debug;
use web_time::Duration;

use super::Scheduler;

/// How long the driver sleeps when no task is scheduled. New tasks wake it earlier.
const IDLE_WAIT: Duration = Duration::from_millis(250);

impl Scheduler {
    /// Runs due tasks as they fall due until `stop` completes.
    ///
    /// This is the async counterpart of [`Scheduler::spawn_driver`]. Callbacks run on
    /// the task polling this future, so keep them short.
    ///
    /// ```no_run
    /// use handheld_link::Scheduler;
    /// use std::time::Duration;
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() {
    ///     let scheduler = Scheduler::new();
    ///     let _task = scheduler.schedule_periodic("tick", Duration::from_millis(16), || {});
    ///     scheduler
    ///         .run_until(tokio::time::sleep(Duration::from_secs(1)))
    ///         .await;
    /// }
    /// ```
    pub async fn run_until<F>(&self, stop: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        debug!("Async scheduler driver started");
        loop {
            let wait = self
                .next_deadline()
                .map_or(IDLE_WAIT, |due| due.saturating_duration_since(self.now()));

            tokio::select! {
                () = &mut stop => break,
                () = tokio::time::sleep(wait) => {
                    self.run_pending();
                },
                () = self.shared.notify.notified() => {},
            }
        }
        debug!("Async scheduler driver stopped");
    }
}
