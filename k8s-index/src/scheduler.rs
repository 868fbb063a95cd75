//! Debounced "sync X" triggers (§5, §10.6): three independent channels
//! (address files, endpoint files, node info) that coalesce any number of
//! requests between ticks into a single sync invocation, and retry with
//! capped exponential backoff when the sync reports "needs retry".

use std::time::Duration;
use tokio::sync::watch;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One named debounced channel. Cloning `Scheduler` and calling
/// [`Scheduler::request`] from any handler marks intent; the owning task
/// polling [`Scheduler::changed`] decides when to actually run the sync.
#[derive(Clone)]
pub struct Scheduler {
    tx: watch::Sender<u64>,
}

pub struct SchedulerTask {
    rx: watch::Receiver<u64>,
}

impl Scheduler {
    pub fn new() -> (Self, SchedulerTask) {
        let (tx, rx) = watch::channel(0);
        (Self { tx }, SchedulerTask { rx })
    }

    /// Marks intent to sync. Multiple calls before the task observes them
    /// collapse to one wakeup.
    pub fn request(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

impl SchedulerTask {
    /// Waits for the next coalesced request.
    pub async fn next(&mut self) -> anyhow::Result<()> {
        self.rx.changed().await.map_err(Into::into)
    }
}

/// Drives one named sync with retry-with-backoff on a `true` ("needs
/// retry") return, per §4.6/§4.7's contract. `sync` is re-invoked from
/// scratch on each retry rather than queuing — the scheduler only tracks
/// intent, never per-event work (§9).
pub async fn drive<F, Fut>(mut task: SchedulerTask, name: &'static str, mut sync: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    loop {
        if task.next().await.is_err() {
            tracing::debug!(sync = name, "scheduler channel closed, exiting");
            return;
        }

        let mut backoff = INITIAL_BACKOFF;
        loop {
            let needs_retry = sync().await;
            if !needs_retry {
                break;
            }
            tracing::warn!(sync = name, backoff = ?backoff, "sync requested retry");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn coalesces_requests_between_ticks() {
        let (scheduler, mut task) = Scheduler::new();
        scheduler.request();
        scheduler.request();
        scheduler.request();
        task.next().await.unwrap();
        // A single `changed()` observation regardless of how many requests
        // landed before it: the counter only needs to have moved at all.
    }

    #[tokio::test]
    async fn retries_until_sync_reports_success() {
        let (scheduler, task) = Scheduler::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = attempts.clone();

        let driver = tokio::spawn(drive(task, "test", move || {
            let attempts = attempts2.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                n < 2
            }
        }));

        scheduler.request();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Let backoff run its course within the test's timeout budget.
        tokio::time::sleep(INITIAL_BACKOFF * 3).await;
        driver.abort();
        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }
}
