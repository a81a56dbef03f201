use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_CLEAR_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    #[default]
    None,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub kind: StatusKind,
}

/// The user-visible status line.
///
/// Success messages clear themselves after `clear_delay` unless another
/// report arrives first; at most one clear is ever pending.
pub struct StatusReporter {
    tx: Arc<watch::Sender<Status>>,
    clear_delay: Duration,
    generation: Arc<AtomicU64>,
    pending_clear: Mutex<Option<JoinHandle<()>>>,
}

impl StatusReporter {
    pub fn new(clear_delay: Duration) -> Self {
        let (tx, _rx) = watch::channel(Status::default());
        Self {
            tx: Arc::new(tx),
            clear_delay,
            generation: Arc::new(AtomicU64::new(0)),
            pending_clear: Mutex::new(None),
        }
    }

    pub fn current(&self) -> Status {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    pub fn report(&self, message: impl Into<String>, kind: StatusKind) {
        let message = message.into();
        let mut pending = self
            .pending_clear
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match kind {
            StatusKind::Error => tracing::warn!(%message, "status"),
            StatusKind::None => {}
            _ => tracing::info!(%message, ?kind, "status"),
        }
        self.tx.send_replace(Status { message, kind });

        if kind == StatusKind::Success {
            let tx = Arc::clone(&self.tx);
            let current = Arc::clone(&self.generation);
            let delay = self.clear_delay;
            *pending = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // A report that raced the abort bumped the generation.
                if current.load(Ordering::SeqCst) == generation {
                    tx.send_replace(Status::default());
                }
            }));
        }
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        let pending = self
            .pending_clear
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn success_clears_after_delay() {
        let reporter = StatusReporter::new(DEFAULT_CLEAR_DELAY);
        reporter.report("done", StatusKind::Success);
        assert_eq!(reporter.current().kind, StatusKind::Success);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(reporter.current().message, "done");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(reporter.current(), Status::default());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_report_cancels_pending_clear() {
        let reporter = StatusReporter::new(DEFAULT_CLEAR_DELAY);
        reporter.report("done", StatusKind::Success);
        tokio::time::sleep(Duration::from_secs(2)).await;
        reporter.report("working", StatusKind::Loading);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            reporter.current(),
            Status {
                message: "working".to_owned(),
                kind: StatusKind::Loading,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_success_restarts_the_timer() {
        let reporter = StatusReporter::new(DEFAULT_CLEAR_DELAY);
        reporter.report("first", StatusKind::Success);
        tokio::time::sleep(Duration::from_secs(2)).await;
        reporter.report("second", StatusKind::Success);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(reporter.current().message, "second");

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(reporter.current().kind, StatusKind::None);
    }

    #[tokio::test]
    async fn errors_persist_and_subscribers_see_updates() {
        let reporter = StatusReporter::new(Duration::from_millis(1));
        let mut rx = reporter.subscribe();
        reporter.report("boom", StatusKind::Error);

        rx.changed().await.expect("reporter alive");
        assert_eq!(rx.borrow().message, "boom");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(reporter.current().kind, StatusKind::Error);
    }
}
