//! The timing substrate: delayed and periodic work keyed by alert id.
//!
//! Every scheduled task is independently cancellable, and resolving an
//! alert cancels everything pending for that id — a resolved alert must
//! never fire a later escalation or monitoring tick.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

/// Handle registry for pending per-alert tasks.
#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Arc<Mutex<HashMap<Uuid, Vec<AbortHandle>>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` once after `delay`, unless the alert's tasks are
    /// cancelled first.
    pub fn schedule<F>(&self, alert_id: Uuid, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        });

        self.register(alert_id, handle.abort_handle());
    }

    /// Run `tick` every `every`, starting one interval from now, until the
    /// tick returns `false` or the alert's tasks are cancelled.
    pub fn schedule_repeating<F, Fut>(&self, alert_id: Uuid, every: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                if !tick().await {
                    break;
                }
            }
        });

        self.register(alert_id, handle.abort_handle());
    }

    fn register(&self, alert_id: Uuid, handle: AbortHandle) {
        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        let entries = tasks.entry(alert_id).or_default();
        entries.retain(|h| !h.is_finished());
        entries.push(handle);
    }

    /// Abort every pending task for an alert. Returns how many were
    /// still live.
    pub fn cancel_all(&self, alert_id: Uuid) -> usize {
        let handles = self
            .tasks
            .lock()
            .expect("scheduler lock poisoned")
            .remove(&alert_id)
            .unwrap_or_default();

        let live = handles.iter().filter(|h| !h.is_finished()).count();
        for handle in handles {
            handle.abort();
        }

        if live > 0 {
            debug!(%alert_id, cancelled = live, "Cancelled pending alert tasks");
        }
        live
    }

    /// How many tasks are still pending for an alert.
    pub fn pending(&self, alert_id: Uuid) -> usize {
        self.tasks
            .lock()
            .expect("scheduler lock poisoned")
            .get(&alert_id)
            .map(|handles| handles.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_scheduled_task_runs() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let alert_id = Uuid::new_v4();

        let counter = fired.clone();
        scheduler.schedule(alert_id, Duration::from_millis(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(alert_id), 0);
    }

    #[tokio::test]
    async fn test_cancelled_task_never_fires() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let alert_id = Uuid::new_v4();

        let counter = fired.clone();
        scheduler.schedule(alert_id, Duration::from_millis(40), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(scheduler.cancel_all(alert_id), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeating_task_stops_on_false() {
        let scheduler = Scheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let alert_id = Uuid::new_v4();

        let counter = ticks.clone();
        scheduler.schedule_repeating(alert_id, Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move { counter.fetch_add(1, Ordering::SeqCst) < 2 }
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        // Two ticks returned true-then-false; the loop stopped at three.
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_is_scoped_to_alert() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let doomed = Uuid::new_v4();
        let survivor = Uuid::new_v4();

        let counter = fired.clone();
        scheduler.schedule(doomed, Duration::from_millis(20), async move {
            counter.fetch_add(10, Ordering::SeqCst);
        });
        let counter = fired.clone();
        scheduler.schedule(survivor, Duration::from_millis(20), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.cancel_all(doomed);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
