//! Delayed-task scheduler backing the partition fetch workers.
//!
//! Models a fixed pool of timed executors on top of tokio: each scheduled
//! tick sleeps out its delay, then takes one of `fetch_threads` permits
//! before running, so at most `fetch_threads` ticks execute concurrently no
//! matter how many partitions are assigned. Reseek paths replace the whole
//! scheduler, relying on [`FetchScheduler::shutdown`] to fence off in-flight
//! ticks.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Returned by [`FetchScheduler::schedule`] once shutdown has begun. Workers
/// treat this as benign: it is the expected outcome of rearming against a
/// scheduler that a reseek has torn down.
#[derive(Debug)]
pub(crate) struct ScheduleRejected;

pub(crate) struct FetchScheduler {
    shutdown_tx: watch::Sender<bool>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    accepting: AtomicBool,
}

impl FetchScheduler {
    pub fn new(fetch_threads: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            permits: Arc::new(Semaphore::new(fetch_threads)),
            tasks: Mutex::new(JoinSet::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// A receiver that flips to `true` when shutdown begins. Ticks select on
    /// it to abandon blocking waits (buffer offers) promptly.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Runs `task` after `delay`, gated on a pool permit. Must be called from
    /// within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Result<(), ScheduleRejected>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(ScheduleRejected);
        }

        let permits = self.permits.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        self.tasks.lock().spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = shutdown.changed() => return,
            };
            task.await;
        });
        Ok(())
    }

    /// Stops accepting work, signals shutdown, and waits up to `grace` for
    /// in-flight ticks to finish before aborting the rest.
    pub async fn shutdown(&self, grace: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_schedule_runs_after_delay() {
        let scheduler = FetchScheduler::new(2);
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        scheduler
            .schedule(Duration::from_millis(10), async move {
                ran_clone.store(true, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_schedule_rejected_after_shutdown() {
        let scheduler = FetchScheduler::new(2);
        scheduler.shutdown(Duration::from_millis(100)).await;
        assert!(scheduler.schedule(Duration::ZERO, async {}).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_ticks() {
        let scheduler = FetchScheduler::new(2);
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        scheduler
            .schedule(Duration::from_secs(60), async move {
                ran_clone.store(true, Ordering::SeqCst);
            })
            .unwrap();

        scheduler.shutdown(Duration::from_millis(200)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_tasks_after_grace() {
        let scheduler = FetchScheduler::new(1);
        scheduler
            .schedule(Duration::ZERO, async {
                std::future::pending::<()>().await;
            })
            .unwrap();

        // stuck task never observes the signal; the forced phase reaps it
        let start = std::time::Instant::now();
        scheduler.shutdown(Duration::from_millis(100)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let scheduler = FetchScheduler::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let running = running.clone();
            let peak = peak.clone();
            scheduler
                .schedule(Duration::ZERO, async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
