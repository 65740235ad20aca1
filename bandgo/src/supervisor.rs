use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Keeps a fixed number of worker slots occupied.
///
/// Every slot runs its own loop: start a worker, wait for it, and start a
/// fresh one in its place if it panicked.
#[derive(Clone)]
pub struct Supervisor {
    slots: usize,
    active: Arc<AtomicUsize>,
    restarts: Arc<AtomicU64>,
}

impl Supervisor {
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            active: Arc::new(AtomicUsize::new(0)),
            restarts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Worker instances currently running.
    #[inline]
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Replacements started after a worker panicked.
    #[inline]
    #[must_use]
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Acquire)
    }

    /// Fills every slot with `spawn_worker(slot)` and waits until all slots
    /// have stopped for good. Workers that run forever make this run forever.
    pub async fn run<F, Fut>(&self, spawn_worker: F)
    where
        F: Fn(usize) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let spawn_worker = Arc::new(spawn_worker);
        let mut lines = JoinSet::new();
        for slot in 0..self.slots {
            lines.spawn(supervise(slot, spawn_worker.clone(), self.clone()));
        }
        while let Some(res) = lines.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "Worker slot supervisor stopped");
            }
        }
    }
}

async fn supervise<F, Fut>(slot: usize, spawn_worker: Arc<F>, supervisor: Supervisor)
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    loop {
        let guard = ActiveGuard::enter(supervisor.active.clone());
        let spawn_worker = spawn_worker.clone();
        // building the worker can fault too, so it happens inside the task
        let outcome = tokio::spawn(async move {
            let _guard = guard;
            spawn_worker(slot).await
        })
        .await;
        match outcome {
            Ok(_) => {
                debug!(slot, "Worker finished");
                return;
            }
            Err(e) if e.is_panic() => {
                supervisor.restarts.fetch_add(1, Ordering::AcqRel);
                warn!(slot, "Worker faulted, starting a replacement");
            }
            Err(_) => {
                debug!(slot, "Worker cancelled");
                return;
            }
        }
    }
}

/// Counts a worker as active for as long as it is alive, unwinding included.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self { active }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
