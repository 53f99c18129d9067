//! In-process job queue for deferred execution.
//!
//! Each page and each deferred record import is one job. A worker that
//! finishes a page pushes the next one back onto the queue, so pagination of
//! one walk stays strictly sequential while different walks interleave.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use shopsync_core::{StoreId, SyncFamily};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::SyncContext;
use super::cursor::PageCursorState;
use super::import::import_record;
use super::lock::{LockStore, lock_key};
use super::log::SyncLog;
use super::walker::{PageStep, PageWalker, StartOutcome, StartRequest};
use crate::error::SyncError;
use crate::shopify::RemoteRecord;

/// A unit of deferred work.
#[derive(Debug, Clone)]
pub enum SyncJob {
    /// Take the lock and plan the first page.
    StartImport(StartRequest),
    ImportPage(PageCursorState),
    ImportRecord {
        store_id: StoreId,
        family: SyncFamily,
        record: RemoteRecord,
    },
}

impl SyncJob {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartImport(_) => "start_import",
            Self::ImportPage(_) => "import_page",
            Self::ImportRecord { .. } => "import_record",
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

/// Sending half of the queue; cheap to clone.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<SyncJob>,
    pending: Arc<Pending>,
}

/// Receiving half, consumed by [`spawn_workers`].
#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<SyncJob>,
    pending: Arc<Pending>,
}

impl JobQueue {
    /// Create a queue and its receiving half.
    #[must_use]
    pub fn channel() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(Pending::default());
        (
            Self {
                sender,
                pending: Arc::clone(&pending),
            },
            JobReceiver { receiver, pending },
        )
    }

    /// Push a job.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::QueueUnavailable` once the receiver is gone.
    pub fn enqueue(&self, job: SyncJob) -> Result<(), SyncError> {
        let name = job.name();
        self.pending.count.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            finish_one(&self.pending);
            return Err(SyncError::QueueUnavailable(format!(
                "receiver dropped before {name} job"
            )));
        }
        debug!(job = name, pending = self.pending(), "Job queued");
        Ok(())
    }

    /// Jobs queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Wait until every queued job, and every job those jobs queued, is done.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.pending.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

fn finish_one(pending: &Pending) {
    if pending.count.fetch_sub(1, Ordering::SeqCst) == 1 {
        pending.idle.notify_waiters();
    }
}

/// Running worker tasks.
#[derive(Debug)]
pub struct WorkerPool {
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// Stop every worker. Jobs still queued are dropped.
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Spawn `workers` tasks pulling jobs off `receiver`.
///
/// `ctx` must carry the [`JobQueue`] paired with `receiver` so workers can
/// queue follow-up pages.
#[must_use]
pub fn spawn_workers(ctx: &SyncContext, receiver: JobReceiver, workers: usize) -> WorkerPool {
    let pending = Arc::clone(&receiver.pending);
    let receiver = Arc::new(Mutex::new(receiver.receiver));
    let mut tasks = JoinSet::new();

    for worker in 0..workers.max(1) {
        let ctx = ctx.clone();
        let receiver = Arc::clone(&receiver);
        let pending = Arc::clone(&pending);
        tasks.spawn(async move {
            loop {
                let job = receiver.lock().await.recv().await;
                let Some(job) = job else {
                    debug!(worker, "Queue closed, worker exiting");
                    break;
                };
                run_job(&ctx, job).await;
                finish_one(&pending);
            }
        });
    }

    info!(workers = workers.max(1), "Sync workers started");
    WorkerPool { tasks }
}

/// Run one job, queueing whatever it leads to before it counts as done.
async fn run_job(ctx: &SyncContext, job: SyncJob) {
    let walker = PageWalker::new(ctx.clone());
    let name = job.name();

    let follow_up = match job {
        SyncJob::StartImport(request) => match walker.start(&request).await {
            Ok(StartOutcome::Started(state)) => Some(SyncJob::ImportPage(state)),
            Ok(StartOutcome::Finished(status)) => {
                debug!(job = name, ?status, "Walk ended before its first page");
                None
            }
            Err(e) => {
                error!(job = name, store_id = %request.store_id, error = %e, "Job failed");
                None
            }
        },
        SyncJob::ImportPage(state) => match walker.step(state).await.step {
            PageStep::Next(next) => Some(SyncJob::ImportPage(next)),
            PageStep::Restart { request } => Some(SyncJob::StartImport(request)),
            PageStep::Finished(status) => {
                debug!(job = name, ?status, "Walk finished");
                None
            }
            PageStep::Abort(e) => {
                error!(job = name, error = %e, "Job failed");
                None
            }
        },
        SyncJob::ImportRecord {
            store_id,
            family,
            record,
        } => {
            match ctx.repos.stores.get(store_id).await {
                Ok(Some(store)) => {
                    if let Err(e) = import_record(ctx, &store, family, &record).await {
                        error!(job = name, %store_id, error = %e, "Job failed");
                    }
                }
                Ok(None) => warn!(job = name, %store_id, "Store vanished before import"),
                Err(e) => error!(job = name, %store_id, error = %e, "Job failed"),
            }
            None
        }
    };

    if let Some(next) = follow_up {
        let result = match &ctx.queue {
            Some(queue) => queue.enqueue(next.clone()),
            None => Err(SyncError::QueueUnavailable(
                "no job queue to continue the walk".to_string(),
            )),
        };
        if let Err(e) = result {
            strand(ctx, &next, &e).await;
        }
    }
}

/// A walk whose next job could not be queued is over: free its lock and
/// raise an emergency against the store.
async fn strand(ctx: &SyncContext, job: &SyncJob, error: &SyncError) {
    let (store_id, family) = match job {
        SyncJob::ImportPage(state) => (state.store_id, state.family),
        SyncJob::StartImport(request) => (request.store_id, request.family),
        SyncJob::ImportRecord { .. } => {
            error!(job = job.name(), error = %error, "Could not queue follow-up job");
            return;
        }
    };

    // Restarts are queued after the walker already released the lock.
    if matches!(job, SyncJob::ImportPage(_)) {
        let released = ctx.locks.release(&lock_key(family, store_id)).await;
        if let Err(e) = released {
            error!(%store_id, %family, error = %e, "Could not release stranded lock");
        }
    }

    match ctx.repos.stores.get(store_id).await {
        Ok(Some(store)) => SyncLog::new(family, &store).emergency(
            "follow_up_lost",
            &json!({ "job": job.name(), "error": error.to_string() }),
        ),
        _ => error!(job = job.name(), %store_id, error = %error, "Could not queue follow-up job"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_pending_counts_and_idle() {
        let (queue, mut receiver) = JobQueue::channel();
        let request = StartRequest::new(StoreId::new(1), SyncFamily::Products);
        queue.enqueue(SyncJob::StartImport(request.clone())).unwrap();
        queue.enqueue(SyncJob::StartImport(request)).unwrap();
        assert_eq!(queue.pending(), 2);

        let pending = Arc::clone(&receiver.pending);
        let drain = tokio::spawn(async move {
            while let Some(_job) = receiver.receiver.recv().await {
                finish_one(&pending);
                if pending.count.load(Ordering::SeqCst) == 0 {
                    break;
                }
            }
        });

        tokio::time::timeout(Duration::from_secs(1), queue.wait_idle())
            .await
            .unwrap();
        assert_eq!(queue.pending(), 0);
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let (queue, receiver) = JobQueue::channel();
        drop(receiver);
        let err = queue
            .enqueue(SyncJob::StartImport(StartRequest::new(
                StoreId::new(1),
                SyncFamily::Orders,
            )))
            .unwrap_err();
        assert!(matches!(err, SyncError::QueueUnavailable(_)));
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_empty() {
        let (queue, _receiver) = JobQueue::channel();
        tokio::time::timeout(Duration::from_millis(100), queue.wait_idle())
            .await
            .unwrap();
    }
}
