//! Job executor.
//!
//! Exactly one consumer task owns the priority queue. Producers hand jobs
//! over through a channel; before each pop the consumer moves every pending
//! submission into the heap, so priority holds across submissions. Only
//! one job runs at a time and there is no second consumer to start.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mpost_queue::{PriorityJobQueue, QueueError, QueuedJob};

use crate::metrics::set_queue_depth;
use crate::processor::{process_job, ProcessingContext};

/// Starts the consumer task.
pub struct JobExecutor;

impl JobExecutor {
    /// Spawn the single consumer and return a handle for producers.
    pub fn spawn(ctx: ProcessingContext) -> ExecutorHandle {
        let capacity = ctx.config.queue.capacity;
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let pending = Arc::new(AtomicUsize::new(0));

        let consumer = Consumer {
            ctx,
            rx,
            shutdown: shutdown_rx,
            pending: Arc::clone(&pending),
            heap: PriorityJobQueue::new(),
        };
        let task = tokio::spawn(consumer.run());

        info!(capacity, "Job executor started");

        ExecutorHandle {
            tx,
            pending,
            capacity,
            shutdown: Arc::new(shutdown),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Producer side of the executor. Cheap to clone.
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: mpsc::UnboundedSender<QueuedJob>,
    pending: Arc<AtomicUsize>,
    capacity: usize,
    shutdown: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ExecutorHandle {
    /// Enqueue a job. Never starts processing directly.
    pub fn submit(&self, job: QueuedJob) -> Result<(), QueueError> {
        if *self.shutdown.borrow() {
            return Err(QueueError::Closed);
        }

        let reserved = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.capacity).then_some(n + 1)
            });
        if reserved.is_err() {
            return Err(QueueError::QueueFull(self.capacity));
        }

        let job_id = job.job_id.clone();
        let priority = job.priority;
        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }

        let depth = self.pending.load(Ordering::SeqCst);
        set_queue_depth(depth);
        debug!(job_id = %job_id, priority, depth, "Job queued");
        Ok(())
    }

    /// Jobs submitted but not yet started.
    pub fn queue_depth(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether the consumer is still accepting work.
    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow() && !self.tx.is_closed()
    }

    /// Stop after the running job and wait up to `timeout` for it.
    pub async fn shutdown(&self, timeout: Duration) {
        let _ = self.shutdown.send(true);

        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(())) => info!("Job executor stopped"),
            Ok(Err(e)) => error!("Job executor task failed: {}", e),
            Err(_) => warn!(
                timeout_secs = timeout.as_secs(),
                "Job executor did not stop in time"
            ),
        }
    }
}

struct Consumer {
    ctx: ProcessingContext,
    rx: mpsc::UnboundedReceiver<QueuedJob>,
    shutdown: watch::Receiver<bool>,
    pending: Arc<AtomicUsize>,
    heap: PriorityJobQueue,
}

impl Consumer {
    async fn run(mut self) {
        let mut closed = false;

        loop {
            closed |= self.buffer_pending();

            if *self.shutdown.borrow() {
                break;
            }

            if let Some(job) = self.heap.pop() {
                let depth = self.pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
                set_queue_depth(depth);
                self.execute(job).await;
                continue;
            }

            if closed {
                break;
            }

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = self.rx.recv() => match received {
                    Some(job) => self.heap.push(job),
                    None => closed = true,
                }
            }
        }

        if !self.heap.is_empty() {
            warn!(remaining = self.heap.len(), "Executor stopping with queued jobs");
        }
    }

    /// Move every waiting submission into the heap. Returns true once the
    /// channel is closed.
    fn buffer_pending(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(job) => self.heap.push(job),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    async fn execute(&self, job: QueuedJob) {
        let job_id = job.job_id.clone();
        info!(job_id = %job_id, priority = job.priority, "Executing job");

        match process_job(&self.ctx, &job).await {
            Ok(report) => info!(
                job_id = %job_id,
                status = %report.status,
                processed = report.processed,
                failed = report.failed,
                "Job done"
            ),
            Err(e) => error!(job_id = %job_id, "Job failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::tests::{Harness, ScriptedEditor, PNG};
    use crate::EditorSet;
    use async_trait::async_trait;
    use mpost_imaging::{EditRequest, EditedImage, ImageEditor, ImagingResult};
    use mpost_models::{JobId, JobStatus, ProcessingTier};
    use mpost_queue::JobStore;
    use tokio::sync::Notify;

    /// Editor that blocks on `gate.png` until released.
    struct GatedEditor {
        started: Notify,
        release: Notify,
        order: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageEditor for GatedEditor {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn edit(&self, request: EditRequest<'_>) -> ImagingResult<EditedImage> {
            self.order.lock().unwrap().push(request.filename.to_string());
            if request.filename == "gate.png" {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(EditedImage::from_bytes(PNG.to_vec()))
        }
    }

    async fn wait_terminal(store: &dyn JobStore, id: &JobId) -> JobStatus {
        for _ in 0..500 {
            if let Some(job) = store.get(id).await {
                if job.status.is_terminal() {
                    return job.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn test_priority_order_across_submissions() {
        let h = Harness::new(ScriptedEditor::default());
        let editor = Arc::new(GatedEditor {
            started: Notify::new(),
            release: Notify::new(),
            order: Default::default(),
        });
        let mut ctx = h.context();
        ctx.editors = EditorSet::new(editor.clone());
        let handle = JobExecutor::spawn(ctx);

        let gate = h.job(&["gate.png"], ProcessingTier::Basic).await;
        handle.submit(gate.clone()).unwrap();
        editor.started.notified().await;

        let low = h.job(&["low.png"], ProcessingTier::Basic).await.with_priority(1);
        let high = h.job(&["high.png"], ProcessingTier::Basic).await.with_priority(5);
        let tie = h.job(&["tie.png"], ProcessingTier::Basic).await.with_priority(1);
        handle.submit(low.clone()).unwrap();
        handle.submit(high.clone()).unwrap();
        handle.submit(tie.clone()).unwrap();
        assert_eq!(handle.queue_depth(), 3);

        editor.release.notify_one();
        for id in [&gate.job_id, &low.job_id, &high.job_id, &tie.job_id] {
            assert_eq!(wait_terminal(h.store.as_ref(), id).await, JobStatus::Completed);
        }

        assert_eq!(
            *editor.order.lock().unwrap(),
            vec!["gate.png", "high.png", "low.png", "tie.png"]
        );
        assert_eq!(handle.queue_depth(), 0);
        handle.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_capacity_and_shutdown() {
        let h = Harness::new(ScriptedEditor::default());
        let mut ctx = h.context();
        ctx.config.queue.capacity = 1;
        let editor = Arc::new(GatedEditor {
            started: Notify::new(),
            release: Notify::new(),
            order: Default::default(),
        });
        ctx.editors = EditorSet::new(editor.clone());
        let handle = JobExecutor::spawn(ctx);

        let gate = h.job(&["gate.png"], ProcessingTier::Basic).await;
        handle.submit(gate).unwrap();
        editor.started.notified().await;

        let first = h.job(&["a.png"], ProcessingTier::Basic).await;
        let second = h.job(&["b.png"], ProcessingTier::Basic).await;
        handle.submit(first).unwrap();
        assert!(matches!(handle.submit(second), Err(QueueError::QueueFull(1))));

        editor.release.notify_one();
        handle.shutdown(Duration::from_secs(5)).await;
        assert!(!handle.is_running());
        let third = h.job(&["c.png"], ProcessingTier::Basic).await;
        assert!(matches!(handle.submit(third), Err(QueueError::Closed)));
    }
}
