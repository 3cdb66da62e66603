use anyhow::{Result, anyhow};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A unit of work queued on a host's executor.
pub type Job = BoxFuture<'static, ()>;

/// Runs the jobs of one host one at a time, in submission order.
///
/// Hosts never share an executor, so a slow host only delays its own
/// gatherers. Dropping the executor stops the worker; jobs still queued are
/// discarded.
pub struct HostExecutor {
    handle: ExecutorHandle,
    worker: JoinHandle<()>,
}

/// Cloneable submit side of a [`HostExecutor`].
#[derive(Clone)]
pub struct ExecutorHandle {
    label: Arc<str>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl HostExecutor {
    /// Start the worker task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(label: impl Into<String>) -> Self {
        let label: Arc<str> = Arc::from(label.into());
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();

        let worker_label = Arc::clone(&label);
        let worker = tokio::spawn(async move {
            debug!(host = %worker_label, "executor started");

            while let Some(job) = queue.recv().await {
                // A panicking gatherer must not take the other gatherers of its host down.
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    error!(host = %worker_label, "gatherer job panicked");
                }
            }

            debug!(host = %worker_label, "executor stopped");
        });

        Self {
            handle: ExecutorHandle { label, jobs },
            worker,
        }
    }

    #[must_use]
    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }
}

impl Drop for HostExecutor {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl ExecutorHandle {
    /// Queue `job` behind everything already submitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor has stopped.
    pub fn submit(&self, job: Job) -> Result<()> {
        self.jobs
            .send(job)
            .map_err(|_| anyhow!("executor for {} has stopped", self.label))
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_jobs_run_serially_in_order() {
        let executor = HostExecutor::spawn("db1[shop]");
        let handle = executor.handle();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            handle
                .submit(
                    async move {
                        log.lock().unwrap().push(format!("start {i}"));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        log.lock().unwrap().push(format!("end {i}"));
                    }
                    .boxed(),
                )
                .unwrap();
        }

        let (tx, rx) = oneshot::channel();
        handle
            .submit(
                async move {
                    let _ = tx.send(());
                }
                .boxed(),
            )
            .unwrap();
        rx.await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_executor() {
        let executor = HostExecutor::spawn("db1[shop]");
        let handle = executor.handle();

        handle
            .submit(
                async {
                    panic!("boom");
                }
                .boxed(),
            )
            .unwrap();

        let (tx, rx) = oneshot::channel();
        handle
            .submit(
                async move {
                    let _ = tx.send(42);
                }
                .boxed(),
            )
            .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_submit_after_drop_fails() {
        let executor = HostExecutor::spawn("db1[shop]");
        let handle = executor.handle();
        drop(executor);

        // Give the aborted worker a chance to release its receiver.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(handle.submit(async {}.boxed()).is_err());
        assert_eq!(handle.label(), "db1[shop]");
    }
}
