//! Run a function in the background, and stop it again.
//!
//! A [`Worker`] is not handed back to the caller until the background function has
//! said it is ready, see [`Ready`]. This way e.g. a simulated device is guaranteed
//! to be listening before a test sends it its first line.
//!
//! Stopping is done in two steps: first the stop function is called (which should
//! make the background function return, for example by closing what it reads from),
//! then the background task is awaited.

use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, error, info_span, warn, Instrument};

use crate::error::Error;

/// Given to the background function.
/// The worker is not considered started until [`Ready::signal`] is called.
///
/// A background function which does not need synchronization like this
/// should signal as its first statement.
#[derive(Debug)]
pub struct Ready(oneshot::Sender<()>);

impl Ready {
    /// Let the starter of the worker proceed.
    pub fn signal(self) {
        // The starter may have given up on us, nothing to do about that.
        let _ = self.0.send(());
    }
}

type StopFn = Box<dyn FnOnce() -> Result<(), Error> + Send>;

/// A background task which is ready when started, and gone when stopped.
pub struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
    stop: Option<StopFn>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl Worker {
    /// Start a worker which needs no stop function,
    /// i.e. it ends by itself.
    pub async fn start<F, Fut>(name: &str, worker: F) -> Result<Self, Error>
    where
        F: FnOnce(Ready) -> Fut,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self::spawn(name, worker, None).await
    }

    /// Start a worker.
    /// When stopping, `stop` is called before waiting for the worker to end.
    pub async fn start_with_stop<F, Fut, S>(name: &str, worker: F, stop: S) -> Result<Self, Error>
    where
        F: FnOnce(Ready) -> Fut,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
        S: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        Self::spawn(name, worker, Some(Box::new(stop))).await
    }

    async fn spawn<F, Fut>(name: &str, worker: F, stop: Option<StopFn>) -> Result<Self, Error>
    where
        F: FnOnce(Ready) -> Fut,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let work = worker(Ready(ready_tx));

        let handle = tokio::spawn(
            async move {
                debug!("Worker begin");

                match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(?e, "Error in background worker"),
                    Err(panic) => {
                        let message = panic_message(&*panic);
                        error!(%message, "Background worker panicked");
                    }
                }

                debug!("Worker end");
            }
            .instrument(info_span!("worker", %name)),
        );

        let mut worker = Self {
            name: name.into(),
            handle: Some(handle),
            stop,
        };

        if ready_rx.await.is_err() {
            worker.shutdown().await;
            return Err(Error::WorkerNotReady(name.into()));
        }

        debug!(%name, "Worker ready");
        Ok(worker)
    }

    /// The name given when starting.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Has the background task ended?
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// Call the stop function, then wait for the worker to end.
    ///
    /// A failing stop function is logged, and we still wait.
    pub async fn stop(mut self) {
        self.shutdown().await;
    }

    fn call_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            if let Err(e) = stop() {
                error!(?e, %self.name, "Error when stopping worker");
            }
        }
    }

    async fn shutdown(&mut self) {
        self.call_stop();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(?e, %self.name, "Worker did not end cleanly");
            }
            debug!(%self.name, "Worker stopped");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!(%self.name, "Worker dropped without being stopped, aborting it");
            self.call_stop();
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    use tokio_util::sync::CancellationToken;

    use super::*;

    #[tokio::test]
    async fn start_returns_after_ready() {
        let prepared = Arc::new(AtomicBool::new(false));
        let prepared_worker = Arc::clone(&prepared);

        let worker = Worker::start("slow-starter", |ready| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            prepared_worker.store(true, Ordering::SeqCst);
            ready.signal();

            Ok(())
        })
        .await
        .unwrap();

        assert!(prepared.load(Ordering::SeqCst));
        worker.stop().await;
    }

    #[tokio::test]
    async fn stop_calls_stop_function_then_joins() {
        let token = CancellationToken::new();
        let ended = Arc::new(AtomicBool::new(false));

        let worker_token = token.clone();
        let worker_ended = Arc::clone(&ended);

        let worker = Worker::start_with_stop(
            "waits-for-cancel",
            |ready| async move {
                ready.signal();
                worker_token.cancelled().await;

                // Make sure stopping really waits for us.
                tokio::time::sleep(Duration::from_millis(50)).await;
                worker_ended.store(true, Ordering::SeqCst);

                Ok(())
            },
            move || {
                token.cancel();
                Ok(())
            },
        )
        .await
        .unwrap();

        assert!(!worker.is_finished());
        worker.stop().await;

        assert!(ended.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failing_stop_function_still_joins() {
        let token = CancellationToken::new();
        let worker_token = token.clone();

        let worker = Worker::start_with_stop(
            "bad-stop",
            |ready| async move {
                ready.signal();
                worker_token.cancelled().await;
                Ok(())
            },
            move || {
                token.cancel();
                Err(Error::Closed)
            },
        )
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), worker.stop())
            .await
            .expect("Stopping should finish");
    }

    #[tokio::test]
    async fn worker_errors_stay_in_the_worker() {
        let worker = Worker::start("fails", |ready| async move {
            ready.signal();
            Err(Error::EndOfStream)
        })
        .await
        .unwrap();

        worker.stop().await;
    }

    #[tokio::test]
    async fn worker_panics_stay_in_the_worker() {
        let worker = Worker::start("panics", |ready| async move {
            ready.signal();
            tokio::task::yield_now().await;

            let nothing: Option<()> = None;
            nothing.expect("Worker blew up");

            Ok(())
        })
        .await
        .unwrap();

        worker.stop().await;
    }

    #[tokio::test]
    async fn ending_before_ready_is_an_error() {
        let result = Worker::start("never-ready", |_ready| async move { Ok(()) }).await;

        assert!(matches!(result, Err(Error::WorkerNotReady(name)) if name == "never-ready"));
    }

    #[tokio::test]
    async fn dropping_calls_stop_and_aborts() {
        let token = CancellationToken::new();
        let stop_token = token.clone();

        let worker = Worker::start_with_stop(
            "forever",
            |ready| async move {
                ready.signal();
                std::future::pending::<()>().await;
                Ok(())
            },
            move || {
                stop_token.cancel();
                Ok(())
            },
        )
        .await
        .unwrap();

        drop(worker);

        assert!(token.is_cancelled());
    }
}
