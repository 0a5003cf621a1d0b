//! Serialized access to the record store.
//!
//! A dedicated worker thread owns the `RecordStore` and runs jobs one at a
//! time in the order they were submitted. Jobs are sent when an operation is
//! *called*, not when its future is first polled, so call order is queue
//! order. Results travel back over a oneshot channel.
//!
//! A job that fails with a storage error, or panics, closes a file-backed
//! store handle; the next job reopens it. Validation failures leave the
//! handle alone, and an in-memory handle is never closed on failure since
//! its records live only in that handle. The worker itself keeps running.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use semindex_core::error::{IndexError, Result};
use semindex_storage::RecordStore;

type Job = Box<dyn FnOnce(&mut RecordStore) + Send>;

/// Handle to the store worker. Clones share the same worker and queue.
///
/// The worker exits after the last handle is dropped and every queued job
/// has run.
#[derive(Clone)]
pub struct StoreQueue {
    tx: mpsc::Sender<Job>,
}

impl StoreQueue {
    /// Spawn the worker thread that owns `store`.
    pub fn new(store: RecordStore) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();

        thread::Builder::new()
            .name("semindex-store".into())
            .spawn(move || {
                let mut store = store;
                while let Ok(job) = rx.recv() {
                    job(&mut store);
                }
                store.close();
                debug!("Store worker stopped");
            })?;

        Ok(Self { tx })
    }

    /// Enqueue `op` and return a future resolving to its result.
    ///
    /// The job is enqueued before this function returns. Dropping the future
    /// does not cancel the job.
    pub fn submit<T, F>(&self, name: &'static str, op: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce(&mut RecordStore) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let span = tracing::Span::current();

        let job: Job = Box::new(move |store| {
            let _guard = span.enter();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| op(&mut *store)));
            let result = match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    let reopen = store.is_file_backed() && reopen_may_recover(&e);
                    warn!(op = name, error = %e, reopen, "Store task failed");
                    if reopen {
                        store.close();
                    }
                    Err(e)
                }
                Err(_) => {
                    error!(op = name, "Store task panicked");
                    if store.is_file_backed() {
                        store.close();
                    }
                    Err(IndexError::TaskPanicked)
                }
            };
            let _ = reply_tx.send(result);
        });

        let sent = self.tx.send(job).map_err(|_| IndexError::QueueClosed);

        async move {
            sent?;
            reply_rx.await.map_err(|_| IndexError::QueueClosed)?
        }
    }
}

/// Errors a fresh handle can clear. Validation rejections are not among them.
fn reopen_may_recover(error: &IndexError) -> bool {
    matches!(
        error,
        IndexError::Storage(_) | IndexError::HandleInvalidated | IndexError::Io(_)
    )
}

impl std::fmt::Debug for StoreQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreQueue").finish_non_exhaustive()
    }
}
