//! Named background threads with an explicit start/stop/join lifecycle.

use std::{
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker {name:?}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("worker {name:?} panicked")]
    Panicked { name: String },
}

/// Shared cancellation flag observed by every loop in the pipeline.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

type StopHook = Box<dyn FnOnce() + Send>;

/// Handle to a running background worker.
///
/// The stop hook is how a worker is asked to finish, typically by quitting the
/// queue its loop blocks on. Dropping a worker stops and joins it.
pub struct Worker {
    name: String,
    handle: Option<thread::JoinHandle<()>>,
    stop_hook: Option<StopHook>,
}

impl Worker {
    /// Start `body` on a new named thread.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self, WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let handle = spawn_thread(name.clone(), body).map_err(|source| WorkerError::Spawn {
            name: name.clone(),
            source,
        })?;
        debug!(worker = %name, "worker started");
        Ok(Self {
            name,
            handle: Some(handle),
            stop_hook: None,
        })
    }

    /// Register the action that makes the worker's loop exit.
    pub fn on_stop(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.stop_hook = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// Ask the worker to finish. Runs the stop hook at most once.
    pub fn stop(&mut self) {
        if let Some(hook) = self.stop_hook.take() {
            debug!(worker = %self.name, "stopping worker");
            hook();
        }
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn join(mut self) -> Result<(), WorkerError> {
        self.stop();
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                name: self.name.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
        let _ = self.join_inner();
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::BoundedQueue;

    #[test]
    fn stop_hook_unblocks_worker_loop() {
        let queue = Arc::new(BoundedQueue::<u32>::new(4));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let worker = {
            let queue = queue.clone();
            let seen = seen.clone();
            Worker::spawn("test-consumer", move || {
                while let Some(item) = queue.dequeue() {
                    seen.lock().push(item);
                }
            })
            .unwrap()
        };
        let hook_queue = queue.clone();
        let worker = worker.on_stop(move || hook_queue.quit());

        queue.enqueue(1);
        queue.enqueue(2);
        worker.join().unwrap();

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn panicking_worker_reports_error_on_join() {
        let worker = Worker::spawn("doomed", || panic!("boom")).unwrap();
        match worker.join() {
            Err(WorkerError::Panicked { name }) => assert_eq!(name, "doomed"),
            other => panic!("unexpected join result: {other:?}"),
        }
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
