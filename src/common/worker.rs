// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Worker pools that run authentication callbacks away from the notification thread.

use crate::{Error, Result};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;

/// A unit of work submitted to a [`WorkerPool`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Returned by [`WorkerPool::submit`] when a job was not accepted. The job is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Worker pool rejected job: {0}")]
pub struct Rejected(pub String);

/// Runs jobs on threads other than the caller's. Submission never waits for the job.
pub trait WorkerPool: Debug + Send + Sync {
    fn submit(&self, job: Job) -> std::result::Result<(), Rejected>;
}

/// The default [`WorkerPool`]: the blocking thread pool of a private tokio runtime, with a bound
/// on the number of jobs that are queued or running.
pub struct RuntimePool {
    runtime: Option<Runtime>,
    slots: Arc<Semaphore>,
    queue_depth: usize,
}

impl RuntimePool {
    /// At most `workers` jobs run at once and at most `queue_depth` are accepted but unfinished.
    pub fn new(workers: usize, queue_depth: usize) -> Result<Self> {
        if workers == 0 || queue_depth == 0 {
            return Err(Error::InvalidParameter(
                "worker pool needs at least one worker and one queue slot".into(),
            ));
        }
        let runtime = Builder::new_current_thread()
            .thread_name("bthplug-auth")
            .max_blocking_threads(workers)
            .build()
            .map_err(|e| Error::Other(format!("Cannot start worker pool: {}", e)))?;
        Ok(RuntimePool {
            runtime: Some(runtime),
            slots: Arc::new(Semaphore::new(queue_depth)),
            queue_depth,
        })
    }
}

impl Debug for RuntimePool {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("RuntimePool")
            .field("queue_depth", &self.queue_depth)
            .field("available", &self.slots.available_permits())
            .finish()
    }
}

impl WorkerPool for RuntimePool {
    fn submit(&self, job: Job) -> std::result::Result<(), Rejected> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| Rejected("pool is shut down".into()))?;
        let slot = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|e| Rejected(e.to_string()))?;
        runtime.spawn_blocking(move || {
            let _slot = slot;
            job();
        });
        Ok(())
    }
}

impl Drop for RuntimePool {
    fn drop(&mut self) {
        // Jobs still running are detached rather than joined.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
