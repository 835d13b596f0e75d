use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tracing::debug;

use crate::error::{Result, SubtractError};

/// Fixed-size pool executing subtraction jobs, shared by every output stack.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cryosub-worker-{}", i))
            .build()?;
        debug!(workers, "Worker pool started");
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on the pool and return a handle to its eventual result.
    ///
    /// A panic inside the job is caught and reported through the handle as
    /// [`SubtractError::JobFailed`].
    pub fn submit<T, F>(&self, job: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.pool.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|payload| Err(SubtractError::JobFailed(panic_message(&*payload))));
            // The receiver may be gone if the stack was aborted.
            let _ = tx.send(outcome);
        });
        JobHandle {
            state: JobState::Pending(rx),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

enum JobState<T> {
    Pending(Receiver<Result<T>>),
    Ready(Result<T>),
    Taken,
}

/// Result of a job submitted to a [`WorkerPool`].
pub struct JobHandle<T> {
    state: JobState<T>,
}

impl<T> JobHandle<T> {
    /// Non-blocking check for completion.
    pub fn is_ready(&mut self) -> bool {
        if let JobState::Pending(ref rx) = self.state {
            match rx.try_recv() {
                Ok(result) => self.state = JobState::Ready(result),
                Err(TryRecvError::Disconnected) => {
                    self.state = JobState::Ready(Err(SubtractError::JobLost))
                }
                Err(TryRecvError::Empty) => return false,
            }
        }
        !matches!(self.state, JobState::Taken)
    }

    /// Take the result if the job has finished, without blocking.
    /// Returns `None` while pending and after the result has been taken.
    pub fn try_get(&mut self) -> Option<Result<T>> {
        if !self.is_ready() {
            return None;
        }
        match std::mem::replace(&mut self.state, JobState::Taken) {
            JobState::Ready(result) => Some(result),
            _ => None,
        }
    }

    /// Block until the job finishes.
    pub fn wait(self) -> Result<T> {
        match self.state {
            JobState::Pending(rx) => rx.recv().unwrap_or(Err(SubtractError::JobLost)),
            JobState::Ready(result) => result,
            JobState::Taken => Err(SubtractError::JobLost),
        }
    }
}

/// Counting limit on submitted-but-unconsumed jobs.
pub struct InFlightLimit {
    capacity: usize,
    state: Mutex<InFlight>,
    released: Condvar,
}

#[derive(Default)]
struct InFlight {
    current: usize,
    peak: usize,
}

impl InFlightLimit {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            state: Mutex::new(InFlight::default()),
            released: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a slot is free, then take it.
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.current >= self.capacity {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.current += 1;
        state.peak = state.peak.max(state.current);
        Permit {
            limit: Arc::clone(self),
        }
    }

    pub fn current(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).current
    }

    /// Highest number of simultaneously held permits so far.
    pub fn peak(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).peak
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current = state.current.saturating_sub(1);
        self.released.notify_one();
    }
}

/// One slot of an [`InFlightLimit`], returned on drop.
pub struct Permit {
    limit: Arc<InFlightLimit>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limit.release();
    }
}
