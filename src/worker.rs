//! Long-lived worker threads
//!
//! A worker owns one native thread and runs the closures it is handed one at
//! a time, in submission order. It knows nothing about the pool that owns it;
//! completion is reported by the closures themselves.

use crossbeam_channel::{unbounded, Sender};
use log::{trace, warn};
use std::thread::{self, JoinHandle};

use crate::error::ScanError;

/// A unit of work run on a worker thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Whether a worker is currently running a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Waiting for a task
    #[default]
    Idle,
    /// Running a task
    Busy,
}

/// A worker thread that runs tasks handed to it
#[derive(Debug)]
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Task channel; dropping it ends the thread's loop
    tasks: Option<Sender<Task>>,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Idle or busy, as tracked by the owner
    state: WorkerState,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(id: usize) -> Result<Self, ScanError> {
        let (tx, rx) = unbounded::<Task>();

        let handle = thread::Builder::new()
            .name(format!("sz-worker-{}", id))
            .spawn(move || {
                for task in rx {
                    task();
                }
                trace!("Worker {} exiting", id);
            })
            .map_err(|e| ScanError::worker_spawn(id, &e))?;

        Ok(Self {
            id,
            tasks: Some(tx),
            handle: Some(handle),
            state: WorkerState::Idle,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Current state
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Check if the worker can take a task
    pub fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle
    }

    /// Hand a task to the worker thread and mark it busy
    ///
    /// Returns the task back if the thread is gone.
    pub fn run(&mut self, task: Task) -> Result<(), Task> {
        let Some(tasks) = &self.tasks else {
            return Err(task);
        };
        tasks.send(task).map_err(|e| e.into_inner())?;
        self.state = WorkerState::Busy;
        Ok(())
    }

    /// Mark the worker idle once its task has reported completion
    pub fn release(&mut self) {
        self.state = WorkerState::Idle;
    }

    /// Stop accepting tasks and wait for the thread to exit
    ///
    /// Tasks already handed over run to completion first.
    pub fn terminate(&mut self) {
        self.tasks.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker {} panicked", self.id);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.terminate();
    }
}
