//! Fixed-size worker pool with non-blocking result polling
//!
//! The pool is driven from a single thread: every method takes `&mut self`,
//! and tasks only ever see the parameter they were submitted with. Workers
//! report completions on a pool-wide channel, so grooming the busy set is a
//! series of `try_recv` calls and waiting for a free worker is a
//! `recv_timeout` rather than a blind sleep.
//!
//! Results are decoupled from submission: `execute` never hands results
//! back. Anything harvested while it waits for a free worker is buffered and
//! returned by the next [`WorkerPool::poll`] or [`WorkerPool::drain`].

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, trace, warn};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::error::{ScanError, ScanErrorKind};
use crate::worker::{Task, Worker};

/// Completion report sent by a task when it finishes
struct Completion<R> {
    worker_id: usize,
    outcome: std::thread::Result<R>,
}

/// A submitted task that has not been collected yet
struct Job<P> {
    param: P,
    worker: Worker,
}

/// Bounded pool of worker threads
pub struct WorkerPool<P, R> {
    size: usize,
    idle: Vec<Worker>,
    busy: HashMap<usize, Job<P>>,
    completion_tx: Sender<Completion<R>>,
    completion_rx: Receiver<Completion<R>>,
    /// Results groomed while `execute` waited for a free worker
    harvested: Vec<R>,
    poll_interval: Duration,
    failed_jobs: u64,
    terminated: bool,
}

impl<P, R> WorkerPool<P, R>
where
    P: Clone + Debug + Send + 'static,
    R: Send + 'static,
{
    /// Start `size` idle workers
    pub fn new(size: usize, poll_interval: Duration) -> Result<Self, ScanError> {
        if size == 0 {
            return Err(ScanError::invalid_config("pool size must be at least 1"));
        }

        let idle = (0..size)
            .map(Worker::spawn)
            .collect::<Result<Vec<_>, _>>()?;
        let (completion_tx, completion_rx) = unbounded();

        debug!("Started worker pool with {} workers", size);

        Ok(Self {
            size,
            idle,
            busy: HashMap::with_capacity(size),
            completion_tx,
            completion_rx,
            harvested: Vec::new(),
            poll_interval,
            failed_jobs: 0,
            terminated: false,
        })
    }

    /// Submit `task(param)` for background execution
    ///
    /// Blocks while every worker is busy, grooming completed jobs between
    /// waits. Returns as soon as the task has been handed to a worker.
    pub fn execute<F>(&mut self, param: P, task: F) -> Result<(), ScanError>
    where
        F: FnOnce(P) -> R + Send + 'static,
    {
        if self.terminated {
            return Err(ScanError::pool_terminated());
        }

        let mut worker = loop {
            if let Some(worker) = self.idle.pop() {
                break worker;
            }
            self.wait_for_completion(self.poll_interval);
        };

        let id = worker.id();
        let task = self.wrap(id, param.clone(), task);
        if let Err(task) = worker.run(task) {
            // The thread is gone; replace it so the pool keeps its size
            warn!("Worker {} stopped unexpectedly, restarting it", id);
            worker = Worker::spawn(id)?;
            worker.run(task).map_err(|_| {
                ScanError::new(
                    ScanErrorKind::WorkerSpawn,
                    None,
                    format!("Worker {} rejected a task after restart", id),
                )
            })?;
        }

        trace!("Submitted {:?} to worker {}", param, id);
        self.busy.insert(id, Job { param, worker });
        self.check_invariant();
        Ok(())
    }

    /// Collect every completed result without blocking
    ///
    /// Returns whether any job was busy before grooming.
    pub fn poll(&mut self, out: &mut Vec<R>) -> bool {
        let was_busy = !self.busy.is_empty();
        out.append(&mut self.harvested);
        self.groom(out);
        was_busy
    }

    /// Block until every busy job has completed, collecting the results
    ///
    /// With `terminate`, all worker threads are stopped afterwards and the
    /// pool accepts no further submissions. Returns whether any job was busy.
    pub fn drain(&mut self, terminate: bool, out: &mut Vec<R>) -> bool {
        let was_busy = !self.busy.is_empty();
        out.append(&mut self.harvested);

        while !self.busy.is_empty() {
            match self.completion_rx.recv() {
                Ok(completion) => self.complete(completion, out),
                // Unreachable while the pool holds a sender
                Err(_) => break,
            }
        }

        if terminate && !self.terminated {
            for mut worker in self.idle.drain(..) {
                worker.terminate();
            }
            self.terminated = true;
            debug!("Worker pool terminated");
        }

        was_busy
    }

    /// Block until at least one job completes or `timeout` passes
    ///
    /// A completion observed here is buffered for the next `poll`. Returns
    /// false when nothing is busy or the timeout expired.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        if self.busy.is_empty() {
            return false;
        }
        let mut out = std::mem::take(&mut self.harvested);
        let before = self.busy.len();
        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => self.complete(completion, &mut out),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
        }
        self.groom(&mut out);
        self.harvested = out;
        self.busy.len() < before
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of workers waiting for a task
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Number of jobs not yet collected
    pub fn busy_count(&self) -> usize {
        self.busy.len()
    }

    /// Number of tasks that panicked
    pub fn failed_jobs(&self) -> u64 {
        self.failed_jobs
    }

    /// Check if the pool was drained with termination
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Wrap a task so it reports its outcome, panics included
    fn wrap<F>(&self, worker_id: usize, param: P, task: F) -> Task
    where
        F: FnOnce(P) -> R + Send + 'static,
    {
        let tx = self.completion_tx.clone();
        Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(move || task(param)));
            // The receiver lives as long as the pool
            let _ = tx.send(Completion { worker_id, outcome });
        })
    }

    /// Move every completion already reported into `out`
    fn groom(&mut self, out: &mut Vec<R>) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.complete(completion, out);
        }
    }

    fn complete(&mut self, completion: Completion<R>, out: &mut Vec<R>) {
        let Some(mut job) = self.busy.remove(&completion.worker_id) else {
            warn!(
                "Completion from worker {} with no matching job",
                completion.worker_id
            );
            return;
        };

        match completion.outcome {
            Ok(result) => out.push(result),
            Err(payload) => {
                self.failed_jobs += 1;
                warn!(
                    "Task for {:?} failed: {}",
                    job.param,
                    panic_message(payload.as_ref())
                );
            }
        }

        job.worker.release();
        self.idle.push(job.worker);
        self.check_invariant();
    }

    fn check_invariant(&self) {
        debug_assert_eq!(
            self.idle.len() + self.busy.len(),
            self.size,
            "idle + busy workers must equal the pool size"
        );
    }
}

impl<P, R> Drop for WorkerPool<P, R> {
    fn drop(&mut self) {
        // Dropping the workers closes their task channels and joins them;
        // queued tasks still run to completion first.
        self.idle.clear();
        self.busy.clear();
    }
}

/// Best-effort text of a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(5);

    fn collect_all(pool: &mut WorkerPool<u64, u64>) -> Vec<u64> {
        let mut out = Vec::new();
        pool.drain(false, &mut out);
        out.sort_unstable();
        out
    }

    #[test]
    fn test_new_pool_is_idle() {
        let pool: WorkerPool<u64, u64> = WorkerPool::new(4, INTERVAL).unwrap();
        assert_eq!(pool.size(), 4);
        assert_eq!(pool.idle_count(), 4);
        assert_eq!(pool.busy_count(), 0);
        assert!(!pool.is_terminated());
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = WorkerPool::<u64, u64>::new(0, INTERVAL).err().unwrap();
        assert_eq!(err.kind, ScanErrorKind::InvalidConfig);
    }

    #[test]
    fn test_execute_and_drain() {
        let mut pool = WorkerPool::new(3, INTERVAL).unwrap();
        for n in 1..=10u64 {
            pool.execute(n, |n| n * n).unwrap();
            assert_eq!(pool.idle_count() + pool.busy_count(), 3);
        }
        let results = collect_all(&mut pool);
        assert_eq!(results, vec![1, 4, 9, 16, 25, 36, 49, 64, 81, 100]);
        assert_eq!(pool.idle_count(), 3);
    }

    #[test]
    fn test_poll_never_blocks() {
        let mut pool = WorkerPool::new(1, INTERVAL).unwrap();
        pool.execute(1u64, |n| {
            thread::sleep(Duration::from_millis(200));
            n
        })
        .unwrap();

        let start = Instant::now();
        let mut out = Vec::new();
        let was_busy = pool.poll(&mut out);
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(was_busy);
        assert!(out.is_empty());

        pool.drain(true, &mut out);
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn test_poll_reports_idle_pool() {
        let mut pool: WorkerPool<u64, u64> = WorkerPool::new(2, INTERVAL).unwrap();
        let mut out = Vec::new();
        assert!(!pool.poll(&mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_poll_eventually_collects_everything() {
        let mut pool = WorkerPool::new(2, INTERVAL).unwrap();
        for n in 0..6u64 {
            pool.execute(n, |n| n + 100).unwrap();
        }
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let was_busy = pool.poll(&mut out);
            if !was_busy && pool.busy_count() == 0 {
                break;
            }
            assert!(Instant::now() < deadline, "pool never went idle");
            thread::sleep(INTERVAL);
        }
        out.sort_unstable();
        assert_eq!(out, vec![100, 101, 102, 103, 104, 105]);
    }

    #[test]
    fn test_backpressure_single_worker() {
        let mut pool = WorkerPool::new(1, INTERVAL).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&events);
        pool.execute(1u64, move |n| {
            log.lock().unwrap().push(("start", n));
            thread::sleep(Duration::from_millis(150));
            log.lock().unwrap().push(("end", n));
            n
        })
        .unwrap();

        let start = Instant::now();
        let log = Arc::clone(&events);
        pool.execute(2u64, move |n| {
            log.lock().unwrap().push(("start", n));
            n
        })
        .unwrap();
        // The second submission had to wait for the only worker
        assert!(start.elapsed() >= Duration::from_millis(100));

        let mut out = Vec::new();
        pool.drain(true, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![1, 2]);

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![("start", 1), ("end", 1), ("start", 2)],
            "second task must not start before the first ends"
        );
    }

    #[test]
    fn test_results_harvested_during_execute_are_not_lost() {
        let mut pool = WorkerPool::new(1, INTERVAL).unwrap();
        pool.execute(1u64, |n| n).unwrap();
        // Blocks until task 1 completes; its result is buffered
        pool.execute(2u64, |n| {
            thread::sleep(Duration::from_millis(50));
            n
        })
        .unwrap();

        let mut out = Vec::new();
        pool.poll(&mut out);
        assert!(out.contains(&1));
        pool.drain(false, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_drain_terminate_lifecycle() {
        let mut pool = WorkerPool::new(2, INTERVAL).unwrap();
        pool.execute(5u64, |n| {
            thread::sleep(Duration::from_millis(20));
            n
        })
        .unwrap();

        let mut out = Vec::new();
        assert!(pool.drain(true, &mut out));
        assert_eq!(out, vec![5]);
        assert!(pool.is_terminated());
        assert_eq!(pool.busy_count(), 0);
        assert_eq!(pool.idle_count(), 0);

        // A second drain returns immediately with nothing
        let mut again = Vec::new();
        let start = Instant::now();
        assert!(!pool.drain(true, &mut again));
        assert!(again.is_empty());
        assert!(start.elapsed() < Duration::from_millis(100));

        let err = pool.execute(6, |n| n).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::PoolTerminated);
    }

    #[test]
    fn test_drain_without_terminate_on_idle_pool() {
        let mut pool: WorkerPool<u64, u64> = WorkerPool::new(2, INTERVAL).unwrap();
        let mut out = Vec::new();
        assert!(!pool.drain(false, &mut out));
        assert!(out.is_empty());
        // Still usable
        pool.execute(3, |n| n).unwrap();
        assert_eq!(collect_all(&mut pool), vec![3]);
    }

    #[test]
    fn test_panicking_task_frees_worker() {
        let mut pool = WorkerPool::new(1, INTERVAL).unwrap();
        pool.execute(0u64, |n| {
            if n == 0 {
                panic!("bad input");
            }
            n
        })
        .unwrap();
        pool.execute(9u64, |n| n).unwrap();

        let results = collect_all(&mut pool);
        assert_eq!(results, vec![9]);
        assert_eq!(pool.failed_jobs(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_wait_for_completion() {
        let mut pool = WorkerPool::new(1, INTERVAL).unwrap();
        assert!(!pool.wait_for_completion(Duration::from_millis(1)));

        pool.execute(4u64, |n| n).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pool.wait_for_completion(Duration::from_millis(50)) {
            assert!(Instant::now() < deadline);
        }
        assert_eq!(pool.busy_count(), 0);

        let mut out = Vec::new();
        assert!(!pool.poll(&mut out));
        assert_eq!(out, vec![4]);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(3);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
