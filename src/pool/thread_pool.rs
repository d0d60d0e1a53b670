//! Cached thread pool.
//!
//! Stage executors block while their upstream is empty, so a fixed-size pool
//! smaller than the number of live stages could park every worker on a stage
//! whose producer never gets a thread. This pool therefore never queues work
//! behind busy workers: a submission either claims an idle worker or spawns a
//! new one. Idle workers retire after `keep_alive`.
//!
//! # Idle accounting
//!
//! `idle` counts workers waiting for a job that no submitter has claimed yet.
//! A submitter claims one by decrementing `idle`; a worker whose keep-alive
//! expires may only retire by performing that same decrement. When it finds
//! `idle == 0`, every waiting worker (itself included) has been claimed, so a
//! job is on its way and it keeps waiting.

use crate::config::PoolConfig;
use crate::error::{PipelineError, Result};
use crate::pool::{log_fatal, FatalHandler, FatalReport, Task, WorkerPool};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

type Job = Box<dyn Task>;

/// State shared by the pool handle and its workers.
struct Shared {
    jobs: Receiver<Job>,
    thread_name_prefix: String,
    keep_alive: Duration,
    max_threads: Option<usize>,
    fatal: FatalHandler,
    /// Waiting workers not yet claimed by a submitter.
    idle: AtomicUsize,
    /// Workers currently alive (running, waiting, or claimed).
    live: AtomicUsize,
    next_worker_id: AtomicUsize,
}

impl Shared {
    /// Claim a waiting worker for one job.
    fn claim_idle(&self) -> bool {
        self.idle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Pool that grows on demand and shrinks when idle.
pub struct ThreadPool {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self::with_fatal_handler(config, log_fatal())
    }

    /// Create a pool that reports panicking tasks to `fatal`.
    pub fn with_fatal_handler(config: &PoolConfig, fatal: FatalHandler) -> Self {
        let (sender, jobs) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                jobs,
                thread_name_prefix: config.thread_name_prefix.clone(),
                keep_alive: config.keep_alive(),
                max_threads: config.max_threads,
                fatal,
                idle: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                next_worker_id: AtomicUsize::new(0),
            }),
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Number of worker threads currently alive.
    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Number of workers waiting for work.
    pub fn idle_workers(&self) -> usize {
        self.shared.idle.load(Ordering::Acquire)
    }

    /// Stop accepting tasks and wait for every worker to exit.
    ///
    /// Workers finish the tasks already submitted first, so the pipelines
    /// they belong to must be drained (or cancelled) or this blocks.
    pub fn shutdown(&self) {
        lock(&self.sender).take();
        let handles: Vec<_> = lock(&self.handles).drain(..).collect();
        tracing::debug!("Shutting down pool, joining {} workers", handles.len());
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Worker terminated by a panic");
            }
        }
    }

    fn spawn_worker(&self, task_label: &str) -> Result<()> {
        let shared = &self.shared;
        let live = shared.live.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(max) = shared.max_threads {
            if live > max {
                shared.live.fetch_sub(1, Ordering::AcqRel);
                return Err(PipelineError::PoolRejected {
                    task: task_label.to_string(),
                    reason: format!("all {} workers are busy", max),
                });
            }
        }

        let id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", shared.thread_name_prefix, id);
        let worker_shared = Arc::clone(shared);
        let spawned = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(worker_shared, name));

        match spawned {
            Ok(handle) => {
                let mut handles = lock(&self.handles);
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
                Ok(())
            }
            Err(e) => {
                shared.live.fetch_sub(1, Ordering::AcqRel);
                Err(PipelineError::PoolRejected {
                    task: task_label.to_string(),
                    reason: format!("failed to spawn worker: {}", e),
                })
            }
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}

impl WorkerPool for ThreadPool {
    fn submit(&self, task: Box<dyn Task>) -> Result<()> {
        let sender = lock(&self.sender).clone().ok_or_else(|| PipelineError::PoolRejected {
            task: task.label().to_string(),
            reason: "pool is shut down".to_string(),
        })?;

        if !self.shared.claim_idle() {
            self.spawn_worker(task.label())?;
        }

        tracing::trace!("Submitting task '{}'", task.label());
        sender.send(task).map_err(|e| PipelineError::PoolRejected {
            task: e.into_inner().label().to_string(),
            reason: "pool is shut down".to_string(),
        })
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Detach: running stages keep their threads until their input ends.
        lock(&self.sender).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn worker_loop(shared: Arc<Shared>, name: String) {
    tracing::trace!("Worker '{}' started", name);

    // A fresh worker is spawned for a specific submission: it is claimed.
    let mut claimed = true;
    loop {
        let next = if claimed {
            shared
                .jobs
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            shared.jobs.recv_timeout(shared.keep_alive)
        };

        match next {
            Ok(job) => {
                run_job(&shared, &name, job);
                shared.idle.fetch_add(1, Ordering::AcqRel);
                claimed = false;
            }
            Err(RecvTimeoutError::Timeout) => {
                if shared.claim_idle() {
                    tracing::trace!("Worker '{}' retiring after idle timeout", name);
                    break;
                }
                claimed = true;
            }
            Err(RecvTimeoutError::Disconnected) => {
                if !claimed {
                    shared.claim_idle();
                }
                break;
            }
        }
    }

    shared.live.fetch_sub(1, Ordering::AcqRel);
    tracing::trace!("Worker '{}' stopped", name);
}

fn run_job(shared: &Shared, worker: &str, job: Job) {
    let label = job.label().to_string();
    let span = tracing::debug_span!("task", task = %label, worker = worker);
    let _enter = span.enter();

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || job.run())) {
        (shared.fatal)(&FatalReport {
            task: &label,
            worker,
            payload: &*payload,
        });
        shared.live.fetch_sub(1, Ordering::AcqRel);
        panic::resume_unwind(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    struct FnTask<F> {
        label: &'static str,
        f: F,
    }

    impl<F: FnOnce() + Send> Task for FnTask<F> {
        fn label(&self) -> &str {
            self.label
        }

        fn run(self: Box<Self>) {
            (self.f)()
        }
    }

    fn task(label: &'static str, f: impl FnOnce() + Send + 'static) -> Box<dyn Task> {
        Box::new(FnTask { label, f })
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_tasks_run_and_workers_are_reused() {
        let pool = ThreadPool::default();
        let (tx, rx) = crossbeam_channel::unbounded();

        for i in 0..3 {
            let tx = tx.clone();
            pool.submit(task("count", move || tx.send(i).unwrap())).unwrap();
            // Let the worker go idle before the next submission.
            assert!(wait_until(|| pool.idle_workers() == 1));
        }

        let mut got: Vec<i32> = rx.iter().take(3).collect();
        got.sort();
        assert_eq!(got, vec![0, 1, 2]);
        assert_eq!(pool.live_workers(), 1);
        pool.shutdown();
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_blocking_tasks_get_their_own_workers() {
        let pool = ThreadPool::default();
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let (done_tx, done_rx) = crossbeam_channel::unbounded();

        // The first task blocks until the second one runs.
        let done = done_tx.clone();
        pool.submit(task("waiter", move || {
            gate_rx.recv().unwrap();
            done.send("waiter").unwrap();
        }))
        .unwrap();
        pool.submit(task("opener", move || {
            gate_tx.send(()).unwrap();
            done_tx.send("opener").unwrap();
        }))
        .unwrap();

        let mut got: Vec<_> = done_rx.iter().take(2).collect();
        got.sort();
        assert_eq!(got, vec!["opener", "waiter"]);
        assert_eq!(pool.live_workers(), 2);
        pool.shutdown();
    }

    #[test]
    fn test_idle_workers_retire_after_keep_alive() {
        let config = PoolConfig {
            keep_alive_ms: 20,
            ..PoolConfig::default()
        };
        let pool = ThreadPool::new(&config);
        pool.submit(task("noop", || {})).unwrap();

        assert!(wait_until(|| pool.live_workers() == 0));
        assert_eq!(pool.idle_workers(), 0);

        // A retired pool still accepts work.
        let (tx, rx) = crossbeam_channel::unbounded();
        pool.submit(task("again", move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_max_threads_rejects_when_busy() {
        let config = PoolConfig {
            max_threads: Some(1),
            ..PoolConfig::default()
        };
        let pool = ThreadPool::new(&config);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

        pool.submit(task("busy", move || {
            let _ = release_rx.recv();
        }))
        .unwrap();

        let err = pool.submit(task("extra", || {})).unwrap_err();
        assert!(matches!(err, PipelineError::PoolRejected { ref task, .. } if task == "extra"));

        release_tx.send(()).unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let pool = ThreadPool::default();
        pool.shutdown();
        let err = pool.submit(task("late", || {})).unwrap_err();
        assert!(err.to_string().contains("shut down"));
    }

    #[test]
    fn test_panicking_task_reaches_fatal_handler() {
        let reported = Arc::new(AtomicBool::new(false));
        let flag = reported.clone();
        let handler: FatalHandler = Arc::new(move |report: &FatalReport<'_>| {
            assert_eq!(report.task, "explode");
            assert!(report.worker.starts_with("pipeworks-"));
            assert_eq!(report.message(), "stack exhausted");
            flag.store(true, Ordering::SeqCst);
        });
        let pool = ThreadPool::with_fatal_handler(&PoolConfig::default(), handler);

        pool.submit(task("explode", || panic!("stack exhausted"))).unwrap();

        assert!(wait_until(|| reported.load(Ordering::SeqCst)));
        assert!(wait_until(|| pool.live_workers() == 0));
        pool.shutdown();
    }
}
