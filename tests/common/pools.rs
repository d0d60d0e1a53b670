//! Worker pool wrappers for scheduling tests

use pipeworks::{Result, Task, ThreadPool, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Task that sleeps before running the wrapped task.
struct DelayedTask {
    inner: Box<dyn Task>,
    delay: Duration,
}

impl Task for DelayedTask {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn run(self: Box<Self>) {
        std::thread::sleep(self.delay);
        self.inner.run();
    }
}

/// Pool that delays the start of each submitted task by the next value of a
/// caller-supplied schedule, perturbing the order in which stages start.
pub struct JitterPool {
    inner: ThreadPool,
    start_delays_us: Mutex<Vec<u64>>,
}

impl JitterPool {
    pub fn new(start_delays_us: Vec<u64>) -> Self {
        Self {
            inner: ThreadPool::default(),
            start_delays_us: Mutex::new(start_delays_us),
        }
    }

    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl WorkerPool for JitterPool {
    fn submit(&self, task: Box<dyn Task>) -> Result<()> {
        let delay_us = self.start_delays_us.lock().unwrap().pop().unwrap_or(0);
        self.inner.submit(Box::new(DelayedTask {
            inner: task,
            delay: Duration::from_micros(delay_us),
        }))
    }
}

/// Pool that records the labels of submitted tasks.
#[derive(Default)]
pub struct RecordingPool {
    inner: ThreadPool,
    labels: Mutex<Vec<String>>,
    submitted: AtomicUsize,
}

impl RecordingPool {
    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn idle_workers(&self) -> usize {
        self.inner.idle_workers()
    }
}

impl WorkerPool for RecordingPool {
    fn submit(&self, task: Box<dyn Task>) -> Result<()> {
        self.labels.lock().unwrap().push(task.label().to_string());
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(task)
    }
}
