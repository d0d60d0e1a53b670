//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod pools;

use std::time::Duration;

/// Upper bound for any single pipeline run in tests
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Run `f` on its own thread and fail the test if it does not return in time.
///
/// Used to turn a pipeline hang into a test failure instead of a stuck test
/// binary.
pub fn run_with_timeout<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(test_timeout())
        .expect("pipeline did not complete before the timeout")
}
