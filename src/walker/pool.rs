//! Bounded worker pool
//!
//! N named threads pull items from a shared crossbeam receiver, run a task
//! on each and forward any produced value downstream. Workers stop when the
//! input closes or the shutdown flag is raised. Each worker owns a clone of
//! the output sender, so the output channel closes exactly when the last
//! worker exits: consumers read until disconnect instead of counting.

use crate::error::WorkerError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// How long a worker blocks on its input before re-checking shutdown
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Counters shared by the workers of one pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Items taken off the input
    pub received: AtomicU64,

    /// Items that produced an output
    pub produced: AtomicU64,
}

impl PoolStats {
    fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct WorkerPool {
    name: String,
    handles: Vec<(usize, JoinHandle<()>)>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Spawn `size` workers named `<name>-<id>` running `task` on every item
    pub fn spawn<I, O, F>(
        name: &str,
        size: usize,
        input: Receiver<I>,
        output: Sender<O>,
        shutdown: Arc<AtomicBool>,
        task: F,
    ) -> Result<Self, WorkerError>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(usize, I) -> Option<O> + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let stats = Arc::new(PoolStats::default());
        let mut handles = Vec::with_capacity(size);

        for id in 0..size.max(1) {
            let input = input.clone();
            let output = output.clone();
            let shutdown = Arc::clone(&shutdown);
            let task = Arc::clone(&task);
            let stats = Arc::clone(&stats);

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || worker_loop(id, input, output, shutdown, task.as_ref(), &stats))
                .map_err(|e| WorkerError::InitFailed {
                    id,
                    reason: e.to_string(),
                })?;
            handles.push((id, handle));
        }

        debug!(pool = name, workers = handles.len(), "Worker pool started");

        Ok(Self {
            name: name.to_string(),
            handles,
            stats,
        })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for every worker; reports the first panic
    pub fn join(self) -> Result<(), WorkerError> {
        let mut first_err = None;
        for (id, handle) in self.handles {
            if handle.join().is_err() && first_err.is_none() {
                first_err = Some(WorkerError::Panicked {
                    id,
                    message: format!("{} worker thread panicked", self.name),
                });
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn worker_loop<I, O, F>(
    id: usize,
    input: Receiver<I>,
    output: Sender<O>,
    shutdown: Arc<AtomicBool>,
    task: &F,
    stats: &PoolStats,
) where
    F: Fn(usize, I) -> Option<O>,
{
    while !shutdown.load(Ordering::Relaxed) {
        let item = match input.recv_timeout(RECV_TIMEOUT) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        stats.record_received();

        if let Some(out) = task(id, item) {
            stats.record_produced();
            if output.send(out).is_err() {
                break;
            }
        }
    }
    trace!(worker = id, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};

    #[test]
    fn test_output_closes_when_input_drains() {
        let (in_tx, in_rx) = bounded(4);
        let (out_tx, out_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let pool = WorkerPool::spawn("test", 3, in_rx, out_tx, shutdown, |_, n: u64| {
            (n % 2 == 0).then_some(n * 10)
        })
        .unwrap();
        assert_eq!(pool.size(), 3);

        for n in 0..10 {
            in_tx.send(n).unwrap();
        }
        drop(in_tx);

        let mut results: Vec<u64> = out_rx.iter().collect();
        results.sort_unstable();
        assert_eq!(results, vec![0, 20, 40, 60, 80]);

        let stats = pool.stats();
        pool.join().unwrap();
        assert_eq!(stats.received.load(Ordering::Relaxed), 10);
        assert_eq!(stats.produced.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_shutdown_stops_workers() {
        let (_in_tx, in_rx) = bounded::<u64>(1);
        let (out_tx, out_rx) = unbounded::<u64>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let pool =
            WorkerPool::spawn("idle", 2, in_rx, out_tx, Arc::clone(&shutdown), |_, n| Some(n))
                .unwrap();
        shutdown.store(true, Ordering::Relaxed);
        pool.join().unwrap();

        // every sender is gone even though the input is still open
        assert!(out_rx.recv().is_err());
    }
}
