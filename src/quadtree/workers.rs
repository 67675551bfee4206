use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender, TrySendError};
use tracing::{debug, warn};

use crate::error::Result;

/// Fixed pool of named threads draining a bounded job queue.
pub(crate) struct WorkerPool<T: Send + 'static> {
    sender: Option<Sender<T>>,
    handles: Vec<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub(crate) fn spawn<F>(name: &str, workers: usize, capacity: usize, run: F) -> Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let (sender, receiver) = channel::bounded::<T>(capacity.max(1));
        let run = Arc::new(run);
        let stopping = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers.max(1) {
            let receiver = receiver.clone();
            let run = Arc::clone(&run);
            let stopping = Arc::clone(&stopping);
            let handle = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        // Drain without work once shutdown starts.
                        if stopping.load(Ordering::Acquire) {
                            continue;
                        }
                        run(job);
                    }
                })?;
            handles.push(handle);
        }
        debug!(name, workers = handles.len(), capacity, "Started worker pool");

        Ok(Self {
            sender: Some(sender),
            handles,
            stopping,
        })
    }

    /// Queue a job without blocking. A full or closed queue hands it back.
    pub(crate) fn try_submit(&self, job: T) -> std::result::Result<(), T> {
        let Some(sender) = &self.sender else {
            return Err(job);
        };
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) | TrySendError::Disconnected(job) => job,
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.sender.is_some()
    }

    /// Discard queued jobs, let in-flight ones finish, and join the threads.
    pub(crate) fn shutdown(&mut self) {
        self.stopping.store(true, Ordering::Release);
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn runs_submitted_jobs() {
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        let mut pool = WorkerPool::spawn("test", 3, 16, move |n: usize| {
            counter.fetch_add(n, Ordering::SeqCst);
        })
        .unwrap();

        for n in 1..=10 {
            pool.try_submit(n).unwrap();
        }
        pool.shutdown();
        // Jobs queued before shutdown may be dropped, never run twice.
        assert!(done.load(Ordering::SeqCst) <= 55);
        assert!(!pool.is_running());
        assert_eq!(pool.try_submit(1), Err(1));
    }

    #[test]
    fn full_queue_hands_job_back() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate = std::sync::Mutex::new(gate_rx);
        let pool = WorkerPool::spawn("blocked", 1, 1, move |_: u32| {
            let _ = gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
        })
        .unwrap();

        // One job blocks the worker, one fills the queue; keep pushing
        // until the queue refuses.
        let mut refused = None;
        for n in 0..10 {
            if let Err(job) = pool.try_submit(n) {
                refused = Some(job);
                break;
            }
        }
        assert!(refused.is_some());
        for _ in 0..10 {
            let _ = gate_tx.send(());
        }
    }

    #[test]
    fn all_jobs_run_when_not_stopped() {
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let pool = WorkerPool::spawn("echo", 2, 8, move |n: u32| {
            let _ = tx.lock().unwrap().send(n);
        })
        .unwrap();
        for n in 0..8 {
            pool.try_submit(n).unwrap();
        }
        let mut seen: Vec<u32> = (0..8).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }
}
