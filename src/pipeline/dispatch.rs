//! The bounded worker thread pool (`spec.md` §4.4, §5): `J` persistent
//! threads each draining one ray at a time from a shared job channel and
//! producing a `WorkResults`, modeled on the `sync_channel`-based pool in
//! `guydunigo-graphics`'s `rasterizer/cpu/parallel/thread_pool.rs` but
//! using `crossbeam-channel` for the multi-producer/multi-consumer job
//! queue this pipeline needs.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::ray::FatRay;
use super::shading::WorkResults;

/// Default `-j`/`--jobs` value (`spec.md` §6).
pub const DEFAULT_JOBS: usize = 10;

/// A fixed pool of `jobs` worker threads. Each job is a pure function
/// from one `FatRay` to one `WorkResults`; jobs never touch shared
/// mutable state (`spec.md` §5) — only whatever read-only scene data
/// `work_fn` closes over.
pub struct ThreadPool {
    job_tx: Option<Sender<FatRay>>,
    result_rx: Receiver<WorkResults>,
    handles: Vec<JoinHandle<()>>,
    capacity: usize,
    in_flight: usize,
}

impl ThreadPool {
    pub fn new<F>(jobs: usize, work_fn: F) -> Self
    where
        F: Fn(FatRay) -> WorkResults + Send + Sync + 'static,
    {
        let (job_tx, job_rx) = unbounded::<FatRay>();
        let (result_tx, result_rx) = unbounded::<WorkResults>();
        let work_fn = Arc::new(work_fn);

        let handles = (0..jobs)
            .map(|_| {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let work_fn = Arc::clone(&work_fn);
                thread::spawn(move || {
                    while let Ok(ray) = job_rx.recv() {
                        let result = work_fn(ray);
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            result_rx,
            handles,
            capacity: jobs.max(1),
            in_flight: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn has_capacity(&self) -> bool {
        self.in_flight < self.capacity
    }

    /// Submits a ray to the pool. Panics if called when `!has_capacity()`
    /// — callers (the worker event loop) are responsible for respecting
    /// the `J` bound.
    pub fn submit(&mut self, ray: FatRay) {
        debug_assert!(self.has_capacity(), "submitted past the job bound");
        if let Some(tx) = &self.job_tx {
            let _ = tx.send(ray);
            self.in_flight += 1;
        }
    }

    /// Drains one completed job's result, if any are ready, without
    /// blocking.
    pub fn try_recv(&mut self) -> Option<WorkResults> {
        match self.result_rx.try_recv() {
            Ok(result) => {
                self.in_flight -= 1;
                Some(result)
            }
            Err(_) => None,
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
