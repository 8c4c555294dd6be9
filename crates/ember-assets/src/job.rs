//! Fixed-size worker pool for load and save jobs.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{AssetError, AssetResult};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Workers pull jobs from one shared FIFO channel.
pub(crate) struct JobPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl JobPool {
    pub(crate) fn new(size: usize, name_prefix: &str) -> AssetResult<Self> {
        let size = size.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("{name_prefix}-{index}"))
                .spawn(move || worker_loop(receiver))
                .map_err(AssetError::from)?;
            workers.push(worker);
        }
        tracing::debug!("Started {} asset worker thread(s)", size);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        })
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn submit(&self, job: Job) -> AssetResult<()> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(AssetError::Shutdown)?;
        sender.send(job).map_err(|_| AssetError::Shutdown)
    }

    pub(crate) fn pending(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, Sender::len)
    }

    /// Stop accepting jobs, let queued ones finish and join the workers.
    ///
    /// A worker calling this does not join itself.
    pub(crate) fn shutdown(&self) {
        drop(self.sender.lock().take());

        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!("Asset worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    for job in receiver.iter() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("Asset job panicked");
        }
    }
}
