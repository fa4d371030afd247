//! Fixed-size worker pool for deep hashing.
//!
//! Workers block on file reads, so the pool is sized for I/O concurrency.
//! Each job carries its own reply sender; the engine awaits exactly one
//! reply per submitted job, which forms the per-directory barrier.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel as channel;

use crate::core::errors::{QcError, Result};
use crate::crawler::interrupt::InterruptFlag;
use crate::hashing::{self, HashAlgo};

/// One hashing task: deep-hash `path`, answer on `reply` keyed by
/// `file_name`.
pub struct HashJob {
    pub file_name: String,
    pub path: PathBuf,
    pub reply: channel::Sender<HashReply>,
}

/// Worker answer for one job.
pub struct HashReply {
    pub file_name: String,
    pub outcome: Result<String>,
}

/// Fixed pool of hashing workers fed through a bounded channel.
pub struct HashPool {
    job_tx: Option<channel::Sender<HashJob>>,
    handles: Vec<JoinHandle<()>>,
}

impl HashPool {
    #[must_use]
    pub fn new(workers: usize, algo: HashAlgo, interrupt: InterruptFlag) -> Self {
        let (job_tx, job_rx) = channel::bounded::<HashJob>(workers.max(1) * 4);

        let handles = (0..workers.max(1))
            .map(|_| {
                let job_rx = job_rx.clone();
                let interrupt = interrupt.clone();
                thread::spawn(move || worker_loop(&job_rx, algo, &interrupt))
            })
            .collect();

        Self {
            job_tx: Some(job_tx),
            handles,
        }
    }

    /// Queue a job. Blocks when the queue is full (backpressure on the
    /// producer).
    pub fn submit(&self, job: HashJob) -> Result<()> {
        self.job_tx
            .as_ref()
            .ok_or(QcError::ChannelClosed {
                component: "hash_pool",
            })?
            .send(job)
            .map_err(|_| QcError::ChannelClosed {
                component: "hash_pool",
            })
    }

    /// Drop the job channel and join all workers.
    pub fn shutdown(mut self) {
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for HashPool {
    fn drop(&mut self) {
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(job_rx: &channel::Receiver<HashJob>, algo: HashAlgo, interrupt: &InterruptFlag) {
    for job in job_rx.iter() {
        // Queued jobs stop executing once a drain is requested; in-flight
        // hashes have already completed by definition.
        let outcome = if interrupt.is_requested() {
            Err(QcError::Interrupted)
        } else {
            hashing::deep_hash(algo, &job.path)
        };
        let _ = job.reply.send(HashReply {
            file_name: job.file_name,
            outcome,
        });
    }
}
