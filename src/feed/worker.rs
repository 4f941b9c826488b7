use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{FeedError, Result};
use crate::model::Entry;
use crate::storage::{RemoteStore, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchJob {
    pub generation: u64,
    pub page: u32,
    pub range: TimeRange,
}

#[derive(Debug)]
pub struct FetchCompletion {
    pub generation: u64,
    pub page: u32,
    pub range: TimeRange,
    pub result: Result<Vec<Entry>>,
}

/// Runs range queries off the caller's thread. Dropping the worker closes
/// the job channel without waiting; a query still running finishes on the
/// detached thread and its result is discarded.
pub struct FetchWorker {
    jobs: Option<Sender<FetchJob>>,
    completions: Receiver<FetchCompletion>,
    handle: Option<JoinHandle<()>>,
}

impl FetchWorker {
    pub fn spawn(store: Arc<dyn RemoteStore>) -> anyhow::Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<FetchJob>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<FetchCompletion>();
        let handle = thread::Builder::new()
            .name("til-fetch".into())
            .spawn(move || run(store, job_rx, done_tx))
            .context("spawning fetch worker")?;
        Ok(Self {
            jobs: Some(job_tx),
            completions: done_rx,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, job: FetchJob) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| FeedError::Network(anyhow!("fetch worker is shut down")))?;
        jobs.send(job)
            .map_err(|_| FeedError::Network(anyhow!("fetch worker exited")))
    }

    #[cfg(test)]
    pub(crate) fn close(&mut self) {
        self.jobs.take();
    }

    pub fn try_next(&self) -> Option<FetchCompletion> {
        match self.completions.try_recv() {
            Ok(completion) => Some(completion),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                tracing::warn!("fetch worker disconnected");
                None
            }
        }
    }

    pub fn wait(&self, timeout: Duration) -> Result<FetchCompletion> {
        self.completions.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => {
                FeedError::Network(anyhow!("fetch timed out after {timeout:?}"))
            }
            RecvTimeoutError::Disconnected => FeedError::Network(anyhow!("fetch worker exited")),
        })
    }
}

impl Drop for FetchWorker {
    fn drop(&mut self) {
        self.jobs.take();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if !handle.is_finished() {
            tracing::debug!("detaching busy fetch worker");
            return;
        }
        if handle.join().is_err() {
            tracing::error!("fetch worker panicked");
        }
    }
}

fn run(store: Arc<dyn RemoteStore>, jobs: Receiver<FetchJob>, done: Sender<FetchCompletion>) {
    for job in jobs {
        tracing::debug!(page = job.page, range = %job.range, "fetching page");
        let result = store.query(&job.range);
        let completion = FetchCompletion {
            generation: job.generation,
            page: job.page,
            range: job.range,
            result,
        };
        if done.send(completion).is_err() {
            break;
        }
    }
}
