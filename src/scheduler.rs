//! Periodic dataset refresh on a dedicated thread.
//!
//! Each tick forces a fresh download of both datasets, opens them, and swaps
//! them into the [`DatasetStore`]. Any failure ends the loop: the error goes
//! back to whoever supervises the thread, which is expected to stop the
//! process rather than keep serving a dataset that can no longer refresh.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::DatasetConfig;
use crate::dataset::{DatasetReader, MmdbReader};
use crate::error::RefreshError;
use crate::fetcher::Fetcher;
use crate::store::DatasetStore;

/// Startup acquisition: download whatever is missing, then install the pair.
///
/// Files already on disk are reused as they are.
pub fn prepare_datasets<R: DatasetReader>(
    fetcher: &Fetcher,
    store: &DatasetStore<R>,
    config: &DatasetConfig,
) -> crate::Result<u64> {
    fetcher.check_and_download(config, false)?;
    Ok(store.reload(&config.paths())?)
}

/// Drives the refresh ticks.
pub struct RefreshScheduler<R = MmdbReader> {
    fetcher: Arc<Fetcher>,
    store: Arc<DatasetStore<R>>,
    config: Arc<DatasetConfig>,
    interval: Duration,
}

impl<R: DatasetReader> RefreshScheduler<R> {
    pub fn new(fetcher: Arc<Fetcher>, store: Arc<DatasetStore<R>>, config: Arc<DatasetConfig>) -> Self {
        let interval = config.reload_interval();
        Self {
            fetcher,
            store,
            config,
            interval,
        }
    }

    /// Override the tick interval taken from the config.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One refresh cycle: re-download both files, load them, swap them in.
    ///
    /// Returns the new store generation.
    pub fn tick(&self) -> Result<u64, RefreshError> {
        log::info!("Start to refresh datasets");
        self.fetcher.check_and_download(&self.config, true)?;
        let set = self.store.load(&self.config.paths())?;
        Ok(self.store.swap(set))
    }

    /// Tick every interval until `stop` fires or is disconnected.
    ///
    /// Returns `Ok(())` only when stopped; a failed tick is returned as is.
    fn run(&self, stop: mpsc::Receiver<()>) -> Result<(), RefreshError> {
        loop {
            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let generation = self.tick()?;
                    log::info!("Datasets refreshed, generation {}", generation);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Start the loop on its own thread.
    pub fn spawn(self) -> std::io::Result<RefreshHandle> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("dataset-refresh".to_string())
            .spawn(move || self.run(stop_rx))?;
        Ok(RefreshHandle {
            stop: stop_tx,
            thread,
        })
    }
}

/// Handle to a running refresh loop.
pub struct RefreshHandle {
    stop: mpsc::Sender<()>,
    thread: JoinHandle<Result<(), RefreshError>>,
}

impl RefreshHandle {
    /// Block until the loop exits on its own.
    ///
    /// Under normal operation it never does; a return value of `Ok(())`
    /// therefore means the loop stopped without being asked to.
    pub fn wait(self) -> Result<(), RefreshError> {
        let RefreshHandle { stop, thread } = self;
        let outcome = thread.join().unwrap_or(Err(RefreshError::Panicked));
        drop(stop);
        outcome
    }

    /// Ask the loop to stop after the current tick and wait for it.
    pub fn stop(self) -> Result<(), RefreshError> {
        let _ = self.stop.send(());
        self.thread.join().unwrap_or(Err(RefreshError::Panicked))
    }

}

/// Wait for a refresh loop that should never end and report why it did.
///
/// Every outcome is fatal: a loop that returns without an error is reported
/// as [`RefreshError::Stopped`].
pub fn supervise(handle: RefreshHandle) -> RefreshError {
    let err = match handle.wait() {
        Ok(()) => RefreshError::Stopped,
        Err(e) => e,
    };
    log::error!("Dataset refresh loop ended: {}", err);
    err
}
