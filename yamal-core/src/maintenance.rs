//! Background preallocation and flushing.

use crate::config::MaintenanceConfig;
use crate::error::{Result, YamalError};
use crate::storage::MappedStorage;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

struct Signal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to the maintenance thread. Dropping it stops the thread.
pub(crate) struct Maintenance {
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl Maintenance {
    /// Start the thread for `storage`.
    ///
    /// The thread holds only a weak reference and exits on its own once the
    /// storage is dropped or closed.
    pub(crate) fn spawn(storage: &Arc<MappedStorage>, config: MaintenanceConfig) -> Result<Self> {
        let signal = Arc::new(Signal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let weak = Arc::downgrade(storage);
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("yamal-maintenance".to_string())
            .spawn(move || run(weak, config, thread_signal))
            .map_err(|e| YamalError::io(storage.path(), e))?;

        tracing::debug!(
            interval_ms = config.interval.as_millis() as u64,
            preallocate = config.preallocate,
            "Started maintenance thread"
        );

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit.
    pub(crate) fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if handle.join().is_err() {
            tracing::warn!("Maintenance thread panicked");
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(storage: Weak<MappedStorage>, config: MaintenanceConfig, signal: Arc<Signal>) {
    let mut stopped = signal.stopped.lock();
    while !*stopped {
        signal.wake.wait_for(&mut stopped, config.interval);
        if *stopped {
            break;
        }

        let Some(storage) = storage.upgrade() else {
            break;
        };
        if storage.is_closed() {
            break;
        }

        if let Err(e) = storage.preallocate(config.preallocate) {
            tracing::warn!(error = %e, "Preallocation failed");
        }
        if config.sync
            && let Err(e) = storage.sync()
        {
            tracing::warn!(error = %e, "Background flush failed");
        }
    }
    tracing::debug!("Maintenance thread exiting");
}
