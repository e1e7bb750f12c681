use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use psx_mem::MemoryHandle;

use crate::engine::WatchEngine;
use crate::sync::lock;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(400);

/// Cooperative stop flag that also wakes sleepers.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        *lock(&self.stopped) = true;
        self.cv.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *lock(&self.stopped)
    }

    /// Sleeps for `timeout` or until raised. Returns `true` if the signal was raised.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = lock(&self.stopped);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = match self.cv.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

/// Background thread that drains coalesced hooks every interval.
#[derive(Debug)]
pub struct FlushScheduler {
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    pub fn spawn(
        engine: Arc<WatchEngine>,
        memory: MemoryHandle,
        interval: Duration,
    ) -> io::Result<Self> {
        let stop = Arc::new(StopSignal::new());
        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("psx-watch-flush".into())
            .spawn(move || {
                tracing::debug!("flush thread started ({}ms)", interval.as_millis());
                while !thread_stop.wait(interval) {
                    engine.flush_pending(&memory.view());
                }
                tracing::debug!("flush thread stopped");
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Raises the stop signal and joins the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.raise();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("flush thread panicked");
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
