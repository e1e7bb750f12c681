use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use psx_control_protocol::{Notification, Status};

use crate::sync::lock;

/// The outbound notification channel.
///
/// Every message is encoded up front and written under a single lock, so hook events from the
/// execution and flush threads and status bytes from the protocol thread never interleave.
pub struct Notifier {
    sink: Mutex<Box<dyn Write + Send>>,
    sent: AtomicU64,
    failures: AtomicU64,
}

impl Notifier {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
            sent: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// A notifier that discards everything (control plane disabled).
    pub fn disabled() -> Self {
        Self::new(io::sink())
    }

    pub fn send(&self, notification: &Notification) -> io::Result<()> {
        let bytes = notification.to_bytes();
        let mut sink = lock(&self.sink);
        let res = sink.write_all(&bytes).and_then(|()| sink.flush());
        match &res {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("notification write failed: {err}");
            }
        }
        res
    }

    /// Sends a status byte. Failures are logged and counted, never propagated: the protocol thread
    /// keeps serving requests even when nobody reads the acknowledgements.
    pub fn status(&self, status: Status) {
        tracing::trace!("status {}", status.code());
        let _ = self.send(&Notification::Status(status));
    }

    pub fn flush(&self) -> io::Result<()> {
        lock(&self.sink).flush()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl core::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier")
            .field("sent", &self.sent())
            .field("failures", &self.failures())
            .finish_non_exhaustive()
    }
}

/// In-memory sink shared between a [`Notifier`] and whoever inspects the stream.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        lock(&self.buf).clone()
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.buf))
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        lock(&self.buf).extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
