use std::sync::{Arc, Condvar, Mutex};

use psx_control_protocol::Status;
use psx_watch::Notifier;

use crate::sync::{lock, wait};

#[derive(Debug, Default)]
struct RunFlags {
    paused: bool,
    parked: bool,
    shutdown: bool,
}

/// Result of passing the pause gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Continue,
    Shutdown,
}

/// Pause/resume/shutdown flags shared by the protocol and execution threads.
///
/// The protocol thread flips flags; the execution thread parks in [`RunControl::gate`] and emits
/// [`Status::Paused`] when it parks and [`Status::Resumed`] when it leaves.
#[derive(Debug)]
pub struct RunControl {
    flags: Mutex<RunFlags>,
    cv: Condvar,
    notifier: Arc<Notifier>,
}

impl RunControl {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            flags: Mutex::new(RunFlags::default()),
            cv: Condvar::new(),
            notifier,
        }
    }

    /// Returns `false` if execution was already paused.
    pub fn request_pause(&self) -> bool {
        let mut flags = lock(&self.flags);
        if flags.paused {
            return false;
        }
        flags.paused = true;
        true
    }

    /// Returns `false` if execution was already running.
    pub fn request_resume(&self) -> bool {
        let mut flags = lock(&self.flags);
        if !flags.paused {
            return false;
        }
        flags.paused = false;
        self.cv.notify_all();
        true
    }

    pub fn request_shutdown(&self) {
        let mut flags = lock(&self.flags);
        flags.shutdown = true;
        flags.paused = false;
        self.cv.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.flags).paused
    }

    /// Whether the execution thread is currently parked in [`RunControl::gate`].
    pub fn is_parked(&self) -> bool {
        lock(&self.flags).parked
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.flags).shutdown
    }

    /// Called by the execution thread once per tick. Blocks while paused.
    ///
    /// Status bytes are sent with the flags unlocked: a stalled reader must not keep the protocol
    /// thread from resuming or shutting down.
    pub fn gate(&self) -> Gate {
        let mut flags = lock(&self.flags);
        if flags.shutdown {
            return Gate::Shutdown;
        }
        if !flags.paused {
            return Gate::Continue;
        }
        flags.parked = true;
        drop(flags);

        self.notifier.status(Status::Paused);
        tracing::info!("execution paused");

        let mut flags = lock(&self.flags);
        while flags.paused && !flags.shutdown {
            flags = wait(&self.cv, flags);
        }
        flags.parked = false;
        let shutdown = flags.shutdown;
        drop(flags);

        if shutdown {
            return Gate::Shutdown;
        }
        self.notifier.status(Status::Resumed);
        tracing::info!("execution resumed");
        Gate::Continue
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::thread;
    use std::time::Duration;

    use psx_watch::MemorySink;

    use super::*;

    fn wait_parked(run: &RunControl) {
        for _ in 0..1000 {
            if run.is_parked() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("execution thread never parked");
    }

    #[test]
    fn pause_and_resume_are_acknowledged_by_the_gate() {
        let sink = MemorySink::new();
        let run = Arc::new(RunControl::new(Arc::new(Notifier::new(sink.clone()))));

        assert!(run.request_pause());
        assert!(!run.request_pause());
        let gate = {
            let run = run.clone();
            thread::spawn(move || run.gate())
        };
        wait_parked(&run);
        for _ in 0..1000 {
            if !sink.contents().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(sink.contents(), vec![7]);

        assert!(run.request_resume());
        assert_eq!(gate.join().unwrap(), Gate::Continue);
        assert_eq!(sink.take(), vec![7, 8]);
        assert!(!run.request_resume());
    }

    #[test]
    fn shutdown_releases_a_parked_gate() {
        let run = Arc::new(RunControl::new(Arc::new(Notifier::disabled())));
        run.request_pause();
        let gate = {
            let run = run.clone();
            thread::spawn(move || run.gate())
        };
        wait_parked(&run);
        run.request_shutdown();
        assert_eq!(gate.join().unwrap(), Gate::Shutdown);
        assert_eq!(run.gate(), Gate::Shutdown);
    }

    /// Blocks every write until `release` is dropped.
    struct StalledWriter {
        entered: Sender<()>,
        release: Receiver<()>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Write for StalledWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stalled_status_write_leaves_the_flags_usable() {
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel::<()>();
        let written = Arc::new(Mutex::new(Vec::new()));
        let run = Arc::new(RunControl::new(Arc::new(Notifier::new(StalledWriter {
            entered: entered_tx,
            release: release_rx,
            written: written.clone(),
        }))));

        run.request_pause();
        let gate = {
            let run = run.clone();
            thread::spawn(move || run.gate())
        };
        entered.recv_timeout(Duration::from_secs(10)).unwrap();

        // The gate is stuck writing status 7; resuming must not wait for it.
        let (done_tx, done) = mpsc::channel();
        {
            let run = run.clone();
            thread::spawn(move || {
                let _ = done_tx.send((run.is_parked(), run.request_resume()));
            });
        }
        assert_eq!(done.recv_timeout(Duration::from_secs(10)).unwrap(), (true, true));

        drop(release);
        assert_eq!(gate.join().unwrap(), Gate::Continue);
        assert_eq!(*written.lock().unwrap(), vec![7, 8]);
        assert!(!run.is_parked());
    }
}
