use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use psx_control_protocol::Status;
use psx_watch::Notifier;

use crate::sync::lock;

/// Render/audio plugins driven by the protocol thread.
pub trait Frontend: Send {
    /// Render into the external snapshot buffer `id`. Id 0 clears it.
    fn snapshot(&mut self, id: u8);

    fn set_speed(&mut self, multiplier: f64);

    /// Starts recording to `path`. A recording that ends without a stop request is reported
    /// through `finished`.
    fn start_audio_recording(&mut self, path: &Path, finished: RecordingFinished) -> io::Result<()>;

    fn stop_audio_recording(&mut self);

    /// Called once during shutdown.
    fn release(&mut self);
}

/// Reports the end of an audio recording to the controller.
#[derive(Clone)]
pub struct RecordingFinished {
    notifier: Arc<Notifier>,
}

impl RecordingFinished {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }

    pub fn notify(&self) {
        self.notifier.status(Status::AudioRecordingFinished);
    }
}

impl std::fmt::Debug for RecordingFinished {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingFinished").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrontendEvent {
    Snapshot(u8),
    Speed(f64),
    AudioStarted(PathBuf),
    AudioStopped,
    AudioFinished(PathBuf),
    Released,
}

/// A frontend with no display or audio. Calls are logged and recorded.
#[derive(Debug, Clone, Default)]
pub struct HeadlessFrontend {
    events: Arc<Mutex<Vec<FrontendEvent>>>,
    recording: Arc<Mutex<Option<(PathBuf, RecordingFinished)>>>,
}

impl HeadlessFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far, shared with every clone.
    pub fn events(&self) -> Vec<FrontendEvent> {
        lock(&self.events).clone()
    }

    pub fn recording(&self) -> Option<PathBuf> {
        lock(&self.recording).as_ref().map(|(path, _)| path.clone())
    }

    /// Ends the current recording as if the audio device ran out, notifying the controller.
    /// Returns false when nothing was recording.
    pub fn finish_recording(&self) -> bool {
        let Some((path, finished)) = lock(&self.recording).take() else {
            return false;
        };
        tracing::info!("audio recording to {} finished", path.display());
        self.record(FrontendEvent::AudioFinished(path));
        finished.notify();
        true
    }

    fn record(&self, event: FrontendEvent) {
        lock(&self.events).push(event);
    }
}

impl Frontend for HeadlessFrontend {
    fn snapshot(&mut self, id: u8) {
        tracing::debug!("snapshot {id} (headless)");
        self.record(FrontendEvent::Snapshot(id));
    }

    fn set_speed(&mut self, multiplier: f64) {
        tracing::debug!("render speed x{multiplier}");
        self.record(FrontendEvent::Speed(multiplier));
    }

    fn start_audio_recording(&mut self, path: &Path, finished: RecordingFinished) -> io::Result<()> {
        tracing::info!("audio recording to {}", path.display());
        *lock(&self.recording) = Some((path.to_path_buf(), finished));
        self.record(FrontendEvent::AudioStarted(path.to_path_buf()));
        Ok(())
    }

    fn stop_audio_recording(&mut self) {
        if let Some((path, _)) = lock(&self.recording).take() {
            tracing::info!("audio recording to {} stopped", path.display());
        }
        self.record(FrontendEvent::AudioStopped);
    }

    fn release(&mut self) {
        lock(&self.recording).take();
        self.record(FrontendEvent::Released);
    }
}
