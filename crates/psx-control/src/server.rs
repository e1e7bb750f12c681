use std::fs;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use psx_control_protocol::{DecodeError, Request, RequestReader, Status};
use psx_mem::MemoryHandle;
use psx_watch::{Notifier, WatchEngine};

use crate::error::{ControlError, Result};
use crate::frontend::{Frontend, RecordingFinished};
use crate::run_control::RunControl;
use crate::segment::{QueryBuffer, SegmentProvider};
use crate::slot::{DeferredRequestSlot, SlotError};

/// Spacing between the pokes of a drill.
pub const DRILL_INTERVAL: Duration = Duration::from_millis(5);

/// Why [`ProtocolServer::serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerExit {
    /// Opcode 1.
    Shutdown,
    /// The inbound channel reached EOF, including in the middle of a frame.
    ChannelClosed,
}

enum Flow {
    Continue,
    Shutdown,
}

/// Reads requests from the inbound channel and dispatches them one at a time.
///
/// Each request, including blocking work such as a drill or a file dump, completes before the
/// next opcode byte is read.
pub struct ProtocolServer<R> {
    reader: RequestReader<R>,
    memory: MemoryHandle,
    engine: Arc<WatchEngine>,
    notifier: Arc<Notifier>,
    run: Arc<RunControl>,
    slot: Arc<DeferredRequestSlot>,
    frontend: Box<dyn Frontend>,
    query: QueryBuffer,
    drill_interval: Duration,
    handled: u64,
}

impl<R: Read> ProtocolServer<R> {
    pub fn new(
        input: R,
        memory: MemoryHandle,
        engine: Arc<WatchEngine>,
        run: Arc<RunControl>,
        slot: Arc<DeferredRequestSlot>,
        frontend: Box<dyn Frontend>,
        segments: Box<dyn SegmentProvider>,
    ) -> Self {
        Self {
            reader: RequestReader::new(input),
            memory,
            notifier: engine.notifier().clone(),
            engine,
            run,
            slot,
            frontend,
            query: QueryBuffer::new(segments),
            drill_interval: DRILL_INTERVAL,
            handled: 0,
        }
    }

    pub fn with_drill_interval(mut self, interval: Duration) -> Self {
        self.drill_interval = interval;
        self
    }

    /// Serves until shutdown or EOF, then runs the orderly shutdown.
    pub fn serve(mut self) -> ServerExit {
        tracing::info!("control server started");
        let exit = loop {
            match self.reader.next_request() {
                Ok(Some(req)) => {
                    self.handled += 1;
                    if let Flow::Shutdown = self.dispatch(req) {
                        break ServerExit::Shutdown;
                    }
                }
                Ok(None) => {
                    tracing::info!("control channel closed");
                    break ServerExit::ChannelClosed;
                }
                Err(DecodeError::Truncated { opcode }) => {
                    tracing::warn!("control channel closed in the middle of opcode {opcode}");
                    break ServerExit::ChannelClosed;
                }
                Err(DecodeError::Io(err)) => {
                    tracing::warn!("control channel read failed: {err}");
                    break ServerExit::ChannelClosed;
                }
            }
        };
        self.shutdown(exit);
        exit
    }

    fn dispatch(&mut self, req: Request) -> Flow {
        tracing::debug!("request {req:?}");
        if let Request::Shutdown = req {
            return Flow::Shutdown;
        }
        match self.handle(req) {
            Ok(Some(status)) => self.notifier.status(status),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("request failed: {err}");
                self.notifier.status(Status::Failed);
            }
        }
        Flow::Continue
    }

    fn handle(&mut self, req: Request) -> Result<Option<Status>> {
        let status = match req {
            Request::Shutdown => None,
            Request::Pause => {
                // The execution thread acknowledges with 7 once it parks.
                (!self.run.request_pause()).then_some(Status::AlreadyPaused)
            }
            Request::Resume => (!self.run.request_resume()).then_some(Status::AlreadyRunning),
            Request::Snapshot { id } => {
                self.frontend.snapshot(id);
                None
            }
            Request::ClearSnapshot => {
                self.frontend.snapshot(0);
                None
            }
            Request::QueryMemory { start, len, key } => {
                let len = QueryBuffer::check_len(len)?;
                let mut buf = vec![0u8; len];
                self.memory.read_bytes(start, &mut buf)?;
                self.query.store(key, &buf)?;
                Some(Status::QueryCopied)
            }
            Request::DumpMemory { start, len, path } => {
                let len = len as usize;
                self.memory.view().resolve_range(start, len)?;
                let mut bytes = vec![0u8; len];
                self.memory.read_bytes(start, &mut bytes)?;
                fs::write(path.to_path_buf(), &bytes)
                    .map_err(|err| ControlError::io(format!("dump to {path}"), err))?;
                tracing::debug!("dumped {len} bytes from 0x{start:08x} to {path}");
                Some(Status::DumpWritten)
            }
            Request::ReleaseQuery => {
                self.query.release();
                None
            }
            Request::Silence { key } => {
                self.engine.silence(key);
                None
            }
            Request::Unsilence { key } => {
                self.engine.unsilence(key);
                None
            }
            Request::Poke { addr, value } => {
                self.memory.write_u8(addr, value)?;
                Some(Status::ByteWritten)
            }
            Request::Drill { addr, value, count } => {
                for _ in 0..count {
                    self.memory.write_u8(addr, value)?;
                    thread::sleep(self.drill_interval);
                }
                tracing::debug!("drilled 0x{addr:08x} {count} times");
                Some(Status::DrillFinished)
            }
            Request::StartAudioRecording { path } => {
                self.frontend
                    .start_audio_recording(
                        &path.to_path_buf(),
                        RecordingFinished::new(self.notifier.clone()),
                    )
                    .map_err(|err| ControlError::io(format!("audio recording to {path}"), err))?;
                None
            }
            Request::StopAudioRecording => {
                self.frontend.stop_audio_recording();
                None
            }
            Request::SaveState { path } => {
                Some(self.defer(self.slot.request_save(path.to_path_buf())))
            }
            Request::LoadState { path } => {
                Some(self.defer(self.slot.request_load(path.to_path_buf())))
            }
            Request::SetSpeed { percent } => {
                self.frontend.set_speed(f64::from(percent) / 100.0);
                Some(Status::SpeedSet)
            }
            Request::Ping => Some(Status::Alive),
            Request::Unknown { opcode } => {
                tracing::debug!("ignoring unknown opcode {opcode}");
                None
            }
        };
        Ok(status)
    }

    fn defer(&self, res: core::result::Result<(), SlotError>) -> Status {
        match res {
            Ok(()) => Status::DeferredAccepted,
            Err(err) => {
                tracing::debug!("deferred request rejected: {err}");
                Status::DeferredRejected
            }
        }
    }

    fn shutdown(&mut self, exit: ServerExit) {
        self.run.request_shutdown();
        self.frontend.stop_audio_recording();
        self.frontend.release();
        self.query.release();
        if let Err(err) = self.notifier.flush() {
            tracing::warn!("failed to flush notification channel: {err}");
        }
        tracing::info!(
            "control server stopped ({exit:?}) after {} requests",
            self.handled
        );
    }
}

impl<R> core::fmt::Debug for ProtocolServer<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProtocolServer")
            .field("query", &self.query)
            .field("handled", &self.handled)
            .finish_non_exhaustive()
    }
}
