//! Control plane for the memory bus: the protocol server, pause/resume, deferred save/load and the
//! shared query segment, plus the [`Controller`] that wires them to an execution thread.
//!
//! Threads:
//! - execution: owns the [`psx_mem::AddressSpace`], passes the pause gate and consumes deferred
//!   requests once per tick;
//! - protocol: [`ProtocolServer::serve`] on the caller's thread, one request at a time;
//! - flush: [`psx_watch::FlushScheduler`].

#![forbid(unsafe_code)]

pub mod config;
mod controller;
mod error;
mod exec;
mod fifo;
mod frontend;
mod run_control;
mod segment;
mod server;
mod slot;
mod state;
mod sync;

pub use controller::{Controller, ControllerOptions, ControllerReport};
pub use error::{ControlError, Result};
pub use exec::{Cpu, ExecutionContext, ExecutionSummary, IdleCpu, TickOutcome, FRAME_INTERVAL};
pub use fifo::ensure_fifo;
pub use frontend::{Frontend, FrontendEvent, HeadlessFrontend, RecordingFinished};
pub use run_control::{Gate, RunControl};
pub use segment::{
    FileSegmentProvider, InMemorySegments, QueryBuffer, QueryError, SegmentProvider, SharedSegment,
};
pub use server::{ProtocolServer, ServerExit, DRILL_INTERVAL};
pub use slot::{DeferredKind, DeferredRequest, DeferredRequestSlot, SlotError};
pub use state::{RamImageStore, StateStore, RAM_IMAGE_LEN};
