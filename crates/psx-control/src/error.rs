use std::io;

use psx_control_protocol::DecodeError;
use psx_mem::MemoryError;
use psx_watch::HookConfigError;
use thiserror::Error;

use crate::segment::QueryError;
use crate::slot::SlotError;

pub type Result<T> = core::result::Result<T, ControlError>;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Hooks(#[from] HookConfigError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("execution thread panicked")]
    ExecutionPanicked,
}

impl ControlError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
