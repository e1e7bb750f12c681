use std::io;

use psx_mem::MemoryError;
use thiserror::Error;

use crate::hook::MAX_HOOK_KEY;

#[derive(Debug, Error)]
pub enum HookConfigError {
    #[error("hook key {key} is used more than once")]
    DuplicateKey { key: u8 },

    #[error("hook key {key} is out of range (max {MAX_HOOK_KEY})")]
    KeyOutOfRange { key: u8 },

    #[error("hook {key} has zero length")]
    ZeroLength { key: u8 },

    #[error("hook {key} has negative length {length}")]
    NegativeLength { key: u8, length: i32 },

    #[error("hook {key} range 0x{start:08x}+{length} overflows the address space")]
    RangeOverflow { key: u8, start: u32, length: u32 },

    #[error("hook {key} range is not backed by memory: {source}")]
    Unbacked {
        key: u8,
        #[source]
        source: MemoryError,
    },

    #[error("hook list ended after {read} of {expected} records")]
    Truncated { read: usize, expected: usize },

    #[error("failed to read hook list: {0}")]
    Io(#[from] io::Error),

    #[error("invalid hook list json: {0}")]
    Json(#[from] serde_json::Error),
}
