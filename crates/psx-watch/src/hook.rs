use std::sync::{Mutex, MutexGuard};

use psx_mem::canonical_watch_address;
use serde::{Deserialize, Serialize};

use crate::error::HookConfigError;
use crate::sync::lock;

/// Keys are one byte on the wire; the top bit is reserved.
pub const MAX_HOOK_KEY: u8 = 0x7f;

/// One entry of the hook list supplied at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSpec {
    pub key: u8,
    pub start: u32,
    pub length: u32,
    /// Suppress notifications when the watched bytes did not change.
    #[serde(default)]
    pub dedupe: bool,
    /// Rate-limit to one notification per flush interval.
    #[serde(default)]
    pub coalesce: bool,
    /// Start in [`HookState::Silenced`].
    #[serde(default)]
    pub silenced: bool,
}

impl HookSpec {
    pub fn new(key: u8, start: u32, length: u32) -> Self {
        Self {
            key,
            start,
            length,
            dedupe: false,
            coalesce: false,
            silenced: false,
        }
    }

    pub fn dedupe(mut self, on: bool) -> Self {
        self.dedupe = on;
        self
    }

    pub fn coalesce(mut self, on: bool) -> Self {
        self.coalesce = on;
        self
    }

    pub fn silenced(mut self, on: bool) -> Self {
        self.silenced = on;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), HookConfigError> {
        if self.key > MAX_HOOK_KEY {
            return Err(HookConfigError::KeyOutOfRange { key: self.key });
        }
        if self.length == 0 {
            return Err(HookConfigError::ZeroLength { key: self.key });
        }
        let start = canonical_watch_address(self.start);
        if start.checked_add(self.length).is_none() || self.start.checked_add(self.length).is_none()
        {
            return Err(HookConfigError::RangeOverflow {
                key: self.key,
                start: self.start,
                length: self.length,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    NoChanges,
    /// A coalescing hook saw one change this interval; the next flush reports it.
    PushedChanges,
    /// Queued for the next flush.
    UnpushedChanges,
    Silenced,
}

#[derive(Debug)]
pub(crate) struct HookInner {
    pub(crate) state: HookState,
    /// Last reported bytes; only kept for dedupe hooks.
    pub(crate) last: Option<Vec<u8>>,
}

/// A registered watchpoint over `[start, start + length)` in canonical addresses.
#[derive(Debug)]
pub struct WatchHook {
    key: u8,
    start: u32,
    length: u32,
    dedupe: bool,
    coalesce: bool,
    inner: Mutex<HookInner>,
}

impl WatchHook {
    pub(crate) fn from_spec(spec: &HookSpec) -> Self {
        let state = if spec.silenced {
            HookState::Silenced
        } else {
            HookState::NoChanges
        };
        Self {
            key: spec.key,
            start: canonical_watch_address(spec.start),
            length: spec.length,
            dedupe: spec.dedupe,
            coalesce: spec.coalesce,
            inner: Mutex::new(HookInner { state, last: None }),
        }
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.length)
    }

    pub fn dedupe(&self) -> bool {
        self.dedupe
    }

    pub fn coalesce(&self) -> bool {
        self.coalesce
    }

    pub fn state(&self) -> HookState {
        self.lock().state
    }

    /// Whether a `len`-byte store at canonical address `addr` touches this hook.
    pub fn overlaps(&self, addr: u32, len: u32) -> bool {
        let addr = u64::from(addr);
        addr < self.end() && addr + u64::from(len) > u64::from(self.start)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HookInner> {
        lock(&self.inner)
    }
}
