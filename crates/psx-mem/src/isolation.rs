use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::map::PageTable;

/// Cache-control values that isolate the cache (RAM stores become invisible).
pub const ISOLATE_VALUES: [u32; 2] = [0x800, 0x804];
/// Cache-control values that end isolation.
pub const RESTORE_VALUES: [u32; 2] = [0x0, 0x1e988];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationChange {
    Isolated,
    Restored,
    /// Repeated toggle in the current direction.
    Unchanged,
    /// Value is neither an isolate nor a restore command.
    UnknownValue,
}

/// Emulates the cache-isolation bit of the cache-control register.
///
/// Only the owner of the write table (the execution thread's [`crate::AddressSpace`]) may flip
/// it. The flag is published through an [`AtomicBool`] so off-thread [`crate::MemoryHandle`]s
/// drop RAM stores while isolation is active, just like the execution thread does.
#[derive(Debug)]
pub struct CacheIsolationSwitch {
    isolated: Arc<AtomicBool>,
}

impl Default for CacheIsolationSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheIsolationSwitch {
    pub fn new() -> Self {
        Self {
            isolated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated.load(Ordering::Acquire)
    }

    pub(crate) fn published(&self) -> Arc<AtomicBool> {
        self.isolated.clone()
    }

    pub fn apply(&mut self, value: u32, write_table: &mut PageTable) -> IsolationChange {
        if ISOLATE_VALUES.contains(&value) {
            if self.is_isolated() {
                return IsolationChange::Unchanged;
            }
            self.isolated.store(true, Ordering::Release);
            write_table.clear_ram();
            IsolationChange::Isolated
        } else if RESTORE_VALUES.contains(&value) {
            if !self.is_isolated() {
                return IsolationChange::Unchanged;
            }
            write_table.install_ram();
            self.isolated.store(false, Ordering::Release);
            IsolationChange::Restored
        } else {
            IsolationChange::UnknownValue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MemoryMap;

    #[test]
    fn toggles_are_idempotent() {
        let mut table = MemoryMap::standard().write_table().clone();
        let mut switch = CacheIsolationSwitch::new();

        assert_eq!(switch.apply(0x0, &mut table), IsolationChange::Unchanged);
        assert_eq!(switch.apply(0x800, &mut table), IsolationChange::Isolated);
        assert_eq!(switch.apply(0x804, &mut table), IsolationChange::Unchanged);
        assert!(switch.is_isolated());
        assert_eq!(table.resolve(0x8000_1000), None);

        assert_eq!(switch.apply(0x1e988, &mut table), IsolationChange::Restored);
        assert_eq!(switch.apply(0x0, &mut table), IsolationChange::Unchanged);
        assert!(!switch.is_isolated());
        assert!(table.resolve(0x8000_1000).is_some());

        assert_eq!(switch.apply(0x1234, &mut table), IsolationChange::UnknownValue);
    }
}
