use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MemoryError, MemoryResult};
use crate::map::{classify, AddressClass, MemoryMap, PageTable};
use crate::phys::{HostLocation, HostRange, PhysicalMemory, Region};
use crate::space::WriteObserver;

/// Read-only resolver over a page table.
///
/// Watch evaluation and bulk copies use this to re-resolve an emulated address to its backing
/// bytes each time they need them, instead of holding on to a host location.
#[derive(Clone, Copy)]
pub struct MemoryView<'a> {
    mem: &'a PhysicalMemory,
    table: &'a PageTable,
}

impl<'a> MemoryView<'a> {
    pub fn new(mem: &'a PhysicalMemory, table: &'a PageTable) -> Self {
        Self { mem, table }
    }

    /// Resolves `[addr, addr + len)` to one contiguous host range.
    pub fn resolve_range(&self, addr: u32, len: usize) -> MemoryResult<HostRange> {
        self.table.resolve_range(addr, len)
    }

    pub fn read_bytes(&self, addr: u32, dst: &mut [u8]) -> MemoryResult<()> {
        let range = self.resolve_range(addr, dst.len())?;
        self.mem.region(range.region).read_into(range.offset, dst);
        Ok(())
    }

    pub fn read_vec(&self, addr: u32, len: usize) -> MemoryResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read_bytes(addr, &mut out)?;
        Ok(out)
    }
}

/// Thread-safe accessor for control-plane threads.
///
/// Reads resolve against the power-on read table (which never changes). Writes resolve against the
/// power-on write table and honour the cache-isolation flag published by the execution thread,
/// then run the same write observer as bus writes.
#[derive(Clone)]
pub struct MemoryHandle {
    mem: Arc<PhysicalMemory>,
    map: Arc<MemoryMap>,
    isolated: Arc<AtomicBool>,
    observer: Option<Arc<dyn WriteObserver>>,
}

impl MemoryHandle {
    pub(crate) fn new(
        mem: Arc<PhysicalMemory>,
        map: Arc<MemoryMap>,
        isolated: Arc<AtomicBool>,
        observer: Option<Arc<dyn WriteObserver>>,
    ) -> Self {
        Self {
            mem,
            map,
            isolated,
            observer,
        }
    }

    pub fn memory(&self) -> &Arc<PhysicalMemory> {
        &self.mem
    }

    pub fn view(&self) -> MemoryView<'_> {
        MemoryView::new(&self.mem, self.map.read_table())
    }

    pub fn is_cache_isolated(&self) -> bool {
        self.isolated.load(Ordering::Acquire)
    }

    pub fn read_bytes(&self, addr: u32, dst: &mut [u8]) -> MemoryResult<()> {
        self.view().read_bytes(addr, dst)
    }

    /// Stores one byte. While the cache is isolated, RAM stores are dropped but still succeed.
    pub fn write_u8(&self, addr: u32, value: u8) -> MemoryResult<()> {
        let loc = match classify(addr) {
            AddressClass::Scratchpad { offset } => HostLocation {
                region: Region::Hardware,
                offset,
            },
            AddressClass::HardwareRegister => return Err(MemoryError::NoBacking { addr }),
            AddressClass::Table => self
                .map
                .write_table()
                .resolve(addr)
                .ok_or(MemoryError::Unmapped { addr })?,
        };
        if loc.region == Region::Ram && self.is_cache_isolated() {
            tracing::debug!("store to 0x{addr:08x} dropped: cache isolated");
            return Ok(());
        }
        self.mem.write(loc, &[value]);
        if let Some(observer) = &self.observer {
            observer.on_write(addr, 1, &self.view());
        }
        Ok(())
    }
}

impl core::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("isolated", &self.is_cache_isolated())
            .field("observed", &self.observer.is_some())
            .finish()
    }
}
