use std::sync::Arc;

use crate::handle::{MemoryHandle, MemoryView};
use crate::isolation::{CacheIsolationSwitch, IsolationChange};
use crate::map::{classify, AddressClass, MemoryMap, PageTable, CACHE_CONTROL_ADDR, PAGE_SIZE};
use crate::phys::{HostLocation, HostRange, PhysicalMemory, Region};

/// Access width of a bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }
}

/// Notified after every store that reached backing memory.
///
/// `addr` is the emulated address as issued (not canonicalized); `view` resolves against the
/// current read table so observers can re-read the affected bytes.
pub trait WriteObserver: Send + Sync {
    fn on_write(&self, addr: u32, width: u32, view: &MemoryView<'_>);
}

/// Instruction-cache (or recompiler block cache) owned by the execution component.
pub trait CodeCacheObserver: Send {
    fn invalidate(&mut self, addr: u32, len: u32);
    fn invalidate_all(&mut self);
}

/// Handler for the hardware register file (`0x1f80_0400..0x1f81_0000` and mirrors).
///
/// Values are little-endian and zero-extended to `u32`.
pub trait HardwareRegisters: Send {
    fn read(&mut self, addr: u32, width: Width, mem: &PhysicalMemory) -> u32;
    fn write(&mut self, addr: u32, width: Width, value: u32, mem: &PhysicalMemory);
}

/// Plain register file: registers behave like memory inside the hardware window.
#[derive(Debug, Default)]
pub struct RegisterFile;

impl HardwareRegisters for RegisterFile {
    fn read(&mut self, addr: u32, width: Width, mem: &PhysicalMemory) -> u32 {
        let mut buf = [0u8; 4];
        let loc = HostLocation {
            region: Region::Hardware,
            offset: addr & (PAGE_SIZE - 1),
        };
        mem.read(loc, &mut buf[..width.bytes()]);
        u32::from_le_bytes(buf)
    }

    fn write(&mut self, addr: u32, width: Width, value: u32, mem: &PhysicalMemory) {
        let loc = HostLocation {
            region: Region::Hardware,
            offset: addr & (PAGE_SIZE - 1),
        };
        mem.write(loc, &value.to_le_bytes()[..width.bytes()]);
    }
}

/// Counters for accesses that hit unmapped pages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AccessStats {
    pub unmapped_reads: u64,
    pub unmapped_writes: u64,
}

/// The execution thread's memory bus.
///
/// Owns the mutable write table and the cache-isolation switch; nothing else can remap pages, so
/// the single-writer rule for the tables is enforced by ownership. The type is `Send` but not
/// `Clone`: move it into the execution thread and hand out [`MemoryHandle`]s for everyone else.
pub struct AddressSpace {
    mem: Arc<PhysicalMemory>,
    base: Arc<MemoryMap>,
    write_table: PageTable,
    isolation: CacheIsolationSwitch,
    hardware: Box<dyn HardwareRegisters>,
    observer: Option<Arc<dyn WriteObserver>>,
    code_cache: Option<Box<dyn CodeCacheObserver>>,
    stats: AccessStats,
}

impl AddressSpace {
    pub fn new(mem: Arc<PhysicalMemory>) -> Self {
        let base = Arc::new(MemoryMap::standard());
        Self {
            mem,
            write_table: base.write_table().clone(),
            base,
            isolation: CacheIsolationSwitch::new(),
            hardware: Box::new(RegisterFile),
            observer: None,
            code_cache: None,
            stats: AccessStats::default(),
        }
    }

    pub fn with_write_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_code_cache(mut self, cache: Box<dyn CodeCacheObserver>) -> Self {
        self.code_cache = Some(cache);
        self
    }

    pub fn with_hardware(mut self, hardware: Box<dyn HardwareRegisters>) -> Self {
        self.hardware = hardware;
        self
    }

    pub fn memory(&self) -> &Arc<PhysicalMemory> {
        &self.mem
    }

    /// A cross-thread accessor sharing this bus's storage, isolation flag and observer.
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle::new(
            self.mem.clone(),
            self.base.clone(),
            self.isolation.published(),
            self.observer.clone(),
        )
    }

    pub fn view(&self) -> MemoryView<'_> {
        MemoryView::new(&self.mem, self.base.read_table())
    }

    pub fn is_cache_isolated(&self) -> bool {
        self.isolation.is_isolated()
    }

    /// Drops every translated block. Callers that replace memory wholesale (state loads) must
    /// call this since no store went through the bus.
    pub fn invalidate_code_cache(&mut self) {
        if let Some(cache) = self.code_cache.as_mut() {
            cache.invalidate_all();
        }
    }

    pub fn stats(&self) -> AccessStats {
        self.stats
    }

    /// Resolves a range for bulk copies. `None` for unmapped addresses, hardware registers, and
    /// ranges running past their backing region.
    pub fn host_range(&self, addr: u32, len: usize) -> Option<HostRange> {
        self.view().resolve_range(addr, len).ok()
    }

    pub fn read_u8(&mut self, addr: u32) -> u8 {
        self.read(addr, Width::Byte) as u8
    }

    pub fn read_u16(&mut self, addr: u32) -> u16 {
        self.read(addr, Width::Half) as u16
    }

    pub fn read_u32(&mut self, addr: u32) -> u32 {
        self.read(addr, Width::Word)
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) {
        self.write(addr, Width::Byte, u32::from(value));
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) {
        self.write(addr, Width::Half, u32::from(value));
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) {
        self.write(addr, Width::Word, value);
    }

    fn read(&mut self, addr: u32, width: Width) -> u32 {
        let loc = match classify(addr) {
            AddressClass::Scratchpad { offset } => HostLocation {
                region: Region::Hardware,
                offset,
            },
            AddressClass::HardwareRegister => {
                return self.hardware.read(addr, width, &self.mem);
            }
            AddressClass::Table => match self.base.read_table().resolve(addr) {
                Some(loc) => loc,
                None => {
                    self.stats.unmapped_reads += 1;
                    tracing::trace!("unmapped read{} at 0x{addr:08x}", width.bytes() * 8);
                    return 0;
                }
            },
        };

        let mut buf = [0u8; 4];
        if !self.mem.read(loc, &mut buf[..width.bytes()]) {
            self.stats.unmapped_reads += 1;
            tracing::trace!("read past end of {} at 0x{addr:08x}", loc.region);
            return 0;
        }
        u32::from_le_bytes(buf)
    }

    fn write(&mut self, addr: u32, width: Width, value: u32) {
        let bytes = value.to_le_bytes();
        let bytes = &bytes[..width.bytes()];

        match classify(addr) {
            AddressClass::Scratchpad { offset } => {
                let loc = HostLocation {
                    region: Region::Hardware,
                    offset,
                };
                if self.mem.write(loc, bytes) {
                    self.notify_observer(addr, width);
                }
            }
            AddressClass::HardwareRegister => {
                self.hardware.write(addr, width, value, &self.mem);
            }
            AddressClass::Table => match self.write_table.resolve(addr) {
                Some(loc) => {
                    if !self.mem.write(loc, bytes) {
                        self.stats.unmapped_writes += 1;
                        tracing::trace!("write past end of {} at 0x{addr:08x}", loc.region);
                        return;
                    }
                    self.notify_observer(addr, width);
                    if let Some(cache) = self.code_cache.as_mut() {
                        cache.invalidate(addr & !3, 1);
                    }
                }
                None => self.unmapped_write(addr, width, value),
            },
        }
    }

    fn notify_observer(&self, addr: u32, width: Width) {
        if let Some(observer) = &self.observer {
            let view = MemoryView::new(&self.mem, self.base.read_table());
            observer.on_write(addr, width.bytes() as u32, &view);
        }
    }

    fn unmapped_write(&mut self, addr: u32, width: Width, value: u32) {
        if addr == CACHE_CONTROL_ADDR && width == Width::Word {
            match self.isolation.apply(value, &mut self.write_table) {
                IsolationChange::Isolated => {
                    tracing::debug!("cache isolated (0x{value:x})");
                    if let Some(cache) = self.code_cache.as_mut() {
                        cache.invalidate_all();
                    }
                }
                IsolationChange::Restored => tracing::debug!("cache isolation lifted (0x{value:x})"),
                IsolationChange::Unchanged => {}
                IsolationChange::UnknownValue => {
                    tracing::debug!("unknown cache-control value 0x{value:08x}")
                }
            }
            return;
        }

        if self.isolation.is_isolated() {
            // Isolated stores are how the BIOS flushes cache lines.
            if let Some(cache) = self.code_cache.as_mut() {
                cache.invalidate(addr, 1);
            }
            return;
        }

        self.stats.unmapped_writes += 1;
        tracing::debug!(
            "unmapped write{} at 0x{addr:08x} (value 0x{value:x})",
            width.bytes() * 8
        );
    }
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("isolated", &self.is_cache_isolated())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingCache {
        events: Arc<Mutex<Vec<Option<(u32, u32)>>>>,
    }

    impl CodeCacheObserver for RecordingCache {
        fn invalidate(&mut self, addr: u32, len: u32) {
            self.events.lock().unwrap().push(Some((addr, len)));
        }

        fn invalidate_all(&mut self) {
            self.events.lock().unwrap().push(None);
        }
    }

    #[test]
    fn stores_invalidate_the_code_cache() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut bus = AddressSpace::new(Arc::new(PhysicalMemory::new())).with_code_cache(
            Box::new(RecordingCache {
                events: events.clone(),
            }),
        );

        bus.write_u32(0x8000_1006, 1);
        bus.write_u32(CACHE_CONTROL_ADDR, 0x800);
        bus.write_u8(0x8000_2000, 1);
        bus.write_u32(CACHE_CONTROL_ADDR, 0x0);

        assert_eq!(
            *events.lock().unwrap(),
            vec![Some((0x8000_1004, 1)), None, Some((0x8000_2000, 1))]
        );
    }

    #[test]
    fn explicit_invalidation_drops_the_whole_cache() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut bus = AddressSpace::new(Arc::new(PhysicalMemory::new())).with_code_cache(
            Box::new(RecordingCache {
                events: events.clone(),
            }),
        );
        bus.invalidate_code_cache();
        assert_eq!(*events.lock().unwrap(), vec![None]);

        // No observer attached: nothing to do.
        AddressSpace::new(Arc::new(PhysicalMemory::new())).invalidate_code_cache();
    }

    #[test]
    fn unmapped_accesses_are_counted_not_fatal() {
        let mut bus = AddressSpace::new(Arc::new(PhysicalMemory::new()));
        assert_eq!(bus.read_u32(0x0080_0000), 0);
        bus.write_u16(0x1fc0_0000, 0xbeef);
        bus.write_u8(0x7000_0000, 1);
        assert_eq!(
            bus.stats(),
            AccessStats {
                unmapped_reads: 1,
                unmapped_writes: 2
            }
        );
    }

    #[test]
    fn isolated_stores_are_not_counted_as_errors() {
        let mut bus = AddressSpace::new(Arc::new(PhysicalMemory::new()));
        bus.write_u32(CACHE_CONTROL_ADDR, 0x804);
        bus.write_u32(0x0000_0100, 5);
        assert_eq!(bus.stats().unmapped_writes, 0);
    }
}
