use core::fmt;

use crate::error::{MemoryError, MemoryResult};
use crate::phys::{HostLocation, HostRange, Region};

pub const PAGE_SHIFT: u32 = 16;
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;
pub const PAGE_COUNT: usize = 1 << (32 - PAGE_SHIFT);

pub const KUSEG_RAM_PAGE: u16 = 0x0000;
pub const KSEG0_RAM_PAGE: u16 = 0x8000;
pub const KSEG1_RAM_PAGE: u16 = 0xa000;
/// Pages per RAM window: 8 MiB, i.e. the 2 MiB of RAM mirrored four times.
pub const RAM_WINDOW_PAGES: u16 = 0x80;

pub const PARALLEL_PAGE: u16 = 0x1f00;

/// Pages routed to the scratchpad/hardware-register window, one per segment.
pub const HARDWARE_PAGES: [u16; 3] = [0x1f80, 0x9f80, 0xbf80];
pub const SCRATCHPAD_SIZE: u32 = 0x400;

pub const BIOS_PAGE: u16 = 0x1fc0;
pub const KSEG0_BIOS_PAGE: u16 = 0x9fc0;
pub const KSEG1_BIOS_PAGE: u16 = 0xbfc0;
pub const BIOS_WINDOW_PAGES: u16 = 0x08;

/// Cache-control register. It sits in an unmapped page, so stores to it fall through the write
/// table and are decoded by the bus.
pub const CACHE_CONTROL_ADDR: u32 = 0xfffe_0130;

const RAM_BASES: [u16; 3] = [KUSEG_RAM_PAGE, KSEG0_RAM_PAGE, KSEG1_RAM_PAGE];

#[inline]
pub const fn page_of(addr: u32) -> u16 {
    (addr >> PAGE_SHIFT) as u16
}

/// How the bus routes an address before consulting the page tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    /// Direct scratchpad access; `offset` indexes the hardware window.
    Scratchpad { offset: u32 },
    /// Hardware register file, handled by [`crate::HardwareRegisters`].
    HardwareRegister,
    /// Everything else goes through the read/write tables.
    Table,
}

pub fn classify(addr: u32) -> AddressClass {
    if HARDWARE_PAGES.contains(&page_of(addr)) {
        let offset = addr & (PAGE_SIZE - 1);
        if offset < SCRATCHPAD_SIZE {
            AddressClass::Scratchpad { offset }
        } else {
            AddressClass::HardwareRegister
        }
    } else {
        AddressClass::Table
    }
}

/// Folds an address onto the canonical location used to match watch hooks.
///
/// Segment bits are stripped, and the four RAM mirrors inside the first 8 MiB collapse onto the
/// 2 MiB RAM offset. `0x800a_0000`, `0xa02a_0000` and `0x000a_0000` all map to `0x000a_0000`.
pub const fn canonical_watch_address(addr: u32) -> u32 {
    let phys = addr & 0x1fff_ffff;
    if phys < (RAM_WINDOW_PAGES as u32) << PAGE_SHIFT {
        phys & (crate::phys::RAM_SIZE - 1)
    } else {
        phys
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub region: Region,
    /// Offset of the page start inside `region`.
    pub base: u32,
}

/// One lookup table: a host location (or nothing) per 64 KiB page.
#[derive(Clone)]
pub struct PageTable {
    entries: Box<[Option<PageEntry>]>,
}

impl PageTable {
    pub fn empty() -> Self {
        Self {
            entries: vec![None; PAGE_COUNT].into_boxed_slice(),
        }
    }

    pub fn get(&self, page: u16) -> Option<PageEntry> {
        self.entries[usize::from(page)]
    }

    pub fn set(&mut self, page: u16, entry: Option<PageEntry>) {
        self.entries[usize::from(page)] = entry;
    }

    pub fn resolve(&self, addr: u32) -> Option<HostLocation> {
        let entry = self.get(page_of(addr))?;
        Some(HostLocation {
            region: entry.region,
            offset: entry.base + (addr & (PAGE_SIZE - 1)),
        })
    }

    /// Resolves `[addr, addr + len)` to one contiguous host range. Scratchpad addresses bypass
    /// the table; hardware registers have no backing.
    pub fn resolve_range(&self, addr: u32, len: usize) -> MemoryResult<HostRange> {
        let loc = match classify(addr) {
            AddressClass::Scratchpad { offset } => HostLocation {
                region: Region::Hardware,
                offset,
            },
            AddressClass::HardwareRegister => return Err(MemoryError::NoBacking { addr }),
            AddressClass::Table => self.resolve(addr).ok_or(MemoryError::Unmapped { addr })?,
        };
        let end = u64::from(loc.offset) + len as u64;
        if end > u64::from(loc.region.size()) {
            return Err(MemoryError::OutOfBounds {
                addr,
                len,
                region: loc.region,
            });
        }
        Ok(HostRange {
            region: loc.region,
            offset: loc.offset,
            len,
        })
    }

    pub fn mapped_pages(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    fn copy_pages(&mut self, dst: u16, src: u16, count: u16) {
        for i in 0..count {
            self.set(dst + i, self.get(src + i));
        }
    }

    /// Installs the RAM windows (direct plus both mirrors).
    pub(crate) fn install_ram(&mut self) {
        for i in 0..RAM_WINDOW_PAGES {
            self.set(
                KUSEG_RAM_PAGE + i,
                Some(PageEntry {
                    region: Region::Ram,
                    base: u32::from(i & 0x1f) << PAGE_SHIFT,
                }),
            );
        }
        self.copy_pages(KSEG0_RAM_PAGE, KUSEG_RAM_PAGE, RAM_WINDOW_PAGES);
        self.copy_pages(KSEG1_RAM_PAGE, KUSEG_RAM_PAGE, RAM_WINDOW_PAGES);
    }

    /// Blanks every RAM window entry.
    pub(crate) fn clear_ram(&mut self) {
        for base in RAM_BASES {
            for i in 0..RAM_WINDOW_PAGES {
                self.set(base + i, None);
            }
        }
    }

    fn install_fixed_windows(&mut self) {
        self.set(
            PARALLEL_PAGE,
            Some(PageEntry {
                region: Region::Parallel,
                base: 0,
            }),
        );
        self.set(
            HARDWARE_PAGES[0],
            Some(PageEntry {
                region: Region::Hardware,
                base: 0,
            }),
        );
    }

    fn install_bios(&mut self) {
        for i in 0..BIOS_WINDOW_PAGES {
            self.set(
                BIOS_PAGE + i,
                Some(PageEntry {
                    region: Region::Bios,
                    base: u32::from(i) << PAGE_SHIFT,
                }),
            );
        }
        self.copy_pages(KSEG0_BIOS_PAGE, BIOS_PAGE, BIOS_WINDOW_PAGES);
        self.copy_pages(KSEG1_BIOS_PAGE, BIOS_PAGE, BIOS_WINDOW_PAGES);
    }
}

impl fmt::Debug for PageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTable")
            .field("mapped_pages", &self.mapped_pages())
            .finish()
    }
}

/// The power-on read and write tables. Never mutated after construction; the execution thread
/// keeps its own copy of the write table for cache isolation.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    read: PageTable,
    write: PageTable,
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::standard()
    }
}

impl MemoryMap {
    pub fn standard() -> Self {
        let mut read = PageTable::empty();
        read.install_ram();
        read.install_fixed_windows();
        read.install_bios();

        // ROM is never writable.
        let mut write = PageTable::empty();
        write.install_ram();
        write.install_fixed_windows();

        Self { read, write }
    }

    pub fn read_table(&self) -> &PageTable {
        &self.read
    }

    pub fn write_table(&self) -> &PageTable {
        &self.write
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_mirrors_resolve_to_the_same_offset() {
        let map = MemoryMap::standard();
        for addr in [0x0001_2345u32, 0x8001_2345, 0xa001_2345, 0x0021_2345, 0x8061_2345] {
            assert_eq!(
                map.read_table().resolve(addr),
                Some(HostLocation {
                    region: Region::Ram,
                    offset: 0x1_2345
                }),
                "addr=0x{addr:08x}"
            );
        }
    }

    #[test]
    fn bios_is_readable_but_not_writable() {
        let map = MemoryMap::standard();
        for addr in [0x1fc0_0100u32, 0x9fc0_0100, 0xbfc7_0100] {
            let loc = map.read_table().resolve(addr).unwrap();
            assert_eq!(loc.region, Region::Bios);
            assert_eq!(map.write_table().resolve(addr), None);
        }
    }

    #[test]
    fn unmapped_pages_are_empty() {
        let map = MemoryMap::standard();
        assert_eq!(map.read_table().resolve(0x0080_0000), None);
        assert_eq!(map.read_table().resolve(0x1f01_0000), None);
        assert_eq!(map.write_table().resolve(CACHE_CONTROL_ADDR), None);
    }

    #[test]
    fn classify_splits_the_hardware_window() {
        assert_eq!(
            classify(0x1f80_0010),
            AddressClass::Scratchpad { offset: 0x10 }
        );
        assert_eq!(
            classify(0xbf80_03ff),
            AddressClass::Scratchpad { offset: 0x3ff }
        );
        assert_eq!(classify(0x9f80_1810), AddressClass::HardwareRegister);
        assert_eq!(classify(0x8000_0000), AddressClass::Table);
    }

    #[test]
    fn clear_ram_only_touches_ram_windows() {
        let mut table = MemoryMap::standard().write_table().clone();
        table.clear_ram();
        assert_eq!(table.resolve(0x8000_0000), None);
        assert_eq!(table.resolve(0x0070_0000), None);
        assert!(table.resolve(0x1f00_0000).is_some());
        table.install_ram();
        assert_eq!(table.mapped_pages(), MemoryMap::standard().write_table().mapped_pages());
    }

    #[test]
    fn canonical_watch_address_folds_mirrors() {
        assert_eq!(canonical_watch_address(0x800a_0000), 0x000a_0000);
        assert_eq!(canonical_watch_address(0xa02a_0004), 0x000a_0004);
        assert_eq!(canonical_watch_address(0x1f00_0010), 0x1f00_0010);
        assert_eq!(canonical_watch_address(0x9f80_0010), 0x1f80_0010);
    }
}
