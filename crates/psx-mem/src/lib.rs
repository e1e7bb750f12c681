//! Console address space: backing storage, page tables and the emulated memory bus.
//!
//! # Memory map
//!
//! | Address range             | Region                          | Size   |
//! |---------------------------|---------------------------------|--------|
//! | `0x0000_0000-0x007f_ffff` | RAM (2 MiB, mirrored 4x)        | 8 MiB  |
//! | `0x1f00_0000-0x1f00_ffff` | Parallel port                   | 64 KiB |
//! | `0x1f80_0000-0x1f80_03ff` | Scratchpad                      | 1 KiB  |
//! | `0x1f80_0400-0x1f80_ffff` | Hardware registers              |        |
//! | `0x1fc0_0000-0x1fc7_ffff` | BIOS ROM                        | 512 KiB|
//! | `0x8000_0000-...`         | KSEG0 (cached) mirror of RAM/BIOS |      |
//! | `0xa000_0000-...`         | KSEG1 (uncached) mirror of RAM/BIOS |    |
//!
//! [`AddressSpace`] is the execution thread's view: it owns the mutable write table (cache
//! isolation blanks it) and drives write observers. Other threads use a [`MemoryHandle`], which
//! resolves against the immutable base [`MemoryMap`] and shares the byte-atomic
//! [`PhysicalMemory`].

#![forbid(unsafe_code)]

mod error;
mod handle;
mod isolation;
mod map;
mod phys;
mod space;

pub use error::{MemoryError, MemoryResult};
pub use handle::{MemoryHandle, MemoryView};
pub use isolation::{CacheIsolationSwitch, IsolationChange, ISOLATE_VALUES, RESTORE_VALUES};
pub use map::{
    canonical_watch_address, classify, page_of, AddressClass, MemoryMap, PageEntry, PageTable,
    BIOS_PAGE, BIOS_WINDOW_PAGES, CACHE_CONTROL_ADDR, HARDWARE_PAGES, KSEG0_BIOS_PAGE,
    KSEG0_RAM_PAGE, KSEG1_BIOS_PAGE, KSEG1_RAM_PAGE, KUSEG_RAM_PAGE, PAGE_COUNT, PAGE_SHIFT,
    PAGE_SIZE, PARALLEL_PAGE, RAM_WINDOW_PAGES, SCRATCHPAD_SIZE,
};
pub use phys::{
    Backing, HostLocation, HostRange, PhysicalMemory, Region, BIOS_SIZE, HARDWARE_SIZE,
    PARALLEL_SIZE, RAM_SIZE,
};
pub use space::{
    AccessStats, AddressSpace, CodeCacheObserver, HardwareRegisters, RegisterFile, Width,
    WriteObserver,
};
