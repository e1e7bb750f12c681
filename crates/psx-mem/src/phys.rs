use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{MemoryError, MemoryResult};

pub const RAM_SIZE: u32 = 0x20_0000;
pub const PARALLEL_SIZE: u32 = 0x1_0000;
/// Scratchpad (first 1 KiB) plus the hardware register file.
pub const HARDWARE_SIZE: u32 = 0x1_0000;
pub const BIOS_SIZE: u32 = 0x8_0000;

/// A host backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Ram,
    Parallel,
    Hardware,
    Bios,
}

impl Region {
    pub const fn size(self) -> u32 {
        match self {
            Region::Ram => RAM_SIZE,
            Region::Parallel => PARALLEL_SIZE,
            Region::Hardware => HARDWARE_SIZE,
            Region::Bios => BIOS_SIZE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Region::Ram => "RAM",
            Region::Parallel => "parallel port",
            Region::Hardware => "scratchpad/hardware window",
            Region::Bios => "BIOS ROM",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved host location: backing region plus byte offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLocation {
    pub region: Region,
    pub offset: u32,
}

/// A resolved, bounds-checked host range used for bulk copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRange {
    pub region: Region,
    pub offset: u32,
    pub len: usize,
}

/// Byte-addressable storage shared between threads.
///
/// Every byte is an [`AtomicU8`] accessed with relaxed ordering: the execution thread, the control
/// protocol thread and the flush thread may touch the same bytes concurrently, and byte-granular
/// atomics keep that free of data races without a global lock. Multi-byte values can tear across
/// threads, exactly like the hardware bus they model.
pub struct Backing {
    bytes: Box<[AtomicU8]>,
}

impl Backing {
    fn new(size: u32) -> Self {
        Self {
            bytes: (0..size).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn range(&self, offset: u32, len: usize) -> Option<&[AtomicU8]> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(len)?;
        self.bytes.get(start..end)
    }

    /// Copies bytes out of the backing store. Returns `false` if the range is out of bounds.
    pub fn read_into(&self, offset: u32, dst: &mut [u8]) -> bool {
        let Some(src) = self.range(offset, dst.len()) else {
            return false;
        };
        for (slot, byte) in dst.iter_mut().zip(src) {
            *slot = byte.load(Ordering::Relaxed);
        }
        true
    }

    /// Copies bytes into the backing store. Returns `false` if the range is out of bounds.
    pub fn write_from(&self, offset: u32, src: &[u8]) -> bool {
        let Some(dst) = self.range(offset, src.len()) else {
            return false;
        };
        for (byte, value) in dst.iter().zip(src) {
            byte.store(*value, Ordering::Relaxed);
        }
        true
    }

    pub fn fill(&self, value: u8) {
        for byte in self.bytes.iter() {
            byte.store(value, Ordering::Relaxed);
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backing").field("len", &self.len()).finish()
    }
}

/// All host buffers behind the console address space.
#[derive(Debug)]
pub struct PhysicalMemory {
    ram: Backing,
    parallel: Backing,
    hardware: Backing,
    bios: Backing,
}

impl Default for PhysicalMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalMemory {
    pub fn new() -> Self {
        Self {
            ram: Backing::new(RAM_SIZE),
            parallel: Backing::new(PARALLEL_SIZE),
            hardware: Backing::new(HARDWARE_SIZE),
            bios: Backing::new(BIOS_SIZE),
        }
    }

    pub fn region(&self, region: Region) -> &Backing {
        match region {
            Region::Ram => &self.ram,
            Region::Parallel => &self.parallel,
            Region::Hardware => &self.hardware,
            Region::Bios => &self.bios,
        }
    }

    pub fn read(&self, loc: HostLocation, dst: &mut [u8]) -> bool {
        self.region(loc.region).read_into(loc.offset, dst)
    }

    pub fn write(&self, loc: HostLocation, src: &[u8]) -> bool {
        self.region(loc.region).write_from(loc.offset, src)
    }

    /// Copies a BIOS image into ROM, zero-filling the remainder.
    pub fn load_bios(&self, image: &[u8]) -> MemoryResult<()> {
        let max = BIOS_SIZE as usize;
        if image.len() > max {
            return Err(MemoryError::BiosTooLarge {
                len: image.len(),
                max,
            });
        }
        self.bios.fill(0);
        self.bios.write_from(0, image);
        Ok(())
    }

    /// Power-on reset: clears RAM and the parallel port window. ROM is left untouched.
    pub fn reset(&self) {
        self.ram.fill(0);
        self.parallel.fill(0);
    }
}
