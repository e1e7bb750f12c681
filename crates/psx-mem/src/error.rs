use thiserror::Error;

use crate::phys::Region;

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// Errors returned by the off-thread memory accessors ([`crate::MemoryHandle`],
/// [`crate::MemoryView`]). The execution-thread bus never fails; it counts and logs instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("address 0x{addr:08x} is not mapped")]
    Unmapped { addr: u32 },

    #[error("address 0x{addr:08x} is a hardware register without direct backing")]
    NoBacking { addr: u32 },

    #[error("range 0x{addr:08x}+{len} runs past the end of {region}")]
    OutOfBounds { addr: u32, len: usize, region: Region },

    #[error("BIOS image is {len} bytes, expected at most {max} bytes")]
    BiosTooLarge { len: usize, max: usize },
}
