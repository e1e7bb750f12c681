use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use psx_mem::{AddressSpace, PhysicalMemory, Region, PARALLEL_SIZE, RAM_SIZE, SCRATCHPAD_SIZE};

/// Persists and restores machine state. Only ever called on the execution thread, between
/// instruction slices.
pub trait StateStore: Send {
    fn save(&mut self, path: &Path, bus: &mut AddressSpace) -> io::Result<()>;
    fn load(&mut self, path: &Path, bus: &mut AddressSpace) -> io::Result<()>;
}

const MAGIC_LEN: usize = 8;
const IMAGE_MAGIC: &[u8; MAGIC_LEN] = b"PSXRAM01";

/// Image sections in file order: `(region, offset, len)`.
const SECTIONS: [(Region, u32, u32); 3] = [
    (Region::Ram, 0, RAM_SIZE),
    (Region::Parallel, 0, PARALLEL_SIZE),
    (Region::Hardware, 0, SCRATCHPAD_SIZE),
];

pub const RAM_IMAGE_LEN: usize =
    MAGIC_LEN + (RAM_SIZE + PARALLEL_SIZE + SCRATCHPAD_SIZE) as usize;

/// Flat image of RAM, the parallel port window and the scratchpad.
///
/// Relative paths resolve against the state directory when one is set.
#[derive(Debug, Clone, Default)]
pub struct RamImageStore {
    dir: Option<PathBuf>,
}

impl RamImageStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn encode(mem: &PhysicalMemory) -> Vec<u8> {
        let mut image = Vec::with_capacity(RAM_IMAGE_LEN);
        image.extend_from_slice(IMAGE_MAGIC);
        for (region, offset, len) in SECTIONS {
            let start = image.len();
            image.resize(start + len as usize, 0);
            mem.region(region).read_into(offset, &mut image[start..]);
        }
        image
    }

    pub fn decode_into(image: &[u8], mem: &PhysicalMemory) -> io::Result<()> {
        if image.len() != RAM_IMAGE_LEN || !image.starts_with(IMAGE_MAGIC) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("not a RAM image ({} bytes)", image.len()),
            ));
        }
        let mut rest = &image[MAGIC_LEN..];
        for (region, offset, len) in SECTIONS {
            let (section, tail) = rest.split_at(len as usize);
            mem.region(region).write_from(offset, section);
            rest = tail;
        }
        Ok(())
    }
}

impl StateStore for RamImageStore {
    fn save(&mut self, path: &Path, bus: &mut AddressSpace) -> io::Result<()> {
        let path = self.resolve(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, Self::encode(bus.memory()))?;
        tracing::info!("state saved to {}", path.display());
        Ok(())
    }

    fn load(&mut self, path: &Path, bus: &mut AddressSpace) -> io::Result<()> {
        let path = self.resolve(path);
        let image = fs::read(&path)?;
        Self::decode_into(&image, bus.memory())?;
        tracing::info!("state loaded from {}", path.display());
        Ok(())
    }
}
