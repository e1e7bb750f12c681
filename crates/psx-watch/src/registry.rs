use psx_mem::MemoryMap;

use crate::error::HookConfigError;
use crate::hook::{HookSpec, WatchHook, MAX_HOOK_KEY};

const KEY_SLOTS: usize = MAX_HOOK_KEY as usize + 1;

/// The fixed set of hooks, sized at construction.
#[derive(Debug)]
pub struct WatchRegistry {
    hooks: Vec<WatchHook>,
    by_key: [Option<usize>; KEY_SLOTS],
    /// Union of all hook ranges, `[min, max)`.
    min: u64,
    max: u64,
}

impl WatchRegistry {
    pub fn new(specs: &[HookSpec]) -> Result<Self, HookConfigError> {
        let mut by_key = [None; KEY_SLOTS];
        let mut hooks = Vec::with_capacity(specs.len());
        let mut min = u64::MAX;
        let mut max = 0u64;
        let map = MemoryMap::standard();

        for spec in specs {
            spec.validate()?;
            let slot = &mut by_key[usize::from(spec.key)];
            if slot.is_some() {
                return Err(HookConfigError::DuplicateKey { key: spec.key });
            }
            *slot = Some(hooks.len());

            let hook = WatchHook::from_spec(spec);
            // The whole range must sit inside one backing region or it could never be read.
            map.read_table()
                .resolve_range(hook.start(), hook.length() as usize)
                .map_err(|source| HookConfigError::Unbacked {
                    key: spec.key,
                    source,
                })?;
            min = min.min(u64::from(hook.start()));
            max = max.max(hook.end());
            hooks.push(hook);
        }

        if hooks.is_empty() {
            min = 0;
        }
        tracing::debug!("registered {} hooks over [0x{min:x}, 0x{max:x})", hooks.len());
        Ok(Self {
            hooks,
            by_key,
            min,
            max,
        })
    }

    pub fn empty() -> Self {
        Self {
            hooks: Vec::new(),
            by_key: [None; KEY_SLOTS],
            min: 0,
            max: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn get(&self, key: u8) -> Option<&WatchHook> {
        let idx = (*self.by_key.get(usize::from(key))?)?;
        self.hooks.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchHook> {
        self.hooks.iter()
    }

    /// Configured value length for `key`, for splitting a captured notification stream.
    pub fn value_len(&self, key: u8) -> Option<usize> {
        self.get(key).map(|h| h.length() as usize)
    }

    /// Fast reject against the union of all hook ranges.
    pub fn may_overlap(&self, addr: u32, len: u32) -> bool {
        let addr = u64::from(addr);
        addr < self.max && addr + u64::from(len) > self.min
    }
}
