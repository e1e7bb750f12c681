//! Memory watchpoints reported over the notification channel.
//!
//! A [`WatchRegistry`] is built once from a list of [`HookSpec`]s. The [`WatchEngine`] is installed
//! as the address space's [`psx_mem::WriteObserver`] and evaluates every store against the
//! registered ranges; hooks without coalescing report immediately, coalescing hooks are drained by
//! the [`FlushScheduler`] at a fixed interval.
//!
//! Addresses are canonical (see [`psx_mem::canonical_watch_address`]), so a hook configured on
//! `0x800a_0000` fires for stores through `0x000a_0000` and `0xa00a_0000` alike.

#![forbid(unsafe_code)]

mod engine;
mod error;
mod flush;
mod hook;
mod loader;
mod notifier;
mod registry;
mod sync;

pub use engine::WatchEngine;
pub use error::HookConfigError;
pub use flush::{FlushScheduler, StopSignal, DEFAULT_FLUSH_INTERVAL};
pub use hook::{HookSpec, HookState, WatchHook, MAX_HOOK_KEY};
pub use loader::{encode_hook_record, load_json_hooks, parse_json_hooks, read_hook_records, HOOK_RECORD_LEN};
pub use notifier::{MemorySink, Notifier};
pub use registry::WatchRegistry;
