//! Console memory bus with a live watch/control plane.
//!
//! Re-exports the workspace crates under short names:
//! - [`mem`]: memory map, address space, cache isolation;
//! - [`protocol`]: control-channel wire format;
//! - [`watch`]: watch hooks and notifications;
//! - [`control`]: protocol server, execution thread and the [`control::Controller`].

#![forbid(unsafe_code)]

pub use psx_control as control;
pub use psx_control_protocol as protocol;
pub use psx_mem as mem;
pub use psx_watch as watch;

pub use psx_control::{Controller, ControllerOptions, ControllerReport};
pub use psx_mem::{AddressSpace, PhysicalMemory};
pub use psx_watch::HookSpec;
