//! Control-pipe wire protocol.
//!
//! Inbound (controller -> emulator): one opcode byte followed by a fixed, opcode-specific
//! payload. Integers are 4 bytes big-endian; paths are a 1-byte length followed by raw bytes.
//! Unknown opcodes decode to [`Request::Unknown`] with no payload so readers can skip them.
//!
//! Outbound (emulator -> controller): either a hook event `[0x00][key][value...]`, where the
//! value length is the hook's configured length, or a single [`Status`] byte.

#![forbid(unsafe_code)]

mod notification;
mod request;

pub use notification::{
    decode_notifications, Notification, NotificationDecodeError, Status, HOOK_FIRED_TAG,
};
pub use request::{
    encode_request, DecodeError, EncodeError, Request, RequestReader, WirePath, MAX_PATH_LEN,
};

/// Capacity of the shared query segment written by [`Request::QueryMemory`].
pub const QUERY_SEGMENT_SIZE: usize = 128;

/// Maximum number of pokes in one [`Request::Drill`] (the count is a single byte).
pub const MAX_DRILL_COUNT: u8 = u8::MAX;

pub mod opcode {
    pub const SHUTDOWN: u8 = 1;
    pub const PAUSE: u8 = 2;
    pub const RESUME: u8 = 3;
    pub const SNAPSHOT: u8 = 11;
    pub const CLEAR_SNAPSHOT: u8 = 12;
    /// Headless framebuffer pull; reserved and never implemented.
    pub const RESERVED_FRAMEBUFFER: u8 = 13;
    pub const QUERY_MEMORY: u8 = 21;
    pub const DUMP_MEMORY: u8 = 22;
    pub const RELEASE_QUERY: u8 = 23;
    pub const SILENCE: u8 = 24;
    pub const UNSILENCE: u8 = 25;
    pub const POKE: u8 = 26;
    pub const DRILL: u8 = 27;
    pub const START_AUDIO_RECORDING: u8 = 31;
    pub const STOP_AUDIO_RECORDING: u8 = 32;
    pub const SAVE_STATE: u8 = 41;
    pub const LOAD_STATE: u8 = 42;
    pub const SET_SPEED: u8 = 43;
    pub const PING: u8 = 50;
}
