use core::fmt;
use std::io::{self, Read};
use std::path::PathBuf;

use thiserror::Error;

use crate::opcode;

/// Longest path representable on the wire (1-byte length prefix).
pub const MAX_PATH_LEN: usize = u8::MAX as usize;

/// A path exactly as it appeared on the wire (raw bytes, no terminator).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WirePath(Vec<u8>);

impl WirePath {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(unix)]
    pub fn to_path_buf(&self) -> PathBuf {
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(std::ffi::OsStr::from_bytes(&self.0))
    }

    #[cfg(not(unix))]
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(String::from_utf8_lossy(&self.0).into_owned())
    }
}

impl From<&str> for WirePath {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for WirePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for WirePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// One decoded inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Opcode 1: orderly shutdown.
    Shutdown,
    /// Opcode 2.
    Pause,
    /// Opcode 3.
    Resume,
    /// Opcode 11: render snapshot into the external buffer identified by `id`.
    Snapshot { id: u8 },
    /// Opcode 12: clear the snapshot buffer (snapshot id 0).
    ClearSnapshot,
    /// Opcode 21: copy `len` bytes at `start` into the shared segment keyed by `key`.
    QueryMemory { start: u32, len: u32, key: u8 },
    /// Opcode 22: write `len` bytes at `start` to `path`.
    DumpMemory { start: u32, len: u32, path: WirePath },
    /// Opcode 23: detach and release the shared segment.
    ReleaseQuery,
    /// Opcode 24.
    Silence { key: u8 },
    /// Opcode 25.
    Unsilence { key: u8 },
    /// Opcode 26: single byte store.
    Poke { addr: u32, value: u8 },
    /// Opcode 27: `count` byte stores spaced 5 ms apart.
    Drill { addr: u32, value: u8, count: u8 },
    /// Opcode 31.
    StartAudioRecording { path: WirePath },
    /// Opcode 32.
    StopAudioRecording,
    /// Opcode 41: deferred save.
    SaveState { path: WirePath },
    /// Opcode 42: deferred load.
    LoadState { path: WirePath },
    /// Opcode 43: render speed multiplier is `percent / 100`.
    SetSpeed { percent: u32 },
    /// Opcode 50: liveness probe.
    Ping,
    /// Any other opcode. Carries no payload; the reader resumes at the next byte.
    Unknown { opcode: u8 },
}

impl Request {
    pub fn opcode(&self) -> u8 {
        match self {
            Request::Shutdown => opcode::SHUTDOWN,
            Request::Pause => opcode::PAUSE,
            Request::Resume => opcode::RESUME,
            Request::Snapshot { .. } => opcode::SNAPSHOT,
            Request::ClearSnapshot => opcode::CLEAR_SNAPSHOT,
            Request::QueryMemory { .. } => opcode::QUERY_MEMORY,
            Request::DumpMemory { .. } => opcode::DUMP_MEMORY,
            Request::ReleaseQuery => opcode::RELEASE_QUERY,
            Request::Silence { .. } => opcode::SILENCE,
            Request::Unsilence { .. } => opcode::UNSILENCE,
            Request::Poke { .. } => opcode::POKE,
            Request::Drill { .. } => opcode::DRILL,
            Request::StartAudioRecording { .. } => opcode::START_AUDIO_RECORDING,
            Request::StopAudioRecording => opcode::STOP_AUDIO_RECORDING,
            Request::SaveState { .. } => opcode::SAVE_STATE,
            Request::LoadState { .. } => opcode::LOAD_STATE,
            Request::SetSpeed { .. } => opcode::SET_SPEED,
            Request::Ping => opcode::PING,
            Request::Unknown { opcode } => *opcode,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The channel closed after the opcode byte but before the payload was complete.
    #[error("channel closed in the middle of opcode {opcode}")]
    Truncated { opcode: u8 },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("path is {len} bytes, the wire format allows at most {MAX_PATH_LEN}")]
    PathTooLong { len: usize },

    #[error("opcode {0} is owned by a typed request")]
    ReservedOpcode(u8),
}

/// Pulls [`Request`]s off a blocking byte stream, one opcode at a time.
///
/// Reads block without a timeout: a peer that stops mid-frame stalls the reader until it closes
/// the stream, at which point [`DecodeError::Truncated`] is returned.
#[derive(Debug)]
pub struct RequestReader<R> {
    inner: R,
}

impl<R: Read> RequestReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Returns `Ok(None)` when the stream ends cleanly at an opcode boundary.
    pub fn next_request(&mut self) -> Result<Option<Request>, DecodeError> {
        let mut op = [0u8; 1];
        loop {
            match self.inner.read(&mut op) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(DecodeError::Io(err)),
            }
        }
        let op = op[0];
        let mut payload = Payload {
            inner: &mut self.inner,
            opcode: op,
        };

        let req = match op {
            opcode::SHUTDOWN => Request::Shutdown,
            opcode::PAUSE => Request::Pause,
            opcode::RESUME => Request::Resume,
            opcode::SNAPSHOT => Request::Snapshot {
                id: payload.read_u8()?,
            },
            opcode::CLEAR_SNAPSHOT => Request::ClearSnapshot,
            opcode::QUERY_MEMORY => Request::QueryMemory {
                start: payload.read_u32()?,
                len: payload.read_u32()?,
                key: payload.read_u8()?,
            },
            opcode::DUMP_MEMORY => Request::DumpMemory {
                start: payload.read_u32()?,
                len: payload.read_u32()?,
                path: payload.read_path()?,
            },
            opcode::RELEASE_QUERY => Request::ReleaseQuery,
            opcode::SILENCE => Request::Silence {
                key: payload.read_u8()?,
            },
            opcode::UNSILENCE => Request::Unsilence {
                key: payload.read_u8()?,
            },
            opcode::POKE => Request::Poke {
                addr: payload.read_u32()?,
                value: payload.read_u8()?,
            },
            opcode::DRILL => Request::Drill {
                addr: payload.read_u32()?,
                value: payload.read_u8()?,
                count: payload.read_u8()?,
            },
            opcode::START_AUDIO_RECORDING => Request::StartAudioRecording {
                path: payload.read_path()?,
            },
            opcode::STOP_AUDIO_RECORDING => Request::StopAudioRecording,
            opcode::SAVE_STATE => Request::SaveState {
                path: payload.read_path()?,
            },
            opcode::LOAD_STATE => Request::LoadState {
                path: payload.read_path()?,
            },
            opcode::SET_SPEED => Request::SetSpeed {
                percent: payload.read_u32()?,
            },
            opcode::PING => Request::Ping,
            other => Request::Unknown { opcode: other },
        };
        Ok(Some(req))
    }
}

struct Payload<'a, R> {
    inner: &'a mut R,
    opcode: u8,
}

impl<R: Read> Payload<'_, R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        self.inner.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                DecodeError::Truncated {
                    opcode: self.opcode,
                }
            } else {
                DecodeError::Io(err)
            }
        })
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn read_path(&mut self) -> Result<WirePath, DecodeError> {
        let len = usize::from(self.read_u8()?);
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        Ok(WirePath(bytes))
    }
}

/// Encodes a request as the controller would send it. On error `out` is left as it was.
pub fn encode_request(req: &Request, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let mark = out.len();
    let res = encode_body(req, out);
    if res.is_err() {
        out.truncate(mark);
    }
    res
}

fn encode_body(req: &Request, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    out.push(req.opcode());
    match req {
        Request::Shutdown
        | Request::Pause
        | Request::Resume
        | Request::ClearSnapshot
        | Request::ReleaseQuery
        | Request::StopAudioRecording
        | Request::Ping => {}
        Request::Snapshot { id } => out.push(*id),
        Request::QueryMemory { start, len, key } => {
            out.extend_from_slice(&start.to_be_bytes());
            out.extend_from_slice(&len.to_be_bytes());
            out.push(*key);
        }
        Request::DumpMemory { start, len, path } => {
            out.extend_from_slice(&start.to_be_bytes());
            out.extend_from_slice(&len.to_be_bytes());
            push_path(out, path)?;
        }
        Request::Silence { key } | Request::Unsilence { key } => out.push(*key),
        Request::Poke { addr, value } => {
            out.extend_from_slice(&addr.to_be_bytes());
            out.push(*value);
        }
        Request::Drill { addr, value, count } => {
            out.extend_from_slice(&addr.to_be_bytes());
            out.push(*value);
            out.push(*count);
        }
        Request::StartAudioRecording { path }
        | Request::SaveState { path }
        | Request::LoadState { path } => push_path(out, path)?,
        Request::SetSpeed { percent } => out.extend_from_slice(&percent.to_be_bytes()),
        Request::Unknown { opcode } => {
            if is_typed_opcode(*opcode) {
                return Err(EncodeError::ReservedOpcode(*opcode));
            }
        }
    }
    Ok(())
}

fn push_path(out: &mut Vec<u8>, path: &WirePath) -> Result<(), EncodeError> {
    let len = u8::try_from(path.0.len()).map_err(|_| EncodeError::PathTooLong {
        len: path.0.len(),
    })?;
    out.push(len);
    out.extend_from_slice(&path.0);
    Ok(())
}

fn is_typed_opcode(op: u8) -> bool {
    matches!(
        op,
        opcode::SHUTDOWN
            | opcode::PAUSE
            | opcode::RESUME
            | opcode::SNAPSHOT
            | opcode::CLEAR_SNAPSHOT
            | opcode::QUERY_MEMORY
            | opcode::DUMP_MEMORY
            | opcode::RELEASE_QUERY
            | opcode::SILENCE
            | opcode::UNSILENCE
            | opcode::POKE
            | opcode::DRILL
            | opcode::START_AUDIO_RECORDING
            | opcode::STOP_AUDIO_RECORDING
            | opcode::SAVE_STATE
            | opcode::LOAD_STATE
            | opcode::SET_SPEED
            | opcode::PING
    )
}
