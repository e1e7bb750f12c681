use thiserror::Error;

/// First byte of a hook-fired event.
pub const HOOK_FIRED_TAG: u8 = 0x00;

/// Single-byte acknowledgements written to the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    DumpWritten = 4,
    ByteWritten = 5,
    DrillFinished = 6,
    Paused = 7,
    Resumed = 8,
    /// Sent by the audio frontend when a recording ends on its own.
    AudioRecordingFinished = 9,
    SpeedSet = 10,
    QueryCopied = 11,
    Alive = 12,
    AlreadyPaused = 13,
    AlreadyRunning = 14,
    DeferredRejected = 15,
    Failed = 16,
    DeferredAccepted = 17,
}

impl Status {
    pub const ALL: [Status; 14] = [
        Status::DumpWritten,
        Status::ByteWritten,
        Status::DrillFinished,
        Status::Paused,
        Status::Resumed,
        Status::AudioRecordingFinished,
        Status::SpeedSet,
        Status::QueryCopied,
        Status::Alive,
        Status::AlreadyPaused,
        Status::AlreadyRunning,
        Status::DeferredRejected,
        Status::Failed,
        Status::DeferredAccepted,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    HookFired { key: u8, value: Vec<u8> },
    Status(Status),
}

impl Notification {
    pub fn encoded_len(&self) -> usize {
        match self {
            Notification::HookFired { value, .. } => 2 + value.len(),
            Notification::Status(_) => 1,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Notification::HookFired { key, value } => {
                out.push(HOOK_FIRED_TAG);
                out.push(*key);
                out.extend_from_slice(value);
            }
            Notification::Status(status) => out.push(status.code()),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }
}

impl From<Status> for Notification {
    fn from(value: Status) -> Self {
        Notification::Status(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationDecodeError {
    #[error("unknown status byte {0}")]
    UnknownStatus(u8),

    #[error("hook key {0} is not configured")]
    UnknownKey(u8),

    #[error("stream ends inside a hook event at offset {offset}")]
    Truncated { offset: usize },
}

/// Splits a captured notification stream back into messages.
///
/// Hook events carry no length on the wire, so the caller supplies the configured value length for
/// each key.
pub fn decode_notifications(
    mut bytes: &[u8],
    hook_len: impl Fn(u8) -> Option<usize>,
) -> Result<Vec<Notification>, NotificationDecodeError> {
    let total = bytes.len();
    let mut out = Vec::new();
    while let Some((&tag, rest)) = bytes.split_first() {
        let offset = total - bytes.len();
        if tag != HOOK_FIRED_TAG {
            let status = Status::from_code(tag).ok_or(NotificationDecodeError::UnknownStatus(tag))?;
            out.push(Notification::Status(status));
            bytes = rest;
            continue;
        }
        let (&key, rest) = rest
            .split_first()
            .ok_or(NotificationDecodeError::Truncated { offset })?;
        let len = hook_len(key).ok_or(NotificationDecodeError::UnknownKey(key))?;
        if rest.len() < len {
            return Err(NotificationDecodeError::Truncated { offset });
        }
        let (value, rest) = rest.split_at(len);
        out.push(Notification::HookFired {
            key,
            value: value.to_vec(),
        });
        bytes = rest;
    }
    Ok(out)
}
