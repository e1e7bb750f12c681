use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::sync::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredKind {
    Save,
    Load,
}

impl DeferredKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeferredKind::Save => "save",
            DeferredKind::Load => "load",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRequest {
    pub kind: DeferredKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("a deferred {} of {} is already pending", .pending.kind.as_str(), .pending.path.display())]
    Conflict { pending: DeferredRequest },
}

/// Single-entry handoff of save/load requests from the protocol thread to the execution thread.
///
/// The entry stays in place while the execution thread runs it, so requests arriving mid-operation
/// are rejected rather than queued.
#[derive(Debug, Default)]
pub struct DeferredRequestSlot {
    inner: Mutex<Option<DeferredRequest>>,
}

impl DeferredRequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_save(&self, path: impl Into<PathBuf>) -> Result<(), SlotError> {
        self.request(DeferredKind::Save, path.into())
    }

    pub fn request_load(&self, path: impl Into<PathBuf>) -> Result<(), SlotError> {
        self.request(DeferredKind::Load, path.into())
    }

    fn request(&self, kind: DeferredKind, path: PathBuf) -> Result<(), SlotError> {
        let mut slot = lock(&self.inner);
        if let Some(pending) = slot.as_ref() {
            return Err(SlotError::Conflict {
                pending: pending.clone(),
            });
        }
        tracing::debug!("deferred {} of {} queued", kind.as_str(), path.display());
        *slot = Some(DeferredRequest { kind, path });
        Ok(())
    }

    pub fn pending(&self) -> Option<DeferredRequest> {
        lock(&self.inner).clone()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner).is_some()
    }

    /// Runs `f` on the pending request, if any, then clears the slot.
    ///
    /// The lock is not held while `f` runs.
    pub fn consume_if_pending<R>(&self, f: impl FnOnce(DeferredKind, &Path) -> R) -> Option<R> {
        let request = lock(&self.inner).clone()?;
        let out = f(request.kind, &request.path);
        *lock(&self.inner) = None;
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_request_conflicts_until_consumed() {
        let slot = DeferredRequestSlot::new();
        slot.request_save("a.sav").unwrap();

        let err = slot.request_load("b.sav").unwrap_err();
        assert_eq!(
            err,
            SlotError::Conflict {
                pending: DeferredRequest {
                    kind: DeferredKind::Save,
                    path: "a.sav".into()
                }
            }
        );
        assert_eq!(slot.pending().unwrap().path, PathBuf::from("a.sav"));

        let seen = slot.consume_if_pending(|kind, path| (kind, path.to_path_buf()));
        assert_eq!(seen, Some((DeferredKind::Save, PathBuf::from("a.sav"))));
        assert!(!slot.is_pending());
        slot.request_load("b.sav").unwrap();
    }

    #[test]
    fn slot_stays_occupied_while_running() {
        let slot = DeferredRequestSlot::new();
        slot.request_load("x").unwrap();
        slot.consume_if_pending(|_, _| {
            assert!(slot.request_save("y").is_err());
        });
        assert!(slot.consume_if_pending(|_, _| ()).is_none());
    }
}
