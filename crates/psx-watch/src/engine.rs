use std::sync::Arc;

use psx_control_protocol::Notification;
use psx_mem::{canonical_watch_address, MemoryView, WriteObserver};

use crate::hook::{HookState, WatchHook};
use crate::notifier::Notifier;
use crate::registry::WatchRegistry;

/// Evaluates stores against the registry and emits hook notifications.
///
/// Lock order is hook lock, then the notifier's channel lock.
#[derive(Debug)]
pub struct WatchEngine {
    registry: WatchRegistry,
    notifier: Arc<Notifier>,
}

impl WatchEngine {
    pub fn new(registry: WatchRegistry, notifier: Arc<Notifier>) -> Self {
        Self { registry, notifier }
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Runs the watch state machine for a `width`-byte store at `addr`.
    pub fn evaluate(&self, addr: u32, width: u32, view: &MemoryView<'_>) {
        let addr = canonical_watch_address(addr);
        if !self.registry.may_overlap(addr, width) {
            return;
        }
        for hook in self.registry.iter().filter(|h| h.overlaps(addr, width)) {
            self.evaluate_hook(hook, view);
        }
    }

    fn evaluate_hook(&self, hook: &WatchHook, view: &MemoryView<'_>) {
        let mut inner = hook.lock();
        if matches!(
            inner.state,
            HookState::Silenced | HookState::UnpushedChanges
        ) {
            return;
        }

        let current = match view.read_vec(hook.start(), hook.length() as usize) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::trace!("hook {} unreadable: {err}", hook.key());
                return;
            }
        };

        if hook.dedupe() && inner.last.as_deref() == Some(current.as_slice()) {
            return;
        }

        match inner.state {
            HookState::NoChanges if hook.coalesce() => inner.state = HookState::PushedChanges,
            HookState::NoChanges => self.emit(hook, current.clone()),
            HookState::PushedChanges => inner.state = HookState::UnpushedChanges,
            HookState::UnpushedChanges | HookState::Silenced => {}
        }

        if hook.dedupe() {
            inner.last = Some(current);
        }
    }

    /// Emits every hook with a coalesced change pending ([`HookState::PushedChanges`] or
    /// [`HookState::UnpushedChanges`]) with its current value and resets it to
    /// [`HookState::NoChanges`]. Returns the number of notifications sent.
    pub fn flush_pending(&self, view: &MemoryView<'_>) -> usize {
        let mut flushed = 0;
        for hook in self.registry.iter() {
            let mut inner = hook.lock();
            if !matches!(
                inner.state,
                HookState::PushedChanges | HookState::UnpushedChanges
            ) {
                continue;
            }
            match view.read_vec(hook.start(), hook.length() as usize) {
                Ok(value) => {
                    if hook.dedupe() {
                        inner.last = Some(value.clone());
                    }
                    self.emit(hook, value);
                    flushed += 1;
                }
                Err(err) => tracing::trace!("hook {} unreadable at flush: {err}", hook.key()),
            }
            inner.state = HookState::NoChanges;
        }
        if flushed > 0 {
            tracing::trace!("flushed {flushed} coalesced hooks");
        }
        flushed
    }

    /// Returns `false` when no hook has `key`.
    pub fn silence(&self, key: u8) -> bool {
        match self.registry.get(key) {
            Some(hook) => {
                hook.lock().state = HookState::Silenced;
                tracing::debug!("hook {key} silenced");
                true
            }
            None => {
                tracing::debug!("silence: no hook with key {key}");
                false
            }
        }
    }

    /// Resets the hook to [`HookState::NoChanges`], discarding any pending coalesced change.
    pub fn unsilence(&self, key: u8) -> bool {
        match self.registry.get(key) {
            Some(hook) => {
                hook.lock().state = HookState::NoChanges;
                tracing::debug!("hook {key} unsilenced");
                true
            }
            None => {
                tracing::debug!("unsilence: no hook with key {key}");
                false
            }
        }
    }

    fn emit(&self, hook: &WatchHook, value: Vec<u8>) {
        let _ = self.notifier.send(&Notification::HookFired {
            key: hook.key(),
            value,
        });
    }
}

impl WriteObserver for WatchEngine {
    fn on_write(&self, addr: u32, width: u32, view: &MemoryView<'_>) {
        self.evaluate(addr, width, view);
    }
}

#[cfg(test)]
mod tests {
    use psx_mem::{MemoryMap, PhysicalMemory};

    use super::*;
    use crate::hook::HookSpec;
    use crate::notifier::MemorySink;

    fn engine(specs: &[HookSpec]) -> (WatchEngine, MemorySink) {
        let sink = MemorySink::new();
        let engine = WatchEngine::new(
            WatchRegistry::new(specs).unwrap(),
            Arc::new(Notifier::new(sink.clone())),
        );
        (engine, sink)
    }

    #[test]
    fn plain_hook_reports_every_store() {
        let mem = PhysicalMemory::new();
        let map = MemoryMap::standard();
        let view = MemoryView::new(&mem, map.read_table());
        let (engine, sink) = engine(&[HookSpec::new(5, 0x8000_0010, 2)]);

        engine.evaluate(0xa000_0011, 1, &view);
        engine.evaluate(0x0000_0010, 4, &view);
        engine.evaluate(0x0000_0012, 1, &view);
        assert_eq!(sink.take(), vec![0, 5, 0, 0, 0, 5, 0, 0]);
        assert_eq!(engine.registry().get(5).unwrap().state(), HookState::NoChanges);
    }

    #[test]
    fn unknown_keys_are_reported() {
        let (engine, _) = engine(&[HookSpec::new(5, 0, 2)]);
        assert!(engine.silence(5));
        assert!(!engine.silence(6));
        assert!(!engine.unsilence(6));
    }

    #[test]
    fn coalescing_walks_the_state_machine() {
        let mem = PhysicalMemory::new();
        let map = MemoryMap::standard();
        let view = MemoryView::new(&mem, map.read_table());
        let (engine, sink) = engine(&[HookSpec::new(1, 0x100, 1).coalesce(true)]);
        let hook = engine.registry().get(1).unwrap();

        engine.evaluate(0x100, 1, &view);
        assert_eq!(hook.state(), HookState::PushedChanges);
        engine.evaluate(0x100, 1, &view);
        assert_eq!(hook.state(), HookState::UnpushedChanges);
        engine.evaluate(0x100, 1, &view);
        assert_eq!(hook.state(), HookState::UnpushedChanges);
        assert!(sink.contents().is_empty());

        assert_eq!(engine.flush_pending(&view), 1);
        assert_eq!(hook.state(), HookState::NoChanges);
        assert_eq!(sink.take(), vec![0, 1, 0]);
        assert_eq!(engine.flush_pending(&view), 0);
    }

    #[test]
    fn single_coalesced_change_is_delivered_by_the_next_flush() {
        let mem = PhysicalMemory::new();
        let map = MemoryMap::standard();
        let view = MemoryView::new(&mem, map.read_table());
        let (engine, sink) = engine(&[HookSpec::new(1, 0x400, 1).coalesce(true)]);
        let hook = engine.registry().get(1).unwrap();

        mem.region(psx_mem::Region::Ram).write_from(0x400, &[42]);
        engine.evaluate(0x8000_0400, 1, &view);
        assert_eq!(hook.state(), HookState::PushedChanges);
        assert!(sink.contents().is_empty());

        assert_eq!(engine.flush_pending(&view), 1);
        assert_eq!(sink.take(), vec![0, 1, 42]);
        assert_eq!(hook.state(), HookState::NoChanges);
        for _ in 0..10 {
            assert_eq!(engine.flush_pending(&view), 0);
        }
        assert!(sink.contents().is_empty());
    }
}
