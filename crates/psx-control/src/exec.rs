use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use psx_mem::AddressSpace;

use crate::run_control::{Gate, RunControl};
use crate::slot::{DeferredKind, DeferredRequestSlot};
use crate::state::StateStore;

/// NTSC field rate.
pub const FRAME_INTERVAL: Duration = Duration::from_nanos(16_683_350);

/// The instruction core. Executes a bounded slice of instructions against the bus.
pub trait Cpu: Send {
    fn run_slice(&mut self, bus: &mut AddressSpace);
}

/// A core that executes nothing, pacing slices at the frame rate.
#[derive(Debug, Clone)]
pub struct IdleCpu {
    interval: Duration,
}

impl IdleCpu {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for IdleCpu {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

impl Cpu for IdleCpu {
    fn run_slice(&mut self, _bus: &mut AddressSpace) {
        thread::sleep(self.interval);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub ticks: u64,
    pub saves: u64,
    pub loads: u64,
    pub failed_requests: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Shutdown,
}

/// Drives the execution thread: pause gate, deferred save/load, then one CPU slice.
pub struct ExecutionContext {
    bus: AddressSpace,
    cpu: Box<dyn Cpu>,
    store: Box<dyn StateStore>,
    run: Arc<RunControl>,
    slot: Arc<DeferredRequestSlot>,
    max_ticks: Option<u64>,
    summary: ExecutionSummary,
}

impl ExecutionContext {
    pub fn new(
        bus: AddressSpace,
        cpu: Box<dyn Cpu>,
        store: Box<dyn StateStore>,
        run: Arc<RunControl>,
        slot: Arc<DeferredRequestSlot>,
    ) -> Self {
        Self {
            bus,
            cpu,
            store,
            run,
            slot,
            max_ticks: None,
            summary: ExecutionSummary::default(),
        }
    }

    /// Stop on its own after `ticks` slices.
    pub fn with_max_ticks(mut self, ticks: Option<u64>) -> Self {
        self.max_ticks = ticks;
        self
    }

    pub fn bus(&self) -> &AddressSpace {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut AddressSpace {
        &mut self.bus
    }

    pub fn summary(&self) -> ExecutionSummary {
        self.summary
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.max_ticks.is_some_and(|max| self.summary.ticks >= max) {
            return TickOutcome::Shutdown;
        }
        if self.run.gate() == Gate::Shutdown {
            return TickOutcome::Shutdown;
        }
        self.consume_deferred();
        self.cpu.run_slice(&mut self.bus);
        self.summary.ticks += 1;
        TickOutcome::Continue
    }

    fn consume_deferred(&mut self) {
        let Self {
            bus, store, slot, ..
        } = self;
        let outcome = slot.consume_if_pending(|kind, path| {
            let res = match kind {
                DeferredKind::Save => store.save(path, bus),
                DeferredKind::Load => store
                    .load(path, bus)
                    .map(|()| bus.invalidate_code_cache()),
            };
            if let Err(err) = &res {
                tracing::warn!("deferred {} of {} failed: {err}", kind.as_str(), path.display());
            }
            (kind, res.is_ok())
        });
        match outcome {
            Some((DeferredKind::Save, true)) => self.summary.saves += 1,
            Some((DeferredKind::Load, true)) => self.summary.loads += 1,
            Some((_, false)) => self.summary.failed_requests += 1,
            None => {}
        }
    }

    /// Ticks until shutdown.
    pub fn run(mut self) -> (ExecutionSummary, AddressSpace) {
        tracing::info!("execution started");
        while self.tick() == TickOutcome::Continue {}
        tracing::info!("execution stopped after {} ticks", self.summary.ticks);
        (self.summary, self.bus)
    }

    pub fn spawn(self) -> io::Result<JoinHandle<(ExecutionSummary, AddressSpace)>> {
        thread::Builder::new()
            .name("psx-exec".into())
            .spawn(move || self.run())
    }
}

impl core::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("bus", &self.bus)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use psx_mem::{CodeCacheObserver, PhysicalMemory};
    use psx_watch::Notifier;

    use super::*;
    use crate::state::RamImageStore;

    #[derive(Default)]
    struct CountingCpu;

    impl Cpu for CountingCpu {
        fn run_slice(&mut self, bus: &mut AddressSpace) {
            let n = bus.read_u32(0);
            bus.write_u32(0, n + 1);
        }
    }

    #[derive(Default, Clone)]
    struct RecordingStore {
        calls: Arc<Mutex<Vec<(DeferredKind, u32)>>>,
    }

    impl StateStore for RecordingStore {
        fn save(&mut self, _: &Path, bus: &mut AddressSpace) -> io::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((DeferredKind::Save, bus.read_u32(0)));
            Ok(())
        }

        fn load(&mut self, _: &Path, _: &mut AddressSpace) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "missing"))
        }
    }

    fn context(store: RecordingStore) -> (ExecutionContext, Arc<DeferredRequestSlot>) {
        let slot = Arc::new(DeferredRequestSlot::new());
        let ctx = ExecutionContext::new(
            AddressSpace::new(Arc::new(PhysicalMemory::new())),
            Box::new(CountingCpu),
            Box::new(store),
            Arc::new(RunControl::new(Arc::new(Notifier::disabled()))),
            slot.clone(),
        );
        (ctx, slot)
    }

    #[test]
    fn deferred_requests_run_between_slices() {
        let store = RecordingStore::default();
        let (mut ctx, slot) = context(store.clone());

        ctx.tick();
        ctx.tick();
        slot.request_save("s").unwrap();
        ctx.tick();
        assert_eq!(*store.calls.lock().unwrap(), vec![(DeferredKind::Save, 2)]);
        assert!(!slot.is_pending());

        slot.request_load("l").unwrap();
        ctx.tick();
        assert!(!slot.is_pending(), "failed requests still clear the slot");
        assert_eq!(
            ctx.summary(),
            ExecutionSummary {
                ticks: 4,
                saves: 1,
                loads: 0,
                failed_requests: 1
            }
        );
    }

    #[derive(Clone, Default)]
    struct FlushLog(Arc<Mutex<u32>>);

    impl CodeCacheObserver for FlushLog {
        fn invalidate(&mut self, _: u32, _: u32) {}

        fn invalidate_all(&mut self) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn loaded_state_invalidates_translated_code() {
        let dir = tempfile::tempdir().unwrap();
        let flushes = FlushLog::default();
        let slot = Arc::new(DeferredRequestSlot::new());

        let mut source = AddressSpace::new(Arc::new(PhysicalMemory::new()));
        source.write_u32(0x8000_0080, 0x2408_0001);
        let mut images = RamImageStore::new(Some(dir.path().to_path_buf()));
        images.save(Path::new("code.img"), &mut source).unwrap();

        let mut ctx = ExecutionContext::new(
            AddressSpace::new(Arc::new(PhysicalMemory::new()))
                .with_code_cache(Box::new(flushes.clone())),
            Box::new(IdleCpu::new(Duration::ZERO)),
            Box::new(images),
            Arc::new(RunControl::new(Arc::new(Notifier::disabled()))),
            slot.clone(),
        );

        slot.request_save("unchanged.img").unwrap();
        ctx.tick();
        assert_eq!(*flushes.0.lock().unwrap(), 0, "saves leave the cache alone");

        slot.request_load("missing.img").unwrap();
        ctx.tick();
        assert_eq!(*flushes.0.lock().unwrap(), 0, "failed loads leave memory untouched");

        slot.request_load("code.img").unwrap();
        ctx.tick();
        assert_eq!(*flushes.0.lock().unwrap(), 1);
        assert_eq!(ctx.summary().loads, 1);
    }

    #[test]
    fn max_ticks_stops_the_loop() {
        let (ctx, _) = context(RecordingStore::default());
        let (summary, mut bus) = ctx.with_max_ticks(Some(3)).run();
        assert_eq!(summary.ticks, 3);
        assert_eq!(bus.read_u32(0), 3);
    }
}
