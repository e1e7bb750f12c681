use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use psx_mem::{AddressSpace, CodeCacheObserver, HardwareRegisters, MemoryHandle, PhysicalMemory};
use psx_watch::{FlushScheduler, HookSpec, Notifier, WatchEngine, WatchRegistry, DEFAULT_FLUSH_INTERVAL};

use crate::error::{ControlError, Result};
use crate::exec::{Cpu, ExecutionContext, ExecutionSummary};
use crate::frontend::Frontend;
use crate::run_control::RunControl;
use crate::segment::SegmentProvider;
use crate::server::{ProtocolServer, ServerExit, DRILL_INTERVAL};
use crate::slot::DeferredRequestSlot;
use crate::state::StateStore;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub flush_interval: Duration,
    pub drill_interval: Duration,
    /// Stop execution after this many slices.
    pub max_ticks: Option<u64>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            drill_interval: DRILL_INTERVAL,
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerReport {
    /// `None` when no control channel was served.
    pub exit: Option<ServerExit>,
    pub execution: ExecutionSummary,
}

/// Owns the bus and every piece of shared control-plane state.
///
/// Built once at startup; [`Controller::run`] moves the bus to the execution thread, starts the
/// flush thread and serves the control channel on the calling thread.
pub struct Controller {
    bus: AddressSpace,
    engine: Arc<WatchEngine>,
    run: Arc<RunControl>,
    slot: Arc<DeferredRequestSlot>,
    options: ControllerOptions,
}

impl Controller {
    pub fn new(
        mem: Arc<PhysicalMemory>,
        hooks: &[HookSpec],
        notify: impl Write + Send + 'static,
        options: ControllerOptions,
    ) -> Result<Self> {
        let registry = WatchRegistry::new(hooks)?;
        Ok(Self::assemble(mem, registry, Notifier::new(notify), options))
    }

    /// No hooks and no notification channel.
    pub fn headless(mem: Arc<PhysicalMemory>, options: ControllerOptions) -> Self {
        Self::assemble(mem, WatchRegistry::empty(), Notifier::disabled(), options)
    }

    fn assemble(
        mem: Arc<PhysicalMemory>,
        registry: WatchRegistry,
        notifier: Notifier,
        options: ControllerOptions,
    ) -> Self {
        let notifier = Arc::new(notifier);
        let engine = Arc::new(WatchEngine::new(registry, notifier.clone()));
        let bus = AddressSpace::new(mem).with_write_observer(engine.clone());
        tracing::info!("{} memory hooks registered", engine.registry().len());
        Self {
            bus,
            engine,
            run: Arc::new(RunControl::new(notifier)),
            slot: Arc::new(DeferredRequestSlot::new()),
            options,
        }
    }

    pub fn with_code_cache(mut self, cache: Box<dyn CodeCacheObserver>) -> Self {
        self.bus = self.bus.with_code_cache(cache);
        self
    }

    pub fn with_hardware(mut self, hardware: Box<dyn HardwareRegisters>) -> Self {
        self.bus = self.bus.with_hardware(hardware);
        self
    }

    pub fn bus_mut(&mut self) -> &mut AddressSpace {
        &mut self.bus
    }

    pub fn handle(&self) -> MemoryHandle {
        self.bus.handle()
    }

    pub fn engine(&self) -> &Arc<WatchEngine> {
        &self.engine
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        self.engine.notifier()
    }

    pub fn run_control(&self) -> &Arc<RunControl> {
        &self.run
    }

    pub fn slot(&self) -> &Arc<DeferredRequestSlot> {
        &self.slot
    }

    /// Queues a load to run before the first instruction slice.
    pub fn queue_load(&self, path: impl Into<PathBuf>) -> Result<()> {
        Ok(self.slot.request_load(path)?)
    }

    /// Runs execution and the flush thread, and serves `input` until shutdown or EOF.
    pub fn run<R: Read>(
        self,
        input: R,
        cpu: Box<dyn Cpu>,
        store: Box<dyn StateStore>,
        frontend: Box<dyn Frontend>,
        segments: Box<dyn SegmentProvider>,
    ) -> Result<ControllerReport> {
        let handle = self.handle();
        let server = ProtocolServer::new(
            input,
            handle,
            self.engine.clone(),
            self.run.clone(),
            self.slot.clone(),
            frontend,
            segments,
        )
        .with_drill_interval(self.options.drill_interval);
        self.drive(cpu, store, move || Some(server.serve()))
    }

    /// Runs execution and the flush thread without a control channel.
    pub fn run_headless(
        self,
        cpu: Box<dyn Cpu>,
        store: Box<dyn StateStore>,
    ) -> Result<ControllerReport> {
        self.drive(cpu, store, || None)
    }

    fn drive(
        self,
        cpu: Box<dyn Cpu>,
        store: Box<dyn StateStore>,
        serve: impl FnOnce() -> Option<ServerExit>,
    ) -> Result<ControllerReport> {
        let Self {
            bus,
            engine,
            run,
            slot,
            options,
        } = self;

        let flush = FlushScheduler::spawn(engine.clone(), bus.handle(), options.flush_interval)
            .map_err(|err| ControlError::io("spawn flush thread", err))?;
        let exec = ExecutionContext::new(bus, cpu, store, run.clone(), slot)
            .with_max_ticks(options.max_ticks)
            .spawn()
            .map_err(|err| ControlError::io("spawn execution thread", err))?;

        let exit = serve();

        let joined = exec.join();
        if joined.is_err() {
            run.request_shutdown();
        }
        flush.stop();
        let (execution, _bus) = joined.map_err(|_| ControlError::ExecutionPanicked)?;
        if let Err(err) = engine.notifier().flush() {
            tracing::warn!("failed to flush notification channel: {err}");
        }
        Ok(ControllerReport { exit, execution })
    }
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("bus", &self.bus)
            .field("hooks", &self.engine.registry().len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
