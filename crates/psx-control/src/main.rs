#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use psx_control::config::{Config, ControlChannels, HookSource};
use psx_control::{
    ensure_fifo, Controller, ControllerOptions, FileSegmentProvider, HeadlessFrontend, IdleCpu,
    RamImageStore,
};
use psx_mem::PhysicalMemory;
use psx_watch::{load_json_hooks, read_hook_records, HookSpec};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(config) {
        tracing::error!("fatal: {err:#}");
        return Err(err);
    }
    Ok(())
}

fn run(config: Config) -> Result<()> {
    let mem = Arc::new(PhysicalMemory::new());
    if let Some(path) = &config.bios {
        let image = fs::read(path).with_context(|| format!("read BIOS {}", path.display()))?;
        mem.load_bios(&image).context("load BIOS")?;
        tracing::info!("BIOS loaded from {}", path.display());
    }

    let hooks = load_hooks(&config.hooks)?;
    let options = ControllerOptions {
        flush_interval: config.flush_interval,
        max_ticks: config.max_ticks,
        ..ControllerOptions::default()
    };
    let store = Box::new(RamImageStore::new(config.state_dir.clone()));
    let cpu = Box::new(IdleCpu::default());

    let report = match &config.channels {
        ControlChannels::Disabled => {
            if !hooks.is_empty() {
                tracing::warn!("control plane disabled; ignoring {} hooks", hooks.len());
            }
            let controller = Controller::headless(mem, options);
            if let Some(path) = &config.load_state {
                controller.queue_load(path)?;
            }
            controller.run_headless(cpu, store)?
        }
        ControlChannels::Enabled {
            input,
            output,
            output_fifo,
        } => {
            // Notifications first: the controller opens its read end before writing requests.
            let mut open = OpenOptions::new();
            open.write(true);
            if *output_fifo {
                ensure_fifo(output)
                    .with_context(|| format!("create notification fifo {}", output.display()))?;
            } else {
                open.create(true).truncate(true);
            }
            let notify = open
                .open(output)
                .with_context(|| format!("open notification channel {}", output.display()))?;
            let controller = Controller::new(mem, &hooks, notify, options)?;
            if let Some(path) = &config.load_state {
                controller.queue_load(path)?;
            }
            let input_path = input;
            let input = File::open(input_path)
                .with_context(|| format!("open control channel {}", input_path.display()))?;
            tracing::info!(
                "control plane: requests from {}, notifications to {}",
                input_path.display(),
                output.display()
            );
            controller.run(
                input,
                cpu,
                store,
                Box::new(HeadlessFrontend::new()),
                Box::new(FileSegmentProvider::new(config.segment_dir.clone())),
            )?
        }
    };

    tracing::info!(
        "exit {:?} after {} ticks",
        report.exit,
        report.execution.ticks
    );
    Ok(())
}

fn load_hooks(source: &HookSource) -> Result<Vec<HookSpec>> {
    let hooks = match source {
        HookSource::None => Vec::new(),
        HookSource::Stdin { count } => read_hook_records(io::stdin().lock(), *count)
            .with_context(|| format!("read {count} hook records from stdin"))?,
        HookSource::Json(path) => load_json_hooks(path)
            .with_context(|| format!("load hooks from {}", path.display()))?,
    };
    Ok(hooks)
}
