use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

/// Value of `--control-pipe` that runs without a control plane.
pub const CONTROL_PIPE_DISABLED: &str = "none";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "psx-control",
    version,
    about = "Console memory bus with a live watch/control plane"
)]
pub struct Args {
    /// Control pipe base name. Requests are read from `<NAME>-proc` and notifications written to
    /// `<NAME>-mem`; `none` disables the control plane.
    ///
    /// Environment variable: `PSX_CONTROL_PIPE`.
    #[arg(long, env = "PSX_CONTROL_PIPE", default_value = CONTROL_PIPE_DISABLED)]
    pub control_pipe: String,

    /// Read requests from this path instead of `<NAME>-proc`.
    #[arg(long, env = "PSX_CONTROL_INPUT")]
    pub control_input: Option<PathBuf>,

    /// Write notifications to this path instead of `<NAME>-mem`. Opened as a plain file;
    /// `<NAME>-mem` itself is created as a FIFO when missing.
    #[arg(long, env = "PSX_NOTIFY_OUTPUT")]
    pub notify_output: Option<PathBuf>,

    /// Read this many 12-byte hook records from stdin.
    #[arg(long, env = "PSX_MEMORY_LISTENERS", default_value_t = 0, conflicts_with = "hooks")]
    pub memory_listeners: usize,

    /// JSON hook list.
    #[arg(long, env = "PSX_HOOKS")]
    pub hooks: Option<PathBuf>,

    /// Interval between flushes of coalesced hooks.
    #[arg(long, env = "PSX_FLUSH_INTERVAL_MS", default_value_t = 400)]
    pub flush_interval_ms: u64,

    /// Directory holding query segments. Defaults to `/dev/shm`, or the temp dir without it.
    #[arg(long, env = "PSX_SEGMENT_DIR")]
    pub segment_dir: Option<PathBuf>,

    /// Directory that relative save/load paths resolve against.
    #[arg(long, env = "PSX_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Queue a deferred load before the first instruction slice.
    #[arg(long, env = "PSX_LOAD_STATE")]
    pub load_state: Option<PathBuf>,

    /// BIOS ROM image (at most 512 KiB).
    #[arg(long, env = "PSX_BIOS")]
    pub bios: Option<PathBuf>,

    /// Stop execution after N slices.
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Log filter (tracing-subscriber EnvFilter syntax). `RUST_LOG` takes precedence.
    ///
    /// Environment variable: `PSX_LOG_LEVEL`.
    #[arg(long, env = "PSX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlChannels {
    Disabled,
    Enabled {
        input: PathBuf,
        output: PathBuf,
        /// The output was derived from the pipe name and is created as a FIFO when missing.
        output_fifo: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookSource {
    None,
    Stdin { count: usize },
    Json(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("--control-input and --notify-output must be given together when --control-pipe is none")]
    PartialChannels,

    #[error("--flush-interval-ms must be greater than zero")]
    ZeroFlushInterval,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub channels: ControlChannels,
    pub hooks: HookSource,
    pub flush_interval: Duration,
    pub segment_dir: PathBuf,
    pub state_dir: Option<PathBuf>,
    pub load_state: Option<PathBuf>,
    pub bios: Option<PathBuf>,
    pub max_ticks: Option<u64>,
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let channels = resolve_channels(&args.control_pipe, args.control_input, args.notify_output)?;

        if args.flush_interval_ms == 0 {
            return Err(ConfigError::ZeroFlushInterval);
        }

        let hooks = match (args.hooks, args.memory_listeners) {
            (Some(path), _) => HookSource::Json(path),
            (None, 0) => HookSource::None,
            (None, count) => HookSource::Stdin { count },
        };

        Ok(Self {
            channels,
            hooks,
            flush_interval: Duration::from_millis(args.flush_interval_ms),
            segment_dir: args.segment_dir.unwrap_or_else(default_segment_dir),
            state_dir: args.state_dir,
            load_state: args.load_state,
            bios: args.bios,
            max_ticks: args.max_ticks,
            log_level: args.log_level,
        })
    }
}

fn resolve_channels(
    pipe: &str,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<ControlChannels, ConfigError> {
    if pipe == CONTROL_PIPE_DISABLED {
        return match (input, output) {
            (None, None) => Ok(ControlChannels::Disabled),
            (Some(input), Some(output)) => Ok(ControlChannels::Enabled {
                input,
                output,
                output_fifo: false,
            }),
            _ => Err(ConfigError::PartialChannels),
        };
    }
    let output_fifo = output.is_none();
    Ok(ControlChannels::Enabled {
        input: input.unwrap_or_else(|| PathBuf::from(format!("{pipe}-proc"))),
        output: output.unwrap_or_else(|| PathBuf::from(format!("{pipe}-mem"))),
        output_fifo,
    })
}

fn default_segment_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        env::temp_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["psx-control"];
        argv.extend_from_slice(args);
        Config::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn pipe_name_derives_both_channels() {
        let config = parse(&["--control-pipe", "/tmp/emu1"]).unwrap();
        assert_eq!(
            config.channels,
            ControlChannels::Enabled {
                input: "/tmp/emu1-proc".into(),
                output: "/tmp/emu1-mem".into(),
                output_fifo: true,
            }
        );
        assert_eq!(config.flush_interval, Duration::from_millis(400));
        assert_eq!(config.hooks, HookSource::None);
    }

    #[test]
    fn overrides_replace_one_channel() {
        let config = parse(&["--control-pipe", "p", "--notify-output", "/tmp/out"]).unwrap();
        assert_eq!(
            config.channels,
            ControlChannels::Enabled {
                input: "p-proc".into(),
                output: "/tmp/out".into(),
                output_fifo: false,
            }
        );
    }

    #[test]
    fn none_disables_the_control_plane() {
        assert_eq!(parse(&[]).unwrap().channels, ControlChannels::Disabled);
        assert_eq!(
            parse(&["--control-input", "in", "--notify-output", "out"])
                .unwrap()
                .channels,
            ControlChannels::Enabled {
                input: "in".into(),
                output: "out".into(),
                output_fifo: false,
            }
        );
        assert_eq!(
            parse(&["--control-input", "in"]).unwrap_err(),
            ConfigError::PartialChannels
        );
    }

    #[test]
    fn hook_sources() {
        let config = parse(&["--memory-listeners", "3"]).unwrap();
        assert_eq!(config.hooks, HookSource::Stdin { count: 3 });
        let config = parse(&["--hooks", "h.json"]).unwrap();
        assert_eq!(config.hooks, HookSource::Json("h.json".into()));
        assert!(Args::try_parse_from([
            "psx-control",
            "--hooks",
            "h.json",
            "--memory-listeners",
            "2"
        ])
        .is_err());
    }

    #[test]
    fn zero_flush_interval_is_rejected() {
        assert_eq!(
            parse(&["--flush-interval-ms", "0"]).unwrap_err(),
            ConfigError::ZeroFlushInterval
        );
    }
}
