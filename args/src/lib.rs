// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line and configuration file of the `wiretrace` tool.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod config;

pub use clap::Parser;
pub use config::{
    CaptureConfigSection, ClockConfigSection, ConfigError, Configuration, OverflowSetting, Pacing,
    ReplayConfigSection, RingConfigSection, TracingConfigSection,
};

use std::path::PathBuf;
use trace::FrameLen;

/// Which meta word layout a trace file uses.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Layout {
    /// Traces fed to the replay direction (and produced by `import` and `generate`).
    #[default]
    Replay,
    /// Traces written by the capture direction.
    Capture,
}

/// A trace file and how to read it.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct TraceFormat {
    /// Meta word layout of the trace.
    #[arg(long, value_enum, default_value_t = Layout::Replay)]
    pub layout: Layout,

    /// Snap limit the capture trace was recorded with.  Required for the capture layout.
    #[arg(long, value_name = "BYTES", value_parser = parse_frame_len)]
    pub max_capture_len: Option<FrameLen>,
}

impl TraceFormat {
    /// The snap limit, if the layout needs one.
    ///
    /// # Errors
    ///
    /// Fails for the capture layout without `--max-capture-len`.
    pub fn capture_param(&self) -> Result<FrameLen, String> {
        self.max_capture_len
            .ok_or_else(|| "--max-capture-len is required for the capture layout".to_string())
    }
}

fn parse_frame_len(arg: &str) -> Result<FrameLen, String> {
    let len: u16 = arg.parse().map_err(|e| format!("{e}"))?;
    FrameLen::new(len).map_err(|_| format!("{len} exceeds {}", FrameLen::MAX))
}

/// Convert a pcap file to a replay trace.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ImportArgs {
    /// pcap file to read.
    pub pcap: PathBuf,
    /// Trace file to write.
    pub trace: PathBuf,
}

/// Convert a trace to a nanosecond pcap file.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ExportArgs {
    /// Trace file to read.
    pub trace: PathBuf,
    /// pcap file to write.
    pub pcap: PathBuf,
    #[command(flatten)]
    #[allow(missing_docs)]
    pub format: TraceFormat,
}

/// Check that a trace decodes completely.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ValidateArgs {
    /// Trace file to read.
    pub trace: PathBuf,
    #[command(flatten)]
    #[allow(missing_docs)]
    pub format: TraceFormat,
}

/// Write a trace of random frames.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct GenerateArgs {
    /// Trace file to write.
    pub trace: PathBuf,
    /// Number of records.
    #[arg(long, default_value_t = 1000)]
    pub count: usize,
}

/// Replay a trace into the capture engine through two in-memory rings.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct LoopbackArgs {
    /// Replay trace to read.
    pub trace: PathBuf,
    /// Capture trace to write.
    pub out: PathBuf,
    /// Number of back to back copies to replay (overrides `replay.repeat`).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: Option<u32>,
    /// Capture overflow policy (overrides `capture.overflow`).
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowSetting>,
    /// Capture snap limit (overrides `capture.max_capture_len`).
    #[arg(long, value_name = "BYTES")]
    pub max_capture_len: Option<u16>,
    /// Replay pacing (overrides `replay.pacing`).
    #[arg(long, value_enum)]
    pub pacing: Option<Pacing>,
}

impl LoopbackArgs {
    /// Fold the command line overrides into `config`.
    pub fn apply(&self, config: &mut Configuration) {
        if let Some(repeat) = self.repeat {
            config.replay.repeat = repeat;
        }
        if let Some(overflow) = self.overflow {
            config.capture.overflow = Some(overflow);
        }
        if let Some(len) = self.max_capture_len {
            config.capture.max_capture_len = len;
        }
        if let Some(pacing) = self.pacing {
            config.replay.pacing = pacing;
        }
    }
}

/// What to do.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Convert a pcap file to a replay trace.
    Import(ImportArgs),
    /// Convert a trace to a pcap file.
    Export(ExportArgs),
    /// Check that a trace decodes completely.
    Validate(ValidateArgs),
    /// Write a trace of random frames.
    Generate(GenerateArgs),
    /// Replay a trace into the capture engine in software.
    Loopback(LoopbackArgs),
}

/// Command line of the `wiretrace` tool.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "wiretrace")]
#[command(version)]
#[command(about = "Trace tooling and software loopback for a 10G traffic generator / capture engine", long_about = None)]
pub struct CmdArgs {
    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        help = "Log filter, e.g. info or warn,wiretrace_ring=trace (default: RUST_LOG, then tracing.level, then info)"
    )]
    log_level: Option<String>,

    #[arg(long, global = true, value_name = "FILE", help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "HZ", help = "Clock rate delta_t is counted in (overrides clock.hz)")]
    clock_hz: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

impl CmdArgs {
    /// The subcommand.
    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The log filter given on the command line.
    #[must_use]
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    /// The configuration file, if any.
    #[must_use]
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    /// Load the configuration file (or the defaults) and fold in the global overrides and those
    /// of the subcommand.  The result is validated.
    ///
    /// # Errors
    ///
    /// See [`Configuration::load`] and [`Configuration::validate`].
    pub fn configuration(&self) -> Result<Configuration, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Configuration::load(path)?,
            None => Configuration::default(),
        };
        if let Some(hz) = self.clock_hz {
            config.clock.hz = hz;
        }
        if let Command::Loopback(loopback) = &self.command {
            loopback.apply(&mut config);
        }
        config.validate()?;
        Ok(config)
    }
}
