// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! YAML configuration file.
//!
//! Every section and every field is optional; missing values take the defaults below.
//!
//! ```yaml
//! ring:
//!   size: 65536
//!   max_transfer: 4096
//!   poll_us: 10
//! clock:
//!   hz: 156250000
//! replay:
//!   pacing: virtual
//!   repeat: 1
//! capture:
//!   max_capture_len: 2047
//!   overflow: backpressure
//! tracing:
//!   level: info
//! ```

use ring::{RingError, RingGeometry};
use std::path::{Path, PathBuf};
use std::time::Duration;
use trace::{ClockRate, FrameLen, record_len};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Configuration errors.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration file {path}")]
    #[diagnostic(code(wiretrace::config::io))]
    Io {
        /// The file.
        path: PathBuf,
        /// Why.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid YAML for a [`Configuration`].
    #[error("invalid configuration")]
    #[diagnostic(code(wiretrace::config::yaml))]
    Yaml(#[from] serde_yaml_ng::Error),
    /// The ring geometry is unusable.
    #[error("invalid ring geometry")]
    #[diagnostic(
        code(wiretrace::config::ring),
        help("the ring size must be a multiple of 64 and larger than max_transfer")
    )]
    Ring(#[source] RingError),
    /// The ring is too small to hold a transfer step and the largest record at once.
    #[error("a ring of {size} bytes cannot hold a {max_transfer} byte step and a {record} byte record")]
    #[diagnostic(code(wiretrace::config::ring), help("grow ring.size or shrink ring.max_transfer"))]
    RingTooSmall {
        /// Configured ring size.
        size: u32,
        /// Configured transfer step limit.
        max_transfer: u32,
        /// Largest record the ring must hold.
        record: usize,
    },
    /// The clock rate is zero.
    #[error("the clock rate must not be zero")]
    #[diagnostic(code(wiretrace::config::clock))]
    Clock,
    /// The capture snap limit does not fit 11 bits.
    #[error("max_capture_len {0} exceeds {max}", max = FrameLen::MAX)]
    #[diagnostic(code(wiretrace::config::capture))]
    MaxCaptureLen(u16),
    /// The repeat count is zero.
    #[error("repeat must be at least 1")]
    #[diagnostic(code(wiretrace::config::replay))]
    Repeat,
    /// No overflow policy was chosen.
    #[error("no capture overflow policy configured")]
    #[diagnostic(
        code(wiretrace::config::capture),
        help("pass --overflow backpressure|drop or set capture.overflow")
    )]
    MissingOverflow,
}

/// Ring buffer parameters, shared by both directions.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RingConfigSection {
    /// Ring size in bytes.
    pub size: u32,
    /// Largest single transfer step in bytes.
    pub max_transfer: u32,
    /// Sleep between attempts once spinning gave up, in microseconds.
    pub poll_us: u64,
}

impl Default for RingConfigSection {
    fn default() -> Self {
        Self {
            size: 65_536,
            max_transfer: 4_096,
            poll_us: 10,
        }
    }
}

/// Clock the `delta_t` fields count in.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfigSection {
    /// Frequency in Hz.
    pub hz: u64,
}

impl Default for ClockConfigSection {
    fn default() -> Self {
        Self {
            hz: ClockRate::DEFAULT.hz(),
        }
    }
}

/// How replayed frames are timed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Logical time; frames leave as fast as they can be handled.
    #[default]
    Virtual,
    /// Frames leave at their recorded times.
    WallClock,
}

/// Replay parameters.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfigSection {
    /// Inter frame timing.
    pub pacing: Pacing,
    /// Number of back to back copies of the trace to replay.
    pub repeat: u32,
}

impl Default for ReplayConfigSection {
    fn default() -> Self {
        Self {
            pacing: Pacing::Virtual,
            repeat: 1,
        }
    }
}

/// What the capture engine does on a full ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSetting {
    /// Stall until the host made room.
    Backpressure,
    /// Drop the frame and flag the overflow.
    Drop,
}

/// Capture parameters.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfigSection {
    /// Frames longer than this are truncated in the trace.
    pub max_capture_len: u16,
    /// Behaviour on a full ring.  Must be set here or on the command line.
    pub overflow: Option<OverflowSetting>,
}

impl Default for CaptureConfigSection {
    fn default() -> Self {
        Self {
            max_capture_len: FrameLen::MAX.get(),
            overflow: None,
        }
    }
}

/// Logging parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingConfigSection {
    /// Log filter, e.g. `info` or `warn,wiretrace_ring=trace`.
    pub level: Option<String>,
}

/// The whole configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Ring parameters.
    pub ring: RingConfigSection,
    /// Clock parameters.
    pub clock: ClockConfigSection,
    /// Replay parameters.
    pub replay: ReplayConfigSection,
    /// Capture parameters.
    pub capture: CaptureConfigSection,
    /// Logging parameters.
    pub tracing: TracingConfigSection,
}

impl Configuration {
    /// Parse a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] for syntax errors, unknown fields or mistyped values.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Read a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Configuration::from_yaml`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&yaml)?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry()?;
        self.clock()?;
        self.max_capture_len()?;
        if self.replay.repeat == 0 {
            return Err(ConfigError::Repeat);
        }
        Ok(())
    }

    /// The ring geometry.
    ///
    /// Besides the ring's own limits, the ring must hold one transfer step and the largest
    /// record at the same time, or the host and an engine may wait on each other forever.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Ring`] or [`ConfigError::RingTooSmall`].
    pub fn geometry(&self) -> Result<RingGeometry, ConfigError> {
        let RingConfigSection {
            size, max_transfer, ..
        } = self.ring;
        let geometry = RingGeometry::new(size, max_transfer).map_err(ConfigError::Ring)?;
        let record = record_len(FrameLen::MAX.as_usize());
        if (size as usize) < max_transfer as usize + record {
            return Err(ConfigError::RingTooSmall {
                size,
                max_transfer,
                record,
            });
        }
        Ok(geometry)
    }

    /// Sleep between attempts once spinning gave up.
    #[must_use]
    pub fn poll(&self) -> Duration {
        Duration::from_micros(self.ring.poll_us)
    }

    /// The clock rate.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Clock`] for zero.
    pub fn clock(&self) -> Result<ClockRate, ConfigError> {
        ClockRate::new(self.clock.hz).ok_or(ConfigError::Clock)
    }

    /// The capture snap limit.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MaxCaptureLen`] beyond 11 bits.
    pub fn max_capture_len(&self) -> Result<FrameLen, ConfigError> {
        let len = self.capture.max_capture_len;
        FrameLen::new(len).map_err(|_| ConfigError::MaxCaptureLen(len))
    }

    /// The capture overflow policy.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingOverflow`] if none was chosen.
    pub fn overflow(&self) -> Result<OverflowSetting, ConfigError> {
        self.capture.overflow.ok_or(ConfigError::MissingOverflow)
    }
}
