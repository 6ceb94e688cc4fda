// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Software loopback: host fill, replay engine, capture engine, host drain.
//!
//! Both rings share one [`Memory`]: the replay window at offset zero and the capture window right
//! behind it.  Replayed frames reach the capture engine over a bounded channel with their departure
//! tick as arrival tick, so the capture trace carries the gaps of the replay trace.

use crate::convert::{read_trace, write_trace};
use args::{Configuration, LoopbackArgs, OverflowSetting, Pacing};
use capture::{ArrivingFrame, CaptureConfig, CaptureEngine, OverflowPolicy};
use miette::IntoDiagnostic;
use replay::{ChannelSink, Pacer, ReplayConfig, ReplayEngine, VirtualPacer, WallClockPacer};
use ring::{Arc, Control, Memory, Registers, Ring, TransferReport, Waiter, drain, fill};
use serde::Serialize;
use stats::StatsSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use trace::ReplayMeta;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Frames in flight between the two engines.
const CHANNEL_DEPTH: usize = 64;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
struct HostTransfer {
    bytes: u64,
    steps: u64,
    stalls: u64,
}

impl From<TransferReport> for HostTransfer {
    fn from(report: TransferReport) -> Self {
        HostTransfer {
            bytes: report.bytes,
            steps: report.steps,
            stalls: report.stalls,
        }
    }
}

/// Printed when a loopback run completes.
#[derive(Clone, Debug, Serialize)]
struct LoopbackReport {
    replay: StatsSnapshot,
    capture: StatsSnapshot,
    fill: HostTransfer,
    drain: HostTransfer,
    capture_errors: String,
}

fn join<T>(name: &str, handle: std::thread::ScopedJoinHandle<'_, miette::Result<T>>) -> miette::Result<T> {
    handle
        .join()
        .map_err(|_| miette::miette!("{name} thread panicked"))?
}

/// Abort every party on the first failure so no one waits forever.
fn abort_on_err<T, E: std::fmt::Display>(name: &str, control: &Control, result: Result<T, E>) -> Result<T, E> {
    if let Err(e) = &result {
        error!("{name} failed: {e}");
        control.abort();
    }
    result
}

fn loopback_with<P: Pacer + Send>(
    trace: &[u8],
    config: &Configuration,
    pacer: P,
) -> miette::Result<(Vec<u8>, LoopbackReport)> {
    let geometry = config.geometry()?;
    let size = geometry.size() as usize;
    let repeat = u64::from(config.replay.repeat);
    let total = trace.len() as u64 * repeat;
    let overflow = match config.overflow()? {
        OverflowSetting::Backpressure => OverflowPolicy::Backpressure,
        OverflowSetting::Drop => OverflowPolicy::Drop,
    };

    let memory = Arc::new(Memory::new(2 * size));
    let (mut host_producer, replay_consumer) =
        Ring::new(memory.clone(), 0, geometry, Registers::replay()).into_diagnostic()?;
    let (capture_producer, mut host_consumer) =
        Ring::new(memory, size, geometry, Registers::capture()).into_diagnostic()?;

    host_producer.registers().set_trace_size(total).into_diagnostic()?;
    let replay_config = ReplayConfig::<ReplayMeta>::from_registers(host_producer.registers(), ()).into_diagnostic()?;
    let (sink, frames) = ChannelSink::bounded(CHANNEL_DEPTH);
    let mut replay = ReplayEngine::new(replay_consumer, replay_config, sink, pacer);
    let replay_stats = replay.stats().clone();

    let capture_config = CaptureConfig {
        max_capture_len: config.max_capture_len()?,
        overflow,
    };
    let mut capture = CaptureEngine::new(capture_producer, capture_config).into_diagnostic()?;
    let capture_stats = capture.stats().clone();

    let control = Arc::new(Control::new());
    let waiter = Waiter::new(control.clone(), config.poll());
    let capture_done = AtomicBool::new(false);
    let source = trace.repeat(config.replay.repeat as usize);
    let mut captured = Vec::new();
    info!(
        "looping back {} copies of a {} byte trace through {size} byte rings",
        repeat,
        trace.len()
    );

    let (waiter, control) = (&waiter, &control);
    let (fill_report, drain_report) = std::thread::scope(|s| {
        let fill_thread = s.spawn(|| {
            let result = fill(&mut host_producer, source.as_slice(), total, waiter);
            abort_on_err("fill", control, result).into_diagnostic()
        });
        let replay_thread = s.spawn(move || {
            let result = replay.run(waiter);
            // closes the channel
            drop(replay);
            abort_on_err("replay", control, result).into_diagnostic()
        });
        let capture_thread = s.spawn(|| {
            let arriving = std::iter::from_fn(move || frames.recv().ok()).map(|frame| ArrivingFrame {
                data: frame.data,
                arrival: frame.at,
                latency: None,
            });
            let result = capture.run(arriving, waiter);
            capture_done.store(true, Ordering::Release);
            abort_on_err("capture", control, result).into_diagnostic()
        });
        let drain_thread = s.spawn(|| {
            let result = drain(
                &mut host_consumer,
                &mut captured,
                || !capture_done.load(Ordering::Acquire),
                waiter,
            );
            abort_on_err("drain", control, result).into_diagnostic()
        });

        let capture_summary = join("capture", capture_thread);
        let replay_summary = join("replay", replay_thread);
        let fill_report = join("fill", fill_thread);
        let drain_report = join("drain", drain_thread);
        let capture_summary = capture_summary?;
        let replay_summary = replay_summary?;
        debug!("replay: {replay_summary:?}, capture: {capture_summary:?}");
        Ok::<_, miette::Report>((fill_report?, drain_report?))
    })?;

    replay_stats.publish();
    capture_stats.publish();
    let report = LoopbackReport {
        replay: replay_stats.snapshot(),
        capture: capture_stats.snapshot(),
        fill: fill_report.into(),
        drain: drain_report.into(),
        capture_errors: format!("{:?}", capture.errors().into_diagnostic()?),
    };
    Ok((captured, report))
}

/// Replay `trace` into the capture engine and return the capture trace.
fn loopback(trace: &[u8], config: &Configuration) -> miette::Result<(Vec<u8>, LoopbackReport)> {
    match config.replay.pacing {
        Pacing::Virtual => loopback_with(trace, config, VirtualPacer::new()),
        Pacing::WallClock => loopback_with(trace, config, WallClockPacer::new(config.clock()?)),
    }
}

#[tracing::instrument(level = "debug", skip(config))]
pub(crate) fn run(args: &LoopbackArgs, config: &Configuration) -> miette::Result<()> {
    let trace = read_trace(&args.trace)?;
    let (captured, report) = loopback(&trace, config)?;
    write_trace(&args.out, &captured)?;
    let summary = serde_yaml_ng::to_string(&report).into_diagnostic()?;
    println!("{summary}");
    Ok(())
}
