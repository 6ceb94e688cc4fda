// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Offline trace tooling.

use args::{Configuration, ExportArgs, GenerateArgs, ImportArgs, Layout, TraceFormat, ValidateArgs};
use miette::{Context, IntoDiagnostic};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use trace::generate::random_trace;
use trace::pcap::Conversion;
use trace::{BUS_WIDTH, CaptureMeta, ReplayMeta, TraceMeta, TraceReader};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

pub(crate) fn read_trace(path: &Path) -> miette::Result<Vec<u8>> {
    std::fs::read(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read trace {}", path.display()))
}

pub(crate) fn write_trace(path: &Path, trace: &[u8]) -> miette::Result<()> {
    std::fs::write(path, trace)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to write trace {}", path.display()))
}

#[tracing::instrument(level = "debug", skip(config))]
pub(crate) fn import(args: &ImportArgs, config: &Configuration) -> miette::Result<()> {
    let pcap = File::open(&args.pcap)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to open {}", args.pcap.display()))?;
    let (trace, Conversion { packets, trace_bytes }) = trace::pcap::import(BufReader::new(pcap), config.clock()?)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to import {}", args.pcap.display()))?;
    write_trace(&args.trace, &trace)?;
    info!("imported {packets} packets into {trace_bytes} trace bytes");
    Ok(())
}

fn export_as<M: TraceMeta>(
    trace: &[u8],
    param: M::Param,
    args: &ExportArgs,
    config: &Configuration,
) -> miette::Result<Conversion> {
    let pcap = File::create(&args.pcap)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to create {}", args.pcap.display()))?;
    trace::pcap::export::<M, _>(trace, param, config.clock()?, BufWriter::new(pcap))
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to export {}", args.trace.display()))
}

#[tracing::instrument(level = "debug", skip(config))]
pub(crate) fn export(args: &ExportArgs, config: &Configuration) -> miette::Result<()> {
    let trace = read_trace(&args.trace)?;
    let conversion = match args.format.layout {
        Layout::Replay => export_as::<ReplayMeta>(&trace, (), args, config)?,
        Layout::Capture => export_as::<CaptureMeta>(&trace, capture_param(&args.format)?, args, config)?,
    };
    info!("exported {} packets", conversion.packets);
    Ok(())
}

fn capture_param(format: &TraceFormat) -> miette::Result<trace::FrameLen> {
    format.capture_param().map_err(|e| miette::miette!("{e}"))
}

/// Decode every record; returns the record count.
fn check<M: TraceMeta>(trace: &[u8], param: M::Param) -> miette::Result<usize> {
    let mut records = 0;
    for record in TraceReader::<M>::new(trace, param) {
        let record = record.into_diagnostic().wrap_err("trace is malformed")?;
        trace!("{:?}", record.meta());
        records += 1;
    }
    Ok(records)
}

#[tracing::instrument(level = "debug")]
pub(crate) fn validate(args: &ValidateArgs) -> miette::Result<()> {
    let trace = read_trace(&args.trace)?;
    let records = match args.format.layout {
        Layout::Replay => check::<ReplayMeta>(&trace, ())?,
        Layout::Capture => check::<CaptureMeta>(&trace, capture_param(&args.format)?)?,
    };
    if trace.len() % BUS_WIDTH != 0 {
        warn!("trace length {} is not a multiple of {BUS_WIDTH}", trace.len());
    }
    info!("{}: {records} records, {} bytes", args.trace.display(), trace.len());
    Ok(())
}

#[tracing::instrument(level = "debug")]
pub(crate) fn generate(args: &GenerateArgs) -> miette::Result<()> {
    let generated = random_trace(args.count, &mut rand::rng()).into_diagnostic()?;
    write_trace(&args.trace, &generated.trace)?;
    info!(
        "generated {} records, {} bytes",
        generated.records.len(),
        generated.trace.len()
    );
    Ok(())
}
