// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bulk transfer between host memory and a ring.
//!
//! [`fill`] plays the host feeding a replay ring from a trace, [`drain`] plays the host emptying
//! a capture ring into a trace.  Both move data in steps of at most `max_transfer` bytes and
//! only ever within one contiguous stretch of the ring.

use crate::error::AgentError;
use crate::shared::{Consumer, Producer, Waiter};
use crossbeam_utils::Backoff;
use std::io::{Read, Write};

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// What a bulk transfer did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Bytes moved.
    pub bytes: u64,
    /// Transfer steps taken.
    pub steps: u64,
    /// Attempts which found the ring not ready.
    pub stalls: u64,
}

/// Copy `total` bytes from `source` into the ring.
///
/// Each step moves whatever the ring has room for, up to `max_transfer` and the outstanding
/// bytes.  A step waits only while the ring is full.
///
/// # Errors
///
/// * [`AgentError::Io`] if `source` ends early or fails.
/// * [`AgentError::Ring`] if the transfer is aborted.
#[tracing::instrument(level = "debug", skip(producer, source, waiter))]
pub fn fill<R: Read>(
    producer: &mut Producer,
    mut source: R,
    total: u64,
    waiter: &Waiter,
) -> Result<TransferReport, AgentError> {
    let geometry = producer.geometry();
    let mut chunk = vec![0u8; geometry.max_transfer() as usize];
    let mut report = TransferReport::default();
    let mut outstanding = total;
    while outstanding > 0 {
        let room = waiter.wait_until(|| {
            let room = producer.writable().min(geometry.max_transfer());
            if room == 0 {
                report.stalls += 1;
            }
            Ok((room > 0).then_some(room))
        })?;
        let len = u64::from(room).min(outstanding);
        #[allow(clippy::cast_possible_truncation)] // bounded by max_transfer
        let chunk = &mut chunk[..len as usize];
        source.read_exact(chunk)?;
        // the room can only have grown since
        producer.wait_write(chunk, waiter)?;
        outstanding -= len;
        report.bytes += len;
        report.steps += 1;
        trace!("wrote {len} bytes, {outstanding} outstanding");
    }
    debug!("fill done: {report:?}");
    Ok(report)
}

/// Copy everything the producer publishes into `sink` until the producer is no longer `active`
/// and the ring is empty.
///
/// Each step moves `min(contiguous readable, max_transfer)` bytes once the policy approves it.
///
/// # Errors
///
/// * [`AgentError::Io`] if `sink` fails.
/// * [`AgentError::Ring`] if the transfer is aborted.
#[tracing::instrument(level = "debug", skip_all)]
pub fn drain<W: Write>(
    consumer: &mut Consumer,
    mut sink: W,
    active: impl Fn() -> bool,
    waiter: &Waiter,
) -> Result<TransferReport, AgentError> {
    let max_transfer = consumer.geometry().max_transfer();
    let mut chunk = Vec::with_capacity(max_transfer as usize);
    let mut report = TransferReport::default();
    let backoff = Backoff::new();
    loop {
        // sampled before reading: if the producer was already idle and nothing is left to read,
        // everything it published has been seen
        let finished = !active();
        chunk.clear();
        let len = consumer.try_read_step(max_transfer, &mut chunk)?;
        if len > 0 {
            sink.write_all(&chunk)?;
            report.bytes += u64::from(len);
            report.steps += 1;
            trace!("read {len} bytes");
            backoff.reset();
            continue;
        }
        if finished {
            break;
        }
        report.stalls += 1;
        waiter.pause(&backoff)?;
    }
    sink.flush()?;
    debug!("drain done: {report:?}");
    Ok(report)
}

#[cfg(all(test, not(feature = "loom")))]
mod test {
    use crate::agent::{drain, fill};
    use crate::error::{AgentError, RingError};
    use crate::geometry::RingGeometry;
    use crate::memory::Memory;
    use crate::regs::Registers;
    use crate::shared::{Control, Ring, Waiter};
    use crate::sync::Arc;
    use core::sync::atomic::{AtomicBool, Ordering};
    use core::time::Duration;
    use pretty_assertions::assert_eq;
    use rand::Rng;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn fill_then_drain_moves_every_byte() {
        let memory = Arc::new(Memory::new(1024));
        let geometry = RingGeometry::new(1024, 256).unwrap();
        let registers = Registers::replay();
        let (mut producer, mut consumer) = Ring::new(memory, 0, geometry, registers).unwrap();
        let waiter = Waiter::new(Arc::new(Control::new()), Waiter::DEFAULT_POLL);

        let mut rng = rand::rng();
        let data: Vec<u8> = (0..100_000).map(|_| rng.next_u32().to_le_bytes()[0]).collect();
        let total = data.len() as u64;
        let done = AtomicBool::new(false);
        let mut out = Vec::new();

        std::thread::scope(|s| {
            let filled = s.spawn(|| {
                let report = fill(&mut producer, data.as_slice(), total, &waiter).unwrap();
                done.store(true, Ordering::Release);
                report
            });
            let drained = drain(&mut consumer, &mut out, || !done.load(Ordering::Acquire), &waiter).unwrap();
            let filled = filled.join().unwrap();
            assert_eq!(filled.bytes, total);
            assert_eq!(drained.bytes, total);
            // steps never cross the ring end nor exceed the transfer limit
            assert!(filled.steps >= total.div_ceil(256));
        });
        assert_eq!(out, data);
        assert!(logs_contain("fill done"));
    }

    #[test]
    fn fill_steps_shrink_to_the_room_left() {
        let memory = Arc::new(Memory::new(1024));
        let geometry = RingGeometry::new(1024, 256).unwrap();
        let (mut producer, mut consumer) = Ring::new(memory, 0, geometry, Registers::replay()).unwrap();
        let waiter = Waiter::new(Arc::new(Control::new()), Waiter::DEFAULT_POLL);
        for len in [256, 256, 256, 192] {
            assert!(producer.try_write(&vec![1; len]).unwrap());
        }

        // rd at 0 keeps the last byte before the ring end free; 63 bytes still fit
        let report = fill(&mut producer, [2u8; 63].as_slice(), 63, &waiter).unwrap();
        assert_eq!((report.bytes, report.steps, report.stalls), (63, 1, 0));
        assert_eq!(producer.write_pointer(), 1023);

        let mut out = Vec::new();
        assert_eq!(consumer.try_read_step(100, &mut out).unwrap(), 100);
        // one byte up to the ring end, then the 99 freed bytes short of rd
        let report = fill(&mut producer, [3u8; 100].as_slice(), 100, &waiter).unwrap();
        assert_eq!((report.bytes, report.steps, report.stalls), (100, 2, 0));
        assert_eq!(producer.write_pointer(), 99);
        assert_eq!(producer.writable(), 0);

        out.clear();
        while consumer.try_read_step(256, &mut out).unwrap() > 0 {}
        assert_eq!(out.len(), 1023);
        assert_eq!(&out[860..923], &[2u8; 63]);
        assert_eq!(&out[923..], &[3u8; 100]);
    }

    #[test]
    fn fill_reports_short_sources() {
        let memory = Arc::new(Memory::new(1024));
        let geometry = RingGeometry::new(1024, 256).unwrap();
        let (mut producer, _consumer) = Ring::new(memory, 0, geometry, Registers::replay()).unwrap();
        let waiter = Waiter::new(Arc::new(Control::new()), Waiter::DEFAULT_POLL);
        let err = fill(&mut producer, [0u8; 10].as_slice(), 100, &waiter).unwrap_err();
        assert!(matches!(err, AgentError::Io(_)));
    }

    #[test]
    fn fill_gives_up_when_aborted() {
        let memory = Arc::new(Memory::new(1024));
        let geometry = RingGeometry::new(1024, 256).unwrap();
        let (mut producer, _consumer) = Ring::new(memory, 0, geometry, Registers::replay()).unwrap();
        let control = Arc::new(Control::new());
        let waiter = Waiter::new(control.clone(), Duration::from_micros(100));
        std::thread::scope(|s| {
            let handle = s.spawn(|| fill(&mut producer, [0u8; 4096].as_slice(), 4096, &waiter));
            std::thread::sleep(Duration::from_millis(5));
            control.abort();
            let err = handle.join().unwrap().unwrap_err();
            assert!(matches!(err, AgentError::Ring(RingError::Aborted)));
        });
    }
}
