// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A slow host against a ring a tenth the size of the capture: frames are only lost once the
//! overflow flag is up, and the host never sees a partial record.

use capture::{ArrivingFrame, CaptureConfig, CaptureEngine, Captured, OverflowPolicy};
use pretty_assertions::assert_eq;
use rand::Rng;
use ring::{Arc, Control, ErrorFlags, Memory, Registers, Ring, RingGeometry, Waiter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use trace::generate::random_frame;
use trace::{CaptureMeta, FrameLen, record_len};

const FRAMES: usize = 4_000;
const STEP: u32 = 256;

#[test]
fn drop_policy_loses_nothing_before_the_overflow_flag() {
    let mut rng = rand::rng();
    let mut arrival = 0u64;
    let frames: Vec<ArrivingFrame> = (0..FRAMES)
        .map(|_| {
            arrival += 1 + u64::from(rng.next_u32() % 10_000);
            ArrivingFrame {
                data: random_frame(&mut rng),
                arrival,
                latency: None,
            }
        })
        .collect();
    let total: usize = frames.iter().map(|frame| record_len(frame.data.len())).sum();
    #[allow(clippy::cast_possible_truncation)]
    let size = (total / 10 / 64 * 64) as u32;

    let memory = Arc::new(Memory::new(size as usize));
    let geometry = RingGeometry::new(size, STEP).unwrap();
    let (producer, mut consumer) = Ring::new(memory, 0, geometry, Registers::capture()).unwrap();
    let config = CaptureConfig {
        max_capture_len: FrameLen::MAX,
        overflow: OverflowPolicy::Drop,
    };
    let mut engine = CaptureEngine::new(producer, config).unwrap();
    let waiter = Waiter::new(Arc::new(Control::new()), Waiter::DEFAULT_POLL);
    let done = AtomicBool::new(false);

    engine.start().unwrap();
    let mut drained = Vec::new();
    let (fates, first_overflow) = std::thread::scope(|s| {
        s.spawn(|| {
            loop {
                let finished = done.load(Ordering::Acquire);
                let moved = consumer.try_read_step(STEP, &mut drained).unwrap();
                if moved == 0 && finished {
                    break;
                }
                std::thread::sleep(Duration::from_micros(50));
            }
        });
        let mut first_overflow = None;
        let fates: Vec<Captured> = frames
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                let fate = engine.capture(frame, &waiter).unwrap();
                if first_overflow.is_none() && engine.errors().unwrap().contains(ErrorFlags::OVERFLOW) {
                    first_overflow = Some(i);
                }
                fate
            })
            .collect();
        engine.stop(&waiter).unwrap();
        done.store(true, Ordering::Release);
        (fates, first_overflow)
    });

    let first_overflow = first_overflow.unwrap();
    assert_eq!(fates[first_overflow], Captured::Dropped);
    assert!(
        fates[..first_overflow]
            .iter()
            .all(|fate| matches!(fate, Captured::Stored { .. }))
    );
    assert_eq!(drained.len() % 64, 0);

    let records = trace::TraceReader::<CaptureMeta>::new(&drained, FrameLen::MAX)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let stored: Vec<&ArrivingFrame> = frames
        .iter()
        .zip(&fates)
        .filter(|(_, fate)| matches!(fate, Captured::Stored { .. }))
        .map(|(frame, _)| frame)
        .collect();
    assert_eq!(records.len(), stored.len());
    assert_eq!(engine.stats().snapshot().dropped as usize, FRAMES - stored.len());

    let mut previous: Option<u64> = None;
    for (i, (record, frame)) in records.iter().zip(&stored).enumerate() {
        assert_eq!(record.payload(), frame.data.as_slice(), "record {i}");
        let gap = previous.map_or(0, |previous| frame.arrival - previous);
        assert_eq!(u64::from(record.delta_t()), gap, "record {i}");
        previous = Some(frame.arrival);
    }
    // frames up to the first drop are all there, in order
    for (i, frame) in frames[..first_overflow].iter().enumerate() {
        assert_eq!(records[i].payload(), frame.data.as_slice(), "frame {i}");
    }
}
