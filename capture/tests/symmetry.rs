// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Frames captured through a small ring replay with the gaps they arrived with.

use capture::{ArrivingFrame, CaptureConfig, CaptureEngine, OverflowPolicy};
use pretty_assertions::assert_eq;
use rand::Rng;
use replay::{ReplayConfig, ReplayEngine, ReplayedFrame, VecSink, VirtualPacer};
use ring::{Arc, Control, Memory, Registers, Ring, RingGeometry, Waiter, drain, fill};
use trace::generate::random_frame;
use trace::{CaptureMeta, FrameLen};

const FRAMES: usize = 2_000;

/// Capture random frames through a small ring, then replay the capture trace through another.
fn capture_then_replay(ring_size: u32, max_capture_len: u16) -> (Vec<ArrivingFrame>, Vec<ReplayedFrame>) {
    let mut rng = rand::rng();
    let mut arrival = 0u64;
    let frames: Vec<ArrivingFrame> = (0..FRAMES)
        .map(|_| {
            arrival += u64::from(rng.next_u32() % 10_000);
            ArrivingFrame {
                data: random_frame(&mut rng),
                arrival,
                latency: Some(rng.next_u32() % 1_000),
            }
        })
        .collect();

    let memory = Arc::new(Memory::new(ring_size as usize));
    let geometry = RingGeometry::new(ring_size, 128).unwrap();
    let registers = Registers::capture();
    let (producer, mut consumer) = Ring::new(memory, 0, geometry, registers.clone()).unwrap();
    let config = CaptureConfig {
        max_capture_len: FrameLen::new(max_capture_len).unwrap(),
        overflow: OverflowPolicy::Backpressure,
    };
    let mut engine = CaptureEngine::new(producer, config).unwrap();
    let waiter = Waiter::new(Arc::new(Control::new()), Waiter::DEFAULT_POLL);

    let mut captured = Vec::new();
    engine.start().unwrap();
    let summary = std::thread::scope(|s| {
        let host = s.spawn(|| {
            drain(
                &mut consumer,
                &mut captured,
                || registers.active().unwrap_or(false),
                &waiter,
            )
            .unwrap()
        });
        for frame in &frames {
            engine.capture(frame, &waiter).unwrap();
        }
        let summary = engine.stop(&waiter).unwrap();
        let report = host.join().unwrap();
        assert_eq!(report.bytes, summary.bytes);
        summary
    });
    assert_eq!(summary.frames, FRAMES as u64);
    assert_eq!(summary.dropped, 0);
    assert_eq!(captured.len() as u64, summary.bytes);
    assert_eq!(captured.len() % 64, 0);

    // play the capture back through a replay ring
    let memory = Arc::new(Memory::new(ring_size as usize));
    let (mut producer, consumer) = Ring::new(memory, 0, geometry, Registers::replay()).unwrap();
    let config =
        ReplayConfig::<CaptureMeta>::new(captured.len() as u64, FrameLen::new(max_capture_len).unwrap())
            .unwrap();
    let mut replay = ReplayEngine::new(consumer, config, VecSink::default(), VirtualPacer::new());
    std::thread::scope(|s| {
        s.spawn(|| fill(&mut producer, captured.as_slice(), captured.len() as u64, &waiter).unwrap());
        replay.run(&waiter).unwrap();
    });

    let (_, sink) = replay.into_parts();
    (frames, sink.frames)
}

#[test]
fn truncated_capture_replays_prefixes_and_gaps() {
    const MAX_CAPTURE_LEN: u16 = 96;
    let (frames, replayed) = capture_then_replay(1024, MAX_CAPTURE_LEN);
    assert_eq!(replayed.len(), FRAMES);
    for (i, (sent, seen)) in frames.iter().zip(&replayed).enumerate() {
        let snap = sent.data.len().min(usize::from(MAX_CAPTURE_LEN));
        assert_eq!(seen.data.len(), sent.data.len(), "frame {i}");
        assert_eq!(&seen.data[..snap], &sent.data[..snap], "frame {i}");
        assert!(seen.data[snap..].iter().all(|b| *b == 0), "frame {i}");
        assert_eq!(seen.at, sent.arrival - frames[0].arrival, "frame {i}");
    }
}

#[test]
fn full_capture_replays_identical_frames_and_gaps() {
    let (frames, replayed) = capture_then_replay(4096, 1518);
    assert!(frames.iter().all(|frame| frame.data.len() <= 1518));
    let sent: Vec<(u64, &[u8])> = frames
        .iter()
        .map(|frame| (frame.arrival - frames[0].arrival, frame.data.as_slice()))
        .collect();
    let seen: Vec<(u64, &[u8])> = replayed.iter().map(|frame| (frame.at, frame.data.as_slice())).collect();
    assert_eq!(seen, sent);
    let gaps: Vec<u64> = replayed.iter().map(|frame| frame.gap).collect();
    let expected: Vec<u64> = std::iter::once(0)
        .chain(frames.windows(2).map(|pair| pair[1].arrival - pair[0].arrival))
        .collect();
    assert_eq!(gaps, expected);
}
