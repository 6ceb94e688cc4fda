// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The host fills a small ring from one thread while the engine replays on another.

use pretty_assertions::assert_eq;
use replay::{ChannelSink, ReplayConfig, ReplayEngine, ReplayError, VecSink, VirtualPacer};
use ring::{Arc, Control, Memory, Registers, Ring, RingGeometry, Waiter, fill};
use trace::generate::random_trace;
use trace::ReplayMeta;

const REPEAT: usize = 3;

#[test]
fn a_trace_larger_than_the_ring_replays_intact() {
    let generated = random_trace(500, &mut rand::rng()).unwrap();
    let trace = generated.trace.repeat(REPEAT);

    let memory = Arc::new(Memory::new(2048));
    let registers = Registers::replay();
    registers.set_trace_size(trace.len() as u64).unwrap();
    let geometry = RingGeometry::new(1024, 256).unwrap();
    let (mut producer, consumer) = Ring::new(memory, 1024, geometry, registers.clone()).unwrap();
    let config = ReplayConfig::<ReplayMeta>::from_registers(&registers, ()).unwrap();
    let waiter = Waiter::new(Arc::new(Control::new()), Waiter::DEFAULT_POLL);
    let mut engine = ReplayEngine::new(consumer, config, VecSink::default(), VirtualPacer::new());

    let summary = std::thread::scope(|s| {
        s.spawn(|| fill(&mut producer, trace.as_slice(), trace.len() as u64, &waiter).unwrap());
        engine.run(&waiter).unwrap()
    });
    assert_eq!(summary.frames, (500 * REPEAT) as u64);
    assert_eq!(summary.bytes, trace.len() as u64);
    assert_eq!(registers.packets(), Ok((500 * REPEAT) as u32));

    let expected: Vec<Vec<u8>> = generated.records.iter().map(trace::TraceRecord::frame).collect();
    let replayed: Vec<Vec<u8>> = engine.sink().frames.iter().map(|f| f.data.clone()).collect();
    assert_eq!(replayed, expected.repeat(REPEAT));
    let stats = engine.stats().snapshot();
    assert_eq!(stats.frames, summary.frames);
    assert_eq!(stats.bytes, summary.bytes);
}

#[test]
fn an_abort_releases_a_starved_engine() {
    let memory = Arc::new(Memory::new(1024));
    let (_producer, consumer) =
        Ring::new(memory, 0, RingGeometry::new(1024, 256).unwrap(), Registers::replay()).unwrap();
    let control = Arc::new(Control::new());
    let waiter = Waiter::new(control.clone(), Waiter::DEFAULT_POLL);
    let config = ReplayConfig::<ReplayMeta>::new(1024, ()).unwrap();
    let (sink, _rx) = ChannelSink::bounded(8);
    let mut engine = ReplayEngine::new(consumer, config, sink, VirtualPacer::new());
    std::thread::scope(|s| {
        let run = s.spawn(|| engine.run(&waiter));
        std::thread::sleep(std::time::Duration::from_millis(5));
        control.abort();
        assert!(matches!(run.join().unwrap(), Err(ReplayError::Aborted)));
    });
    assert!(!engine.registers().active().unwrap());
    assert!(engine.stats().snapshot().stalls > 0);
}
