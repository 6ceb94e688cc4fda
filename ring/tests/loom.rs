// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Exhaustive interleavings of one producer and one consumer.
//!
//! Run with `cargo test -p wiretrace-ring --features loom --release --test loom`.

#![cfg(feature = "loom")]

use wiretrace_ring::{Arc, Memory, Registers, Ring, RingGeometry};

const RECORDS: [u8; 3] = [1, 2, 3];

#[test]
fn records_are_seen_whole_and_in_order() {
    loom::model(|| {
        let memory = Arc::new(Memory::new(128));
        let geometry = RingGeometry::new(128, 64).unwrap();
        let (mut producer, mut consumer) =
            Ring::new(memory, 0, geometry, Registers::capture()).unwrap();

        let writer = loom::thread::spawn(move || {
            for tag in RECORDS {
                while !producer.try_commit(&[tag; 48]).unwrap() {
                    loom::thread::yield_now();
                }
            }
        });

        let mut record = [0u8; 48];
        for tag in RECORDS {
            while !consumer.try_consume(&mut record).unwrap() {
                loom::thread::yield_now();
            }
            assert!(record.iter().all(|b| *b == tag));
        }
        writer.join().unwrap();
        assert_eq!(consumer.available(), 0);
    });
}

#[test]
fn bulk_steps_never_overtake_the_writer() {
    loom::model(|| {
        let memory = Arc::new(Memory::new(128));
        let geometry = RingGeometry::new(128, 64).unwrap();
        let (mut producer, mut consumer) =
            Ring::new(memory, 0, geometry, Registers::replay()).unwrap();

        let writer = loom::thread::spawn(move || {
            for tag in [7u8, 8] {
                while !producer.try_write(&[tag; 64]).unwrap() {
                    loom::thread::yield_now();
                }
            }
        });

        let mut out = Vec::new();
        while out.len() < 128 {
            if consumer.try_read_step(64, &mut out).unwrap() == 0 {
                loom::thread::yield_now();
            }
        }
        writer.join().unwrap();
        assert!(out[..64].iter().all(|b| *b == 7));
        assert!(out[64..].iter().all(|b| *b == 8));
    });
}
