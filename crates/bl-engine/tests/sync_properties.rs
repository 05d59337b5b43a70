//! Randomized and boundary checks for sync math and routine selection

use bl_core::{
    AuxConfig, AuxFormat, AuxPosition, BlError, ByteOrder, DualMonoMode, FeatureFlags,
    FormatDescriptor, NumericRepr, RingCursor,
};
use bl_engine::{
    BlockTiming, SyncEngine, SyncLimits, adapt_rate, detect_desync, select_input, select_output,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const AUX_LEN: usize = 6000;

fn sync_engine() -> SyncEngine {
    SyncEngine::new(&AuxFormat::default(), AUX_LEN, 44100.0, 16384, &AuxConfig::default())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURSOR RANGE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_cursor_stays_in_range_under_random_gaps() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let mut sync = sync_engine();

    for i in 0..20_000 {
        match rng.random_range(0..10) {
            0 => {
                let timing = BlockTiming {
                    first_frame: rng.random_range(0..16384),
                    num_frames: rng.random_range(1..=512),
                    hardware_frame: rng.random_range(0..16384),
                };
                // Readers sit on frame boundaries
                let reader = AuxPosition {
                    offset: rng.random_range(0..AUX_LEN / 2) * 2,
                    loop_count: rng.random_range(0..1000),
                };
                if rng.random_bool(0.3) {
                    sync.mark_restarted();
                }
                sync.resync(&timing, reader);
            }
            1 => {
                // Multi-wrap jumps in either direction
                let gap = rng.random_range(-10_000_000i64..=10_000_000);
                sync.compensate(gap);
            }
            _ => {
                let gap = rng.random_range(-20_000i64..=20_000);
                sync.compensate(gap);
            }
        }

        let cursor = sync.cursor();
        assert!(
            (0..AUX_LEN as i64).contains(&cursor.index),
            "step {i}: cursor {cursor:?} out of range"
        );
        assert_eq!(cursor.index % 2, 0, "step {i}: cursor split a stereo frame");
    }
}

#[test]
fn test_block_sequence_keeps_cursor_in_range() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut sync = sync_engine();
    let mut first = 0usize;
    let mut consumed = 0u64;

    for _ in 0..5_000 {
        // Mostly contiguous blocks, sometimes skipped or repeated ones
        let jump = match rng.random_range(0..20) {
            0 => rng.random_range(0..16384),
            _ => 0,
        };
        first = (first + jump) % 16384;
        consumed += rng.random_range(0..80);
        let reader = AuxPosition {
            offset: (consumed % AUX_LEN as u64) as usize,
            loop_count: consumed / AUX_LEN as u64,
        };
        let timing = BlockTiming {
            first_frame: first,
            num_frames: 128,
            hardware_frame: rng.random_range(0..16384),
        };

        sync.begin_block(&timing, reader, rng.random_bool(0.01));
        let cursor = sync.cursor();
        assert!((0..AUX_LEN as i64).contains(&cursor.index));

        let rate = sync.adaptive_rate();
        assert!((5625..=6375).contains(&rate));
        first = (first + 128) % 16384;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATE ADAPTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_adaptive_rate_bounded() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    for _ in 0..50_000 {
        let nominal = rng.random_range(1000u32..=96_000);
        let lead = rng.random_range(1i64..=1_000_000);
        let distance = match rng.random_range(0..4) {
            0 => i64::MIN,
            1 => i64::MAX,
            _ => rng.random_range(-2_000_000i64..=2_000_000),
        };

        let rate = adapt_rate(distance, lead, nominal);
        assert!(rate >= nominal - nominal / 16 && rate <= nominal + nominal / 16);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESYNC DETECTION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_desync_iff_one_condition_holds() {
    let len = 1000usize;
    let limits = SyncLimits {
        safety_margin: 60,
        max_queued: 600,
    };
    let offsets = [0usize, 1, 59, 60, 61, 399, 400, 401, 599, 600, 601, 940, 999];

    for writer_loop in 0u64..5 {
        for reader_loop in 0u64..5 {
            for &w in &offsets {
                for &r in &offsets {
                    let writer = RingCursor::new(w as i64, writer_loop);
                    let reader = AuxPosition {
                        offset: r,
                        loop_count: reader_loop,
                    };

                    let caught_up = writer_loop == reader_loop && (w as i64 - r as i64) < 60;
                    let lapped = writer_loop > reader_loop + 1;
                    let behind = writer_loop < reader_loop;
                    let queued = (writer_loop as i64 * len as i64 + w as i64)
                        - (reader_loop as i64 * len as i64 + r as i64);
                    let over_queued = queued > 600;
                    let expected = caught_up || lapped || behind || over_queued;

                    assert_eq!(
                        detect_desync(writer, reader, len, &limits).is_some(),
                        expected,
                        "writer ({w}, {writer_loop}) reader ({r}, {reader_loop})"
                    );
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTINE SELECTION
// ═══════════════════════════════════════════════════════════════════════════════

fn all_formats() -> Vec<FormatDescriptor> {
    let mut formats = Vec::new();
    for channels in [1u16, 2, 4] {
        for bit_width in [8u8, 16, 24, 32] {
            for numeric in [NumericRepr::SignedInt, NumericRepr::Float] {
                for byte_order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
                    for mixable in [true, false] {
                        formats.push(FormatDescriptor {
                            channels,
                            bit_width,
                            numeric,
                            byte_order,
                            mixable,
                        });
                    }
                }
            }
        }
    }
    formats
}

fn all_flags() -> Vec<FeatureFlags> {
    let mut flags = Vec::new();
    for bits in 0u32..64 {
        for dual_mono in [
            DualMonoMode::Disabled,
            DualMonoMode::CopyLeftToRight,
            DualMonoMode::CopyRightToLeft,
        ] {
            flags.push(FeatureFlags {
                phase_inversion: bits & 1 != 0,
                right_delay: bits & 2 != 0,
                right_mix_mute: bits & 4 != 0,
                software_gain: bits & 8 != 0,
                aux_attached: bits & 16 != 0,
                balance: if bits & 32 != 0 { -0.5 } else { 0.0 },
                dual_mono,
            });
        }
    }
    flags
}

#[test]
fn test_selection_is_pure_and_total() {
    for format in all_formats() {
        let supported = !format.mixable
            || (format.numeric == NumericRepr::SignedInt && matches!(format.bit_width, 16 | 32));

        for flags in all_flags() {
            let out = select_output(&format, &flags);
            let input = select_input(&format, &flags);

            if supported {
                let out = out.unwrap();
                let input = input.unwrap();
                assert_eq!(select_output(&format, &flags).unwrap(), out);
                assert_eq!(select_input(&format, &flags).unwrap(), input);
            } else {
                assert!(matches!(out, Err(BlError::FormatUnsupported(_))), "{format:?}");
                assert!(matches!(input, Err(BlError::FormatUnsupported(_))), "{format:?}");
            }
        }
    }
}
