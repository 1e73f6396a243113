//! Behavioral-replay detection (spec §4.5.6, step 13): quantizes a mouse
//! path to a coarse spatial/temporal grid, hashes it, and checks a bounded
//! LRU for a prior sighting under a *different* fingerprint.

use parking_lot::Mutex;

use crate::core::constants::{REPLAY_LRU_CAPACITY, REPLAY_SPATIAL_GRID_PX, REPLAY_TEMPORAL_BUCKET_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySample {
    pub x: i64,
    pub y: i64,
    pub t_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// No prior sighting of this quantized path.
    Novel,
    /// Seen before under the same fingerprint — a revisit, not a replay.
    Revisit,
    /// Seen before under a *different* fingerprint — a replayed recording.
    Replayed,
}

pub struct BehavioralReplayDetector {
    seen: Mutex<lru::LruCache<u32, String>>,
}

impl BehavioralReplayDetector {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(lru::LruCache::new(
                std::num::NonZeroUsize::new(REPLAY_LRU_CAPACITY).expect("replay LRU capacity is nonzero"),
            )),
        }
    }

    pub fn check(&self, samples: &[ReplaySample], fingerprint: &str) -> ReplayOutcome {
        if samples.is_empty() {
            return ReplayOutcome::Novel;
        }
        let hash = fnv1a_hash(&quantize(samples));

        let mut seen = self.seen.lock();
        match seen.get(&hash).cloned() {
            Some(first_fp) if first_fp == fingerprint => ReplayOutcome::Revisit,
            Some(_) => ReplayOutcome::Replayed,
            None => {
                seen.put(hash, fingerprint.to_string());
                ReplayOutcome::Novel
            }
        }
    }
}

impl Default for BehavioralReplayDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn quantize(samples: &[ReplaySample]) -> Vec<(i64, i64, i64)> {
    samples
        .iter()
        .map(|s| {
            (
                s.x / REPLAY_SPATIAL_GRID_PX,
                s.y / REPLAY_SPATIAL_GRID_PX,
                s.t_ms / REPLAY_TEMPORAL_BUCKET_MS,
            )
        })
        .collect()
}

/// Non-cryptographic 32-bit FNV-1a over the quantized path's byte
/// representation (spec: "Hash the quantized path (non-cryptographic 32-bit
/// FNV-1a)").
fn fnv1a_hash(path: &[(i64, i64, i64)]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    for (x, y, t) in path {
        for value in [x, y, t] {
            for byte in value.to_le_bytes() {
                hash ^= byte as u32;
                hash = hash.wrapping_mul(PRIME);
            }
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> Vec<ReplaySample> {
        vec![
            ReplaySample { x: 10, y: 20, t_ms: 0 },
            ReplaySample { x: 15, y: 22, t_ms: 80 },
            ReplaySample { x: 30, y: 40, t_ms: 160 },
        ]
    }

    #[test]
    fn first_sighting_is_novel() {
        let detector = BehavioralReplayDetector::new();
        assert_eq!(detector.check(&path(), "fp_a"), ReplayOutcome::Novel);
    }

    #[test]
    fn same_fingerprint_revisiting_is_not_flagged() {
        let detector = BehavioralReplayDetector::new();
        detector.check(&path(), "fp_a");
        assert_eq!(detector.check(&path(), "fp_a"), ReplayOutcome::Revisit);
    }

    #[test]
    fn different_fingerprint_same_path_is_replayed() {
        let detector = BehavioralReplayDetector::new();
        detector.check(&path(), "fp_a");
        assert_eq!(detector.check(&path(), "fp_b"), ReplayOutcome::Replayed);
    }

    #[test]
    fn empty_path_is_novel_and_never_panics() {
        let detector = BehavioralReplayDetector::new();
        assert_eq!(detector.check(&[], "fp_a"), ReplayOutcome::Novel);
    }
}
