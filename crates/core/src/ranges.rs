//! Extent computation for range entities (measures, pages).
//!
//! A range entity only stores the beat it starts on. Its members are the
//! beats from that start up to the next range's start, or to the end of the
//! sequence for the last one.

use std::collections::HashMap;
use std::ops::Range;

use crate::beat::Beat;
use crate::error::CoreError;
use crate::ids::BeatId;

/// Resolve each `(key, start_beat)` pair into a range of indices into `beats`.
///
/// `beats` must already be sorted by position. The result is ordered by the
/// start beat's position. Fails if a start beat does not exist or two
/// entities share a start beat.
pub fn derive_ranges<K: Copy>(
    beats: &[Beat],
    starts: &[(K, BeatId)],
) -> Result<Vec<(K, Range<usize>)>, CoreError> {
    let index_of: HashMap<BeatId, usize> = beats
        .iter()
        .enumerate()
        .map(|(i, beat)| (beat.id, i))
        .collect();

    let mut resolved = Vec::with_capacity(starts.len());
    for (key, start_beat) in starts {
        let index = index_of.get(start_beat).copied().ok_or_else(|| {
            CoreError::InvalidData(format!("start beat {start_beat} does not exist"))
        })?;
        resolved.push((*key, index));
    }
    resolved.sort_by_key(|(_, index)| *index);

    for pair in resolved.windows(2) {
        if pair[0].1 == pair[1].1 {
            return Err(CoreError::InvalidData(format!(
                "two ranges start on beat {}",
                beats[pair[0].1].id
            )));
        }
    }

    let mut ranges = Vec::with_capacity(resolved.len());
    for (i, (key, start)) in resolved.iter().enumerate() {
        let end = resolved
            .get(i + 1)
            .map(|(_, next)| *next)
            .unwrap_or(beats.len());
        ranges.push((*key, *start..end));
    }
    Ok(ranges)
}

/// Whether two index ranges share at least one beat.
pub fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beat::{DatabaseBeat, beats_from_rows};

    fn beats(n: i64) -> Vec<Beat> {
        beats_from_rows(
            (0..n)
                .map(|i| DatabaseBeat {
                    id: BeatId::new(i * 10),
                    position: i,
                    duration: 0.5,
                    include_in_measure: true,
                    notes: None,
                    created_at: String::new(),
                    updated_at: String::new(),
                })
                .collect(),
        )
    }

    #[test]
    fn ranges_slice_between_starts() {
        let beats = beats(6);
        let ranges = derive_ranges(&beats, &[("b", BeatId::new(30)), ("a", BeatId::new(0))])
            .expect("ranges");
        assert_eq!(ranges, vec![("a", 0..3), ("b", 3..6)]);
    }

    #[test]
    fn missing_start_beat_is_an_error() {
        let beats = beats(3);
        let err = derive_ranges(&beats, &[(1, BeatId::new(999))]).unwrap_err();
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn shared_start_beat_is_an_error() {
        let beats = beats(3);
        assert!(derive_ranges(&beats, &[(1, BeatId::new(10)), (2, BeatId::new(10))]).is_err());
    }

    #[test]
    fn empty_sequence_yields_no_ranges() {
        let ranges = derive_ranges::<i64>(&[], &[]).expect("ranges");
        assert!(ranges.is_empty());
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(overlaps(&(0..3), &(2..5)));
        assert!(!overlaps(&(0..3), &(3..5)));
    }
}
