use serde::{Deserialize, Serialize};

use crate::beat::Beat;
use crate::error::CoreError;
use crate::ids::{BeatId, MeasureId};
use crate::ranges::derive_ranges;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMeasure {
    pub id: MeasureId,
    pub start_beat: BeatId,
    pub rehearsal_mark: Option<String>,
    pub notes: Option<String>,
}

/// A measure with its extent resolved against the current beat sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measure {
    pub id: MeasureId,
    /// 1-based, in beat order.
    pub number: usize,
    pub start_beat: BeatId,
    pub rehearsal_mark: Option<String>,
    pub notes: Option<String>,
    pub beats: Vec<Beat>,
    pub duration: f64,
    pub counts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasure {
    pub start_beat: BeatId,
    pub rehearsal_mark: Option<String>,
    pub notes: Option<String>,
}

impl NewMeasure {
    pub fn starting_at(start_beat: BeatId) -> Self {
        Self {
            start_beat,
            rehearsal_mark: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedMeasure {
    pub id: MeasureId,
    pub start_beat: Option<BeatId>,
    pub rehearsal_mark: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

impl ModifiedMeasure {
    pub fn new(id: MeasureId) -> Self {
        Self {
            id,
            start_beat: None,
            rehearsal_mark: None,
            notes: None,
        }
    }
}

/// Build measures from stored rows. `beats` must be sorted by position.
pub fn measures_from_rows(
    rows: &[DatabaseMeasure],
    beats: &[Beat],
) -> Result<Vec<Measure>, CoreError> {
    let starts: Vec<(usize, BeatId)> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (i, row.start_beat))
        .collect();

    let ranges = derive_ranges(beats, &starts)?;
    Ok(ranges
        .into_iter()
        .enumerate()
        .map(|(number, (row_index, range))| {
            let row = &rows[row_index];
            let members = beats[range].to_vec();
            Measure {
                id: row.id,
                number: number + 1,
                start_beat: row.start_beat,
                rehearsal_mark: row.rehearsal_mark.clone(),
                notes: row.notes.clone(),
                duration: members.iter().map(|b| b.duration).sum(),
                counts: members.len(),
                beats: members,
            }
        })
        .collect())
}
