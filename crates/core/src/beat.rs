use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::BeatId;

/// Position held by [`BeatId::FIRST`]. No other beat may occupy it.
pub const FIRST_BEAT_POSITION: i64 = 0;

/// A row of the `beats` table as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseBeat {
    pub id: BeatId,
    pub position: i64,
    pub duration: f64,
    pub include_in_measure: bool,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A beat as handed to collaborators: ordered, with its offset into the show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Beat {
    pub id: BeatId,
    pub position: i64,
    pub duration: f64,
    pub include_in_measure: bool,
    pub notes: Option<String>,
    /// Index in the position-sorted sequence.
    pub index: usize,
    /// Sum of the durations of every earlier beat, in seconds.
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBeat {
    pub duration: f64,
    pub include_in_measure: bool,
    pub notes: Option<String>,
}

impl NewBeat {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration,
            include_in_measure: true,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_duration(self.duration)
    }
}

/// Partial update of a beat. `None` leaves a column untouched; for `notes`,
/// `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedBeat {
    pub id: BeatId,
    pub duration: Option<f64>,
    pub include_in_measure: Option<bool>,
    pub notes: Option<Option<String>>,
}

impl ModifiedBeat {
    pub fn new(id: BeatId) -> Self {
        Self {
            id,
            duration: None,
            include_in_measure: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self.duration {
            Some(duration) => validate_duration(duration),
            None => Ok(()),
        }
    }
}

fn validate_duration(duration: f64) -> Result<(), CoreError> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(CoreError::InvalidData(format!(
            "beat duration must be a non-negative number, got {duration}"
        )));
    }
    Ok(())
}

/// Sort stored rows by position and attach index and timestamp.
pub fn beats_from_rows(mut rows: Vec<DatabaseBeat>) -> Vec<Beat> {
    rows.sort_by_key(|row| row.position);
    let mut timestamp = 0.0;
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let beat = Beat {
                id: row.id,
                position: row.position,
                duration: row.duration,
                include_in_measure: row.include_in_measure,
                notes: row.notes,
                index,
                timestamp,
            };
            timestamp += row.duration;
            beat
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, position: i64, duration: f64) -> DatabaseBeat {
        DatabaseBeat {
            id: BeatId::new(id),
            position,
            duration,
            include_in_measure: true,
            notes: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn beats_are_sorted_and_timestamped() {
        let beats = beats_from_rows(vec![row(7, 2, 0.5), row(0, 0, 0.0), row(3, 1, 1.0)]);
        let ids: Vec<i64> = beats.iter().map(|b| b.id.get()).collect();
        assert_eq!(ids, vec![0, 3, 7]);
        assert_eq!(beats[2].index, 2);
        assert_eq!(beats[1].timestamp, 0.0);
        assert_eq!(beats[2].timestamp, 1.0);
    }

    #[test]
    fn negative_duration_is_rejected() {
        assert!(NewBeat::with_duration(-0.1).validate().is_err());
        assert!(NewBeat::with_duration(f64::NAN).validate().is_err());
        assert!(NewBeat::with_duration(0.0).validate().is_ok());
    }
}
