use serde::{Deserialize, Serialize};

use crate::beat::Beat;
use crate::error::CoreError;
use crate::ids::{BeatId, MeasureId, PageId};
use crate::measure::Measure;
use crate::ranges::{derive_ranges, overlaps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabasePage {
    pub id: PageId,
    pub start_beat: BeatId,
    pub is_subset: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub id: PageId,
    /// Display name: "0", "1", "1A", "1B", "2", ...
    pub name: String,
    pub start_beat: BeatId,
    pub is_subset: bool,
    pub notes: Option<String>,
    pub beats: Vec<Beat>,
    /// Measures sharing at least one beat with this page.
    pub measure_ids: Vec<MeasureId>,
    pub duration: f64,
    pub counts: usize,
    pub timestamp: f64,
    pub previous_page_id: Option<PageId>,
    pub next_page_id: Option<PageId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPage {
    pub start_beat: BeatId,
    pub is_subset: bool,
    pub notes: Option<String>,
}

impl NewPage {
    pub fn starting_at(start_beat: BeatId) -> Self {
        Self {
            start_beat,
            is_subset: false,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedPage {
    pub id: PageId,
    pub start_beat: Option<BeatId>,
    pub is_subset: Option<bool>,
    pub notes: Option<Option<String>>,
}

impl ModifiedPage {
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            start_beat: None,
            is_subset: None,
            notes: None,
        }
    }
}

/// Build pages from stored rows. `beats` must be sorted by position and
/// `measures` must have been derived from the same beats.
pub fn pages_from_rows(
    rows: &[DatabasePage],
    beats: &[Beat],
    measures: &[Measure],
) -> Result<Vec<Page>, CoreError> {
    let starts: Vec<(usize, BeatId)> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (i, row.start_beat))
        .collect();
    let ranges = derive_ranges(beats, &starts)?;

    let measure_ranges: Vec<(MeasureId, std::ops::Range<usize>)> = measures
        .iter()
        .filter_map(|m| m.beats.first().map(|b| (m.id, b.index..b.index + m.counts)))
        .collect();

    let ordered_ids: Vec<PageId> = ranges.iter().map(|(i, _)| rows[*i].id).collect();
    let mut namer = PageNamer::default();
    let mut pages = Vec::with_capacity(ranges.len());

    for (order, (row_index, range)) in ranges.into_iter().enumerate() {
        let row = &rows[row_index];
        let members = beats[range.clone()].to_vec();
        let measure_ids = measure_ranges
            .iter()
            .filter(|(_, m)| overlaps(m, &range))
            .map(|(id, _)| *id)
            .collect();

        pages.push(Page {
            id: row.id,
            name: namer.next(order, row.is_subset),
            start_beat: row.start_beat,
            is_subset: row.is_subset,
            notes: row.notes.clone(),
            measure_ids,
            duration: members.iter().map(|b| b.duration).sum(),
            counts: members.len(),
            timestamp: members.first().map(|b| b.timestamp).unwrap_or_default(),
            previous_page_id: order.checked_sub(1).map(|i| ordered_ids[i]),
            next_page_id: ordered_ids.get(order + 1).copied(),
            beats: members,
        });
    }
    Ok(pages)
}

#[derive(Default)]
struct PageNamer {
    number: usize,
    subset: usize,
}

impl PageNamer {
    fn next(&mut self, order: usize, is_subset: bool) -> String {
        if order > 0 && is_subset {
            self.subset += 1;
            return format!("{}{}", self.number, subset_suffix(self.subset));
        }
        if order > 0 {
            self.number += 1;
        }
        self.subset = 0;
        self.number.to_string()
    }
}

/// 1 -> "A", 26 -> "Z", 27 -> "AA".
fn subset_suffix(mut n: usize) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beat::{DatabaseBeat, beats_from_rows};
    use crate::measure::{DatabaseMeasure, measures_from_rows};

    fn sequence(n: i64) -> Vec<Beat> {
        beats_from_rows(
            (0..n)
                .map(|i| DatabaseBeat {
                    id: BeatId::new(i),
                    position: i,
                    duration: if i == 0 { 0.0 } else { 0.5 },
                    include_in_measure: true,
                    notes: None,
                    created_at: String::new(),
                    updated_at: String::new(),
                })
                .collect(),
        )
    }

    fn page(id: i64, start: i64, is_subset: bool) -> DatabasePage {
        DatabasePage {
            id: PageId::new(id),
            start_beat: BeatId::new(start),
            is_subset,
            notes: None,
        }
    }

    #[test]
    fn pages_are_named_with_subset_letters() {
        let beats = sequence(10);
        let rows = [
            page(0, 0, false),
            page(1, 1, false),
            page(2, 3, true),
            page(3, 5, true),
            page(4, 7, false),
        ];
        let pages = pages_from_rows(&rows, &beats, &[]).expect("pages");
        let names: Vec<&str> = pages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "1A", "1B", "2"]);
    }

    #[test]
    fn page_extent_and_links() {
        let beats = sequence(9);
        let measures = measures_from_rows(
            &[
                DatabaseMeasure {
                    id: MeasureId::new(1),
                    start_beat: BeatId::new(1),
                    rehearsal_mark: None,
                    notes: None,
                },
                DatabaseMeasure {
                    id: MeasureId::new(2),
                    start_beat: BeatId::new(5),
                    rehearsal_mark: None,
                    notes: None,
                },
            ],
            &beats,
        )
        .expect("measures");
        let pages =
            pages_from_rows(&[page(0, 0, false), page(7, 1, false), page(8, 6, false)], &beats, &measures)
                .expect("pages");

        assert_eq!(pages[0].counts, 1);
        assert_eq!(pages[0].duration, 0.0);
        assert!(pages[0].measure_ids.is_empty());
        assert_eq!(pages[1].counts, 5);
        assert_eq!(pages[1].measure_ids, vec![MeasureId::new(1), MeasureId::new(2)]);
        assert_eq!(pages[1].timestamp, 0.0);
        assert_eq!(pages[2].timestamp, 2.5);
        assert_eq!(pages[2].previous_page_id, Some(PageId::new(7)));
        assert_eq!(pages[2].next_page_id, None);
        assert_eq!(pages[0].next_page_id, Some(PageId::new(7)));
    }

    #[test]
    fn suffixes_roll_over() {
        assert_eq!(subset_suffix(1), "A");
        assert_eq!(subset_suffix(26), "Z");
        assert_eq!(subset_suffix(27), "AA");
    }
}
