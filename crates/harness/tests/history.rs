use std::collections::BTreeSet;

use cadence_core::{BeatId, ModifiedBeat, ModifiedPage, NewMeasure, NewPage, PageId};
use cadence_engine::{EngineError, GroupPolicy};
use cadence_harness::TestShow;
use cadence_storage::{HistoryOutcome, StorageConfig, StorageError};

// ============================================================================
// Undo / redo
// ============================================================================

#[test]
fn undo_reports_the_tables_it_touched() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    let beats = t.add_beats(4)?;
    t.show.create_measures(&[NewMeasure::starting_at(beats[0].id)])?;
    t.show.delete_beats(&BTreeSet::from([beats[0].id]))?;
    assert!(t.show.get_measures()?.is_empty());

    let HistoryOutcome::Applied { tables, .. } = t.show.perform_undo()? else {
        panic!("nothing was undone");
    };
    assert_eq!(
        tables,
        BTreeSet::from(["beats".to_string(), "measures".to_string()])
    );
    assert_eq!(t.show.get_measures()?.len(), 1);
    assert_eq!(t.positions()?, vec![1, 2, 3, 4]);
    Ok(())
}

#[test]
fn new_edit_discards_the_redo_log() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    t.add_beats(2)?;
    t.add_beats(1)?;

    t.show.perform_undo()?;
    assert_eq!(t.show.history_depth()?, (1, 1));

    t.add_beats(5)?;
    assert_eq!(t.show.history_depth()?, (2, 0));
    assert_eq!(t.show.perform_redo()?, HistoryOutcome::Empty);
    assert_eq!(t.positions()?.len(), 7);
    Ok(())
}

#[test]
fn redo_takes_the_most_recently_undone_edit() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    let beats = t.add_beats(1)?;
    let mut first = ModifiedBeat::new(beats[0].id);
    first.duration = Some(1.0);
    t.show.update_beats(&[first])?;
    let mut second = ModifiedBeat::new(beats[0].id);
    second.duration = Some(2.0);
    t.show.update_beats(&[second])?;

    t.show.perform_undo()?;
    t.show.perform_undo()?;
    assert_eq!(t.show.get_beats()?[1].duration, 0.5);

    t.show.perform_redo()?;
    assert_eq!(t.show.get_beats()?[1].duration, 1.0);
    t.show.perform_redo()?;
    assert_eq!(t.show.get_beats()?[1].duration, 2.0);
    Ok(())
}

#[test]
fn page_edits_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    let beats = t.add_beats(6)?;
    let created = t.show.create_pages(&[NewPage::starting_at(beats[2].id)])?;

    let mut moved = ModifiedPage::new(created[0].id);
    moved.start_beat = Some(beats[4].id);
    moved.is_subset = Some(true);
    t.show.update_pages(&[moved])?;
    assert_eq!(t.show.get_pages()?[1].name, "0A");

    t.show.perform_undo()?;
    let pages = t.show.get_pages()?;
    assert_eq!(pages[1].start_beat, beats[2].id);
    assert_eq!(pages[1].name, "1");

    t.show.perform_redo()?;
    assert_eq!(t.show.get_pages()?[1].start_beat, beats[4].id);
    Ok(())
}

#[test]
fn history_survives_reopening() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    t.add_beats(3)?;
    t.show.shift_beats(2, 1, GroupPolicy::NewGroup)?;

    let mut t = t.reopen()?;
    assert_eq!(t.show.history_depth()?, (2, 0));
    t.show.perform_undo()?;
    assert_eq!(t.positions()?, vec![1, 2, 3]);

    t.add_beats(1)?;
    let stats = t.show.history_stats()?;
    assert_eq!(stats.undo_groups, 2);
    assert!(stats.current_group >= 2);
    Ok(())
}

#[test]
fn group_limit_drops_the_oldest_edits() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::with_config(StorageConfig {
        undo_group_limit: 3,
        ..TestShow::config()
    })?;
    for _ in 0..5 {
        t.add_beats(1)?;
    }
    assert_eq!(t.show.history_depth()?, (3, 0));

    while t.show.perform_undo()?.is_applied() {}
    assert_eq!(t.positions()?, vec![1, 2]);
    Ok(())
}

#[test]
fn rejected_and_empty_edits_keep_the_undo_history() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::with_config(StorageConfig {
        undo_group_limit: 3,
        ..TestShow::config()
    })?;
    for _ in 0..3 {
        t.add_beats(1)?;
    }
    assert_eq!(t.show.history_depth()?, (3, 0));

    assert!(t.show.delete_beats(&BTreeSet::from([BeatId::FIRST])).is_err());
    assert!(t.show.flatten_order()?.is_empty());
    assert!(t.show.shift_beats(1, 0, GroupPolicy::NewGroup)?.is_empty());
    assert_eq!(t.show.history_depth()?, (3, 0));

    while t.show.perform_undo()?.is_applied() {}
    assert!(t.positions()?.is_empty());
    Ok(())
}

#[test]
fn joining_after_a_rejected_edit_extends_the_previous_one() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    t.add_beats(2)?;
    t.add_beats(1)?;

    assert!(t.show.delete_beats(&BTreeSet::from([BeatId::FIRST])).is_err());
    t.show.shift_beats(1, 1, GroupPolicy::JoinCurrent)?;
    assert_eq!(t.positions()?, vec![2, 3, 4]);
    assert_eq!(t.show.history_depth()?, (2, 0));

    t.show.perform_undo()?;
    assert_eq!(t.positions()?, vec![1, 2]);
    Ok(())
}

#[test]
fn manual_groups_bundle_joined_actions() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    t.add_beats(2)?;

    let group = t.show.increment_edit_group()?;
    t.show.shift_beats(1, 1, GroupPolicy::JoinCurrent)?;
    t.show.shift_beats(1, 1, GroupPolicy::JoinCurrent)?;
    assert_eq!(t.show.history_stats()?.current_group, group);
    assert_eq!(t.positions()?, vec![3, 4]);

    t.show.perform_undo()?;
    assert_eq!(t.positions()?, vec![1, 2]);
    Ok(())
}

// ============================================================================
// Protected rows
// ============================================================================

#[test]
fn first_beat_cannot_change() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    t.add_beats(2)?;
    let depth = t.show.history_depth()?;

    let mut change = ModifiedBeat::new(BeatId::FIRST);
    change.duration = Some(3.0);
    let err = t.show.update_beats(&[change]).unwrap_err();
    assert_eq!(err.to_string(), "Modification not allowed for the first beat.");

    let err = t.show.shift_beats(0, 1, GroupPolicy::NewGroup).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::ConstraintViolation(_))
    ));

    let first = &t.show.get_beats()?[0];
    assert_eq!((first.id, first.position, first.duration), (BeatId::FIRST, 0, 0.0));
    assert_eq!(t.show.history_depth()?, depth);
    Ok(())
}

#[test]
fn first_page_keeps_its_start() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    let beats = t.add_beats(2)?;

    let mut moved = ModifiedPage::new(PageId::FIRST);
    moved.start_beat = Some(beats[0].id);
    let err = t.show.update_pages(&[moved]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Modification not allowed for the first page's start beat."
    );

    let err = t
        .show
        .delete_pages(&BTreeSet::from([PageId::FIRST]))
        .unwrap_err();
    assert_eq!(err.to_string(), "Deletion not allowed for the first page.");

    // Notes on the first page are not protected.
    let mut noted = ModifiedPage::new(PageId::FIRST);
    noted.notes = Some(Some("opener".into()));
    t.show.update_pages(&[noted])?;
    assert_eq!(t.show.get_pages()?[0].notes.as_deref(), Some("opener"));
    Ok(())
}
