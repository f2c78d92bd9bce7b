use std::collections::BTreeSet;

use cadence_core::beat::beats_from_rows;
use cadence_core::measure::measures_from_rows;
use cadence_core::page::pages_from_rows;
use cadence_core::{
    Beat, BeatId, DatabaseBeat, DatabaseMeasure, DatabasePage, Measure, MeasureId,
    ModifiedBeat, ModifiedMeasure, ModifiedPage, NewBeat, NewMeasure, NewPage, Page, PageId,
};
use cadence_storage::tables::{beats, measures, pages};

use crate::error::EngineError;
use crate::undo::GroupPolicy;
use crate::ShowFile;

impl ShowFile {
    // -- Beats --

    /// All beats in order, the first beat included, with their timestamps.
    pub fn get_beats(&self) -> Result<Vec<Beat>, EngineError> {
        Ok(beats_from_rows(beats::get_beats(self.conn())?))
    }

    /// Insert beats after the last beat, or right after position `starting`.
    pub fn create_beats(
        &mut self,
        new_beats: &[NewBeat],
        starting: Option<i64>,
    ) -> Result<Vec<DatabaseBeat>, EngineError> {
        self.in_edit_group("create beats", GroupPolicy::NewGroup, |conn| {
            beats::create_beats(conn, new_beats, starting)
        })
    }

    pub fn update_beats(
        &mut self,
        modified: &[ModifiedBeat],
    ) -> Result<Vec<DatabaseBeat>, EngineError> {
        self.in_edit_group("update beats", GroupPolicy::NewGroup, |conn| {
            beats::update_beats(conn, modified)
        })
    }

    /// Delete beats and close the gaps. Measures and pages starting on a
    /// deleted beat go with it.
    pub fn delete_beats(
        &mut self,
        ids: &BTreeSet<BeatId>,
    ) -> Result<Vec<DatabaseBeat>, EngineError> {
        self.in_edit_group("delete beats", GroupPolicy::NewGroup, |conn| {
            beats::delete_beats(conn, ids)
        })
    }

    pub fn shift_beats(
        &mut self,
        starting_position: i64,
        shift_amount: i64,
        policy: GroupPolicy,
    ) -> Result<Vec<DatabaseBeat>, EngineError> {
        self.in_edit_group("shift beats", policy, |conn| {
            beats::shift_beats(conn, starting_position, shift_amount)
        })
    }

    pub fn flatten_order(&mut self) -> Result<Vec<DatabaseBeat>, EngineError> {
        self.in_edit_group("flatten beat order", GroupPolicy::NewGroup, beats::flatten_order)
    }

    // -- Measures --

    pub fn get_measures(&self) -> Result<Vec<Measure>, EngineError> {
        let beats = self.get_beats()?;
        Ok(measures_from_rows(&measures::get_measures(self.conn())?, &beats)?)
    }

    pub fn create_measures(
        &mut self,
        new_measures: &[NewMeasure],
    ) -> Result<Vec<DatabaseMeasure>, EngineError> {
        self.in_edit_group("create measures", GroupPolicy::NewGroup, |conn| {
            measures::create_measures(conn, new_measures)
        })
    }

    pub fn update_measures(
        &mut self,
        modified: &[ModifiedMeasure],
    ) -> Result<Vec<DatabaseMeasure>, EngineError> {
        self.in_edit_group("update measures", GroupPolicy::NewGroup, |conn| {
            measures::update_measures(conn, modified)
        })
    }

    pub fn delete_measures(
        &mut self,
        ids: &BTreeSet<MeasureId>,
    ) -> Result<Vec<DatabaseMeasure>, EngineError> {
        self.in_edit_group("delete measures", GroupPolicy::NewGroup, |conn| {
            measures::delete_measures(conn, ids)
        })
    }

    // -- Pages --

    pub fn get_pages(&self) -> Result<Vec<Page>, EngineError> {
        let beats = self.get_beats()?;
        let measures = measures_from_rows(&measures::get_measures(self.conn())?, &beats)?;
        Ok(pages_from_rows(&pages::get_pages(self.conn())?, &beats, &measures)?)
    }

    pub fn create_pages(&mut self, new_pages: &[NewPage]) -> Result<Vec<DatabasePage>, EngineError> {
        self.in_edit_group("create pages", GroupPolicy::NewGroup, |conn| {
            pages::create_pages(conn, new_pages)
        })
    }

    pub fn update_pages(
        &mut self,
        modified: &[ModifiedPage],
    ) -> Result<Vec<DatabasePage>, EngineError> {
        self.in_edit_group("update pages", GroupPolicy::NewGroup, |conn| {
            pages::update_pages(conn, modified)
        })
    }

    pub fn delete_pages(
        &mut self,
        ids: &BTreeSet<PageId>,
    ) -> Result<Vec<DatabasePage>, EngineError> {
        self.in_edit_group("delete pages", GroupPolicy::NewGroup, |conn| {
            pages::delete_pages(conn, ids)
        })
    }
}
