use cadence_core::{AudioFile, AudioFileId, ModifiedUtility, NewAudioFile, Utility};
use cadence_storage::tables::{audio, singletons};

use crate::error::EngineError;
use crate::undo::GroupPolicy;
use crate::ShowFile;

impl ShowFile {
    pub fn get_utility(&self) -> Result<Utility, EngineError> {
        Ok(singletons::get_utility(self.conn())?)
    }

    pub fn update_utility(&mut self, modified: &ModifiedUtility) -> Result<Utility, EngineError> {
        self.in_edit_group("update utility", GroupPolicy::NewGroup, |conn| {
            singletons::update_utility(conn, modified)
        })
    }

    pub fn get_field_properties(&self) -> Result<serde_json::Value, EngineError> {
        Ok(singletons::get_field_properties(self.conn())?)
    }

    pub fn update_field_properties(
        &mut self,
        value: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        self.in_edit_group("update field properties", GroupPolicy::NewGroup, |conn| {
            singletons::update_field_properties(conn, value)
        })
    }

    pub fn get_workspace_settings(&self) -> Result<serde_json::Value, EngineError> {
        Ok(singletons::get_workspace_settings(self.conn())?)
    }

    pub fn update_workspace_settings(
        &mut self,
        value: &serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        self.in_edit_group("update workspace settings", GroupPolicy::NewGroup, |conn| {
            singletons::update_workspace_settings(conn, value)
        })
    }

    // Audio is not tracked by history, so no edit group.

    pub fn get_audio_files(&self) -> Result<Vec<AudioFile>, EngineError> {
        Ok(audio::get_audio_files(self.conn())?)
    }

    pub fn create_audio_file(&self, new_file: &NewAudioFile) -> Result<AudioFile, EngineError> {
        Ok(audio::create_audio_file(self.conn(), new_file)?)
    }

    pub fn select_audio_file(&self, id: AudioFileId) -> Result<AudioFile, EngineError> {
        Ok(audio::select_audio_file(self.conn(), id)?)
    }

    pub fn get_selected_audio_data(&self) -> Result<Option<(AudioFile, Vec<u8>)>, EngineError> {
        Ok(audio::get_selected_audio_data(self.conn())?)
    }

    pub fn delete_audio_file(&self, id: AudioFileId) -> Result<AudioFile, EngineError> {
        Ok(audio::delete_audio_file(self.conn(), id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_storage::StorageError;

    #[test]
    fn invalid_utility_is_rejected_without_history() -> Result<(), Box<dyn std::error::Error>> {
        let mut show = ShowFile::open_in_memory()?;
        let bad = ModifiedUtility {
            last_page_counts: Some(0),
            ..Default::default()
        };
        let err = show.update_utility(&bad).unwrap_err();
        assert!(matches!(err, EngineError::Storage(StorageError::Core(_))));
        assert_eq!(show.history_depth()?, (0, 0));
        assert_eq!(show.get_utility()?, Utility::default());
        Ok(())
    }

    #[test]
    fn settings_edits_undo() -> Result<(), Box<dyn std::error::Error>> {
        let mut show = ShowFile::open_in_memory()?;
        show.update_workspace_settings(&serde_json::json!({ "gridLines": true }))?;
        show.update_utility(&ModifiedUtility {
            show_title: Some("Halftime".into()),
            ..Default::default()
        })?;

        show.perform_undo()?;
        assert_eq!(show.get_utility()?.show_title, "");
        assert_eq!(show.get_workspace_settings()?["gridLines"], true);

        show.perform_undo()?;
        assert_eq!(show.get_workspace_settings()?, serde_json::json!({}));
        Ok(())
    }
}
