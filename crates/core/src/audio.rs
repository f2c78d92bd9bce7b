use serde::{Deserialize, Serialize};

use crate::ids::AudioFileId;

/// Metadata of an audio file stored in the show. The bytes are fetched
/// separately since they can be large.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFile {
    pub id: AudioFileId,
    pub path: String,
    pub nickname: Option<String>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAudioFile {
    pub path: String,
    pub nickname: Option<String>,
    pub data: Vec<u8>,
}
