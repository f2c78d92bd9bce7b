pub mod audio;
pub mod beat;
pub mod error;
pub mod ids;
pub mod measure;
pub mod page;
pub mod ranges;
pub mod response;
pub mod utility;

pub use audio::{AudioFile, NewAudioFile};
pub use beat::{Beat, DatabaseBeat, ModifiedBeat, NewBeat};
pub use error::CoreError;
pub use ids::*;
pub use measure::{DatabaseMeasure, Measure, ModifiedMeasure, NewMeasure};
pub use page::{DatabasePage, ModifiedPage, NewPage, Page};
pub use response::{DatabaseResponse, ResponseError};
pub use utility::{ModifiedUtility, Utility};
