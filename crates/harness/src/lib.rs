mod legacy;
mod show;

pub use legacy::{LegacyShow, write_legacy_v1};
pub use show::TestShow;
