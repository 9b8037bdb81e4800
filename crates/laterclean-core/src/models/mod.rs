mod progress;
mod settings;
mod stats;

pub use progress::{watch_percentage, ProgressBand, ProgressRecord};
pub use settings::Settings;
pub use stats::{time_saved_secs, whole_minutes, Stats};
