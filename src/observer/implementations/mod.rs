// Observer implementations organized by rings

// Ring 4: Enrichment - computed fields, timestamps
#[path = "4/touch_timestamps.rs"]
pub mod touch_timestamps;

pub use touch_timestamps::*;
