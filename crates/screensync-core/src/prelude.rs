pub use screensync_types::error::{Error, ScResult};
pub use screensync_types::types::Timestamp;

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
