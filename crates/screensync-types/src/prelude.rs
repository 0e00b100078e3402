pub use crate::error::{Error, ScResult};
pub use crate::types::{ConfigDocument, Timestamp, Version};

// vim: ts=4
