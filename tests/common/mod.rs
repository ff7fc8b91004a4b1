mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from labelview for tests
pub use labelview::{Error, ModelStatus, ServiceErrorKind};
