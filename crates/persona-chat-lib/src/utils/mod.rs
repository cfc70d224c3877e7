use std::sync::Arc;

pub mod logging;

/// Progress callback type for long-running operations.
/// The callback receives a message describing the current step and a progress fraction (0.0..1.0).
pub type ProgressCallback = Arc<dyn Fn(String, f32) + Send + Sync>;
