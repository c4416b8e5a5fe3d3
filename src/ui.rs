//! Progress reporting.

use tracing::info;

/// Sink for human-readable progress lines.
///
/// Purely informational; nothing reads it back for control flow.
pub trait Ui: Send + Sync {
    /// Reports a top-level step.
    fn say(&self, message: &str);

    /// Reports detail beneath the current step.
    fn message(&self, message: &str);
}

/// [`Ui`] that writes through `tracing` at INFO level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        info!("==> {}", message);
    }

    fn message(&self, message: &str) {
        info!("    {}", message);
    }
}
