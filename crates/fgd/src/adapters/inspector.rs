use async_trait::async_trait;
use fg_core::ForegroundEvent;
use tracing::debug;

use crate::ports::{ContentInspector, PortResult};

/// Records content changes of the tracked app in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInspector;

#[async_trait]
impl ContentInspector for LoggingInspector {
    async fn inspect(&self, event: &ForegroundEvent) -> PortResult<()> {
        debug!(
            package = ?event.package,
            class_name = ?event.class_name,
            at = %event.timestamp,
            "Window content changed"
        );
        Ok(())
    }
}
