//! Collaborator interfaces consumed by the tracking components.
//!
//! The OS usage log, session storage, notification surface and keep-alive
//! mechanism are all external to the tracker. Each is a trait object so the
//! daemon can plug in desktop adapters (see [`crate::adapters`]) and tests
//! can plug in recorders.

use std::time::Duration;

use async_trait::async_trait;
use fg_core::{ForegroundEvent, LimitEntry, LimitedAppConfig, PackageId, SessionRecord, Timestamp};
use thiserror::Error;

/// Failure reported by a collaborator.
///
/// Always treated as transient by the callers: logged and swallowed.
#[derive(Debug, Clone, Error)]
pub enum PortError {
    /// I/O against the OS or storage failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The collaborator is not available on this system
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Data returned by the collaborator could not be understood
    #[error("malformed data: {0}")]
    Malformed(String),

    /// A lookup found nothing
    #[error("not found: {0}")]
    NotFound(String),
}

impl PortError {
    /// Creates an I/O error from any displayable error.
    pub fn io<E: std::fmt::Display>(err: E) -> Self {
        Self::Io(err.to_string())
    }
}

pub type PortResult<T> = Result<T, PortError>;

/// Pull-style OS log of foreground events.
#[async_trait]
pub trait UsageLog: Send + Sync {
    /// Events in `[start, end)`, in non-decreasing timestamp order.
    async fn query(&self, start: Timestamp, end: Timestamp) -> PortResult<Vec<ForegroundEvent>>;
}

/// Durable storage of sessions and limit settings.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn record_session(&self, record: &SessionRecord) -> PortResult<()>;

    /// All configured limits, unvalidated.
    async fn limited_apps(&self) -> PortResult<Vec<LimitEntry>>;
}

/// User-facing escalation surface.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show_warning(
        &self,
        config: &LimitedAppConfig,
        display_name: &str,
        elapsed: Duration,
    ) -> PortResult<()>;

    async fn bring_app_to_foreground(&self, package: &PackageId) -> PortResult<()>;

    async fn show_dissuasion_message(&self, display_name: &str) -> PortResult<()>;
}

/// Maps package identifiers to human-readable names.
pub trait DisplayNameResolver: Send + Sync {
    fn resolve(&self, package: &PackageId) -> PortResult<String>;
}

/// Resolves a display name, falling back to the raw package identifier.
pub fn display_name_or_package(resolver: &dyn DisplayNameResolver, package: &PackageId) -> String {
    match resolver.resolve(package) {
        Ok(name) if !name.trim().is_empty() => name,
        Ok(_) => package.to_string(),
        Err(e) => {
            tracing::debug!(package = %package, error = %e, "Display name lookup failed");
            package.to_string()
        }
    }
}

/// Inspects the focused window's content when it changes.
#[async_trait]
pub trait ContentInspector: Send + Sync {
    async fn inspect(&self, event: &ForegroundEvent) -> PortResult<()>;
}

/// OS-level "keep this process alive" status.
pub trait KeepAlive: Send + Sync {
    fn acquire(&self) -> PortResult<()>;
    fn release(&self) -> PortResult<()>;
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Names;

    impl DisplayNameResolver for Names {
        fn resolve(&self, package: &PackageId) -> PortResult<String> {
            match package.as_str() {
                "org.mozilla.firefox" => Ok("Firefox".to_string()),
                "blank" => Ok("  ".to_string()),
                other => Err(PortError::NotFound(other.to_string())),
            }
        }
    }

    #[test]
    fn test_display_name_resolved() {
        assert_eq!(
            display_name_or_package(&Names, &PackageId::new("org.mozilla.firefox")),
            "Firefox"
        );
    }

    #[test]
    fn test_display_name_falls_back_to_package() {
        assert_eq!(
            display_name_or_package(&Names, &PackageId::new("com.unknown")),
            "com.unknown"
        );
        assert_eq!(display_name_or_package(&Names, &PackageId::new("blank")), "blank");
    }

    #[test]
    fn test_port_error_display() {
        assert_eq!(PortError::io("disk full").to_string(), "I/O error: disk full");
        assert_eq!(
            PortError::Unavailable("xdotool".to_string()).to_string(),
            "unavailable: xdotool"
        );
    }
}
