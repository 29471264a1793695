//! Parsing window-focus notifications pushed by desktop hooks.

use chrono::Utc;
use fg_core::{EventKind, ForegroundEvent, PackageId, Timestamp};
use serde::{Deserialize, Serialize};

/// Raw focus notification as sent by a window-manager hook script.
///
/// Hooks are loose about fields: the event name accepts the common aliases
/// and the timestamp is optional (the daemon stamps on receipt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFocusEvent {
    /// `window_state_changed`, `content_changed`, ...
    pub event: String,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
}

impl RawFocusEvent {
    pub fn window_changed(package: impl Into<String>) -> Self {
        Self {
            event: "window_state_changed".to_string(),
            package: Some(package.into()),
            class_name: None,
            timestamp_ms: None,
        }
    }

    pub fn content_changed(package: impl Into<String>) -> Self {
        Self {
            event: "content_changed".to_string(),
            package: Some(package.into()),
            class_name: None,
            timestamp_ms: None,
        }
    }

    /// The event kind, with unknown names mapped to `EventKind::Other`.
    pub fn kind(&self) -> EventKind {
        EventKind::from_wire(&self.event)
    }

    /// Converts to a foreground event, stamping with the current time when
    /// the hook sent none.
    pub fn into_event(self) -> ForegroundEvent {
        let timestamp = self
            .timestamp_ms
            .map(Timestamp::from_millis)
            .unwrap_or_else(|| Timestamp::from(Utc::now()));

        ForegroundEvent {
            kind: self.kind(),
            package: self
                .package
                .filter(|p| !p.trim().is_empty())
                .map(PackageId::new),
            class_name: self.class_name,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_hook_payload() {
        let raw: RawFocusEvent =
            serde_json::from_str(r#"{"event":"window_state_changed","package":"firefox"}"#)
                .unwrap();
        assert_eq!(raw.kind(), EventKind::AppResumed);

        let event = raw.into_event();
        assert_eq!(event.package, Some(PackageId::new("firefox")));
        assert!(event.timestamp.as_millis() > 0);
    }

    #[test]
    fn test_explicit_timestamp_kept() {
        let raw: RawFocusEvent = serde_json::from_str(
            r#"{"event":"content_changed","package":"slack","class_name":"Slack","timestamp_ms":1234}"#,
        )
        .unwrap();
        let event = raw.into_event();
        assert_eq!(event.kind, EventKind::ContentChanged);
        assert_eq!(event.class_name.as_deref(), Some("Slack"));
        assert_eq!(event.timestamp, Timestamp::from_millis(1234));
    }

    #[test]
    fn test_empty_package_means_nothing_focused() {
        let raw = RawFocusEvent {
            event: "window_state_changed".to_string(),
            package: Some(String::new()),
            class_name: None,
            timestamp_ms: Some(5),
        };
        assert_eq!(raw.into_event().package, None);
    }
}
