//! Foreground events and the package identifiers they carry.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of an application (bundle id, package name, window class).
///
/// Compared byte-for-byte: two events belong to the same session only if
/// their package identifiers are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    /// Creates a new PackageId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PackageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Foreground Event
// ============================================================================

/// Kind of an observed foreground transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An application came to the foreground (or the focused window changed).
    AppResumed,
    /// The content of the focused window changed.
    ContentChanged,
    /// Anything else the OS reports; ignored by the tracker.
    Other,
}

impl EventKind {
    /// Parses the wire form, mapping unknown kinds to `Other`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "app_resumed" | "window_state_changed" => Self::AppResumed,
            "content_changed" | "window_content_changed" => Self::ContentChanged,
            _ => Self::Other,
        }
    }

    /// Returns the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppResumed => "app_resumed",
            Self::ContentChanged => "content_changed",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed foreground-app transition.
///
/// Constructed by an event source the instant it observes a transition and
/// consumed once by the session tracker. A `package` of `None` means
/// "nothing is in the foreground" (screen off, lock screen).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundEvent {
    /// What happened
    pub kind: EventKind,
    /// Package now in the foreground, if any
    pub package: Option<PackageId>,
    /// Originating component/class, when the OS reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// When the transition was observed
    pub timestamp: Timestamp,
}

impl ForegroundEvent {
    /// An app-resumed event for `package` at `timestamp`.
    pub fn resumed(package: impl Into<PackageId>, timestamp: Timestamp) -> Self {
        Self {
            kind: EventKind::AppResumed,
            package: Some(package.into()),
            class_name: None,
            timestamp,
        }
    }

    /// A content-changed event reported by `package` at `timestamp`.
    pub fn content_changed(package: impl Into<PackageId>, timestamp: Timestamp) -> Self {
        Self {
            kind: EventKind::ContentChanged,
            package: Some(package.into()),
            class_name: None,
            timestamp,
        }
    }

    /// A "no foreground package" event (screen off, lock screen).
    pub fn nothing_in_foreground(timestamp: Timestamp) -> Self {
        Self {
            kind: EventKind::AppResumed,
            package: None,
            class_name: None,
            timestamp,
        }
    }

    /// Attaches the originating component/class name.
    #[must_use]
    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Returns the package with blank identifiers normalised to `None`.
    pub fn foreground_package(&self) -> Option<&PackageId> {
        self.package.as_ref().filter(|p| !p.is_blank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_id_display_and_eq() {
        let a = PackageId::new("org.mozilla.firefox");
        let b: PackageId = "org.mozilla.firefox".into();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "org.mozilla.firefox");
    }

    #[test]
    fn test_event_kind_from_wire() {
        assert_eq!(EventKind::from_wire("app_resumed"), EventKind::AppResumed);
        assert_eq!(
            EventKind::from_wire("window_state_changed"),
            EventKind::AppResumed
        );
        assert_eq!(
            EventKind::from_wire("content_changed"),
            EventKind::ContentChanged
        );
        assert_eq!(EventKind::from_wire("screen_dimmed"), EventKind::Other);
    }

    #[test]
    fn test_blank_package_is_no_foreground() {
        let mut event = ForegroundEvent::resumed("  ", Timestamp::from_millis(1));
        assert!(event.foreground_package().is_none());

        event.package = Some(PackageId::new("com.example.chat"));
        assert_eq!(
            event.foreground_package().map(PackageId::as_str),
            Some("com.example.chat")
        );
    }

    #[test]
    fn test_event_serialization_skips_missing_class() {
        let event = ForegroundEvent::resumed("com.example.chat", Timestamp::from_millis(42));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"app_resumed\""));
        assert!(json.contains("\"timestamp\":42"));
        assert!(!json.contains("class_name"));

        let parsed: ForegroundEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
