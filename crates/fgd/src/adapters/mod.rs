//! Desktop implementations of the collaborator ports.
//!
//! These are what `fgd` wires in at startup. Tests use in-memory doubles
//! instead.

mod inspector;
mod keep_alive;
mod names;
mod notify;
mod store;
mod usage_log;

pub use inspector::LoggingInspector;
pub use keep_alive::{StatusFileKeepAlive, TrackingStatusFile};
pub use names::TableDisplayNames;
pub use notify::DesktopNotifier;
pub use store::{JsonlSessionStore, LimitsFile};
pub use usage_log::{parse_foreground_output, CommandUsageLog};
