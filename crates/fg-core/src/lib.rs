//! focusguard core - shared types for foreground session tracking
//!
//! This crate provides the domain types shared between the daemon (`fgd`),
//! its wire protocol and the control client (`fgctl`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod event;
pub mod limit;
pub mod session;
pub mod time;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use event::{EventKind, ForegroundEvent, PackageId};
pub use limit::{Escalation, LimitEntry, LimitedAppConfig, ThresholdState};
pub use session::{ActiveSession, SessionRecord};
pub use time::Timestamp;
