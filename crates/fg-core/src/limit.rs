//! Per-package usage limits and escalation thresholds.

use crate::{DomainError, DomainResult, PackageId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Raw limit row as stored by the persistence collaborator.
///
/// Unvalidated: convert with [`LimitedAppConfig::try_from`] before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitEntry {
    pub package: String,
    pub limit_ms: i64,
}

impl LimitEntry {
    pub fn new(package: impl Into<String>, limit_ms: i64) -> Self {
        Self {
            package: package.into(),
            limit_ms,
        }
    }
}

/// A validated continuous-usage ceiling for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitedAppConfig {
    package: PackageId,
    limit: Duration,
}

impl LimitedAppConfig {
    /// Creates a config, rejecting empty packages and non-positive limits.
    pub fn new(package: impl Into<PackageId>, limit_ms: i64) -> DomainResult<Self> {
        let package = package.into();
        if package.is_blank() {
            return Err(DomainError::EmptyPackage);
        }
        let limit = u64::try_from(limit_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| DomainError::NonPositiveLimit {
                package: package.to_string(),
                limit_ms,
            })?;

        Ok(Self { package, limit })
    }

    pub fn package(&self) -> &PackageId {
        &self.package
    }

    /// The configured limit (always non-zero).
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Elapsed time at which `escalation` fires.
    pub fn threshold(&self, escalation: Escalation) -> Duration {
        self.limit.saturating_mul(escalation.multiplier())
    }
}

impl TryFrom<LimitEntry> for LimitedAppConfig {
    type Error = DomainError;

    fn try_from(entry: LimitEntry) -> DomainResult<Self> {
        Self::new(entry.package, entry.limit_ms)
    }
}

// ============================================================================
// Escalation
// ============================================================================

/// Escalation steps, in ascending threshold order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// Soft warning once the limit is reached.
    Warning,
    /// Hard intervention at three times the limit.
    Intervention,
}

impl Escalation {
    /// All steps, lowest threshold first.
    pub const ALL: [Escalation; 2] = [Escalation::Warning, Escalation::Intervention];

    /// Multiple of the configured limit at which this step fires.
    pub const fn multiplier(self) -> u32 {
        match self {
            Self::Warning => 1,
            Self::Intervention => 3,
        }
    }
}

impl fmt::Display for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Intervention => write!(f, "intervention"),
        }
    }
}

/// Whether an escalation step has fired in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdState {
    #[default]
    NotTriggered,
    Triggered,
}

impl ThresholdState {
    pub fn is_triggered(self) -> bool {
        matches!(self, Self::Triggered)
    }
}
