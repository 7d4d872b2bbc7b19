//! Severity scoring.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight applied to proxy-pattern (to-one) findings over collection ones.
pub const PROXY_MULTIPLIER: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breakpoints for one detector family.
///
/// A finding reaches a level when either its (weighted) count or its total
/// execution time reaches that level's breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityScale {
    pub warning_count: f64,
    pub critical_count: f64,
    pub warning_time_ms: f64,
    pub critical_time_ms: f64,
}

impl SeverityScale {
    pub const fn new(
        warning_count: f64,
        critical_count: f64,
        warning_time_ms: f64,
        critical_time_ms: f64,
    ) -> Self {
        Self {
            warning_count,
            critical_count,
            warning_time_ms,
            critical_time_ms,
        }
    }

    pub fn score(&self, weighted_count: f64, total_time_ms: f64) -> Severity {
        if weighted_count >= self.critical_count || total_time_ms >= self.critical_time_ms {
            Severity::Critical
        } else if weighted_count >= self.warning_count || total_time_ms >= self.warning_time_ms {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    pub(crate) fn is_ordered(&self) -> bool {
        self.warning_count <= self.critical_count && self.warning_time_ms <= self.critical_time_ms
    }
}
