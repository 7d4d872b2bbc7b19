//! Inspection settings.
//!
//! Every field has a default, so an empty document is a valid config. Detector
//! sections leave `threshold` and `severity` unset unless overridden; the
//! family defaults below apply in that case.

use crate::error::{InspectError, InspectResult};
use crate::severity::SeverityScale;
use serde::{Deserialize, Serialize};

/// Built-in threshold and severity scale for a detector family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorDefaults {
    pub threshold: usize,
    pub scale: SeverityScale,
}

pub const N_PLUS_ONE_DEFAULTS: DetectorDefaults = DetectorDefaults {
    threshold: 5,
    scale: SeverityScale::new(10.0, 30.0, 200.0, 1000.0),
};

pub const LAZY_LOADING_DEFAULTS: DetectorDefaults = DetectorDefaults {
    threshold: 10,
    scale: SeverityScale::new(20.0, 50.0, 300.0, 1500.0),
};

pub const NESTED_DEFAULTS: DetectorDefaults = DetectorDefaults {
    threshold: 3,
    scale: SeverityScale::new(10.0, 40.0, 200.0, 1000.0),
};

pub const BULK_DEFAULTS: DetectorDefaults = DetectorDefaults {
    threshold: 20,
    scale: SeverityScale::new(50.0, 200.0, 500.0, 2000.0),
};

pub const CACHING_DEFAULTS: DetectorDefaults = DetectorDefaults {
    threshold: 3,
    scale: SeverityScale::new(10.0, 50.0, 100.0, 1000.0),
};

fn default_true() -> bool {
    true
}

/// `[n_plus_one]`, `[lazy_loading]`, `[nested]`, `[bulk]`, `[caching]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub threshold: Option<usize>,
    #[serde(default)]
    pub severity: Option<SeverityScale>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: None,
            severity: None,
        }
    }
}

impl DetectorConfig {
    pub fn threshold_or(&self, defaults: DetectorDefaults) -> usize {
        self.threshold.unwrap_or(defaults.threshold)
    }

    pub fn scale_or(&self, defaults: DetectorDefaults) -> SeverityScale {
        self.severity.unwrap_or(defaults.scale)
    }

    fn validate(&self, section: &str) -> InspectResult<()> {
        if self.threshold == Some(0) {
            return Err(InspectError::config(format!(
                "[{section}] threshold must be at least 1"
            )));
        }
        if let Some(scale) = &self.severity {
            if !scale.is_ordered() {
                return Err(InspectError::config(format!(
                    "[{section}.severity] warning breakpoints must not exceed critical ones"
                )));
            }
        }
        Ok(())
    }
}

/// `[joins]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub enabled: bool,
    pub max_joins: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_joins: 5,
        }
    }
}

/// `[slow_query]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowQueryConfig {
    pub enabled: bool,
    pub threshold_ms: f64,
    pub critical_ms: f64,
}

impl Default for SlowQueryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_ms: 100.0,
            critical_ms: 1000.0,
        }
    }
}

/// Which execution-plan vocabulary EXPLAIN output is judged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainStrategyKind {
    #[default]
    Mysql,
    Postgres,
}

/// `[missing_index]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingIndexConfig {
    pub enabled: bool,
    pub strategy: ExplainStrategyKind,
    pub min_count: usize,
    pub min_execution_ms: f64,
    pub max_explains: usize,
}

impl Default for MissingIndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: ExplainStrategyKind::default(),
            min_count: 3,
            min_execution_ms: 50.0,
            max_explains: 20,
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Clear the analysis cache at the start of every run.
    pub reset_per_run: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            reset_per_run: true,
        }
    }
}

/// `[report]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Sample queries kept per finding.
    pub max_samples: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { max_samples: 3 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectConfig {
    pub n_plus_one: DetectorConfig,
    pub lazy_loading: DetectorConfig,
    pub nested: DetectorConfig,
    pub bulk: DetectorConfig,
    pub caching: DetectorConfig,
    pub joins: JoinConfig,
    pub slow_query: SlowQueryConfig,
    pub missing_index: MissingIndexConfig,
    pub cache: CacheConfig,
    pub report: ReportConfig,
}

impl InspectConfig {
    /// Whether the analyzer with this name should run. Unknown names run.
    pub fn is_enabled(&self, analyzer: &str) -> bool {
        match analyzer {
            "n_plus_one" => self.n_plus_one.enabled,
            "lazy_loading" => self.lazy_loading.enabled,
            "nested_n_plus_one" => self.nested.enabled,
            "bulk_operation" => self.bulk.enabled,
            "query_caching" => self.caching.enabled,
            "join_optimization" => self.joins.enabled,
            "slow_query" => self.slow_query.enabled,
            "missing_index" => self.missing_index.enabled,
            _ => true,
        }
    }

    pub fn validate(&self) -> InspectResult<()> {
        self.n_plus_one.validate("n_plus_one")?;
        self.lazy_loading.validate("lazy_loading")?;
        self.nested.validate("nested")?;
        self.bulk.validate("bulk")?;
        self.caching.validate("caching")?;

        if self.joins.max_joins == 0 {
            return Err(InspectError::config("[joins] max_joins must be at least 1"));
        }
        if self.slow_query.threshold_ms <= 0.0 {
            return Err(InspectError::config(
                "[slow_query] threshold_ms must be positive",
            ));
        }
        if self.slow_query.critical_ms < self.slow_query.threshold_ms {
            return Err(InspectError::config(
                "[slow_query] critical_ms must not be below threshold_ms",
            ));
        }
        if self.missing_index.min_count == 0 || self.missing_index.max_explains == 0 {
            return Err(InspectError::config(
                "[missing_index] min_count and max_explains must be at least 1",
            ));
        }
        if self.report.max_samples == 0 {
            return Err(InspectError::config("[report] max_samples must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = InspectConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.n_plus_one.threshold_or(N_PLUS_ONE_DEFAULTS), 5);
        assert_eq!(config.lazy_loading.threshold_or(LAZY_LOADING_DEFAULTS), 10);
        assert_eq!(config.nested.threshold_or(NESTED_DEFAULTS), 3);
        assert_eq!(config.bulk.threshold_or(BULK_DEFAULTS), 20);
        assert_eq!(config.caching.threshold_or(CACHING_DEFAULTS), 3);
        assert!(config.cache.reset_per_run);
        assert_eq!(config.report.max_samples, 3);
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let config: InspectConfig = serde_json::from_str(
            r#"{"n_plus_one": {"threshold": 8}, "joins": {"max_joins": 3}}"#,
        )
        .expect("valid config");
        assert!(config.n_plus_one.enabled);
        assert_eq!(config.n_plus_one.threshold_or(N_PLUS_ONE_DEFAULTS), 8);
        assert_eq!(config.joins.max_joins, 3);
        assert!(config.joins.enabled);
        assert_eq!(config.slow_query.threshold_ms, 100.0);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = InspectConfig::default();
        config.bulk.threshold = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("[bulk]"));

        let mut config = InspectConfig::default();
        config.caching.severity = Some(SeverityScale::new(10.0, 5.0, 1.0, 2.0));
        assert!(config.validate().is_err());
    }
}
