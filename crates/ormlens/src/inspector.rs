//! Inspection session.

use crate::analyzers::{AnalysisContext, Analyzer, default_analyzers};
use crate::config::InspectConfig;
use crate::error::InspectResult;
use crate::explain::ExplainRunner;
use crate::finding::{Finding, FindingSet};
use crate::log::QueryLog;
use crate::metadata::MetadataSet;
use crate::severity::Severity;
use ormlens_sql::{AnalysisCache, CacheStats};
use serde::Serialize;

/// Result of one [`Inspector::inspect`] run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Critical first, then by count.
    pub findings: Vec<Finding>,
    pub cache: CacheStats,
    pub query_count: usize,
    pub unique_sql_count: usize,
}

impl Report {
    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Critical)
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Owns the analysis cache and the analyzers for a series of runs.
pub struct Inspector {
    config: InspectConfig,
    cache: AnalysisCache,
    analyzers: Vec<Box<dyn Analyzer>>,
    explain: Option<Box<dyn ExplainRunner>>,
}

impl Inspector {
    pub fn new(config: InspectConfig) -> InspectResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache: AnalysisCache::new(),
            analyzers: default_analyzers(),
            explain: None,
        })
    }

    pub fn with_explain_runner(mut self, runner: impl ExplainRunner + 'static) -> Self {
        self.explain = Some(Box::new(runner));
        self
    }

    /// Run an extra analyzer after the built-in ones.
    pub fn with_analyzer(mut self, analyzer: impl Analyzer + 'static) -> Self {
        self.analyzers.push(Box::new(analyzer));
        self
    }

    pub fn config(&self) -> &InspectConfig {
        &self.config
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn inspect(&self, log: &QueryLog, metadata: &MetadataSet) -> Report {
        if self.config.cache.reset_per_run {
            self.cache.reset();
        }
        let unique_sql_count = self.cache.warm_up(log.iter().map(|r| r.sql.as_str()));

        let mut ctx = AnalysisContext::new(log, &self.cache, metadata, &self.config);
        if let Some(runner) = self.explain.as_deref() {
            ctx = ctx.with_explain(runner);
        }

        let mut findings = FindingSet::new();
        for analyzer in &self.analyzers {
            if !self.config.is_enabled(analyzer.name()) {
                tracing::debug!(target: "ormlens.analysis", analyzer = analyzer.name(), "disabled");
                continue;
            }
            let before = findings.len();
            analyzer.analyze(&ctx, &mut findings);
            tracing::debug!(
                target: "ormlens.analysis",
                analyzer = analyzer.name(),
                findings = findings.len() - before,
                "analyzer finished"
            );
        }

        Report {
            findings: findings.into_sorted(),
            cache: self.cache.stats(),
            query_count: log.len(),
            unique_sql_count,
        }
    }
}

impl std::fmt::Debug for Inspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inspector")
            .field("config", &self.config)
            .field(
                "analyzers",
                &self.analyzers.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field("explain", &self.explain.is_some())
            .finish()
    }
}
