//! Detector families.
//!
//! Each analyzer reads the whole log through the shared [`AnalysisCache`] and
//! pushes findings into one run-scoped [`FindingSet`].

mod bulk;
mod caching;
mod join_optimization;
mod lazy_loading;
mod missing_index;
mod n_plus_one;
mod nested;
mod slow_query;


pub use bulk::BulkOperationAnalyzer;
pub use caching::QueryCachingAnalyzer;
pub use join_optimization::JoinOptimizationAnalyzer;
pub use lazy_loading::LazyLoadingAnalyzer;
pub use missing_index::MissingIndexAnalyzer;
pub use n_plus_one::NPlusOneAnalyzer;
pub use nested::NestedRelationshipAnalyzer;
pub use slow_query::SlowQueryAnalyzer;

use crate::aggregate::QueryGroup;
use crate::config::InspectConfig;
use crate::explain::ExplainRunner;
use crate::finding::{Finding, FindingKind, FindingSet};
use crate::log::{QueryLog, truncate_sql};
use crate::metadata::MetadataSet;
use crate::severity::Severity;
use ormlens_sql::AnalysisCache;

/// Everything an analyzer may read during one run.
pub struct AnalysisContext<'a> {
    pub log: &'a QueryLog,
    pub cache: &'a AnalysisCache,
    pub metadata: &'a MetadataSet,
    pub config: &'a InspectConfig,
    pub explain: Option<&'a dyn ExplainRunner>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        log: &'a QueryLog,
        cache: &'a AnalysisCache,
        metadata: &'a MetadataSet,
        config: &'a InspectConfig,
    ) -> Self {
        Self {
            log,
            cache,
            metadata,
            config,
            explain: None,
        }
    }

    pub fn with_explain(mut self, runner: &'a dyn ExplainRunner) -> Self {
        self.explain = Some(runner);
        self
    }

    /// Finding pre-filled from a group: samples, occurrences and backtrace.
    pub(crate) fn group_finding(
        &self,
        kind: FindingKind,
        title: String,
        severity: Severity,
        group: &QueryGroup,
    ) -> Finding {
        Finding::new(kind, title, severity)
            .samples(group.samples(self.log, self.config.report.max_samples))
            .occurrences(group.count(), group.total_time_ms)
            .backtrace(group.backtrace(self.log))
    }
}

pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet);
}

/// All built-in analyzers, in reporting order.
pub fn default_analyzers() -> Vec<Box<dyn Analyzer>> {
    vec![
        Box::new(NPlusOneAnalyzer),
        Box::new(LazyLoadingAnalyzer),
        Box::new(NestedRelationshipAnalyzer),
        Box::new(BulkOperationAnalyzer),
        Box::new(JoinOptimizationAnalyzer),
        Box::new(QueryCachingAnalyzer),
        Box::new(SlowQueryAnalyzer),
        Box::new(MissingIndexAnalyzer),
    ]
}

/// Longest pattern quoted in a finding title.
const MAX_TITLE_PATTERN_BYTES: usize = 120;

pub(crate) fn title_pattern(pattern: &str) -> String {
    truncate_sql(pattern, MAX_TITLE_PATTERN_BYTES)
}

/// `main_table` of the group's first execution, or `"unknown"`.
pub(crate) fn group_table(ctx: &AnalysisContext<'_>, group: &QueryGroup) -> String {
    group
        .representative(ctx.log)
        .and_then(|r| ctx.cache.main_table(&r.sql))
        .map(|t| t.table)
        .unwrap_or_else(|| "unknown".to_string())
}
