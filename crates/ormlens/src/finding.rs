//! Findings and run-scoped deduplication.

use crate::log::StackFrame;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Detector family that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    NPlusOne,
    LazyLoading,
    NestedNPlusOne,
    BulkOperation,
    JoinOptimization,
    QueryCaching,
    SlowQuery,
    MissingIndex,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::NPlusOne => "n_plus_one",
            FindingKind::LazyLoading => "lazy_loading",
            FindingKind::NestedNPlusOne => "nested_n_plus_one",
            FindingKind::BulkOperation => "bulk_operation",
            FindingKind::JoinOptimization => "join_optimization",
            FindingKind::QueryCaching => "query_caching",
            FindingKind::SlowQuery => "slow_query",
            FindingKind::MissingIndex => "missing_index",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggestion references; rendering them is up to the consumer.
pub mod suggestion {
    pub const EAGER_LOADING: &str = "eager_loading";
    pub const BATCH_FETCH: &str = "batch_fetch";
    pub const PAGINATED_COLLECTION: &str = "paginated_collection";
    pub const JOIN_FETCH: &str = "join_fetch";
    pub const NESTED_EAGER_LOADING: &str = "nested_eager_loading";
    pub const BULK_DML: &str = "bulk_dml";
    pub const REDUCE_JOINS: &str = "reduce_joins";
    pub const INNER_JOIN: &str = "inner_join";
    pub const REMOVE_JOIN: &str = "remove_join";
    pub const SPLIT_QUERY: &str = "split_query";
    pub const RESULT_CACHE: &str = "result_cache";
    pub const OPTIMIZE_QUERY: &str = "optimize_query";
    pub const ADD_INDEX: &str = "add_index";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub kind: FindingKind,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub table: Option<String>,
    pub sample_queries: Vec<String>,
    pub count: usize,
    pub total_time_ms: f64,
    pub backtrace: Option<Vec<StackFrame>>,
    pub suggestion_ref: String,
}

impl Finding {
    pub fn new(kind: FindingKind, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind,
            title: title.into(),
            description: String::new(),
            severity,
            table: None,
            sample_queries: Vec::new(),
            count: 0,
            total_time_ms: 0.0,
            backtrace: None,
            suggestion_ref: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn samples(mut self, samples: Vec<String>) -> Self {
        self.sample_queries = samples;
        self
    }

    pub fn occurrences(mut self, count: usize, total_time_ms: f64) -> Self {
        self.count = count;
        self.total_time_ms = total_time_ms;
        self
    }

    pub fn backtrace(mut self, backtrace: Option<Vec<StackFrame>>) -> Self {
        self.backtrace = backtrace;
        self
    }

    pub fn suggestion(mut self, suggestion_ref: &str) -> Self {
        self.suggestion_ref = suggestion_ref.to_string();
        self
    }

    /// Deduplication identity.
    pub fn identity(&self) -> (String, Option<String>) {
        (self.title.clone(), self.table.clone())
    }
}

/// Findings of one run; an identity (`title`, `table`) is kept at most once.
#[derive(Debug, Clone, Default)]
pub struct FindingSet {
    findings: Vec<Finding>,
    seen: HashSet<(String, Option<String>)>,
}

impl FindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when an equal identity was already recorded.
    pub fn push(&mut self, finding: Finding) -> bool {
        if !self.seen.insert(finding.identity()) {
            tracing::trace!(target: "ormlens.analysis", title = %finding.title, "duplicate finding dropped");
            return false;
        }
        self.findings.push(finding);
        true
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.findings.iter()
    }

    /// Critical first, then by count; ties keep discovery order.
    pub fn into_sorted(self) -> Vec<Finding> {
        let mut findings = self.findings;
        findings.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.count.cmp(&a.count)));
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(title: &str, table: &str, severity: Severity, count: usize) -> Finding {
        Finding::new(FindingKind::JoinOptimization, title, severity)
            .table(table)
            .occurrences(count, 0.0)
    }

    #[test]
    fn test_dedupe_by_title_and_table() {
        let mut set = FindingSet::new();
        assert!(set.push(finding("Too many JOINs", "orders", Severity::Warning, 1)));
        assert!(!set.push(finding("Too many JOINs", "orders", Severity::Critical, 9)));
        assert!(set.push(finding("Too many JOINs", "users", Severity::Warning, 1)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().map(|f| f.severity), Some(Severity::Warning));
    }

    #[test]
    fn test_sort_order() {
        let mut set = FindingSet::new();
        set.push(finding("a", "t", Severity::Warning, 3));
        set.push(finding("b", "t", Severity::Critical, 1));
        set.push(finding("c", "t", Severity::Warning, 7));
        set.push(finding("d", "t", Severity::Warning, 3));
        let titles: Vec<String> = set.into_sorted().into_iter().map(|f| f.title).collect();
        assert_eq!(titles, vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(
            finding("x", "t", Severity::Info, 2).suggestion(suggestion::BATCH_FETCH),
        )
        .expect("serializes");
        assert_eq!(json["kind"], "join_optimization");
        assert_eq!(json["severity"], "info");
        assert_eq!(json["suggestionRef"], "batch_fetch");
        assert_eq!(json["totalTimeMs"], 0.0);
        assert!(json["sampleQueries"].is_array());
    }
}
