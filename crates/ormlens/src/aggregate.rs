//! Grouping executions into query groups.
//!
//! collect → group → filter happen here; scoring and deduplication are done
//! by the analyzers through [`crate::severity`] and [`crate::finding`].

use crate::log::{QueryLog, QueryRecord, StackFrame, truncate_sql};
use ormlens_sql::{AnalysisCache, RelationRef};
use std::collections::HashMap;

/// Maximum length of a sample query kept on a finding.
const MAX_SAMPLE_BYTES: usize = 2000;

/// Executions sharing one grouping key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryGroup {
    /// `pattern` or `pattern|table|fk_column`.
    pub key: String,
    pub pattern: String,
    pub relation: Option<RelationRef>,
    /// Log indices, in log order. Never empty.
    pub indices: Vec<usize>,
    pub total_time_ms: f64,
    pub max_time_ms: f64,
}

impl QueryGroup {
    pub fn count(&self) -> usize {
        self.indices.len()
    }

    pub fn first_index(&self) -> usize {
        self.indices.first().copied().unwrap_or(0)
    }

    pub fn last_index(&self) -> usize {
        self.indices.last().copied().unwrap_or(0)
    }

    /// First execution of the group.
    pub fn representative<'a>(&self, log: &'a QueryLog) -> Option<&'a QueryRecord> {
        log.get(self.first_index())
    }

    /// Up to `max` distinct SQL texts, in log order.
    pub fn samples(&self, log: &QueryLog, max: usize) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for record in self.indices.iter().filter_map(|&i| log.get(i)) {
            if out.len() >= max {
                break;
            }
            let sample = truncate_sql(&record.sql, MAX_SAMPLE_BYTES);
            if !out.contains(&sample) {
                out.push(sample);
            }
        }
        out
    }

    /// Backtrace of the first execution that has one.
    pub fn backtrace(&self, log: &QueryLog) -> Option<Vec<StackFrame>> {
        self.indices
            .iter()
            .filter_map(|&i| log.get(i))
            .find_map(|r| r.backtrace.clone())
    }
}

/// How records are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupKey {
    /// Normalized pattern only.
    #[default]
    Pattern,
    /// Pattern plus `table|fk_column` when the query is an N+1 WHERE/JOIN match.
    PatternAndRelation,
}

/// Group the records accepted by `filter`, in order of first appearance.
///
/// Records whose SQL normalizes to nothing are skipped.
pub fn group_records<F>(
    log: &QueryLog,
    cache: &AnalysisCache,
    key: GroupKey,
    filter: F,
) -> Vec<QueryGroup>
where
    F: Fn(&QueryRecord) -> bool,
{
    let mut groups: Vec<QueryGroup> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for record in log.iter().filter(|r| filter(r)) {
        let Some(pattern) = cache.normalized_pattern(&record.sql) else {
            continue;
        };
        let relation = match key {
            GroupKey::Pattern => None,
            GroupKey::PatternAndRelation => cache.relation(&record.sql),
        };
        let group_key = match &relation {
            Some(rel) => format!("{pattern}|{}", rel.key()),
            None => pattern.clone(),
        };

        let slot = *by_key.entry(group_key.clone()).or_insert_with(|| {
            groups.push(QueryGroup {
                key: group_key,
                pattern,
                relation,
                indices: Vec::new(),
                total_time_ms: 0.0,
                max_time_ms: 0.0,
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.indices.push(record.index);
        group.total_time_ms += record.execution_time_ms;
        group.max_time_ms = group.max_time_ms.max(record.execution_time_ms);
    }

    groups
}

/// Keep groups with at least `threshold` executions.
pub fn over_threshold(groups: Vec<QueryGroup>, threshold: usize) -> Vec<QueryGroup> {
    groups
        .into_iter()
        .filter(|g| g.count() >= threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(sqls: &[&str]) -> QueryLog {
        QueryLog::from_records(
            sqls.iter()
                .map(|s| QueryRecord::new(*s).with_time(2.0))
                .collect(),
        )
    }

    #[test]
    fn test_literal_variants_share_a_group() {
        let mut sqls = vec!["SELECT * FROM comments WHERE post_id = 7"; 12];
        sqls.extend(vec!["SELECT * FROM comments WHERE post_id = 9"; 12]);
        let log = log(&sqls);
        let cache = AnalysisCache::new();

        let groups = group_records(&log, &cache, GroupKey::PatternAndRelation, |_| true);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count(), 24);
        assert_eq!(
            groups[0].key,
            "SELECT * FROM comments WHERE post_id = ?|comments|post_id"
        );
        assert_eq!(groups[0].total_time_ms, 48.0);
        assert_eq!(
            groups[0].samples(&log, 3),
            vec![
                "SELECT * FROM comments WHERE post_id = 7",
                "SELECT * FROM comments WHERE post_id = 9"
            ]
        );
    }

    #[test]
    fn test_groups_keep_first_appearance_order() {
        let log = log(&[
            "SELECT * FROM a WHERE x = 1",
            "SELECT * FROM a WHERE x = 2",
            "SELECT * FROM b WHERE y = 1",
        ]);
        let cache = AnalysisCache::new();
        let groups = group_records(&log, &cache, GroupKey::Pattern, |_| true);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].indices, vec![0, 1]);
        assert_eq!(over_threshold(groups, 2).len(), 1);
    }

    #[test]
    fn test_filter_and_empty_sql() {
        let log = log(&["", "  ", "UPDATE t SET a = 1", "SELECT 1"]);
        let cache = AnalysisCache::new();
        let groups = group_records(&log, &cache, GroupKey::Pattern, |r| {
            r.sql.trim_start().starts_with("SELECT")
        });
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].first_index(), 3);
    }
}
