//! JOIN checks, once per distinct SELECT shape.

use super::{AnalysisContext, Analyzer};
use crate::aggregate::{GroupKey, group_records};
use crate::finding::{FindingKind, FindingSet, suggestion};
use crate::joins::JoinClassifier;
use crate::severity::Severity;
use ormlens_sql::{JoinRef, ParsedQueryFacts};

#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptimizationAnalyzer;

/// Explicit alias never referenced outside the join's own ON clause.
fn is_unused(facts: &ParsedQueryFacts, join: &JoinRef) -> bool {
    let Some(alias) = join.alias.as_deref() else {
        return false;
    };
    if alias == join.table || facts.select_star {
        return false;
    }
    facts.qualifier_ref_count(alias) <= join.own_refs(alias)
}

impl Analyzer for JoinOptimizationAnalyzer {
    fn name(&self) -> &'static str {
        "join_optimization"
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet) {
        let max_joins = ctx.config.joins.max_joins;
        let classifier = JoinClassifier::new(ctx.metadata);

        let groups = group_records(ctx.log, ctx.cache, GroupKey::Pattern, |r| {
            let facts = ctx.cache.facts(&r.sql);
            facts.is_select() && !facts.joins.is_empty()
        });

        for group in &groups {
            let Some(first) = group.representative(ctx.log) else {
                continue;
            };
            let facts = ctx.cache.facts(&first.sql);
            let main = facts.main_table_name().unwrap_or("unknown").to_string();

            if facts.joins.len() > max_joins {
                let severity = if facts.joins.len() > max_joins * 2 {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                let finding = ctx
                    .group_finding(
                        FindingKind::JoinOptimization,
                        format!("Too many JOINs on {main}"),
                        severity,
                        group,
                    )
                    .description(format!(
                        "This query joins {} tables (limit {max_joins}). \
                         Wide joins are hard to plan and usually fetch more than needed.",
                        facts.joins.len()
                    ))
                    .table(main.clone())
                    .suggestion(suggestion::REDUCE_JOINS);
                out.push(finding);
            }

            let classified = classifier.classify_all(&facts);
            for join in classified.iter().filter(|j| j.should_be_inner()) {
                let table = join.join.table.clone();
                let finding = ctx
                    .group_finding(
                        FindingKind::JoinOptimization,
                        format!("Suboptimal LEFT JOIN on {table}"),
                        Severity::Info,
                        group,
                    )
                    .description(format!(
                        "`{main}` always has a `{table}` row: the foreign key is NOT NULL. \
                         An INNER JOIN returns the same rows and gives the planner more freedom."
                    ))
                    .table(table)
                    .suggestion(suggestion::INNER_JOIN);
                out.push(finding);
            }

            for join in facts.joins.iter().filter(|j| is_unused(&facts, j)) {
                let table = join.table.clone();
                let finding = ctx
                    .group_finding(
                        FindingKind::JoinOptimization,
                        format!("Unused JOIN on {table}"),
                        Severity::Warning,
                        group,
                    )
                    .description(format!(
                        "`{table}` is joined as `{}` but none of its columns are used.",
                        join.qualifier()
                    ))
                    .table(table)
                    .suggestion(suggestion::REMOVE_JOIN);
                out.push(finding);
            }

            let collections = classified.iter().filter(|j| j.is_collection()).count();
            if collections >= 2 {
                let severity = if collections >= 3 {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                let tables: Vec<&str> = classified
                    .iter()
                    .filter(|j| j.is_collection())
                    .map(|j| j.join.table.as_str())
                    .collect();
                let finding = ctx
                    .group_finding(
                        FindingKind::JoinOptimization,
                        format!("Cartesian product risk on {main}"),
                        severity,
                        group,
                    )
                    .description(format!(
                        "{collections} to-many JOINs ({}) multiply each other's rows. \
                         Load the collections in separate queries.",
                        tables.join(", ")
                    ))
                    .table(main.clone())
                    .suggestion(suggestion::SPLIT_QUERY);
                out.push(finding);
            }
        }
    }
}
