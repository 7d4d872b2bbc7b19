use super::{AnalysisContext, Analyzer, group_table};
use crate::aggregate::{GroupKey, group_records};
use crate::explain::strategy_for;
use crate::finding::{FindingKind, FindingSet, suggestion};
use crate::severity::Severity;

/// Frequent or slow filtered SELECTs whose plan scans instead of seeking.
///
/// Needs an [`ExplainRunner`](crate::explain::ExplainRunner); without one
/// it does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingIndexAnalyzer;

impl Analyzer for MissingIndexAnalyzer {
    fn name(&self) -> &'static str {
        "missing_index"
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet) {
        let config = &ctx.config.missing_index;
        let Some(runner) = ctx.explain else {
            return;
        };
        let strategy = strategy_for(config.strategy);

        let mut candidates: Vec<_> = group_records(ctx.log, ctx.cache, GroupKey::Pattern, |r| {
            let facts = ctx.cache.facts(&r.sql);
            facts.is_select() && !facts.where_columns.is_empty()
        })
        .into_iter()
        .filter(|g| g.count() >= config.min_count || g.max_time_ms >= config.min_execution_ms)
        .collect();
        candidates.sort_by(|a, b| b.total_time_ms.total_cmp(&a.total_time_ms));
        candidates.truncate(config.max_explains);

        for group in candidates {
            let Some(first) = group.representative(ctx.log) else {
                continue;
            };
            let rows = match runner.explain(&first.sql, &first.params) {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(
                        target: "ormlens.analysis",
                        pattern = %group.pattern,
                        error = %e,
                        "EXPLAIN failed, skipping"
                    );
                    continue;
                }
            };
            let Some(advice) = strategy.judge(&rows) else {
                continue;
            };

            let table = advice.table.unwrap_or_else(|| group_table(ctx, &group));
            let columns = ctx.cache.facts(&first.sql).where_columns.join(", ");
            let severity = if group.max_time_ms >= ctx.config.slow_query.critical_ms {
                Severity::Critical
            } else {
                Severity::Warning
            };
            let finding = ctx
                .group_finding(
                    FindingKind::MissingIndex,
                    format!("Missing index on {table} ({columns})"),
                    severity,
                    &group,
                )
                .description(format!(
                    "{} plan: {}. Consider an index on `{table}` ({columns}).",
                    strategy.name(),
                    advice.reason
                ))
                .table(table)
                .suggestion(suggestion::ADD_INDEX);
            out.push(finding);
        }
    }
}
