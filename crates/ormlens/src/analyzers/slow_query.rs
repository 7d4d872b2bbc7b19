use super::{AnalysisContext, Analyzer, group_table, title_pattern};
use crate::aggregate::{GroupKey, group_records};
use crate::finding::{FindingKind, FindingSet, suggestion};
use crate::severity::Severity;

/// Statements whose single executions are slow, regardless of repetition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlowQueryAnalyzer;

impl Analyzer for SlowQueryAnalyzer {
    fn name(&self) -> &'static str {
        "slow_query"
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet) {
        let config = &ctx.config.slow_query;
        let groups = group_records(ctx.log, ctx.cache, GroupKey::Pattern, |r| {
            r.execution_time_ms >= config.threshold_ms
        });

        for group in groups {
            let table = group_table(ctx, &group);
            let severity = if group.max_time_ms >= config.critical_ms {
                Severity::Critical
            } else {
                Severity::Warning
            };
            let finding = ctx
                .group_finding(
                    FindingKind::SlowQuery,
                    format!(
                        "Slow query on {table}: {}",
                        title_pattern(&group.pattern)
                    ),
                    severity,
                    &group,
                )
                .description(format!(
                    "{} execution(s) took at least {:.0} ms, the slowest {:.1} ms.",
                    group.count(),
                    config.threshold_ms,
                    group.max_time_ms
                ))
                .table(table)
                .suggestion(suggestion::OPTIMIZE_QUERY);
            out.push(finding);
        }
    }
}
