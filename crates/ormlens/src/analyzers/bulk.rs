use super::{AnalysisContext, Analyzer, group_table};
use crate::aggregate::{GroupKey, group_records, over_threshold};
use crate::config::BULK_DEFAULTS;
use crate::finding::{FindingKind, FindingSet, suggestion};
use ormlens_sql::{ParsedQueryFacts, StatementKind, is_id_column};

/// UPDATE / DELETE issued once per entity instead of as one statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkOperationAnalyzer;

fn single_row_mutation(facts: &ParsedQueryFacts) -> bool {
    if !matches!(facts.statement, StatementKind::Update | StatementKind::Delete) {
        return false;
    }
    match facts.where_conditions.as_slice() {
        [only] => only.is_equality() && only.value.is_scalar_input() && is_id_column(&only.column),
        _ => false,
    }
}

impl Analyzer for BulkOperationAnalyzer {
    fn name(&self) -> &'static str {
        "bulk_operation"
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet) {
        let config = &ctx.config.bulk;
        let threshold = config.threshold_or(BULK_DEFAULTS);
        let scale = config.scale_or(BULK_DEFAULTS);

        let groups = group_records(ctx.log, ctx.cache, GroupKey::Pattern, |r| {
            single_row_mutation(&ctx.cache.facts(&r.sql))
        });

        for group in over_threshold(groups, threshold) {
            let Some(first) = group.representative(ctx.log) else {
                continue;
            };
            let verb = match ctx.cache.facts(&first.sql).statement {
                StatementKind::Delete => "DELETE",
                _ => "UPDATE",
            };
            let table = group_table(ctx, &group);
            let finding = ctx
                .group_finding(
                    FindingKind::BulkOperation,
                    format!("Repeated single-row {verb} on {table}"),
                    scale.score(group.count() as f64, group.total_time_ms),
                    &group,
                )
                .description(format!(
                    "{} separate {verb} statements on `{table}` each touched one row by id. \
                     A single {verb} with an IN list or a join does the same work in one round trip.",
                    group.count()
                ))
                .table(table)
                .suggestion(suggestion::BULK_DML);
            out.push(finding);
        }
    }
}
