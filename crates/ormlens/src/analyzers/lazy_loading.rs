use super::{AnalysisContext, Analyzer};
use crate::aggregate::{GroupKey, QueryGroup, group_records, over_threshold};
use crate::config::LAZY_LOADING_DEFAULTS;
use crate::finding::{FindingKind, FindingSet, suggestion};
use crate::severity::PROXY_MULTIPLIER;

/// Entities fetched one by one by primary key inside a loop.
///
/// Lookups through a foreign-key column carry a relation identity and are
/// reported by [`super::NPlusOneAnalyzer`] instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct LazyLoadingAnalyzer;

impl LazyLoadingAnalyzer {
    /// Primary-key lookup groups over the threshold.
    pub(super) fn loop_groups(ctx: &AnalysisContext<'_>) -> Vec<QueryGroup> {
        let threshold = ctx.config.lazy_loading.threshold_or(LAZY_LOADING_DEFAULTS);
        let groups = group_records(ctx.log, ctx.cache, GroupKey::Pattern, |r| {
            ctx.cache.lazy_load_by_id(&r.sql).is_some() && ctx.cache.relation(&r.sql).is_none()
        });
        over_threshold(groups, threshold)
    }
}

impl Analyzer for LazyLoadingAnalyzer {
    fn name(&self) -> &'static str {
        "lazy_loading"
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet) {
        let scale = ctx.config.lazy_loading.scale_or(LAZY_LOADING_DEFAULTS);

        for group in Self::loop_groups(ctx) {
            let Some(table) = group
                .representative(ctx.log)
                .and_then(|r| ctx.cache.lazy_load_by_id(&r.sql))
            else {
                continue;
            };
            let severity = scale.score(
                group.count() as f64 * PROXY_MULTIPLIER,
                group.total_time_ms,
            );
            let finding = ctx
                .group_finding(
                    FindingKind::LazyLoading,
                    format!("Lazy loading in loop on {table}"),
                    severity,
                    &group,
                )
                .description(format!(
                    "`{table}` rows were loaded by id {} times in a row. \
                     Fetch them with the parent query or in one batch.",
                    group.count()
                ))
                .table(table)
                .suggestion(suggestion::JOIN_FETCH);
            out.push(finding);
        }
    }
}
