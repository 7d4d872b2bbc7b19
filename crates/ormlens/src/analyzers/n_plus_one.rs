use super::{AnalysisContext, Analyzer};
use crate::aggregate::{GroupKey, QueryGroup, group_records, over_threshold};
use crate::config::N_PLUS_ONE_DEFAULTS;
use crate::finding::{FindingKind, FindingSet, suggestion};
use crate::severity::PROXY_MULTIPLIER;
use ormlens_sql::LoadPattern;

/// The same per-row SELECT repeated for many parent rows.
///
/// Only queries that walk a foreign key (a WHERE on `*_id` or a JOIN through
/// one) are reported here; repeated primary-key lookups belong to
/// [`super::LazyLoadingAnalyzer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NPlusOneAnalyzer;

impl NPlusOneAnalyzer {
    /// Relation groups over the threshold, with their load shape.
    pub(super) fn loop_groups(ctx: &AnalysisContext<'_>) -> Vec<(QueryGroup, LoadPattern)> {
        let threshold = ctx.config.n_plus_one.threshold_or(N_PLUS_ONE_DEFAULTS);
        let groups = group_records(ctx.log, ctx.cache, GroupKey::PatternAndRelation, |r| {
            ctx.cache.facts(&r.sql).is_select()
        });

        over_threshold(groups, threshold)
            .into_iter()
            .filter(|g| g.relation.is_some())
            .filter_map(|g| {
                let load = ctx.cache.classify_load(&g.representative(ctx.log)?.sql);
                (load != LoadPattern::Unknown).then_some((g, load))
            })
            .collect()
    }
}

impl Analyzer for NPlusOneAnalyzer {
    fn name(&self) -> &'static str {
        "n_plus_one"
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet) {
        let scale = ctx.config.n_plus_one.scale_or(N_PLUS_ONE_DEFAULTS);

        for (group, load) in Self::loop_groups(ctx) {
            let Some(relation) = &group.relation else {
                continue;
            };
            let (multiplier, suggestion_ref, shape) = match load {
                LoadPattern::Unknown => continue,
                LoadPattern::Proxy => (PROXY_MULTIPLIER, suggestion::EAGER_LOADING, "single row"),
                LoadPattern::Collection { has_limit: true } => {
                    (1.0, suggestion::PAGINATED_COLLECTION, "paginated collection")
                }
                LoadPattern::Collection { has_limit: false } => {
                    (1.0, suggestion::BATCH_FETCH, "collection")
                }
            };

            let table = relation.table.clone();
            let severity = scale.score(group.count() as f64 * multiplier, group.total_time_ms);

            let finding = ctx
                .group_finding(
                    FindingKind::NPlusOne,
                    format!("N+1 query on {table}"),
                    severity,
                    &group,
                )
                .description(format!(
                    "The same {shape} query on `{table}` through `{}` ran {} times ({:.1} ms total). \
                     Load the association for all parent rows at once.",
                    relation.foreign_key_column,
                    group.count(),
                    group.total_time_ms
                ))
                .table(table)
                .suggestion(suggestion_ref);
            out.push(finding);
        }
    }
}
