use super::{
    AnalysisContext, Analyzer, LazyLoadingAnalyzer, NPlusOneAnalyzer, group_table, title_pattern,
};
use crate::aggregate::{QueryGroup, over_threshold};
use crate::config::CACHING_DEFAULTS;
use crate::finding::{FindingKind, FindingSet, suggestion};
use std::collections::{HashMap, HashSet};

/// The exact same SELECT, with the same parameters, run again and again.
///
/// Repeats are found by raw SQL text plus parameters, not by pattern: only a
/// repeat that would return the same rows is a caching candidate. Candidates
/// sharing a pattern are then reported together, once per pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCachingAnalyzer;

/// Log indices already reported as a per-row loop.
fn loop_indices(ctx: &AnalysisContext<'_>) -> HashSet<usize> {
    let mut covered = HashSet::new();
    if ctx.config.is_enabled("n_plus_one") {
        for (group, _) in NPlusOneAnalyzer::loop_groups(ctx) {
            covered.extend(group.indices);
        }
    }
    if ctx.config.is_enabled("lazy_loading") {
        for group in LazyLoadingAnalyzer::loop_groups(ctx) {
            covered.extend(group.indices);
        }
    }
    covered
}

fn identical_groups(ctx: &AnalysisContext<'_>) -> Vec<QueryGroup> {
    let covered = loop_indices(ctx);
    let mut groups: Vec<QueryGroup> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for record in ctx.log.iter() {
        if covered.contains(&record.index) || !ctx.cache.facts(&record.sql).is_select() {
            continue;
        }
        let Some(pattern) = ctx.cache.normalized_pattern(&record.sql) else {
            continue;
        };
        let params = serde_json::to_string(&record.params).unwrap_or_default();
        let key = format!("{}\u{0}{params}", record.sql.trim());

        let slot = *by_key.entry(key.clone()).or_insert_with(|| {
            groups.push(QueryGroup {
                key,
                pattern,
                relation: None,
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

/// Merge repeated statements by pattern, in order of first appearance.
/// Returns each merged group with the number of statements folded into it.
fn by_pattern(repeats: Vec<QueryGroup>) -> Vec<(QueryGroup, usize)> {
    let mut merged: Vec<(QueryGroup, usize)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for group in repeats {
        match slots.get(&group.pattern) {
            Some(&slot) => {
                let (target, statements) = &mut merged[slot];
                target.indices.extend(group.indices);
                target.indices.sort_unstable();
                target.total_time_ms += group.total_time_ms;
                target.max_time_ms = target.max_time_ms.max(group.max_time_ms);
                *statements += 1;
            }
            None => {
                slots.insert(group.pattern.clone(), merged.len());
                merged.push((
                    QueryGroup {
                        key: group.pattern.clone(),
                        ..group
                    },
                    1,
                ));
            }
        }
    }
    merged
}

impl Analyzer for QueryCachingAnalyzer {
    fn name(&self) -> &'static str {
        "query_caching"
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet) {
        let config = &ctx.config.caching;
        let threshold = config.threshold_or(CACHING_DEFAULTS);
        let scale = config.scale_or(CACHING_DEFAULTS);

        let repeats = over_threshold(identical_groups(ctx), threshold);
        for (group, statements) in by_pattern(repeats) {
            let table = group_table(ctx, &group);
            let count = group.count();
            let finding = ctx
                .group_finding(
                    FindingKind::QueryCaching,
                    format!(
                        "Repeated identical query on {table}: {}",
                        title_pattern(&group.pattern)
                    ),
                    scale.score(count as f64, group.total_time_ms),
                    &group,
                )
                .description(format!(
                    "{statements} statement(s) were each re-run with the same parameters, \
                     {count} executions in all ({:.1} ms total). \
                     Keep the first result instead of asking again.",
                    group.total_time_ms
                ))
                .table(table)
                .suggestion(suggestion::RESULT_CACHE);
            out.push(finding);
        }
    }
}
