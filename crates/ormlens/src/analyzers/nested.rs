//! Multi-hop N+1: a per-row loop inside another per-row loop.
//!
//! Loop nesting is inferred from log positions. A group is nested in another
//! when its first execution falls inside the other group's execution span;
//! the innermost such span is the parent. With metadata loaded, parent and
//! child tables must also be associated in one direction or the other.

use super::{AnalysisContext, Analyzer, group_table};
use crate::aggregate::{GroupKey, QueryGroup, group_records, over_threshold};
use crate::config::NESTED_DEFAULTS;
use crate::finding::{FindingKind, FindingSet, suggestion};
use ormlens_sql::LoadPattern;

#[derive(Debug, Clone, Copy, Default)]
pub struct NestedRelationshipAnalyzer;

struct LoopGroup {
    group: QueryGroup,
    table: String,
}

impl Analyzer for NestedRelationshipAnalyzer {
    fn name(&self) -> &'static str {
        "nested_n_plus_one"
    }

    fn analyze(&self, ctx: &AnalysisContext<'_>, out: &mut FindingSet) {
        let config = &ctx.config.nested;
        let threshold = config.threshold_or(NESTED_DEFAULTS);
        let scale = config.scale_or(NESTED_DEFAULTS);

        let groups = group_records(ctx.log, ctx.cache, GroupKey::PatternAndRelation, |r| {
            ctx.cache.facts(&r.sql).is_select()
                && ctx.cache.classify_load(&r.sql) != LoadPattern::Unknown
        });
        let loops: Vec<LoopGroup> = over_threshold(groups, threshold)
            .into_iter()
            .map(|group| {
                let table = match &group.relation {
                    Some(rel) => rel.table.clone(),
                    None => group_table(ctx, &group),
                };
                LoopGroup { group, table }
            })
            .collect();

        let parents = parent_links(ctx, &loops);
        let is_parent: Vec<bool> = (0..loops.len())
            .map(|i| parents.contains(&Some(i)))
            .collect();

        for leaf in (0..loops.len()).filter(|&i| !is_parent[i]) {
            let mut chain = vec![leaf];
            let mut cursor = leaf;
            // Parents always start earlier, so the walk terminates.
            while let Some(parent) = parents[cursor] {
                chain.push(parent);
                cursor = parent;
            }
            if chain.len() < 2 {
                continue;
            }
            chain.reverse();

            let tables: Vec<&str> = chain.iter().map(|&i| loops[i].table.as_str()).collect();
            let count: usize = chain.iter().map(|&i| loops[i].group.count()).sum();
            let total_ms: f64 = chain.iter().map(|&i| loops[i].group.total_time_ms).sum();
            let root = tables[0].to_string();
            let path = tables.join(" → ");

            let leaf_group = &loops[leaf].group;
            let finding = ctx
                .group_finding(
                    FindingKind::NestedNPlusOne,
                    format!("Nested N+1: {path}"),
                    scale.score(count as f64, total_ms),
                    leaf_group,
                )
                .occurrences(count, total_ms)
                .description(format!(
                    "Per-row queries are nested {} levels deep ({path}), {count} queries in total. \
                     Eager-load the whole association path from `{root}`.",
                    chain.len()
                ))
                .table(root)
                .suggestion(suggestion::NESTED_EAGER_LOADING);
            out.push(finding);
        }
    }
}

/// Index of each group's parent loop, if any.
fn parent_links(ctx: &AnalysisContext<'_>, loops: &[LoopGroup]) -> Vec<Option<usize>> {
    loops
        .iter()
        .map(|child| {
            let start = child.group.first_index();
            loops
                .iter()
                .enumerate()
                .filter(|(_, p)| {
                    p.group.first_index() < start
                        && p.group.last_index() > start
                        && p.table != child.table
                        && (ctx.metadata.is_empty() || ctx.metadata.are_related(&p.table, &child.table))
                })
                .max_by_key(|(_, p)| p.group.first_index())
                .map(|(i, _)| i)
        })
        .collect()
}
