//! Pure query-shape detectors.
//!
//! Every detector looks at [`ParsedQueryFacts`] only, so results can be cached
//! per SQL text. [`classify_load`] evaluates them in a fixed order: a
//! paginated collection query also looks like a lookup by `*_id`, so the
//! partial-collection check has to run first.

use crate::facts::{ColumnName, JoinRef, ParsedQueryFacts, WhereCondition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The relation a repeated query walks: table and foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationRef {
    pub table: String,
    pub foreign_key_column: String,
}

impl RelationRef {
    pub fn new(table: impl Into<String>, foreign_key_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            foreign_key_column: foreign_key_column.into(),
        }
    }

    /// Secondary grouping key: `table|fk_column`.
    pub fn key(&self) -> String {
        format!("{}|{}", self.table, self.foreign_key_column)
    }
}

/// How a repeated query loads its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadPattern {
    /// Collection by foreign key (to-many association).
    Collection {
        #[serde(rename = "hasLimit")]
        has_limit: bool,
    },
    /// Single entity by id (to-one association / proxy initialisation).
    Proxy,
    Unknown,
}

impl LoadPattern {
    pub fn is_proxy(self) -> bool {
        matches!(self, LoadPattern::Proxy)
    }

    pub fn is_collection(self) -> bool {
        matches!(self, LoadPattern::Collection { .. })
    }
}

/// `id` or `*_id`.
pub fn is_id_column(column: &str) -> bool {
    column == "id" || column.ends_with("_id")
}

/// `*_id` but not `id` itself.
pub fn is_foreign_key_column(column: &str) -> bool {
    column != "id" && column.ends_with("_id")
}

fn single_scalar_equality(conditions: &[WhereCondition]) -> Option<&WhereCondition> {
    match conditions {
        [only] if only.is_equality() && only.value.is_scalar_input() => Some(only),
        _ => None,
    }
}

/// SELECT by id without joins: returns the table being loaded.
pub fn lazy_load_by_id(facts: &ParsedQueryFacts) -> Option<String> {
    if !facts.is_select() || !facts.joins.is_empty() {
        return None;
    }
    let cond = single_scalar_equality(&facts.where_conditions)?;
    if !is_id_column(&cond.column) {
        return None;
    }
    facts.main_table_name().map(str::to_string)
}

/// SELECT without joins filtered by one foreign-key equality.
pub fn n_plus_one_where(facts: &ParsedQueryFacts) -> Option<RelationRef> {
    if !facts.is_select() || !facts.joins.is_empty() {
        return None;
    }
    let cond = single_scalar_equality(&facts.where_conditions)?;
    if !is_foreign_key_column(&cond.column) {
        return None;
    }
    Some(RelationRef::new(facts.main_table_name()?, cond.column.clone()))
}

fn owning_table(column: &ColumnName, join: &JoinRef, aliases: &BTreeMap<String, String>) -> String {
    column
        .qualifier
        .as_ref()
        .and_then(|q| aliases.get(q))
        .cloned()
        .unwrap_or_else(|| join.table.clone())
}

/// SELECT with one JOIN whose ON clause follows a foreign key.
///
/// At most one WHERE condition is allowed, and it must be an equality
/// against a parameter or literal (the per-row key).
pub fn n_plus_one_join(facts: &ParsedQueryFacts) -> Option<RelationRef> {
    if !facts.is_select() {
        return None;
    }
    let [join] = facts.joins.as_slice() else {
        return None;
    };
    match facts.where_conditions.as_slice() {
        [] => {}
        conditions => {
            single_scalar_equality(conditions)?;
        }
    }

    let aliases = facts.alias_map();
    join.conditions
        .iter()
        .flat_map(|c| [&c.left, &c.right])
        .find(|col| is_foreign_key_column(&col.column))
        .map(|col| RelationRef::new(owning_table(col, join, &aliases), col.column.clone()))
}

/// Relation identity for grouping: WHERE pattern first, then JOIN pattern.
pub fn relation_of(facts: &ParsedQueryFacts) -> Option<RelationRef> {
    n_plus_one_where(facts).or_else(|| n_plus_one_join(facts))
}

/// A collection-shaped N+1 query that also pages with LIMIT.
pub fn partial_collection_load(facts: &ParsedQueryFacts) -> Option<RelationRef> {
    if !facts.has_limit {
        return None;
    }
    relation_of(facts)
}

pub fn classify_load(facts: &ParsedQueryFacts) -> LoadPattern {
    if partial_collection_load(facts).is_some() {
        LoadPattern::Collection { has_limit: true }
    } else if lazy_load_by_id(facts).is_some() {
        LoadPattern::Proxy
    } else if relation_of(facts).is_some() {
        LoadPattern::Collection { has_limit: false }
    } else {
        LoadPattern::Unknown
    }
}
