//! Structural facts extracted from a single SQL statement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder table name used for derived tables (`FROM (SELECT ...) x`).
pub const SUBQUERY_TABLE: &str = "(subquery)";

/// Type of SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    /// Map a leading SQL keyword to a statement kind.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.to_ascii_uppercase().as_str() {
            "SELECT" | "WITH" => StatementKind::Select,
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            _ => StatementKind::Other,
        }
    }

    /// Whether this statement modifies rows.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }
}

/// A table reference (`FROM users u`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            table: table.into(),
            alias,
        }
    }

    /// Name other clauses use to qualify this table's columns.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// A possibly-qualified column (`u.id` or `id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnName {
    pub qualifier: Option<String>,
    pub column: String,
}

impl ColumnName {
    pub fn new(qualifier: Option<&str>, column: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// Join type after spelling normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    /// Normalise a join keyword prefix: `LEFT OUTER` → `LEFT`, bare / `CROSS` → `INNER`.
    pub fn from_keyword(prefix: &str) -> Self {
        let upper = prefix.trim().to_ascii_uppercase();
        let head = upper.split_whitespace().next().unwrap_or("");
        match head {
            "LEFT" => JoinType::Left,
            "RIGHT" => JoinType::Right,
            "FULL" => JoinType::Full,
            _ => JoinType::Inner,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `left = right` column pair from a JOIN's ON clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left: ColumnName,
    pub right: ColumnName,
}

/// A JOIN as written in the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinRef {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub conditions: Vec<JoinCondition>,
}

impl JoinRef {
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Number of column references to `qualifier` inside this join's own ON clause.
    pub fn own_refs(&self, qualifier: &str) -> usize {
        self.conditions
            .iter()
            .flat_map(|c| [&c.left, &c.right])
            .filter(|c| c.qualifier.as_deref() == Some(qualifier))
            .count()
    }
}

/// What a WHERE condition compares its column against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Parameter,
    Literal,
    Column,
    List,
    Subquery,
    Null,
    Expression,
}

impl ValueKind {
    /// Bound parameter or inline constant.
    pub fn is_scalar_input(self) -> bool {
        matches!(self, ValueKind::Parameter | ValueKind::Literal)
    }
}

/// A single predicate on a column in the WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhereCondition {
    pub column: String,
    /// Upper-cased operator: `=`, `<>`, `IN`, `LIKE`, `IS NULL`, ...
    pub operator: String,
    pub alias: Option<String>,
    pub value: ValueKind,
}

impl WhereCondition {
    pub fn is_equality(&self) -> bool {
        self.operator == "="
    }
}

/// Where the facts came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Tree,
    Fallback,
}

/// LIMIT / OFFSET presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LimitInfo {
    pub has_limit: bool,
    pub has_offset: bool,
    /// Literal row limit, when the LIMIT is a constant.
    pub limit_value: Option<i64>,
}

/// Structural projection of one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQueryFacts {
    pub statement: StatementKind,
    pub main_table: Option<TableRef>,
    pub joins: Vec<JoinRef>,
    pub where_columns: Vec<String>,
    pub where_conditions: Vec<WhereCondition>,
    pub group_by_columns: Vec<String>,
    pub order_by_columns: Vec<String>,
    pub has_limit: bool,
    pub has_offset: bool,
    pub limit_value: Option<i64>,
    pub has_subquery: bool,
    pub has_distinct: bool,
    pub aggregation_functions: Vec<String>,
    /// How often each qualifier (`u` in `u.id`) is referenced anywhere in the statement.
    pub qualifier_refs: BTreeMap<String, usize>,
    /// Projection contains an unqualified `*`.
    pub select_star: bool,
    pub source: ExtractionSource,
}

impl ParsedQueryFacts {
    /// Facts for a statement nothing could be learned about.
    pub fn unknown(source: ExtractionSource) -> Self {
        Self {
            statement: StatementKind::Other,
            main_table: None,
            joins: Vec::new(),
            where_columns: Vec::new(),
            where_conditions: Vec::new(),
            group_by_columns: Vec::new(),
            order_by_columns: Vec::new(),
            has_limit: false,
            has_offset: false,
            limit_value: None,
            has_subquery: false,
            has_distinct: false,
            aggregation_functions: Vec::new(),
            qualifier_refs: BTreeMap::new(),
            select_star: false,
            source,
        }
    }

    pub fn is_select(&self) -> bool {
        self.statement == StatementKind::Select
    }

    pub fn main_table_name(&self) -> Option<&str> {
        self.main_table.as_ref().map(|t| t.table.as_str())
    }

    /// Qualifier → table for every table visible in the statement.
    pub fn alias_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(main) = &self.main_table {
            map.insert(main.qualifier().to_string(), main.table.clone());
            map.entry(main.table.clone())
                .or_insert_with(|| main.table.clone());
        }
        for join in &self.joins {
            map.insert(join.qualifier().to_string(), join.table.clone());
            map.entry(join.table.clone())
                .or_insert_with(|| join.table.clone());
        }
        map
    }

    pub fn qualifier_ref_count(&self, qualifier: &str) -> usize {
        self.qualifier_refs.get(qualifier).copied().unwrap_or(0)
    }
}

/// Bare column names (deduplicated, in order) from a set of conditions.
pub(crate) fn columns_of(conditions: &[WhereCondition]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in conditions {
        if !out.contains(&c.column) {
            out.push(c.column.clone());
        }
    }
    out
}

/// Give unaliased joins their table name as alias when the query qualifies
/// columns with that table name. Joins are never dropped.
pub(crate) fn resolve_implicit_aliases(
    joins: &mut [JoinRef],
    qualifier_refs: &BTreeMap<String, usize>,
) {
    for join in joins.iter_mut() {
        if join.alias.is_none() && qualifier_refs.contains_key(&join.table) {
            join.alias = Some(join.table.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_type_spelling_is_normalised() {
        assert_eq!(JoinType::from_keyword("LEFT OUTER"), JoinType::Left);
        assert_eq!(JoinType::from_keyword("left"), JoinType::Left);
        assert_eq!(JoinType::from_keyword(""), JoinType::Inner);
        assert_eq!(JoinType::from_keyword("CROSS"), JoinType::Inner);
        assert_eq!(JoinType::from_keyword("right outer"), JoinType::Right);
        assert_eq!(JoinType::Left.to_string(), "LEFT");
    }

    #[test]
    fn test_implicit_alias_only_when_table_is_used_as_qualifier() {
        let mut joins = vec![
            JoinRef {
                join_type: JoinType::Inner,
                table: "orders".to_string(),
                alias: None,
                conditions: Vec::new(),
            },
            JoinRef {
                join_type: JoinType::Left,
                table: "items".to_string(),
                alias: None,
                conditions: Vec::new(),
            },
        ];
        let refs = BTreeMap::from([("orders".to_string(), 2usize)]);
        resolve_implicit_aliases(&mut joins, &refs);

        assert_eq!(joins.len(), 2);
        assert_eq!(joins[0].alias.as_deref(), Some("orders"));
        assert_eq!(joins[1].alias, None);
    }

    #[test]
    fn test_alias_map_covers_main_and_joins() {
        let mut facts = ParsedQueryFacts::unknown(ExtractionSource::Tree);
        facts.main_table = Some(TableRef::new("users", Some("u".to_string())));
        facts.joins.push(JoinRef {
            join_type: JoinType::Inner,
            table: "orders".to_string(),
            alias: Some("o".to_string()),
            conditions: Vec::new(),
        });

        let map = facts.alias_map();
        assert_eq!(map.get("u").map(String::as_str), Some("users"));
        assert_eq!(map.get("users").map(String::as_str), Some("users"));
        assert_eq!(map.get("o").map(String::as_str), Some("orders"));
    }
}
