//! Structural extractor façade.
//!
//! [`SqlExtractor`] runs a two-step pipeline for every call: ask the
//! [`SqlParser`] for a tree, then hand `(sql, Option<&Statement>)` to one of
//! the capability components. Each component reads the tree when there is
//! one and applies its own regex fallback when there is not, so every
//! accessor is total.

use crate::facts::{
    ExtractionSource, JoinRef, LimitInfo, ParsedQueryFacts, StatementKind, TableRef,
    WhereCondition, columns_of, resolve_implicit_aliases,
};
use crate::parser::{PgQueryParser, SqlParser, Statement};
use crate::{fallback, sql_analysis};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a capability component gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct ExtractInput<'a> {
    pub sql: &'a str,
    /// `None` when the parser adapter failed.
    pub tree: Option<&'a Statement>,
}

impl<'a> ExtractInput<'a> {
    pub fn text(sql: &'a str) -> Self {
        Self { sql, tree: None }
    }
}

/// FROM-clause structure: main table, joins, qualifier usage.
pub trait JoinExtraction: Send + Sync {
    fn main_table(&self, input: ExtractInput<'_>) -> Option<TableRef>;
    /// Joins as written (implicit aliases are resolved by the façade).
    fn joins(&self, input: ExtractInput<'_>) -> Vec<JoinRef>;
    fn qualifier_refs(&self, input: ExtractInput<'_>) -> BTreeMap<String, usize>;
}

/// WHERE / GROUP BY / ORDER BY.
pub trait ConditionAnalysis: Send + Sync {
    fn where_conditions(&self, input: ExtractInput<'_>) -> Vec<WhereCondition>;
    fn group_by_columns(&self, input: ExtractInput<'_>) -> Vec<String>;
    fn order_by_columns(&self, input: ExtractInput<'_>) -> Vec<String>;
}

/// Statement kind and shape flags that matter for performance checks.
pub trait PerformanceFlags: Send + Sync {
    fn statement_kind(&self, input: ExtractInput<'_>) -> StatementKind;
    fn limit_info(&self, input: ExtractInput<'_>) -> LimitInfo;
    fn has_subquery(&self, input: ExtractInput<'_>) -> bool;
    fn has_distinct(&self, input: ExtractInput<'_>) -> bool;
    fn select_star(&self, input: ExtractInput<'_>) -> bool;
}

/// Aggregate function usage.
pub trait AggregationDetection: Send + Sync {
    fn aggregation_functions(&self, input: ExtractInput<'_>) -> Vec<String>;
}

/// Tree when available, regex otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardJoins;

impl JoinExtraction for StandardJoins {
    fn main_table(&self, input: ExtractInput<'_>) -> Option<TableRef> {
        match input.tree {
            Some(tree) => sql_analysis::main_table(tree),
            None => fallback::main_table(input.sql),
        }
    }

    fn joins(&self, input: ExtractInput<'_>) -> Vec<JoinRef> {
        match input.tree {
            Some(tree) => sql_analysis::joins(tree),
            None => fallback::joins(input.sql),
        }
    }

    fn qualifier_refs(&self, input: ExtractInput<'_>) -> BTreeMap<String, usize> {
        match input.tree {
            Some(tree) => sql_analysis::qualifier_refs(tree),
            None => fallback::qualifier_refs(input.sql),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardConditions;

impl ConditionAnalysis for StandardConditions {
    fn where_conditions(&self, input: ExtractInput<'_>) -> Vec<WhereCondition> {
        match input.tree {
            Some(tree) => sql_analysis::where_conditions(tree),
            None => fallback::where_conditions(input.sql),
        }
    }

    fn group_by_columns(&self, input: ExtractInput<'_>) -> Vec<String> {
        match input.tree {
            Some(tree) => sql_analysis::group_by_columns(tree),
            None => fallback::group_by_columns(input.sql),
        }
    }

    fn order_by_columns(&self, input: ExtractInput<'_>) -> Vec<String> {
        match input.tree {
            Some(tree) => sql_analysis::order_by_columns(tree),
            None => fallback::order_by_columns(input.sql),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFlags;

impl PerformanceFlags for StandardFlags {
    fn statement_kind(&self, input: ExtractInput<'_>) -> StatementKind {
        match input.tree {
            Some(tree) => sql_analysis::statement_kind(tree),
            None => fallback::statement_kind(input.sql),
        }
    }

    fn limit_info(&self, input: ExtractInput<'_>) -> LimitInfo {
        match input.tree {
            Some(tree) => sql_analysis::limit_info(tree),
            None => fallback::limit_info(input.sql),
        }
    }

    fn has_subquery(&self, input: ExtractInput<'_>) -> bool {
        match input.tree {
            Some(tree) => sql_analysis::has_subquery(tree),
            None => fallback::has_subquery(input.sql),
        }
    }

    fn has_distinct(&self, input: ExtractInput<'_>) -> bool {
        match input.tree {
            Some(tree) => sql_analysis::has_distinct(tree),
            None => fallback::has_distinct(input.sql),
        }
    }

    fn select_star(&self, input: ExtractInput<'_>) -> bool {
        match input.tree {
            Some(tree) => sql_analysis::select_star(tree),
            None => fallback::select_star(input.sql),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAggregations;

impl AggregationDetection for StandardAggregations {
    fn aggregation_functions(&self, input: ExtractInput<'_>) -> Vec<String> {
        match input.tree {
            Some(tree) => sql_analysis::aggregation_functions(tree),
            None => fallback::aggregation_functions(input.sql),
        }
    }
}

/// Façade over the parser adapter and the capability components.
///
/// ```
/// use ormlens_sql::{JoinType, SqlExtractor};
///
/// let extractor = SqlExtractor::new();
/// let facts = extractor.facts("SELECT * FROM users u LEFT OUTER JOIN orders o ON o.user_id = u.id");
/// assert!(facts.is_select());
/// assert_eq!(facts.joins[0].join_type, JoinType::Left);
/// ```
pub struct SqlExtractor {
    parser: Arc<dyn SqlParser>,
    joins: Arc<dyn JoinExtraction>,
    conditions: Arc<dyn ConditionAnalysis>,
    flags: Arc<dyn PerformanceFlags>,
    aggregations: Arc<dyn AggregationDetection>,
}

impl Default for SqlExtractor {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for SqlExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlExtractor").finish_non_exhaustive()
    }
}

impl Clone for SqlExtractor {
    fn clone(&self) -> Self {
        Self {
            parser: Arc::clone(&self.parser),
            joins: Arc::clone(&self.joins),
            conditions: Arc::clone(&self.conditions),
            flags: Arc::clone(&self.flags),
            aggregations: Arc::clone(&self.aggregations),
        }
    }
}

impl SqlExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SqlExtractorBuilder {
        SqlExtractorBuilder::default()
    }

    /// Step one of the pipeline. Failures are logged and turned into `None`.
    pub fn parse(&self, sql: &str) -> Option<Statement> {
        match self.parser.parse(sql) {
            Ok(stmt) => Some(stmt),
            Err(e) => {
                tracing::debug!(target: "ormlens.sql", error = %e, "using regex fallback");
                None
            }
        }
    }

    /// Every structural fact in one pass (one parse).
    pub fn facts(&self, sql: &str) -> ParsedQueryFacts {
        if sql.trim().is_empty() {
            return ParsedQueryFacts::unknown(ExtractionSource::Fallback);
        }
        let tree = self.parse(sql);
        let input = ExtractInput {
            sql,
            tree: tree.as_ref(),
        };
        let source = if tree.is_some() {
            ExtractionSource::Tree
        } else {
            ExtractionSource::Fallback
        };

        let qualifier_refs = self.joins.qualifier_refs(input);
        let mut joins = self.joins.joins(input);
        resolve_implicit_aliases(&mut joins, &qualifier_refs);
        let where_conditions = self.conditions.where_conditions(input);
        let limit = self.flags.limit_info(input);

        ParsedQueryFacts {
            statement: self.flags.statement_kind(input),
            main_table: self.joins.main_table(input),
            joins,
            where_columns: columns_of(&where_conditions),
            where_conditions,
            group_by_columns: self.conditions.group_by_columns(input),
            order_by_columns: self.conditions.order_by_columns(input),
            has_limit: limit.has_limit,
            has_offset: limit.has_offset,
            limit_value: limit.limit_value,
            has_subquery: self.flags.has_subquery(input),
            has_distinct: self.flags.has_distinct(input),
            aggregation_functions: self.aggregations.aggregation_functions(input),
            qualifier_refs,
            select_star: self.flags.select_star(input),
            source,
        }
    }

    fn with_input<T>(&self, sql: &str, f: impl FnOnce(ExtractInput<'_>) -> T) -> T {
        let tree = self.parse(sql);
        f(ExtractInput {
            sql,
            tree: tree.as_ref(),
        })
    }

    pub fn is_select(&self, sql: &str) -> bool {
        self.with_input(sql, |i| self.flags.statement_kind(i)) == StatementKind::Select
    }

    pub fn main_table(&self, sql: &str) -> Option<TableRef> {
        self.with_input(sql, |i| self.joins.main_table(i))
    }

    pub fn joins(&self, sql: &str) -> Vec<JoinRef> {
        self.with_input(sql, |i| {
            let refs = self.joins.qualifier_refs(i);
            let mut joins = self.joins.joins(i);
            resolve_implicit_aliases(&mut joins, &refs);
            joins
        })
    }

    pub fn where_conditions(&self, sql: &str) -> Vec<WhereCondition> {
        self.with_input(sql, |i| self.conditions.where_conditions(i))
    }

    pub fn where_columns(&self, sql: &str) -> Vec<String> {
        columns_of(&self.where_conditions(sql))
    }

    pub fn group_by_columns(&self, sql: &str) -> Vec<String> {
        self.with_input(sql, |i| self.conditions.group_by_columns(i))
    }

    pub fn order_by_columns(&self, sql: &str) -> Vec<String> {
        self.with_input(sql, |i| self.conditions.order_by_columns(i))
    }

    pub fn limit_info(&self, sql: &str) -> LimitInfo {
        self.with_input(sql, |i| self.flags.limit_info(i))
    }

    pub fn has_subquery(&self, sql: &str) -> bool {
        self.with_input(sql, |i| self.flags.has_subquery(i))
    }

    pub fn has_distinct(&self, sql: &str) -> bool {
        self.with_input(sql, |i| self.flags.has_distinct(i))
    }

    pub fn aggregation_functions(&self, sql: &str) -> Vec<String> {
        self.with_input(sql, |i| self.aggregations.aggregation_functions(i))
    }
}

/// Builder for [`SqlExtractor`]; every component defaults to its standard implementation.
#[derive(Default)]
pub struct SqlExtractorBuilder {
    parser: Option<Arc<dyn SqlParser>>,
    joins: Option<Arc<dyn JoinExtraction>>,
    conditions: Option<Arc<dyn ConditionAnalysis>>,
    flags: Option<Arc<dyn PerformanceFlags>>,
    aggregations: Option<Arc<dyn AggregationDetection>>,
}

impl SqlExtractorBuilder {
    pub fn parser(mut self, parser: impl SqlParser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn joins(mut self, joins: impl JoinExtraction + 'static) -> Self {
        self.joins = Some(Arc::new(joins));
        self
    }

    pub fn conditions(mut self, conditions: impl ConditionAnalysis + 'static) -> Self {
        self.conditions = Some(Arc::new(conditions));
        self
    }

    pub fn flags(mut self, flags: impl PerformanceFlags + 'static) -> Self {
        self.flags = Some(Arc::new(flags));
        self
    }

    pub fn aggregations(mut self, aggregations: impl AggregationDetection + 'static) -> Self {
        self.aggregations = Some(Arc::new(aggregations));
        self
    }

    pub fn build(self) -> SqlExtractor {
        SqlExtractor {
            parser: self
                .parser
                .unwrap_or_else(|| Arc::new(PgQueryParser::default())),
            joins: self.joins.unwrap_or_else(|| Arc::new(StandardJoins)),
            conditions: self
                .conditions
                .unwrap_or_else(|| Arc::new(StandardConditions)),
            flags: self.flags.unwrap_or_else(|| Arc::new(StandardFlags)),
            aggregations: self
                .aggregations
                .unwrap_or_else(|| Arc::new(StandardAggregations)),
        }
    }
}
