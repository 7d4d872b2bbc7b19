//! ormlens-sql
//!
//! SQL structure extraction for query-log analysis.
//!
//! ORM query logs contain a mix of PostgreSQL, MySQL and driver-specific SQL.
//! Everything in this crate is total: when `pg_query` can parse a statement
//! the facts come from the parse tree, otherwise from regex heuristics that
//! under-report rather than guess.
//!
//! # Features
//!
//! - **Structural extraction**: main table, joins, WHERE conditions, GROUP BY /
//!   ORDER BY, LIMIT, subquery / DISTINCT flags, aggregates
//! - **Normalization**: literal-erasing grouping keys for repeated queries
//! - **Pattern detection**: lazy load by id, N+1 by foreign key, paginated collections
//! - **Caching**: per-session memo tables keyed by SQL content hash
//!
//! # Example
//!
//! ```
//! use ormlens_sql::{AnalysisCache, LoadPattern, normalize};
//!
//! let cache = AnalysisCache::new();
//! let sql = "SELECT * FROM comments WHERE post_id = 7 LIMIT 10";
//!
//! assert_eq!(
//!     normalize(sql).as_deref(),
//!     Some("SELECT * FROM comments WHERE post_id = ? LIMIT ?")
//! );
//! assert_eq!(cache.classify_load(sql), LoadPattern::Collection { has_limit: true });
//! ```

pub mod cache;
pub mod error;
pub mod extractor;
pub mod facts;
pub mod fallback;
pub mod normalize;
pub mod parser;
pub mod patterns;
pub mod sql_analysis;

pub use cache::{AnalysisCache, CacheStats, SqlHash, TableStats};
pub use error::{ParseError, ParseOutcome};
pub use extractor::{
    AggregationDetection, ConditionAnalysis, ExtractInput, JoinExtraction, PerformanceFlags,
    SqlExtractor, SqlExtractorBuilder, StandardAggregations, StandardConditions, StandardFlags,
    StandardJoins,
};
pub use facts::{
    ColumnName, ExtractionSource, JoinCondition, JoinRef, JoinType, LimitInfo, ParsedQueryFacts,
    SUBQUERY_TABLE, StatementKind, TableRef, ValueKind, WhereCondition,
};
pub use normalize::{normalize, normalize_fallback};
pub use parser::{PgQueryParser, SqlParser, Statement, rewrite_for_postgres};
pub use patterns::{
    LoadPattern, RelationRef, classify_load, is_foreign_key_column, is_id_column,
    lazy_load_by_id, n_plus_one_join, n_plus_one_where, partial_collection_load, relation_of,
};
