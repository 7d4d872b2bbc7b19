//! # ormlens
//!
//! Finds performance anti-patterns in a captured log of ORM-issued SQL.
//!
//! ## Features
//!
//! - **N+1 detection**: per-row SELECTs grouped by pattern and foreign key, including nested loops
//! - **Lazy loading**: entities fetched one by one by id
//! - **Bulk operations**: UPDATE / DELETE issued once per row
//! - **JOIN review**: too many joins, LEFT joins that could be INNER, unused joins, cartesian products
//! - **Caching and slow queries**: identical repeated statements, slow executions
//! - **Missing indexes**: EXPLAIN output judged through a pluggable strategy
//!
//! SQL structure comes from [`ormlens_sql`]; relationship metadata and the
//! query log are plain JSON supplied by the caller.
//!
//! ## Example
//!
//! ```
//! use ormlens::{InspectConfig, Inspector, MetadataSet, QueryLog, QueryRecord};
//!
//! let log = QueryLog::from_records(
//!     (1..=6)
//!         .map(|id| QueryRecord::new(format!("SELECT * FROM orders WHERE user_id = {id}")))
//!         .collect(),
//! );
//!
//! let inspector = Inspector::new(InspectConfig::default()).unwrap();
//! let report = inspector.inspect(&log, &MetadataSet::new());
//!
//! assert_eq!(report.findings[0].title, "N+1 query on orders");
//! assert_eq!(report.findings[0].count, 6);
//! ```

pub mod aggregate;
pub mod analyzers;
pub mod config;
pub mod error;
pub mod explain;
pub mod finding;
pub mod inspector;
pub mod joins;
pub mod log;
pub mod metadata;
pub mod severity;

pub use aggregate::{GroupKey, QueryGroup, group_records, over_threshold};
pub use analyzers::{AnalysisContext, Analyzer, default_analyzers};
pub use config::{DetectorConfig, ExplainStrategyKind, InspectConfig};
pub use error::{InspectError, InspectResult};
pub use explain::{
    ExplainRunner, ExplainStrategy, IndexAdvice, MySqlExplain, PlanRow, PostgresExplain,
    RecordedPlans,
};
pub use finding::{Finding, FindingKind, FindingSet};
pub use inspector::{Inspector, Report};
pub use joins::{ClassifiedJoin, JoinClassifier, JoinDirection, Nullability};
pub use log::{QueryLog, QueryRecord, StackFrame};
pub use metadata::{Association, AssociationKind, EntityMetadata, JoinColumn, MetadataSet};
pub use severity::{Severity, SeverityScale};
