//! EXPLAIN collaborators for the missing-index check.
//!
//! Running EXPLAIN needs a live connection, which this crate never opens. A
//! caller supplies an [`ExplainRunner`]; an [`ExplainStrategy`] then reads the
//! plan rows in one database's vocabulary.

use crate::config::ExplainStrategyKind;
use crate::error::{InspectError, InspectResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// One row of EXPLAIN output, column name → value.
pub type PlanRow = Map<String, Value>;

/// Executes EXPLAIN for a statement.
pub trait ExplainRunner {
    fn explain(&self, sql: &str, params: &[Value]) -> InspectResult<Vec<PlanRow>>;
}

/// Why a plan looks like it is missing an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAdvice {
    pub table: Option<String>,
    pub reason: String,
}

/// Judges plan rows.
pub trait ExplainStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn judge(&self, rows: &[PlanRow]) -> Option<IndexAdvice>;
}

pub fn strategy_for(kind: ExplainStrategyKind) -> Box<dyn ExplainStrategy> {
    match kind {
        ExplainStrategyKind::Mysql => Box::new(MySqlExplain),
        ExplainStrategyKind::Postgres => Box::new(PostgresExplain),
    }
}

fn str_field<'a>(row: &'a PlanRow, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

/// MySQL tabular `EXPLAIN` output (`type`, `key`, `possible_keys`, `table`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlExplain;

impl ExplainStrategy for MySqlExplain {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn judge(&self, rows: &[PlanRow]) -> Option<IndexAdvice> {
        for row in rows {
            let table = str_field(row, "table").map(str::to_string);
            let access = str_field(row, "type").unwrap_or_default();
            let key_missing = row.get("key").is_none_or(Value::is_null);

            if access.eq_ignore_ascii_case("ALL") {
                return Some(IndexAdvice {
                    table,
                    reason: "full table scan".to_string(),
                });
            }
            let has_candidates = row
                .get("possible_keys")
                .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
            if has_candidates && key_missing {
                return Some(IndexAdvice {
                    table,
                    reason: "candidate indexes exist but none is used".to_string(),
                });
            }
        }
        None
    }
}

/// PostgreSQL `EXPLAIN (FORMAT JSON)` nodes or plain-text `QUERY PLAN` lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresExplain;

fn seq_scan_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"Seq Scan on "?(\w+)"?"#).expect("invalid built-in regex: seq scan")
    })
}

fn seq_scan_node(node: &PlanRow) -> Option<IndexAdvice> {
    if str_field(node, "Node Type") == Some("Seq Scan") && node.contains_key("Filter") {
        return Some(IndexAdvice {
            table: str_field(node, "Relation Name").map(str::to_string),
            reason: "sequential scan with filter".to_string(),
        });
    }
    node.get("Plans")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .find_map(seq_scan_node)
}

impl ExplainStrategy for PostgresExplain {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn judge(&self, rows: &[PlanRow]) -> Option<IndexAdvice> {
        for row in rows {
            let root = row.get("Plan").and_then(Value::as_object).unwrap_or(row);
            if let Some(advice) = seq_scan_node(root) {
                return Some(advice);
            }
            if let Some(line) = str_field(row, "QUERY PLAN") {
                if let Some(caps) = seq_scan_re().captures(line) {
                    return Some(IndexAdvice {
                        table: caps.get(1).map(|m| m.as_str().to_string()),
                        reason: "sequential scan".to_string(),
                    });
                }
            }
        }
        None
    }
}

/// Plans captured ahead of time, keyed by normalized pattern.
///
/// Lets the missing-index check run offline against EXPLAIN output saved
/// next to the query log.
#[derive(Debug, Clone, Default)]
pub struct RecordedPlans {
    plans: HashMap<String, Vec<PlanRow>>,
}

impl RecordedPlans {
    pub fn from_json(json: &str) -> InspectResult<Self> {
        let plans: HashMap<String, Vec<PlanRow>> = serde_json::from_str(json)
            .map_err(|e| InspectError::explain(format!("invalid recorded plans: {e}")))?;
        Ok(Self { plans })
    }

    pub fn insert(&mut self, pattern: impl Into<String>, rows: Vec<PlanRow>) {
        self.plans.insert(pattern.into(), rows);
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl ExplainRunner for RecordedPlans {
    fn explain(&self, sql: &str, _params: &[Value]) -> InspectResult<Vec<PlanRow>> {
        let Some(pattern) = ormlens_sql::normalize(sql) else {
            return Ok(Vec::new());
        };
        Ok(self.plans.get(&pattern).cloned().unwrap_or_default())
    }
}
