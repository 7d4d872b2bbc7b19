//! Captured query log.
//!
//! The log is produced elsewhere (an ORM profiler, a driver hook) and is
//! read-only here. JSON input is either an array of records or an object with
//! a `queries` array; keys are camelCase with snake_case aliases.

use crate::error::{InspectError, InspectResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One frame of the call stack that issued a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackFrame {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub class: Option<String>,
}

impl StackFrame {
    /// `Class::function (file:line)`, skipping missing parts.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if let Some(class) = &self.class {
            out.push_str(class);
            out.push_str("::");
        }
        if let Some(function) = &self.function {
            out.push_str(function);
        }
        if let Some(file) = &self.file {
            if !out.is_empty() {
                out.push(' ');
            }
            match self.line {
                Some(line) => out.push_str(&format!("({file}:{line})")),
                None => out.push_str(&format!("({file})")),
            }
        }
        out
    }
}

/// A single captured execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    #[serde(alias = "query")]
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(
        default,
        alias = "execution_time_ms",
        alias = "executionMs",
        alias = "executionMS",
        alias = "duration_ms"
    )]
    pub execution_time_ms: f64,
    #[serde(default, alias = "row_count")]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub backtrace: Option<Vec<StackFrame>>,
    /// Position in the log; assigned on load.
    #[serde(default)]
    pub index: usize,
}

impl QueryRecord {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            execution_time_ms: 0.0,
            row_count: None,
            backtrace: None,
            index: 0,
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_time(mut self, ms: f64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.row_count = Some(rows);
        self
    }

    pub fn with_backtrace(mut self, frames: Vec<StackFrame>) -> Self {
        self.backtrace = Some(frames);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLog {
    Records(Vec<QueryRecord>),
    Wrapped { queries: Vec<QueryRecord> },
}

/// Ordered sequence of captured executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryLog {
    records: Vec<QueryRecord>,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records, renumbering them in order.
    pub fn from_records(records: Vec<QueryRecord>) -> Self {
        let mut log = Self::new();
        log.extend(records);
        log
    }

    pub fn from_json(json: &str) -> InspectResult<Self> {
        let raw: RawLog = serde_json::from_str(json)
            .map_err(|e| InspectError::log(format!("invalid query log: {e}")))?;
        let records = match raw {
            RawLog::Records(records) => records,
            RawLog::Wrapped { queries } => queries,
        };
        Ok(Self::from_records(records))
    }

    pub fn push(&mut self, mut record: QueryRecord) {
        record.index = self.records.len();
        self.records.push(record);
    }

    /// Append records (e.g. from another log file), continuing the numbering.
    pub fn extend(&mut self, records: impl IntoIterator<Item = QueryRecord>) {
        for record in records {
            self.push(record);
        }
    }

    pub fn records(&self) -> &[QueryRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&QueryRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a QueryLog {
    type Item = &'a QueryRecord;
    type IntoIter = std::slice::Iter<'a, QueryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Cut `sql` to at most `max_bytes`, on a char boundary, with `...` appended when cut.
pub fn truncate_sql(sql: &str, max_bytes: usize) -> String {
    if sql.len() <= max_bytes {
        return sql.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &sql[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_camel_and_snake_case() {
        let json = r#"[
            {"sql": "SELECT 1", "params": [1, "a"], "executionTimeMs": 1.5, "rowCount": 1},
            {"sql": "SELECT 2", "execution_time_ms": 3, "row_count": null,
             "backtrace": [{"file": "src/Repo.php", "line": 10, "class": "Repo", "function": "find"}]}
        ]"#;
        let log = QueryLog::from_json(json).expect("valid log");
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].params.len(), 2);
        assert_eq!(log.records()[0].row_count, Some(1));
        assert_eq!(log.records()[1].execution_time_ms, 3.0);
        assert_eq!(log.records()[1].index, 1);
        let frame = &log.records()[1].backtrace.as_ref().expect("backtrace")[0];
        assert_eq!(frame.describe(), "Repo::find (src/Repo.php:10)");
    }

    #[test]
    fn test_wrapped_log_and_renumbering() {
        let json = r#"{"queries": [{"query": "SELECT 1", "index": 40}]}"#;
        let mut log = QueryLog::from_json(json).expect("valid log");
        assert_eq!(log.records()[0].index, 0);
        log.extend([QueryRecord::new("SELECT 2").with_time(2.0)]);
        assert_eq!(log.get(1).map(|r| r.index), Some(1));
    }

    #[test]
    fn test_invalid_log_is_a_log_error() {
        let err = QueryLog::from_json("{\"nope\": true}").unwrap_err();
        assert!(matches!(err, InspectError::Log(_)));
    }

    #[test]
    fn test_truncate_sql() {
        assert_eq!(truncate_sql("SELECT * FROM users", 10), "SELECT * F...");
        assert_eq!(truncate_sql("SELECT 1", 10), "SELECT 1");
        assert_eq!(truncate_sql("SELECT 'é'", 9), "SELECT '...");
    }
}
