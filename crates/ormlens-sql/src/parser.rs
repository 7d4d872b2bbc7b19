//! Parser adapter: SQL text → statement tree.
//!
//! The default adapter wraps `pg_query` (libpg_query). ORM query logs are rarely
//! pure PostgreSQL, so the text is first rewritten: `?` and `:name` placeholders
//! become `$n`, and MySQL back-tick identifiers become double-quoted ones.

use crate::error::{ParseError, ParseOutcome};
use pg_query::NodeEnum;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A parsed statement tree.
pub struct Statement {
    parsed: pg_query::ParseResult,
    sql: String,
}

impl Statement {
    /// The SQL actually handed to the parser (after placeholder rewriting).
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Raw protobuf tree.
    pub fn protobuf(&self) -> &pg_query::protobuf::ParseResult {
        &self.parsed.protobuf
    }

    /// Root node of the first statement.
    pub fn root(&self) -> Option<&NodeEnum> {
        self.parsed
            .protobuf
            .stmts
            .first()
            .and_then(|s| s.stmt.as_ref())
            .and_then(|s| s.node.as_ref())
    }

    /// Number of statements in the input.
    pub fn statement_count(&self) -> usize {
        self.parsed.protobuf.stmts.len()
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("statements", &self.statement_count())
            .finish()
    }
}

/// Turns SQL text into a statement tree.
///
/// Implementations must not panic; [`PgQueryParser`] contains panics raised
/// inside the parser and reports them as [`ParseError::Panicked`].
pub trait SqlParser: Send + Sync {
    fn parse(&self, sql: &str) -> ParseOutcome<Statement>;
}

/// `pg_query`-backed parser.
#[derive(Debug, Clone)]
pub struct PgQueryParser {
    /// Rewrite `?` / `:name` placeholders and back-ticks before parsing.
    pub rewrite_placeholders: bool,
}

impl Default for PgQueryParser {
    fn default() -> Self {
        Self {
            rewrite_placeholders: true,
        }
    }
}

impl PgQueryParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand the SQL to libpg_query unchanged.
    pub fn strict() -> Self {
        Self {
            rewrite_placeholders: false,
        }
    }
}

impl SqlParser for PgQueryParser {
    fn parse(&self, sql: &str) -> ParseOutcome<Statement> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        let text = if self.rewrite_placeholders {
            rewrite_for_postgres(trimmed)
        } else {
            trimmed.to_string()
        };

        match catch_unwind(AssertUnwindSafe(|| pg_query::parse(&text))) {
            Ok(Ok(parsed)) => {
                if parsed.protobuf.stmts.is_empty() {
                    return Err(ParseError::NoStatement);
                }
                Ok(Statement { parsed, sql: text })
            }
            Ok(Err(e)) => {
                tracing::trace!(target: "ormlens.sql", error = %e, "pg_query rejected statement");
                Err(ParseError::syntax(e.to_string()))
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::debug!(target: "ormlens.sql", %message, "pg_query panicked");
                Err(ParseError::Panicked(message))
            }
        }
    }
}

/// Rewrite ORM-style SQL into something libpg_query accepts.
///
/// Outside string literals and quoted identifiers:
/// - `?` becomes `$1`, `$2`, ... (`?|` and `?&` JSON operators are left alone)
/// - `:name` becomes `$n` (`::type` casts are left alone)
/// - back-tick quoted identifiers become double-quoted identifiers
pub fn rewrite_for_postgres(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next_param = 1usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == '\'' {
                        if i + 1 < chars.len() && chars[i + 1] == '\'' {
                            out.push('\'');
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            '"' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == '"' {
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            '`' => {
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != '`' {
                    out.push(chars[i]);
                    i += 1;
                }
                out.push('"');
                i += 1;
            }
            '?' => {
                let next = chars.get(i + 1).copied();
                if matches!(next, Some('|') | Some('&')) {
                    out.push(c);
                } else {
                    out.push('$');
                    out.push_str(&next_param.to_string());
                    next_param += 1;
                }
                i += 1;
            }
            ':' => {
                let prev = if i > 0 { Some(chars[i - 1]) } else { None };
                let next = chars.get(i + 1).copied();
                let starts_name = next.is_some_and(|n| n.is_ascii_alphabetic() || n == '_');
                if prev != Some(':') && starts_name {
                    let mut j = i + 1;
                    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_')
                    {
                        j += 1;
                    }
                    out.push('$');
                    out.push_str(&next_param.to_string());
                    next_param += 1;
                    i = j;
                } else {
                    out.push(c);
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}
