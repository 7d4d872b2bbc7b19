//! Error types for ormlens-sql

use thiserror::Error;

/// Result type for parser adapter calls.
pub type ParseOutcome<T> = Result<T, ParseError>;

/// Why the parser adapter could not produce a statement tree.
///
/// These never escape the extractor: every accessor falls back to its regex
/// heuristic when it receives one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input was empty or whitespace only.
    #[error("empty SQL statement")]
    Empty,
    /// The parser rejected the SQL.
    #[error("SQL syntax error: {message}")]
    Syntax {
        message: String,
        /// Byte offset reported by the parser, if any.
        location: Option<usize>,
    },
    /// Parsing succeeded but produced no statement (e.g. only comments).
    #[error("no SQL statement found")]
    NoStatement,
    /// The parser panicked; the panic was contained.
    #[error("parser panicked: {0}")]
    Panicked(String),
}

impl ParseError {
    /// Build a syntax error from a parser message, extracting the position if present.
    pub fn syntax(message: impl Into<String>) -> Self {
        let message = message.into();
        let location = extract_error_location(&message);
        ParseError::Syntax { message, location }
    }
}

/// Extract error location from a pg_query error message.
fn extract_error_location(error: &str) -> Option<usize> {
    if let Some(pos) = error.rfind("position ") {
        let after_pos = &error[pos + 9..];
        let num_str: String = after_pos
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        return num_str.parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_keeps_position() {
        let err = ParseError::syntax("syntax error at or near \"FORM\" at position 9");
        assert_eq!(
            err,
            ParseError::Syntax {
                message: "syntax error at or near \"FORM\" at position 9".to_string(),
                location: Some(9),
            }
        );

        let err = ParseError::syntax("syntax error at end of input");
        assert!(matches!(err, ParseError::Syntax { location: None, .. }));
    }
}
