//! Literal-erasing query normalizer.
//!
//! The normalized pattern is the grouping key for repeated executions, so two
//! statements that differ only in literal values must map to the same string,
//! and normalizing a pattern again must not change it.

use crate::fallback::scrub;
use crate::parser::rewrite_for_postgres;
use regex::{Captures, Regex};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| {
                Regex::new($pattern).expect(concat!("invalid built-in regex: ", stringify!($name)))
            })
        }
    };
}

static_regex!(positional_param_re, r"\$\d+");
static_regex!(named_param_re, r"(^|[^:\w]):[A-Za-z_]\w*");
static_regex!(hex_re, r"\b0[xX][0-9A-Fa-f]+\b");
static_regex!(number_re, r"\b\d+(?:\.\d+)?(?:[eE][+-]?\d+)?\b");
static_regex!(boolean_re, r"(?i)\b(?:true|false)\b");
static_regex!(negative_re, r"([=<>(,]\s*)-\s*\?");
static_regex!(
    quoted_value_re,
    r#"(<>|!=|<=|>=|=|<|>|(?i:\blike\b))\s*"[^"]*"(\.)?"#
);
static_regex!(whitespace_re, r"\s+");
static_regex!(in_list_re, r"(?i)\bIN\s*\(\s*\?(?:\s*,\s*\?)*\s*\)");
static_regex!(
    values_re,
    r"(?i)\bVALUES\s*(\(\s*\?(?:\s*,\s*\?)*\s*\))(?:\s*,\s*\(\s*\?(?:\s*,\s*\?)*\s*\))+"
);
static_regex!(word_re, r"[A-Za-z_][A-Za-z0-9_$]*");
static_regex!(
    keyword_re,
    r"(?i)\b(?:select|from|where|and|or|not|in|is|null|join|left|right|inner|outer|full|cross|natural|on|using|as|group|by|order|having|limit|offset|union|all|distinct|insert|into|values|update|set|delete|asc|desc|like|ilike|between|exists|case|when|then|else|end|returning|with|count|sum|avg|min|max|for|lateral|any)\b"
);
static_regex!(operator_re, r"\s*(<>|!=|<=|>=|=|<|>)\s*");
static_regex!(comma_re, r"\s*,\s*");
static_regex!(open_paren_re, r"\(\s+");
static_regex!(close_paren_re, r"\s+\)");

/// Normalize SQL into its grouping pattern.
///
/// Returns `None` only when nothing but whitespace or comments is left.
///
/// ```
/// use ormlens_sql::normalize;
///
/// assert_eq!(
///     normalize("select id, name from users where id = 42").as_deref(),
///     Some("SELECT * FROM users WHERE id = ?")
/// );
/// assert_eq!(
///     normalize("SELECT * FROM users WHERE id IN (1, 2, 3)"),
///     normalize("SELECT * FROM users WHERE id IN (7)")
/// );
/// ```
pub fn normalize(sql: &str) -> Option<String> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return None;
    }
    let erased = structured_erase(trimmed).unwrap_or_else(|| trimmed.to_string());
    let pattern = canonicalize(&erased);
    if pattern.is_empty() { None } else { Some(pattern) }
}

/// Regex-only normalization; same output as [`normalize`] for SQL the parser accepts.
pub fn normalize_fallback(sql: &str) -> Option<String> {
    let pattern = canonicalize(sql.trim());
    if pattern.is_empty() { None } else { Some(pattern) }
}

/// Let libpg_query replace constants when it can parse the statement.
fn structured_erase(sql: &str) -> Option<String> {
    let text = rewrite_for_postgres(sql);
    match catch_unwind(AssertUnwindSafe(|| pg_query::normalize(&text))) {
        Ok(Ok(normalized)) => Some(normalized),
        Ok(Err(e)) => {
            tracing::trace!(target: "ormlens.sql", error = %e, "normalizing with regex fallback");
            None
        }
        Err(_) => {
            tracing::debug!(target: "ormlens.sql", "pg_query::normalize panicked");
            None
        }
    }
}

fn canonicalize(sql: &str) -> String {
    let text = scrub(sql, "?");
    // MySQL writes string literals in double quotes; an unqualified quoted
    // operand on the value side of a comparison is one of those.
    let text = quoted_value_re().replace_all(&text, |c: &Captures<'_>| {
        if c.get(2).is_some() {
            c[0].to_string()
        } else {
            format!("{} ?", &c[1])
        }
    });
    let text = text.replace(['"', '`'], "");
    let text = erase_literals(&text);
    let text = whitespace_re().replace_all(&text, " ");
    let text = in_list_re().replace_all(&text, "IN (?)");
    let text = values_re().replace_all(&text, "VALUES $1");
    let text = collapse_projection(&text);
    let text = keyword_re().replace_all(&text, |c: &Captures<'_>| c[0].to_uppercase());
    let text = operator_re().replace_all(&text, " $1 ");
    let text = comma_re().replace_all(&text, ", ");
    let text = open_paren_re().replace_all(&text, "(");
    let text = close_paren_re().replace_all(&text, ")");
    let text = whitespace_re().replace_all(&text, " ");
    text.trim().trim_end_matches(';').trim_end().to_string()
}

fn erase_literals(text: &str) -> String {
    let text = positional_param_re().replace_all(text, "?");
    let text = named_param_re().replace_all(&text, "$1?");
    let text = hex_re().replace_all(&text, "?");
    let text = number_re().replace_all(&text, "?");
    let text = boolean_re().replace_all(&text, "?");
    negative_re().replace_all(&text, "$1?").into_owned()
}

/// Replace the column list of the outermost SELECT(s) with `*`.
fn collapse_projection(text: &str) -> String {
    let mut depth = 0i32;
    let mut heads: Vec<(i32, usize, usize)> = Vec::new();
    let mut froms: Vec<(i32, usize)> = Vec::new();
    let mut last = 0usize;

    for word in word_re().find_iter(text) {
        for c in text[last..word.start()].chars() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
        }
        last = word.start();
        if word.as_str().eq_ignore_ascii_case("select") {
            heads.push((depth, word.start(), word.end()));
        } else if word.as_str().eq_ignore_ascii_case("from") {
            froms.push((depth, word.start()));
        }
    }

    let Some(top) = heads.iter().map(|h| h.0).min() else {
        return text.to_string();
    };

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for &(d, _start, end) in heads.iter().filter(|h| h.0 == top) {
        let Some(&(_, from)) = froms.iter().find(|f| f.0 == d && f.1 > end) else {
            continue;
        };
        let projection = text[end..from].trim();
        let distinct = projection
            .get(..8)
            .is_some_and(|p| p.eq_ignore_ascii_case("distinct"))
            && projection[8..].starts_with(char::is_whitespace);
        out.push_str(&text[cursor..end]);
        out.push_str(if distinct { " DISTINCT * " } else { " * " });
        cursor = from;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erases_literals_and_projection() {
        assert_eq!(
            normalize("SELECT u.id, u.name FROM users u WHERE u.email = 'a@b.c' AND u.age > 30").as_deref(),
            Some("SELECT * FROM users u WHERE u.email = ? AND u.age > ?")
        );
    }

    #[test]
    fn test_literal_invariance() {
        let a = normalize("SELECT * FROM comments WHERE post_id = 7");
        let b = normalize("SELECT * FROM comments WHERE post_id = 9");
        let c = normalize("select * from comments where post_id = ?");
        let d = normalize("SELECT * FROM comments WHERE post_id = :post");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
        assert_eq!(
            normalize("SELECT * FROM t WHERE a = -5 AND b = 'it''s'"),
            normalize("SELECT * FROM t WHERE a = 12 AND b = 'x'")
        );
    }

    #[test]
    fn test_collapses_in_lists_and_multi_row_values() {
        assert_eq!(
            normalize("SELECT * FROM users WHERE id IN (1, 2, 3)").as_deref(),
            Some("SELECT * FROM users WHERE id IN (?)")
        );
        assert_eq!(
            normalize("INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y')"),
            normalize("INSERT INTO t (a, b) VALUES (3, 'z')")
        );
    }

    #[test]
    fn test_preserves_clause_order_and_subqueries() {
        let sql = "SELECT DISTINCT p.id FROM posts p JOIN users u ON u.id = p.user_id WHERE p.id IN (SELECT post_id FROM tags WHERE name = 'rust') GROUP BY p.id ORDER BY p.id LIMIT 10";
        assert_eq!(
            normalize(sql).as_deref(),
            Some("SELECT DISTINCT * FROM posts p JOIN users u ON u.id = p.user_id WHERE p.id IN (SELECT post_id FROM tags WHERE name = ?) GROUP BY p.id ORDER BY p.id LIMIT ?")
        );
    }

    #[test]
    fn test_fallback_handles_mysql_and_comments() {
        let sql = "/* app */ SELECT `id` FROM `users` WHERE `name` = 'bob' LIMIT 0, 20; -- trailing";
        assert_eq!(
            normalize(sql).as_deref(),
            Some("SELECT * FROM users WHERE name = ? LIMIT ?, ?")
        );
    }

    #[test]
    fn test_double_quoted_values_are_literals() {
        let bob = normalize(r#"SELECT * FROM users WHERE name = "bob""#);
        assert_eq!(bob.as_deref(), Some("SELECT * FROM users WHERE name = ?"));
        assert_eq!(bob, normalize(r#"SELECT * FROM users WHERE name = "alice""#));
        assert_eq!(
            normalize(r#"SELECT * FROM "posts" p JOIN "users" u ON u."id" = "p"."user_id""#).as_deref(),
            Some("SELECT * FROM posts p JOIN users u ON u.id = p.user_id")
        );
    }

    #[test]
    fn test_idempotent_and_empty() {
        let once = normalize("select a from t where b = 1 and c in (1,2)").expect("pattern");
        assert_eq!(normalize(&once).as_deref(), Some(once.as_str()));
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("-- only a comment"), None);
    }
}
