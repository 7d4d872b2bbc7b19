//! Regex heuristics used when the parser adapter cannot produce a tree.
//!
//! Each function mirrors one tree accessor in [`crate::sql_analysis`]. They are
//! deliberately conservative: when a construct is not recognised, it is left
//! out rather than guessed. None of them panic.

use crate::facts::{
    ColumnName, JoinCondition, JoinRef, JoinType, LimitInfo, SUBQUERY_TABLE, StatementKind,
    TableRef, ValueKind, WhereCondition,
};
use crate::sql_analysis::AGGREGATE_FUNCTIONS;
use regex::Regex;
use std::collections::BTreeMap;
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

static_regex!(leading_keyword_re, r"^[\s(]*([a-z]+)");
static_regex!(
    from_re,
    r"\bfrom\s+(\(|[a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)?)(?:\s+(?:as\s+)?([a-z_][a-z0-9_$]*))?"
);
static_regex!(
    update_re,
    r"^\s*update\s+(?:only\s+)?([a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)?)(?:\s+(?:as\s+)?([a-z_][a-z0-9_$]*))?"
);
static_regex!(
    delete_re,
    r"^\s*delete\s+from\s+([a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)?)(?:\s+(?:as\s+)?([a-z_][a-z0-9_$]*))?"
);
static_regex!(
    insert_re,
    r"^\s*insert\s+into\s+([a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)?)"
);
static_regex!(
    join_head_re,
    r"\b(?:natural\s+)?(?:(left|right|inner|full|cross)(?:\s+outer)?\s+)?join\s+(\(|[a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)?)(?:\s+(?:as\s+)?([a-z_][a-z0-9_$]*))?"
);
static_regex!(
    clause_boundary_re,
    r"\b(?:where|group\s+by|order\s+by|having|limit|offset|union|returning|for\s+update)\b"
);
static_regex!(on_re, r"\bon\b");
static_regex!(
    join_pair_re,
    r"(?:([a-z_][a-z0-9_$]*)\.)?([a-z_][a-z0-9_$]*)\s*=\s*(?:([a-z_][a-z0-9_$]*)\.)?([a-z_][a-z0-9_$]*)"
);
static_regex!(where_re, r"\bwhere\b");
static_regex!(
    where_end_re,
    r"\b(?:group\s+by|order\s+by|having|limit|offset|union|returning|for\s+update)\b"
);
static_regex!(
    condition_re,
    r"(?:([a-z_][a-z0-9_$]*)\.)?([a-z_][a-z0-9_$]*)\s*(<>|!=|<=|>=|=|<|>|\bnot\s+in\b|\bin\b|\bnot\s+like\b|\blike\b|\bilike\b|\bis\s+not\s+null\b|\bis\s+null\b|\bbetween\b)\s*(\?|\$\d+|:[a-z_][a-z0-9_]*|''|-?\d+(?:\.\d+)?|\(\s*select\b|\(|(?:[a-z_][a-z0-9_$]*\.)?[a-z_][a-z0-9_$]*)?"
);
static_regex!(not_group_re, r"\bnot\s*\(");
static_regex!(
    not_term_re,
    r"\bnot\s+(?:[a-z_][a-z0-9_$]*\.)?[a-z_][a-z0-9_$]*\s*(?:<>|!=|<=|>=|=|<|>)\s*\S+"
);
static_regex!(group_by_re, r"\bgroup\s+by\b");
static_regex!(
    group_by_end_re,
    r"\b(?:having|order\s+by|limit|offset|union|for\s+update)\b"
);
static_regex!(order_by_re, r"\border\s+by\b");
static_regex!(order_by_end_re, r"\b(?:limit|offset|union|for\s+update)\b");
static_regex!(
    limit_re,
    r"\blimit\s+(\d+|\?|\$\d+|:[a-z_][a-z0-9_]*|all)(?:\s*,\s*(\d+|\?|\$\d+|:[a-z_][a-z0-9_]*))?"
);
static_regex!(offset_re, r"\boffset\b");
static_regex!(subquery_re, r"\(\s*select\b");
static_regex!(distinct_re, r"^[\s(]*select\s+distinct\b");
static_regex!(
    aggregate_re,
    r"\b(count|sum|avg|min|max|group_concat|string_agg|array_agg|json_agg|jsonb_agg)\s*\("
);
static_regex!(qualifier_re, r"\b([a-z_][a-z0-9_$]*)\.([a-z_*])");
static_regex!(column_item_re, r"^[a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)?$");

/// Words that can never be a table alias.
const RESERVED: &[&str] = &[
    "on", "using", "where", "left", "right", "inner", "outer", "full", "cross", "join", "natural",
    "group", "order", "limit", "offset", "having", "union", "set", "for", "window", "values",
    "returning", "and", "or", "not", "select", "from", "as", "lateral",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

/// Whether the backslash at `at`, inside a plain string literal, escapes the
/// character after it.
///
/// Standard SQL strings have no backslash escapes, but MySQL writes `\'`
/// inside literals. A `\'` is read as an escaped quote only when the rest of
/// the statement still has an unescaped quote left to close the literal, so
/// `'C:\'` ends where PostgreSQL ends it and `'it\'s'` stays one literal.
fn backslash_quote_escapes(chars: &[char], at: usize) -> bool {
    match chars.get(at + 1) {
        Some('\'') => {}
        Some('\\') => return true,
        _ => return false,
    }
    let mut closing = 0usize;
    let mut j = at + 2;
    while j < chars.len() {
        match chars[j] {
            '\\' if chars.get(j + 1) == Some(&'\'') => j += 2,
            '\'' => {
                closing += 1;
                j += 1;
            }
            _ => j += 1,
        }
    }
    closing % 2 == 1
}

/// Remove comments and string-literal contents.
///
/// String literals are replaced by `literal` (the extractor uses `''`, the
/// normalizer `?`). Prefixed literals (`E'..'`, `N'..'`) lose their prefix;
/// backslash escapes are honored in `E'..'` literals and, for MySQL logs, as
/// `\'` inside plain literals when the statement still closes them.
pub fn scrub(sql: &str, literal: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            out.push(' ');
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
            out.push(' ');
            continue;
        }
        if c == '\'' {
            let mut tail = out.chars().rev();
            let prefix = tail
                .next()
                .filter(|&p| matches!(p, 'E' | 'e' | 'N' | 'n' | 'B' | 'b' | 'X' | 'x'))
                .filter(|_| !tail.next().is_some_and(|p| p.is_alphanumeric() || p == '_'));
            if prefix.is_some() {
                out.pop();
            }
            let escapes = matches!(prefix, Some('E' | 'e'));
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && (escapes || backslash_quote_escapes(&chars, i)) {
                    i += 2;
                    continue;
                }
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            i += 1;
            out.push_str(literal);
            continue;
        }
        out.push(c);
        i += 1;
    }

    out
}

/// Text all heuristics run on: scrubbed, unquoted, lower-cased.
pub(crate) fn prepare(sql: &str) -> String {
    scrub(sql, "''")
        .replace(['"', '`'], "")
        .to_lowercase()
}

fn last_segment(ident: &str) -> String {
    ident.rsplit('.').next().unwrap_or(ident).to_string()
}

fn alias_of(capture: Option<regex::Match<'_>>) -> Option<String> {
    capture
        .map(|m| m.as_str().to_string())
        .filter(|a| !is_reserved(a))
}

pub fn statement_kind(sql: &str) -> StatementKind {
    let text = prepare(sql);
    leading_keyword_re()
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| StatementKind::from_keyword(m.as_str()))
        .unwrap_or(StatementKind::Other)
}

fn table_from(captures: Option<regex::Captures<'_>>) -> Option<TableRef> {
    let c = captures?;
    let table = c.get(1)?.as_str();
    if table == "(" {
        return Some(TableRef::new(SUBQUERY_TABLE, None));
    }
    Some(TableRef::new(last_segment(table), alias_of(c.get(2))))
}

pub fn main_table(sql: &str) -> Option<TableRef> {
    let text = prepare(sql);
    match statement_kind(sql) {
        StatementKind::Select => table_from(from_re().captures(&text)),
        StatementKind::Update => table_from(update_re().captures(&text)),
        StatementKind::Delete => table_from(delete_re().captures(&text)),
        StatementKind::Insert => insert_re()
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| TableRef::new(last_segment(m.as_str()), None)),
        StatementKind::Other => None,
    }
}

fn next_boundary(text: &str, from: usize, heads: &[usize]) -> usize {
    let head = heads.iter().copied().filter(|&h| h >= from).min();
    let clause = clause_boundary_re().find_at(text, from).map(|m| m.start());
    match (head, clause) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => text.len(),
    }
}

fn join_pairs(segment: &str) -> Vec<JoinCondition> {
    join_pair_re()
        .captures_iter(segment)
        .filter_map(|c| {
            let left = c.get(2)?.as_str();
            let right = c.get(4)?.as_str();
            if is_reserved(left) || is_reserved(right) || is_value_keyword(right) {
                return None;
            }
            Some(JoinCondition {
                left: ColumnName::new(c.get(1).map(|m| m.as_str()), left),
                right: ColumnName::new(c.get(3).map(|m| m.as_str()), right),
            })
        })
        .collect()
}

/// Joins as written; implicit aliases are resolved by the caller.
pub fn joins(sql: &str) -> Vec<JoinRef> {
    let text = prepare(sql);
    let heads: Vec<regex::Captures<'_>> = join_head_re().captures_iter(&text).collect();
    let starts: Vec<usize> = heads
        .iter()
        .filter_map(|c| c.get(0).map(|m| m.start()))
        .collect();

    let mut out = Vec::with_capacity(heads.len());
    for c in &heads {
        let (Some(whole), Some(table)) = (c.get(0), c.get(2)) else {
            continue;
        };
        let join_type = JoinType::from_keyword(c.get(1).map(|m| m.as_str()).unwrap_or(""));
        let (table_name, alias) = if table.as_str() == "(" {
            (SUBQUERY_TABLE.to_string(), None)
        } else {
            (last_segment(table.as_str()), alias_of(c.get(3)))
        };

        let seg_start = table.end();
        let seg_end = next_boundary(&text, whole.end(), &starts).max(seg_start);
        let segment = &text[seg_start..seg_end];
        let conditions = match on_re().find(segment) {
            Some(on) => join_pairs(&segment[on.end()..]),
            None => Vec::new(),
        };

        out.push(JoinRef {
            join_type,
            table: table_name,
            alias,
            conditions,
        });
    }
    out
}

fn is_value_keyword(word: &str) -> bool {
    matches!(word, "true" | "false" | "null")
}

fn classify_value(token: Option<&str>, operator: &str) -> ValueKind {
    if operator.contains("null") {
        return ValueKind::Null;
    }
    let Some(token) = token.map(str::trim) else {
        return ValueKind::Expression;
    };
    if token == "?" || token.starts_with('$') || token.starts_with(':') {
        ValueKind::Parameter
    } else if token == "''" || token.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        ValueKind::Literal
    } else if token.starts_with('(') {
        if token.ends_with("select") {
            ValueKind::Subquery
        } else {
            ValueKind::List
        }
    } else if token == "null" {
        ValueKind::Null
    } else if is_value_keyword(token) {
        ValueKind::Literal
    } else {
        ValueKind::Column
    }
}

fn where_segment(text: &str) -> Option<&str> {
    let start = where_re().find(text)?.end();
    let end = where_end_re()
        .find_at(text, start)
        .map(|m| m.start())
        .unwrap_or(text.len());
    Some(&text[start..end])
}

/// Blank out `not (...)` groups and `not col = value` terms.
fn strip_negations(segment: &str) -> String {
    let mut out = segment.to_string();
    while let Some((start, open)) = not_group_re().find(&out).map(|m| (m.start(), m.end() - 1)) {
        let mut depth = 0i32;
        let mut close = out.len();
        for (i, c) in out[open..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = open + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        out.replace_range(start..close, " ");
    }
    not_term_re().replace_all(&out, " ").into_owned()
}

pub fn where_conditions(sql: &str) -> Vec<WhereCondition> {
    let text = prepare(sql);
    let Some(segment) = where_segment(&text) else {
        return Vec::new();
    };
    let segment = strip_negations(segment);

    condition_re()
        .captures_iter(&segment)
        .filter_map(|c| {
            let column = c.get(2)?.as_str();
            if is_reserved(column) || is_value_keyword(column) {
                return None;
            }
            let raw_op = c.get(3)?.as_str();
            let operator = raw_op.split_whitespace().collect::<Vec<_>>().join(" ");
            let operator = match operator.as_str() {
                "!=" => "<>".to_string(),
                other => other.to_uppercase(),
            };
            let value = classify_value(c.get(4).map(|m| m.as_str()), raw_op);
            Some(WhereCondition {
                column: column.to_string(),
                operator,
                alias: c.get(1).map(|m| m.as_str().to_string()),
                value,
            })
        })
        .collect()
}

fn column_list(segment: &str) -> Vec<String> {
    segment
        .split(',')
        .filter_map(|item| {
            let first = item.split_whitespace().next()?;
            column_item_re()
                .is_match(first)
                .then(|| first.to_string())
        })
        .collect()
}

fn clause_segment<'a>(text: &'a str, start: &Regex, end: &Regex) -> Option<&'a str> {
    let from = start.find(text)?.end();
    let to = end
        .find_at(text, from)
        .map(|m| m.start())
        .unwrap_or(text.len());
    Some(&text[from..to])
}

pub fn group_by_columns(sql: &str) -> Vec<String> {
    let text = prepare(sql);
    clause_segment(&text, group_by_re(), group_by_end_re())
        .map(column_list)
        .unwrap_or_default()
}

pub fn order_by_columns(sql: &str) -> Vec<String> {
    let text = prepare(sql);
    clause_segment(&text, order_by_re(), order_by_end_re())
        .map(column_list)
        .unwrap_or_default()
}

pub fn limit_info(sql: &str) -> LimitInfo {
    let text = prepare(sql);
    let mut info = LimitInfo {
        has_offset: offset_re().is_match(&text),
        ..LimitInfo::default()
    };
    if let Some(c) = limit_re().captures(&text) {
        let first = c.get(1).map(|m| m.as_str()).unwrap_or("");
        match c.get(2) {
            // MySQL `LIMIT offset, count`
            Some(count) => {
                info.has_limit = true;
                info.has_offset = true;
                info.limit_value = count.as_str().parse().ok();
            }
            None if first != "all" => {
                info.has_limit = true;
                info.limit_value = first.parse().ok();
            }
            None => {}
        }
    }
    info
}

pub fn has_subquery(sql: &str) -> bool {
    subquery_re().is_match(&prepare(sql))
}

pub fn has_distinct(sql: &str) -> bool {
    distinct_re().is_match(&prepare(sql))
}

pub fn aggregation_functions(sql: &str) -> Vec<String> {
    let text = prepare(sql);
    let mut out: Vec<String> = Vec::new();
    for c in aggregate_re().captures_iter(&text) {
        let Some(name) = c.get(1).map(|m| m.as_str().to_uppercase()) else {
            continue;
        };
        if AGGREGATE_FUNCTIONS.contains(&name.as_str()) && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

pub fn qualifier_refs(sql: &str) -> BTreeMap<String, usize> {
    let text = prepare(sql);
    // Schema-qualified tables in FROM/JOIN (`public.users`) are not column qualifiers.
    let tables: Vec<String> = from_re()
        .captures_iter(&text)
        .filter_map(|c| c.get(1))
        .chain(join_head_re().captures_iter(&text).filter_map(|c| c.get(2)))
        .map(|m| m.as_str())
        .filter(|t| t.contains('.'))
        .map(str::to_string)
        .collect();

    let mut refs: BTreeMap<String, usize> = BTreeMap::new();
    for c in qualifier_re().captures_iter(&text) {
        let (Some(q), Some(whole)) = (c.get(1), c.get(0)) else {
            continue;
        };
        let rest = &text[whole.start()..];
        if tables.iter().any(|t| rest.starts_with(t.as_str())) {
            continue;
        }
        *refs.entry(q.as_str().to_string()).or_insert(0) += 1;
    }
    refs
}

pub fn select_star(sql: &str) -> bool {
    let text = prepare(sql);
    let Some(select) = leading_keyword_re()
        .captures(&text)
        .and_then(|c| c.get(1))
        .filter(|m| m.as_str() == "select")
    else {
        return false;
    };
    let rest = &text[select.end()..];
    let projection = match from_re().find(rest) {
        Some(m) => &rest[..m.start()],
        None => rest,
    };
    projection
        .split(',')
        .map(|item| item.trim().trim_start_matches("distinct").trim())
        .any(|item| item == "*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_removes_comments_and_literals() {
        assert_eq!(
            scrub("SELECT 'a''b' -- note\nFROM t /* x */ WHERE n = E'x'", "?"),
            "SELECT ?  \nFROM t   WHERE n = ?"
        );
    }

    #[test]
    fn test_scrub_backslash_only_escapes_when_literal_still_closes() {
        assert_eq!(
            scrub(r"SELECT * FROM files WHERE path = 'C:\' AND id = 3", "?"),
            "SELECT * FROM files WHERE path = ? AND id = 3"
        );
        assert_eq!(
            scrub(r"SELECT * FROM t WHERE name = 'it\'s' AND id = 3", "?"),
            "SELECT * FROM t WHERE name = ? AND id = 3"
        );
        assert_eq!(scrub(r"SELECT E'a\'b', 'c'", "?"), "SELECT ?, ?");
    }

    #[test]
    fn test_negated_terms_are_not_conditions() {
        let conds = where_conditions(
            "SELECT * FROM users WHERE NOT (id = 1 OR id = 2) AND NOT status = 2 AND org_id = ?",
        );
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].column, "org_id");
        assert_eq!(conds[0].value, ValueKind::Parameter);
    }

    #[test]
    fn test_joins_normalise_type_and_keep_unaliased() {
        let sql = "SELECT * FROM users u LEFT OUTER JOIN orders o ON o.user_id = u.id JOIN items ON items.order_id = o.id WHERE u.id = 1 LIMIT 5, 10";
        let joins = joins(sql);
        assert_eq!(joins.len(), 2);
        assert_eq!(joins[0].join_type, JoinType::Left);
        assert_eq!(joins[0].alias.as_deref(), Some("o"));
        assert_eq!(joins[0].conditions.len(), 1);
        assert_eq!(joins[0].conditions[0].left, ColumnName::new(Some("o"), "user_id"));
        assert_eq!(joins[1].join_type, JoinType::Inner);
        assert_eq!(joins[1].table, "items");
        assert_eq!(joins[1].alias, None);

        let limit = limit_info(sql);
        assert!(limit.has_limit);
        assert!(limit.has_offset);
        assert_eq!(limit.limit_value, Some(10));
    }

    #[test]
    fn test_where_conditions_from_mysql_style_sql() {
        let sql = "SELECT * FROM `posts` p WHERE p.`author_id` = ? AND p.status NOT IN (1, 2) AND p.title LIKE 'x%' AND deleted_at IS NULL ORDER BY p.id DESC";
        let conds = where_conditions(sql);
        assert_eq!(conds.len(), 4);
        assert_eq!(conds[0].column, "author_id");
        assert_eq!(conds[0].alias.as_deref(), Some("p"));
        assert_eq!(conds[0].value, ValueKind::Parameter);
        assert_eq!(conds[1].operator, "NOT IN");
        assert_eq!(conds[1].value, ValueKind::List);
        assert_eq!(conds[2].operator, "LIKE");
        assert_eq!(conds[2].value, ValueKind::Literal);
        assert_eq!(conds[3].operator, "IS NULL");
        assert_eq!(conds[3].value, ValueKind::Null);
        assert_eq!(order_by_columns(sql), vec!["p.id"]);
        assert_eq!(main_table(sql), Some(TableRef::new("posts", Some("p".to_string()))));
    }

    #[test]
    fn test_flags_and_aggregates() {
        let sql = "SELECT DISTINCT COUNT(*), max(c.id) FROM comments c WHERE c.post_id IN (SELECT id FROM posts) GROUP BY c.post_id";
        assert_eq!(statement_kind(sql), StatementKind::Select);
        assert!(has_distinct(sql));
        assert!(has_subquery(sql));
        assert_eq!(aggregation_functions(sql), vec!["COUNT", "MAX"]);
        assert_eq!(group_by_columns(sql), vec!["c.post_id"]);
        assert!(!select_star(sql));
        assert!(select_star("SELECT * FROM t"));
    }

    #[test]
    fn test_mutation_targets() {
        assert_eq!(
            main_table("UPDATE users SET name = ? WHERE id = ?"),
            Some(TableRef::new("users", None))
        );
        assert_eq!(
            main_table("DELETE FROM public.sessions WHERE user_id = 3"),
            Some(TableRef::new("sessions", None))
        );
        assert_eq!(statement_kind("  delete from x"), StatementKind::Delete);
    }

    #[test]
    fn test_qualifier_refs_skip_schema_qualified_tables() {
        let refs = qualifier_refs("SELECT u.id, u.name FROM public.users u WHERE u.id = ?");
        assert_eq!(refs.get("u"), Some(&3));
        assert_eq!(refs.get("public"), None);
    }
}
