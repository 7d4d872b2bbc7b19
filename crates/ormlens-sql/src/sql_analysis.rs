//! Structural extraction from a `pg_query` statement tree.

use crate::facts::{
    ColumnName, JoinCondition, JoinRef, JoinType, LimitInfo, SUBQUERY_TABLE, StatementKind,
    TableRef, ValueKind, WhereCondition,
};
use crate::parser::Statement;
use pg_query::protobuf::{self, Node};
use pg_query::{NodeEnum, NodeRef};
use std::collections::BTreeMap;

/// Aggregate functions reported by [`aggregation_functions`].
pub const AGGREGATE_FUNCTIONS: &[&str] = &[
    "COUNT",
    "SUM",
    "AVG",
    "MIN",
    "MAX",
    "GROUP_CONCAT",
    "STRING_AGG",
    "ARRAY_AGG",
    "JSON_AGG",
    "JSONB_AGG",
];

pub fn statement_kind(stmt: &Statement) -> StatementKind {
    match stmt.root() {
        Some(NodeEnum::SelectStmt(_)) => StatementKind::Select,
        Some(NodeEnum::InsertStmt(_)) => StatementKind::Insert,
        Some(NodeEnum::UpdateStmt(_)) => StatementKind::Update,
        Some(NodeEnum::DeleteStmt(_)) => StatementKind::Delete,
        _ => StatementKind::Other,
    }
}

/// The SELECT that owns the FROM list. For set operations (`UNION`) this is the
/// leftmost arm.
fn primary_select(stmt: &Statement) -> Option<&protobuf::SelectStmt> {
    let NodeEnum::SelectStmt(select) = stmt.root()? else {
        return None;
    };
    let mut current: &protobuf::SelectStmt = select;
    while current.from_clause.is_empty() {
        match current.larg.as_deref() {
            Some(left) => current = left,
            None => break,
        }
    }
    Some(current)
}

fn where_clause(stmt: &Statement) -> Option<&Node> {
    match stmt.root()? {
        NodeEnum::SelectStmt(_) => primary_select(stmt)?.where_clause.as_deref(),
        NodeEnum::UpdateStmt(u) => u.where_clause.as_deref(),
        NodeEnum::DeleteStmt(d) => d.where_clause.as_deref(),
        _ => None,
    }
}

fn range_var_ref(v: &protobuf::RangeVar) -> TableRef {
    TableRef {
        table: v.relname.clone(),
        alias: v.alias.as_ref().map(|a| a.aliasname.clone()),
    }
}

/// Table reference of a FROM item that is not itself a join.
fn relation_of(node: &Node) -> Option<TableRef> {
    match node.node.as_ref()? {
        NodeEnum::RangeVar(v) => Some(range_var_ref(v)),
        NodeEnum::RangeSubselect(s) => Some(TableRef {
            table: SUBQUERY_TABLE.to_string(),
            alias: s.alias.as_ref().map(|a| a.aliasname.clone()),
        }),
        NodeEnum::RangeFunction(f) => Some(TableRef {
            table: SUBQUERY_TABLE.to_string(),
            alias: f.alias.as_ref().map(|a| a.aliasname.clone()),
        }),
        _ => None,
    }
}

fn join_type_of(j: &protobuf::JoinExpr) -> JoinType {
    match j.jointype() {
        protobuf::JoinType::JoinLeft => JoinType::Left,
        protobuf::JoinType::JoinRight => JoinType::Right,
        protobuf::JoinType::JoinFull => JoinType::Full,
        _ => JoinType::Inner,
    }
}

fn collect_from_item(node: &Node, main: &mut Option<TableRef>, joins: &mut Vec<JoinRef>) {
    match node.node.as_ref() {
        Some(NodeEnum::JoinExpr(j)) => {
            if let Some(left) = j.larg.as_deref() {
                collect_from_item(left, main, joins);
            }
            let Some(right) = j.rarg.as_deref() else {
                return;
            };
            if let Some(NodeEnum::JoinExpr(_)) = right.node.as_ref() {
                // `a JOIN (b JOIN c ON ...) ON ...`
                collect_from_item(right, main, joins);
                return;
            }
            if let Some(t) = relation_of(right) {
                let mut conditions = Vec::new();
                if let Some(quals) = j.quals.as_deref() {
                    collect_join_conditions(quals, &mut conditions);
                }
                joins.push(JoinRef {
                    join_type: join_type_of(j),
                    table: t.table,
                    alias: t.alias,
                    conditions,
                });
            }
        }
        Some(_) => {
            let Some(t) = relation_of(node) else {
                return;
            };
            if main.is_none() {
                *main = Some(t);
            } else {
                // `FROM a, b`: an implicit inner join without ON pairs.
                joins.push(JoinRef {
                    join_type: JoinType::Inner,
                    table: t.table,
                    alias: t.alias,
                    conditions: Vec::new(),
                });
            }
        }
        None => {}
    }
}

fn from_clause_tables(stmt: &Statement) -> (Option<TableRef>, Vec<JoinRef>) {
    let mut main = None;
    let mut joins = Vec::new();

    match stmt.root() {
        Some(NodeEnum::SelectStmt(_)) => {
            if let Some(select) = primary_select(stmt) {
                for item in &select.from_clause {
                    collect_from_item(item, &mut main, &mut joins);
                }
            }
        }
        Some(NodeEnum::UpdateStmt(u)) => {
            main = u.relation.as_ref().map(range_var_ref);
            for item in &u.from_clause {
                collect_from_item(item, &mut main, &mut joins);
            }
        }
        Some(NodeEnum::DeleteStmt(d)) => {
            main = d.relation.as_ref().map(range_var_ref);
            for item in &d.using_clause {
                collect_from_item(item, &mut main, &mut joins);
            }
        }
        Some(NodeEnum::InsertStmt(i)) => {
            main = i.relation.as_ref().map(range_var_ref);
        }
        _ => {}
    }

    (main, joins)
}

pub fn main_table(stmt: &Statement) -> Option<TableRef> {
    from_clause_tables(stmt).0
}

/// Joins as written; implicit aliases are resolved by the caller.
pub fn joins(stmt: &Statement) -> Vec<JoinRef> {
    from_clause_tables(stmt).1
}

fn column_name(c: &protobuf::ColumnRef) -> Option<ColumnName> {
    let mut parts: Vec<&str> = Vec::new();
    for f in &c.fields {
        match f.node.as_ref() {
            Some(NodeEnum::String(s)) => parts.push(s.sval.as_str()),
            Some(NodeEnum::AStar(_)) => return None,
            _ => {}
        }
    }
    match parts.len() {
        0 => None,
        1 => Some(ColumnName::new(None, parts[0])),
        n => Some(ColumnName::new(Some(parts[n - 2]), parts[n - 1])),
    }
}

fn column_of(node: Option<&Node>) -> Option<ColumnName> {
    match node?.node.as_ref()? {
        NodeEnum::ColumnRef(c) => column_name(c),
        NodeEnum::TypeCast(t) => column_of(t.arg.as_deref()),
        _ => None,
    }
}

fn operator_name(a: &protobuf::AExpr) -> String {
    let mut op = String::new();
    for n in &a.name {
        if let Some(NodeEnum::String(s)) = n.node.as_ref() {
            op = s.sval.clone();
        }
    }
    op
}

fn collect_join_conditions(node: &Node, out: &mut Vec<JoinCondition>) {
    match node.node.as_ref() {
        Some(NodeEnum::BoolExpr(b)) => {
            for arg in &b.args {
                collect_join_conditions(arg, out);
            }
        }
        Some(NodeEnum::AExpr(a)) => {
            if operator_name(a) != "=" {
                return;
            }
            let left = column_of(a.lexpr.as_deref());
            let right = column_of(a.rexpr.as_deref());
            if let (Some(left), Some(right)) = (left, right) {
                out.push(JoinCondition { left, right });
            }
        }
        _ => {}
    }
}

fn value_kind(node: Option<&Node>) -> ValueKind {
    let Some(inner) = node.and_then(|n| n.node.as_ref()) else {
        return ValueKind::Expression;
    };
    match inner {
        NodeEnum::ParamRef(_) => ValueKind::Parameter,
        NodeEnum::AConst(c) => {
            if c.isnull {
                ValueKind::Null
            } else {
                ValueKind::Literal
            }
        }
        NodeEnum::TypeCast(t) => value_kind(t.arg.as_deref()),
        NodeEnum::ColumnRef(_) => ValueKind::Column,
        NodeEnum::List(_) | NodeEnum::AArrayExpr(_) => ValueKind::List,
        NodeEnum::SubLink(_) => ValueKind::Subquery,
        _ => ValueKind::Expression,
    }
}

fn comparison_operator(a: &protobuf::AExpr) -> String {
    let op = operator_name(a);
    match a.kind() {
        protobuf::AExprKind::AexprIn => {
            if op == "<>" {
                "NOT IN".to_string()
            } else {
                "IN".to_string()
            }
        }
        protobuf::AExprKind::AexprLike => {
            if op.starts_with('!') {
                "NOT LIKE".to_string()
            } else {
                "LIKE".to_string()
            }
        }
        protobuf::AExprKind::AexprIlike => {
            if op.starts_with('!') {
                "NOT ILIKE".to_string()
            } else {
                "ILIKE".to_string()
            }
        }
        protobuf::AExprKind::AexprOpAny => format!("{op} ANY"),
        _ => op.to_uppercase(),
    }
}

fn push_condition(out: &mut Vec<WhereCondition>, col: ColumnName, operator: String, value: ValueKind) {
    out.push(WhereCondition {
        column: col.column,
        operator,
        alias: col.qualifier,
        value,
    });
}

fn collect_conditions(node: &Node, out: &mut Vec<WhereCondition>) {
    match node.node.as_ref() {
        // Negated terms never select rows by key.
        Some(NodeEnum::BoolExpr(b)) if b.boolop() == protobuf::BoolExprType::NotExpr => {}
        Some(NodeEnum::BoolExpr(b)) => {
            for arg in &b.args {
                collect_conditions(arg, out);
            }
        }
        Some(NodeEnum::AExpr(a)) => {
            let operator = comparison_operator(a);
            if let Some(col) = column_of(a.lexpr.as_deref()) {
                push_condition(out, col, operator, value_kind(a.rexpr.as_deref()));
            } else if let Some(col) = column_of(a.rexpr.as_deref()) {
                // `? = t.id`
                push_condition(out, col, operator, value_kind(a.lexpr.as_deref()));
            }
        }
        Some(NodeEnum::NullTest(n)) => {
            if let Some(col) = column_of(n.arg.as_deref()) {
                let operator = match n.nulltesttype() {
                    protobuf::NullTestType::IsNotNull => "IS NOT NULL",
                    _ => "IS NULL",
                };
                push_condition(out, col, operator.to_string(), ValueKind::Null);
            }
        }
        Some(NodeEnum::SubLink(s)) => {
            if let Some(col) = column_of(s.testexpr.as_deref()) {
                push_condition(out, col, "IN".to_string(), ValueKind::Subquery);
            }
        }
        _ => {}
    }
}

pub fn where_conditions(stmt: &Statement) -> Vec<WhereCondition> {
    let mut out = Vec::new();
    if let Some(w) = where_clause(stmt) {
        collect_conditions(w, &mut out);
    }
    out
}

fn dotted(node: Option<&Node>) -> Option<String> {
    column_of(node).map(|c| c.to_string())
}

pub fn group_by_columns(stmt: &Statement) -> Vec<String> {
    let Some(select) = primary_select(stmt) else {
        return Vec::new();
    };
    select
        .group_clause
        .iter()
        .filter_map(|n| dotted(Some(n)))
        .collect()
}

pub fn order_by_columns(stmt: &Statement) -> Vec<String> {
    let Some(NodeEnum::SelectStmt(select)) = stmt.root() else {
        return Vec::new();
    };
    // ORDER BY on a set operation lives on the outer statement.
    select
        .sort_clause
        .iter()
        .filter_map(|n| match n.node.as_ref() {
            Some(NodeEnum::SortBy(s)) => dotted(s.node.as_deref()),
            _ => None,
        })
        .collect()
}

fn const_int(node: &Node) -> Option<i64> {
    match node.node.as_ref()? {
        NodeEnum::AConst(c) => match c.val.as_ref()? {
            protobuf::a_const::Val::Ival(i) => Some(i64::from(i.ival)),
            _ => None,
        },
        NodeEnum::TypeCast(t) => const_int(t.arg.as_deref()?),
        _ => None,
    }
}

fn is_null_const(node: &Node) -> bool {
    matches!(node.node.as_ref(), Some(NodeEnum::AConst(c)) if c.isnull)
}

pub fn limit_info(stmt: &Statement) -> LimitInfo {
    let Some(NodeEnum::SelectStmt(select)) = stmt.root() else {
        return LimitInfo::default();
    };
    // `LIMIT ALL` is a NULL constant.
    let limit = select.limit_count.as_deref().filter(|n| !is_null_const(n));
    LimitInfo {
        has_limit: limit.is_some(),
        has_offset: select.limit_offset.is_some(),
        limit_value: limit.and_then(const_int),
    }
}

pub fn has_subquery(stmt: &Statement) -> bool {
    stmt.protobuf()
        .nodes()
        .into_iter()
        .any(|(node, _depth, _context, _has_filter_columns)| {
            matches!(node, NodeRef::SubLink(_) | NodeRef::RangeSubselect(_))
        })
}

pub fn has_distinct(stmt: &Statement) -> bool {
    primary_select(stmt).is_some_and(|s| !s.distinct_clause.is_empty())
}

pub fn aggregation_functions(stmt: &Statement) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (node, _depth, _context, _has_filter_columns) in stmt.protobuf().nodes() {
        let NodeRef::FuncCall(f) = node else {
            continue;
        };
        let Some(name) = f.funcname.iter().rev().find_map(|n| match n.node.as_ref() {
            Some(NodeEnum::String(s)) => Some(s.sval.to_uppercase()),
            _ => None,
        }) else {
            continue;
        };
        if AGGREGATE_FUNCTIONS.contains(&name.as_str()) && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Qualifier usage counts over every column reference, including `t.*`.
pub fn qualifier_refs(stmt: &Statement) -> BTreeMap<String, usize> {
    let mut refs: BTreeMap<String, usize> = BTreeMap::new();
    for (node, _depth, _context, _has_filter_columns) in stmt.protobuf().nodes() {
        let NodeRef::ColumnRef(c) = node else {
            continue;
        };
        let parts: Vec<&str> = c
            .fields
            .iter()
            .filter_map(|f| match f.node.as_ref() {
                Some(NodeEnum::String(s)) => Some(s.sval.as_str()),
                _ => None,
            })
            .collect();
        let has_star = c
            .fields
            .iter()
            .any(|f| matches!(f.node.as_ref(), Some(NodeEnum::AStar(_))));

        // `t.col` → qualifier is the second-to-last part; `t.*` → the last.
        let qualifier = if has_star {
            parts.last().copied()
        } else if parts.len() >= 2 {
            Some(parts[parts.len() - 2])
        } else {
            None
        };
        if let Some(q) = qualifier {
            *refs.entry(q.to_string()).or_insert(0) += 1;
        }
    }
    refs
}

/// Whether the projection contains an unqualified `*`.
pub fn select_star(stmt: &Statement) -> bool {
    let Some(select) = primary_select(stmt) else {
        return false;
    };
    select.target_list.iter().any(|t| {
        let Some(NodeEnum::ResTarget(rt)) = t.node.as_ref() else {
            return false;
        };
        let Some(NodeEnum::ColumnRef(c)) = rt.val.as_deref().and_then(|v| v.node.as_ref()) else {
            return false;
        };
        c.fields.len() == 1 && matches!(c.fields[0].node.as_ref(), Some(NodeEnum::AStar(_)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{PgQueryParser, SqlParser};

    fn parse(sql: &str) -> Statement {
        PgQueryParser::new().parse(sql).expect("valid sql")
    }

    #[test]
    fn test_main_table_and_joins() {
        let stmt = parse(
            "SELECT u.id FROM users u LEFT OUTER JOIN orders o ON o.user_id = u.id JOIN items ON items.order_id = o.id WHERE u.id = ?",
        );
        assert_eq!(statement_kind(&stmt), StatementKind::Select);
        assert_eq!(
            main_table(&stmt),
            Some(TableRef::new("users", Some("u".to_string())))
        );

        let joins = joins(&stmt);
        assert_eq!(joins.len(), 2);
        assert_eq!(joins[0].join_type, JoinType::Left);
        assert_eq!(joins[0].table, "orders");
        assert_eq!(joins[0].alias.as_deref(), Some("o"));
        assert_eq!(
            joins[0].conditions,
            vec![JoinCondition {
                left: ColumnName::new(Some("o"), "user_id"),
                right: ColumnName::new(Some("u"), "id"),
            }]
        );
        assert_eq!(joins[1].join_type, JoinType::Inner);
        assert_eq!(joins[1].table, "items");
        assert_eq!(joins[1].alias, None);
    }

    #[test]
    fn test_where_conditions_capture_operator_and_value() {
        let stmt = parse(
            "SELECT * FROM posts p WHERE p.author_id = $1 AND p.status IN ('a', 'b') AND p.deleted_at IS NULL AND title LIKE 'x%'",
        );
        let conds = where_conditions(&stmt);
        assert_eq!(conds.len(), 4);
        assert_eq!(conds[0].column, "author_id");
        assert_eq!(conds[0].operator, "=");
        assert_eq!(conds[0].alias.as_deref(), Some("p"));
        assert_eq!(conds[0].value, ValueKind::Parameter);
        assert_eq!(conds[1].operator, "IN");
        assert_eq!(conds[1].value, ValueKind::List);
        assert_eq!(conds[2].operator, "IS NULL");
        assert_eq!(conds[3].operator, "LIKE");
        assert_eq!(conds[3].alias, None);
    }

    #[test]
    fn test_negated_terms_are_not_conditions() {
        let stmt = parse("SELECT * FROM users WHERE NOT (id = 1) AND org_id = $1");
        let conds = where_conditions(&stmt);
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].column, "org_id");
    }

    #[test]
    fn test_limit_group_order_and_aggregates() {
        let stmt = parse(
            "SELECT DISTINCT c.post_id, COUNT(*) FROM comments c WHERE c.post_id IN (SELECT id FROM posts) GROUP BY c.post_id ORDER BY c.post_id DESC LIMIT 10 OFFSET 20",
        );
        let limit = limit_info(&stmt);
        assert!(limit.has_limit);
        assert!(limit.has_offset);
        assert_eq!(limit.limit_value, Some(10));
        assert_eq!(group_by_columns(&stmt), vec!["c.post_id"]);
        assert_eq!(order_by_columns(&stmt), vec!["c.post_id"]);
        assert_eq!(aggregation_functions(&stmt), vec!["COUNT"]);
        assert!(has_subquery(&stmt));
        assert!(has_distinct(&stmt));
        assert!(!select_star(&stmt));
    }

    #[test]
    fn test_update_and_delete_targets() {
        let stmt = parse("UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(statement_kind(&stmt), StatementKind::Update);
        assert_eq!(main_table(&stmt), Some(TableRef::new("users", None)));
        assert_eq!(where_conditions(&stmt).len(), 1);

        let stmt = parse("DELETE FROM sessions WHERE user_id = 4");
        assert_eq!(statement_kind(&stmt), StatementKind::Delete);
        assert_eq!(main_table(&stmt), Some(TableRef::new("sessions", None)));
        assert_eq!(where_conditions(&stmt)[0].value, ValueKind::Literal);
    }

    #[test]
    fn test_qualifier_refs_and_star() {
        let stmt = parse("SELECT *, o.* FROM users u JOIN orders o ON o.user_id = u.id WHERE u.active");
        let refs = qualifier_refs(&stmt);
        assert_eq!(refs.get("o"), Some(&2));
        assert_eq!(refs.get("u"), Some(&2));
        assert!(select_star(&stmt));
    }
}
