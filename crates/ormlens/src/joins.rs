//! Join classification against relationship metadata.
//!
//! Two questions per JOIN: does it fan out (collection) or not, and is the
//! foreign key behind it nullable. Both need metadata for the tables on each
//! side; without it the answer is `Unknown` and callers skip the check.
//!
//! The direction fallback ("is there any to-many association targeting the
//! joined table?") is schema-wide and can misfire for self-joins or when two
//! tables are linked by more than one association.

use crate::metadata::{AssociationKind, MetadataSet};
use ormlens_sql::{ColumnName, JoinRef, JoinType, ParsedQueryFacts};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinDirection {
    /// Joined rows multiply the root rows (to-many).
    Collection,
    /// At most one joined row per root row.
    Single,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Nullability {
    Nullable,
    NotNull,
    Unknown,
}

/// The association a join was matched to, seen from the root table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAssociation {
    pub declared_on: String,
    pub field_name: String,
    pub kind: AssociationKind,
    pub matched_columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedJoin {
    pub join: JoinRef,
    /// Table on the other side of the ON clause.
    pub root_table: Option<String>,
    pub direction: JoinDirection,
    pub nullability: Nullability,
    pub association: Option<ResolvedAssociation>,
}

impl ClassifiedJoin {
    /// LEFT JOIN over a mandatory to-one relation.
    ///
    /// Never true for to-many associations: a parent may have no children
    /// regardless of the FK's nullability.
    pub fn should_be_inner(&self) -> bool {
        self.join.join_type == JoinType::Left
            && self.direction != JoinDirection::Collection
            && self.nullability == Nullability::NotNull
            && self
                .association
                .as_ref()
                .is_some_and(|a| a.kind.is_to_one())
    }

    pub fn is_collection(&self) -> bool {
        self.direction == JoinDirection::Collection
    }
}

/// One ON pair split into (root side, joined side).
struct Sides<'a> {
    root_table: &'a str,
    root_column: &'a str,
    joined_column: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct JoinClassifier<'m> {
    metadata: &'m MetadataSet,
}

impl<'m> JoinClassifier<'m> {
    pub fn new(metadata: &'m MetadataSet) -> Self {
        Self { metadata }
    }

    pub fn classify_all(&self, facts: &ParsedQueryFacts) -> Vec<ClassifiedJoin> {
        facts
            .joins
            .iter()
            .map(|j| self.classify(facts, j))
            .collect()
    }

    pub fn classify(&self, facts: &ParsedQueryFacts, join: &JoinRef) -> ClassifiedJoin {
        let aliases = facts.alias_map();
        let sides = split_sides(join, &aliases);
        let root_table = sides
            .iter()
            .flatten()
            .map(|s| s.root_table.to_string())
            .next()
            .or_else(|| facts.main_table_name().map(str::to_string));

        let Some(root) = root_table.as_deref() else {
            return unknown(join, None);
        };
        if self.metadata.entity(root).is_none() || self.metadata.entity(&join.table).is_none() {
            return unknown(join, root_table);
        }

        let direction = self.direction(root, join, &sides);
        let (nullability, association) = self.nullability(root, join);
        ClassifiedJoin {
            join: join.clone(),
            root_table,
            direction,
            nullability,
            association,
        }
    }

    fn direction(&self, root: &str, join: &JoinRef, sides: &[Option<Sides<'_>>]) -> JoinDirection {
        let (Some(root_entity), Some(joined_entity)) =
            (self.metadata.entity(root), self.metadata.entity(&join.table))
        else {
            return JoinDirection::Unknown;
        };

        let mut votes = Vec::with_capacity(sides.len());
        for side in sides {
            let vote = side.as_ref().and_then(|s| {
                // Only pairs that actually connect this root.
                if s.root_table != root {
                    return None;
                }
                let root_pk = root_entity.is_identifier(s.root_column);
                let joined_pk = joined_entity.is_identifier(s.joined_column);
                match (root_pk, joined_pk) {
                    (true, false) => Some(JoinDirection::Collection),
                    (false, true) => Some(JoinDirection::Single),
                    _ => None,
                }
            });
            votes.push(vote);
        }

        let first = votes.first().copied().flatten();
        match first {
            Some(d) if votes.iter().all(|v| *v == Some(d)) => d,
            _ if self.metadata.has_to_many_targeting(&join.table) => JoinDirection::Collection,
            _ => JoinDirection::Single,
        }
    }

    fn nullability(
        &self,
        root: &str,
        join: &JoinRef,
    ) -> (Nullability, Option<ResolvedAssociation>) {
        let on_columns: Vec<&str> = join
            .conditions
            .iter()
            .flat_map(|c| [c.left.column.as_str(), c.right.column.as_str()])
            .collect();

        let mut candidates = Vec::new();
        if let Some(entity) = self.metadata.entity(root) {
            candidates.extend(entity.associations_to(&join.table).map(|a| (entity, a, a.kind)));
        }
        if let Some(entity) = self.metadata.entity(&join.table) {
            candidates.extend(entity.associations_to(root).map(|a| (entity, a, a.kind.flipped())));
        }

        let mut best: Option<(usize, bool, ResolvedAssociation)> = None;
        for (entity, assoc, kind) in candidates {
            let matched: Vec<_> = assoc
                .join_columns
                .iter()
                .filter(|c| on_columns.contains(&c.name.as_str()))
                .collect();
            if best.as_ref().is_some_and(|(n, _, _)| matched.len() <= *n) {
                continue;
            }
            best = Some((
                matched.len(),
                matched.iter().any(|c| c.nullable),
                ResolvedAssociation {
                    declared_on: entity.table.clone(),
                    field_name: assoc.field_name.clone(),
                    kind,
                    matched_columns: matched.len(),
                },
            ));
        }

        match best {
            Some((0, _, assoc)) => (Nullability::Unknown, Some(assoc)),
            Some((_, true, assoc)) => (Nullability::Nullable, Some(assoc)),
            Some((_, false, assoc)) => (Nullability::NotNull, Some(assoc)),
            None => (Nullability::Unknown, None),
        }
    }
}

fn unknown(join: &JoinRef, root_table: Option<String>) -> ClassifiedJoin {
    ClassifiedJoin {
        join: join.clone(),
        root_table,
        direction: JoinDirection::Unknown,
        nullability: Nullability::Unknown,
        association: None,
    }
}

/// Which side of each ON pair belongs to the joined table. Pairs with an
/// unqualified column, or where neither side is the joined table, are `None`.
fn split_sides<'a>(join: &'a JoinRef, aliases: &'a BTreeMap<String, String>) -> Vec<Option<Sides<'a>>> {
    let joined_q = join.qualifier();
    let is_joined = |c: &ColumnName| {
        c.qualifier
            .as_deref()
            .is_some_and(|q| q == joined_q || (join.alias.is_none() && q == join.table))
    };

    join.conditions
        .iter()
        .map(|cond| {
            let (joined, root) = if is_joined(&cond.right) && !is_joined(&cond.left) {
                (&cond.right, &cond.left)
            } else if is_joined(&cond.left) && !is_joined(&cond.right) {
                (&cond.left, &cond.right)
            } else {
                return None;
            };
            let root_table = aliases.get(root.qualifier.as_deref()?)?;
            Some(Sides {
                root_table,
                root_column: &root.column,
                joined_column: &joined.column,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlens_sql::SqlExtractor;

    fn metadata(user_fk_nullable: bool) -> MetadataSet {
        MetadataSet::from_json(&format!(
            r#"[
                {{"table": "users", "identifier": ["id"], "associations": [
                    {{"fieldName": "orders", "targetTable": "orders", "kind": "one_to_many"}}
                ]}},
                {{"table": "orders", "identifier": ["id"], "associations": [
                    {{"fieldName": "user", "targetTable": "users", "kind": "many_to_one",
                      "joinColumns": [{{"name": "user_id", "nullable": {user_fk_nullable}}}]}}
                ]}}
            ]"#
        ))
        .expect("valid metadata")
    }

    fn classify(sql: &str, metadata: &MetadataSet) -> ClassifiedJoin {
        let facts = SqlExtractor::new().facts(sql);
        JoinClassifier::new(metadata).classify(&facts, &facts.joins[0])
    }

    #[test]
    fn test_direction_follows_primary_keys() {
        let md = metadata(false);
        let forward = classify(
            "SELECT * FROM users JOIN orders ON users.id = orders.user_id",
            &md,
        );
        assert_eq!(forward.direction, JoinDirection::Collection);

        let swapped_operands = classify(
            "SELECT * FROM users JOIN orders ON orders.user_id = users.id",
            &md,
        );
        assert_eq!(swapped_operands.direction, JoinDirection::Collection);

        let reversed = classify(
            "SELECT * FROM orders JOIN users ON users.id = orders.user_id",
            &md,
        );
        assert_eq!(reversed.direction, JoinDirection::Single);
    }

    #[test]
    fn test_schema_fallback_ignores_table_case() {
        let j = classify(
            r#"SELECT * FROM users u JOIN "Orders" o ON o.total > 0"#,
            &metadata(false),
        );
        assert_eq!(j.direction, JoinDirection::Collection);
    }

    #[test]
    fn test_left_join_to_many_never_flagged() {
        let md = metadata(false);
        let j = classify(
            "SELECT * FROM users u LEFT JOIN orders o ON o.user_id = u.id",
            &md,
        );
        assert_eq!(j.nullability, Nullability::NotNull);
        assert_eq!(j.association.as_ref().map(|a| a.kind), Some(AssociationKind::OneToMany));
        assert!(!j.should_be_inner());
    }

    #[test]
    fn test_left_join_to_one_not_null_flagged() {
        let md = metadata(false);
        let j = classify(
            "SELECT * FROM orders o LEFT JOIN users u ON u.id = o.user_id",
            &md,
        );
        assert_eq!(j.association.as_ref().map(|a| a.kind), Some(AssociationKind::ManyToOne));
        assert!(j.should_be_inner());

        let nullable = metadata(true);
        let j = classify(
            "SELECT * FROM orders o LEFT JOIN users u ON u.id = o.user_id",
            &nullable,
        );
        assert_eq!(j.nullability, Nullability::Nullable);
        assert!(!j.should_be_inner());
    }

    #[test]
    fn test_missing_metadata_is_unknown() {
        let j = classify(
            "SELECT * FROM orders o LEFT JOIN users u ON u.id = o.user_id",
            &MetadataSet::new(),
        );
        assert_eq!(j.direction, JoinDirection::Unknown);
        assert_eq!(j.nullability, Nullability::Unknown);
        assert!(!j.should_be_inner());
    }

    #[test]
    fn test_uncertain_votes_use_schema_heuristic() {
        let md = metadata(false);
        // PK = PK gives no vote; some association targets orders as to-many.
        let j = classify("SELECT * FROM users u JOIN orders o ON o.id = u.id", &md);
        assert_eq!(j.direction, JoinDirection::Collection);
        let j = classify("SELECT * FROM orders o JOIN users u ON u.id = o.id", &md);
        assert_eq!(j.direction, JoinDirection::Single);
    }
}
