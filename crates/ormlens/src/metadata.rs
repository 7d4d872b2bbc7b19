//! Relationship metadata snapshot.
//!
//! Metadata is exported by the ORM in more than one shape: `joinColumns` can
//! be an array of column objects, an array of names, or an object keyed by
//! column name, and `identifier` can be a string or an array. All of that is
//! folded into one canonical structure in [`MetadataSet::from_json`]; nothing
//! downstream looks at the raw shape again.

use crate::error::{InspectError, InspectResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Cardinality of an association, seen from the entity that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum AssociationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl AssociationKind {
    pub fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    pub fn is_to_one(self) -> bool {
        !self.is_to_many()
    }

    /// The same association seen from the other side.
    pub fn flipped(self) -> Self {
        match self {
            Self::OneToMany => Self::ManyToOne,
            Self::ManyToOne => Self::OneToMany,
            other => other,
        }
    }
}

impl TryFrom<String> for AssociationKind {
    type Error = String;

    /// Accepts `one-to-many`, `one_to_many`, `OneToMany`, `ONE_TO_MANY`, ...
    fn try_from(value: String) -> Result<Self, Self::Error> {
        let key: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "onetoone" => Ok(Self::OneToOne),
            "onetomany" => Ok(Self::OneToMany),
            "manytoone" => Ok(Self::ManyToOne),
            "manytomany" => Ok(Self::ManyToMany),
            _ => Err(format!("unknown association kind '{value}'")),
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        })
    }
}

/// A foreign-key column owned by an association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinColumn {
    pub name: String,
    pub nullable: bool,
    pub unique: bool,
    pub referenced_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub field_name: String,
    pub target_table: String,
    pub kind: AssociationKind,
    pub join_columns: Vec<JoinColumn>,
    pub cascade: Vec<String>,
    pub orphan_removal: bool,
}

impl Association {
    pub fn join_column(&self, name: &str) -> Option<&JoinColumn> {
        self.join_columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    pub name: String,
    pub table: String,
    /// Primary-key column names.
    pub identifier: Vec<String>,
    pub associations: Vec<Association>,
}

impl EntityMetadata {
    pub fn is_identifier(&self, column: &str) -> bool {
        self.identifier.iter().any(|c| c == column)
    }

    /// Associations declared on this entity that point at `table`.
    pub fn associations_to<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Association> {
        self.associations
            .iter()
            .filter(move |a| a.target_table.eq_ignore_ascii_case(table))
    }
}

// ── Raw input shapes ──

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawColumnBody {
    nullable: Option<bool>,
    unique: Option<bool>,
    #[serde(alias = "referenced_column_name", alias = "referencedColumn")]
    referenced_column_name: Option<String>,
}

#[derive(Deserialize)]
struct RawColumn {
    name: String,
    #[serde(flatten)]
    body: RawColumnBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawJoinColumns {
    Columns(Vec<RawColumn>),
    Names(Vec<String>),
    Keyed(BTreeMap<String, RawColumnBody>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssociation {
    #[serde(alias = "field_name", alias = "field")]
    field_name: String,
    #[serde(alias = "target_table")]
    target_table: String,
    #[serde(alias = "type")]
    kind: AssociationKind,
    #[serde(default, alias = "join_columns")]
    join_columns: Option<RawJoinColumns>,
    #[serde(default, alias = "cascadeOptions", alias = "cascade_options")]
    cascade: Vec<String>,
    #[serde(default, alias = "orphan_removal")]
    orphan_removal: bool,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    name: Option<String>,
    table: String,
    #[serde(default, alias = "primaryKey", alias = "primary_key")]
    identifier: Option<OneOrMany>,
    #[serde(default)]
    associations: Vec<RawAssociation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMetadata {
    Entities(Vec<RawEntity>),
    Wrapped { entities: Vec<RawEntity> },
}

fn canonical_columns(raw: Option<RawJoinColumns>) -> Vec<JoinColumn> {
    let column = |name: String, body: RawColumnBody| JoinColumn {
        name: name.to_ascii_lowercase(),
        nullable: body.nullable.unwrap_or(true),
        unique: body.unique.unwrap_or(false),
        referenced_column: body.referenced_column_name,
    };
    match raw {
        None => Vec::new(),
        Some(RawJoinColumns::Columns(cols)) => {
            cols.into_iter().map(|c| column(c.name, c.body)).collect()
        }
        Some(RawJoinColumns::Names(names)) => names
            .into_iter()
            .map(|n| column(n, RawColumnBody::default()))
            .collect(),
        Some(RawJoinColumns::Keyed(map)) => {
            map.into_iter().map(|(n, body)| column(n, body)).collect()
        }
    }
}

fn canonical_entity(raw: RawEntity) -> EntityMetadata {
    let table = raw.table.to_ascii_lowercase();
    let identifier = raw
        .identifier
        .map(OneOrMany::into_vec)
        .unwrap_or_else(|| vec!["id".to_string()])
        .into_iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();
    EntityMetadata {
        name: raw.name.unwrap_or_else(|| table.clone()),
        identifier,
        associations: raw
            .associations
            .into_iter()
            .map(|a| Association {
                field_name: a.field_name,
                target_table: a.target_table.to_ascii_lowercase(),
                kind: a.kind,
                join_columns: canonical_columns(a.join_columns),
                cascade: a.cascade,
                orphan_removal: a.orphan_removal,
            })
            .collect(),
        table,
    }
}

/// Every known entity, indexed by (lower-cased) table name.
#[derive(Debug, Clone, Default)]
pub struct MetadataSet {
    entities: Vec<EntityMetadata>,
    by_table: HashMap<String, usize>,
}

impl MetadataSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: Vec<EntityMetadata>) -> Self {
        let by_table = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.table.to_ascii_lowercase(), i))
            .collect();
        Self { entities, by_table }
    }

    pub fn from_json(json: &str) -> InspectResult<Self> {
        let raw: RawMetadata = serde_json::from_str(json)
            .map_err(|e| InspectError::metadata(format!("invalid relationship metadata: {e}")))?;
        let entities = match raw {
            RawMetadata::Entities(e) => e,
            RawMetadata::Wrapped { entities } => entities,
        };
        Ok(Self::from_entities(
            entities.into_iter().map(canonical_entity).collect(),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &[EntityMetadata] {
        &self.entities
    }

    pub fn entity(&self, table: &str) -> Option<&EntityMetadata> {
        self.by_table
            .get(&table.to_ascii_lowercase())
            .and_then(|&i| self.entities.get(i))
    }

    /// Whether any declared to-many association targets `table`.
    pub fn has_to_many_targeting(&self, table: &str) -> bool {
        self.entities
            .iter()
            .flat_map(|e| e.associations.iter())
            .any(|a| a.kind.is_to_many() && a.target_table.eq_ignore_ascii_case(table))
    }

    /// Whether either table declares an association to the other.
    pub fn are_related(&self, a: &str, b: &str) -> bool {
        let declares = |from: &str, to: &str| {
            self.entity(from)
                .is_some_and(|e| e.associations_to(to).next().is_some())
        };
        declares(a, b) || declares(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"[
        {
            "name": "User",
            "table": "users",
            "identifier": "id",
            "associations": [
                {"fieldName": "orders", "targetTable": "orders", "kind": "one-to-many"}
            ]
        },
        {
            "name": "Order",
            "table": "orders",
            "identifier": ["id"],
            "associations": [
                {"fieldName": "user", "targetTable": "users", "kind": "ManyToOne",
                 "joinColumns": [{"name": "user_id", "nullable": false}],
                 "cascadeOptions": ["persist"]},
                {"fieldName": "coupon", "targetTable": "coupons", "kind": "MANY_TO_ONE",
                 "joinColumns": {"coupon_id": {"nullable": true, "unique": false}}},
                {"field_name": "tags", "target_table": "tags", "type": "many_to_many",
                 "join_columns": ["order_id", "tag_id"]}
            ]
        }
    ]"#;

    #[test]
    fn test_both_join_column_shapes_normalise() {
        let set = MetadataSet::from_json(METADATA).expect("valid metadata");
        let order = set.entity("ORDERS").expect("orders entity");

        let user = &order.associations[0];
        assert_eq!(user.kind, AssociationKind::ManyToOne);
        assert_eq!(user.cascade, vec!["persist"]);
        assert!(!user.join_column("user_id").expect("column").nullable);

        let coupon = &order.associations[1];
        assert_eq!(coupon.join_columns.len(), 1);
        assert!(coupon.join_columns[0].nullable);

        let tags = &order.associations[2];
        assert_eq!(tags.kind, AssociationKind::ManyToMany);
        assert_eq!(tags.join_columns.len(), 2);
        assert!(tags.join_columns.iter().all(|c| c.nullable));
    }

    #[test]
    fn test_lookups() {
        let set = MetadataSet::from_json(METADATA).expect("valid metadata");
        assert_eq!(set.len(), 2);
        assert!(set.entity("users").expect("users").is_identifier("id"));
        assert!(set.has_to_many_targeting("orders"));
        assert!(!set.has_to_many_targeting("users"));
        assert!(set.are_related("users", "orders"));
        assert!(set.are_related("tags", "orders"));
        assert!(!set.are_related("users", "tags"));
        assert!(set.entity("missing").is_none());
    }

    #[test]
    fn test_lookups_ignore_query_side_case() {
        let set = MetadataSet::from_json(METADATA).expect("valid metadata");
        assert!(set.has_to_many_targeting("Orders"));
        assert!(set.has_to_many_targeting("ORDERS"));
        assert!(set.are_related("Users", "Orders"));
        let users = set.entity("users").expect("users");
        assert_eq!(users.associations_to("ORDERS").count(), 1);
    }

    #[test]
    fn test_kind_helpers() {
        assert_eq!(AssociationKind::ManyToOne.flipped(), AssociationKind::OneToMany);
        assert_eq!(AssociationKind::OneToOne.flipped(), AssociationKind::OneToOne);
        assert!(AssociationKind::ManyToMany.is_to_many());
        assert!(AssociationKind::OneToOne.is_to_one());
        assert!(AssociationKind::try_from("sideways".to_string()).is_err());
    }

    #[test]
    fn test_wrapped_and_invalid_input() {
        let set = MetadataSet::from_json(r#"{"entities": [{"table": "Users"}]}"#)
            .expect("valid metadata");
        let users = set.entity("users").expect("users");
        assert_eq!(users.name, "users");
        assert_eq!(users.identifier, vec!["id"]);

        assert!(matches!(
            MetadataSet::from_json("[{\"name\": 1}]"),
            Err(InspectError::Metadata(_))
        ));
    }
}
