//! Entity kinds and their table layout.
//!
//! The dependency graph is fixed: `User` → `Project` → `Competitor`. Each kind
//! knows its table, natural key columns and (for parent-scoped kinds) the
//! column holding the parent's identifier.

use serde::{Deserialize, Serialize};

use crate::value::Scalar;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int,
    Text,
    Bool,
    Uuid,
}

impl ColumnType {
    /// Whether `value` can be stored in a column of this type. `Null` fits
    /// every type.
    pub fn accepts(self, value: &Scalar) -> bool {
        matches!(
            (self, value),
            (_, Scalar::Null)
                | (ColumnType::Int, Scalar::Int(_))
                | (ColumnType::Text, Scalar::Text(_))
                | (ColumnType::Bool, Scalar::Bool(_))
                | (ColumnType::Uuid, Scalar::Id(_))
        )
    }
}

impl core::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ColumnType::Int => write!(f, "bigint"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Bool => write!(f, "boolean"),
            ColumnType::Uuid => write!(f, "uuid"),
        }
    }
}

/// Kind of reconciled entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Bot user, keyed globally by Telegram id.
    User,
    /// Monitoring project, keyed by name within its owning user.
    Project,
    /// Tracked Instagram account, keyed by username within its project.
    Competitor,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::User, EntityKind::Project, EntityKind::Competitor];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Project => "projects",
            EntityKind::Competitor => "competitors",
        }
    }

    /// Natural key columns, excluding the parent column.
    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::User => &["telegram_id"],
            EntityKind::Project => &["name"],
            EntityKind::Competitor => &["username"],
        }
    }

    /// Required parent kind, `None` for globally keyed kinds.
    pub fn parent(self) -> Option<EntityKind> {
        match self {
            EntityKind::User => None,
            EntityKind::Project => Some(EntityKind::User),
            EntityKind::Competitor => Some(EntityKind::Project),
        }
    }

    /// Column holding the parent's identifier.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            EntityKind::User => None,
            EntityKind::Project => Some("user_id"),
            EntityKind::Competitor => Some("project_id"),
        }
    }

    pub fn is_parent_scoped(self) -> bool {
        self.parent().is_some()
    }

    /// Every writable column of the kind's table (`id` and timestamps are
    /// store-generated and not listed).
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::User => &[
                "telegram_id",
                "username",
                "first_name",
                "last_name",
                "language_code",
                "is_premium",
            ],
            EntityKind::Project => &["user_id", "name", "description", "is_active"],
            EntityKind::Competitor => &["project_id", "username", "instagram_url", "is_active"],
        }
    }

    /// Type of a column of this kind's table; `id` is included.
    pub fn column_type(self, column: &str) -> Option<ColumnType> {
        let ty = match (self, column) {
            (_, "id") => ColumnType::Uuid,
            (EntityKind::User, "telegram_id") => ColumnType::Int,
            (EntityKind::User, "username" | "first_name" | "last_name" | "language_code") => {
                ColumnType::Text
            }
            (EntityKind::User, "is_premium") => ColumnType::Bool,
            (EntityKind::Project, "user_id") => ColumnType::Uuid,
            (EntityKind::Project, "name" | "description") => ColumnType::Text,
            (EntityKind::Project, "is_active") => ColumnType::Bool,
            (EntityKind::Competitor, "project_id") => ColumnType::Uuid,
            (EntityKind::Competitor, "username" | "instagram_url") => ColumnType::Text,
            (EntityKind::Competitor, "is_active") => ColumnType::Bool,
            _ => return None,
        };
        Some(ty)
    }

    /// Look up the kind owning a table name.
    pub fn from_table(table: &str) -> Option<EntityKind> {
        Self::ALL.into_iter().find(|k| k.table() == table)
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Project => write!(f, "project"),
            EntityKind::Competitor => write!(f, "competitor"),
        }
    }
}
