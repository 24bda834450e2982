//! Edge types - environment-scoped relationship representation
//!
//! Relationships between entities are not foreign keys. Every link lives in
//! the generic `junction` table as `(table1, key1, table2, key2, env)`:
//! a table tag and key for each end, plus the owning environment.
//!
//! `TableTag` is the closed set of entity tables a junction end may name, so
//! traversal code matches exhaustively instead of passing table strings around.

use crate::entity::EnvId;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Name of the generic edge table
pub const JUNCTION_TABLE: &str = "junction";

/// Entity tables that may appear on either end of a junction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableTag {
    /// Package (name, repository)
    Package,
    /// Module descriptor (INF)
    Inf,
    /// Source file
    Source,
    /// Module instanced into a component for one environment
    InstancedInf,
    /// Firmware volume instanced for one environment
    InstancedFv,
}

impl TableTag {
    /// Table name; also the tag stored in `junction.table1/table2`
    pub fn as_str(&self) -> &'static str {
        match self {
            TableTag::Package => "package",
            TableTag::Inf => "inf",
            TableTag::Source => "source",
            TableTag::InstancedInf => "instanced_inf",
            TableTag::InstancedFv => "instanced_fv",
        }
    }

    /// Column holding the key that junction records refer to
    pub fn key_column(&self) -> &'static str {
        match self {
            TableTag::Package => "name",
            TableTag::Inf | TableTag::Source | TableTag::InstancedInf => "path",
            TableTag::InstancedFv => "fv_name",
        }
    }

    /// Column holding the owning environment, for directly scoped tables
    pub fn env_column(&self) -> Option<&'static str> {
        match self {
            TableTag::InstancedInf | TableTag::InstancedFv => Some("env"),
            TableTag::Package | TableTag::Inf | TableTag::Source => None,
        }
    }

    /// Every column of the table
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            TableTag::Package => &["name", "repository"],
            TableTag::Inf => &["path", "guid", "library_class", "package"],
            TableTag::Source => &[
                "path",
                "license",
                "total_lines",
                "code_lines",
                "comment_lines",
                "blank_lines",
            ],
            TableTag::InstancedInf => &["env", "path", "component", "class", "name", "arch", "dsc"],
            TableTag::InstancedFv => &["env", "fv_name", "fdf", "path"],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Get all table tags
    pub fn all() -> &'static [TableTag] {
        &[
            TableTag::Package,
            TableTag::Inf,
            TableTag::Source,
            TableTag::InstancedInf,
            TableTag::InstancedFv,
        ]
    }
}

impl FromStr for TableTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "package" => Ok(TableTag::Package),
            "inf" => Ok(TableTag::Inf),
            "source" => Ok(TableTag::Source),
            "instanced_inf" => Ok(TableTag::InstancedInf),
            "instanced_fv" => Ok(TableTag::InstancedFv),
            _ => Err(Error::Query(format!("Unknown table tag: {}", s))),
        }
    }
}

impl std::fmt::Display for TableTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One end of a junction record: a table tag plus an opaque key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub tag: TableTag,
    pub key: String,
}

impl EntityKey {
    pub fn new(tag: TableTag, key: impl Into<String>) -> Self {
        Self { tag, key: key.into() }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tag, self.key)
    }
}

/// A junction record. Only meaningful inside `env`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: EntityKey,
    pub target: EntityKey,
    pub env: EnvId,
}

impl Edge {
    pub fn new(source: EntityKey, target: EntityKey, env: EnvId) -> Self {
        Self { source, target, env }
    }

    /// Shorthand for building an edge from tag/key pairs
    pub fn link(
        env: EnvId,
        source_tag: TableTag,
        source_key: impl Into<String>,
        target_tag: TableTag,
        target_key: impl Into<String>,
    ) -> Self {
        Self::new(
            EntityKey::new(source_tag, source_key),
            EntityKey::new(target_tag, target_key),
            env,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_tag_roundtrip() {
        for tag in TableTag::all() {
            let parsed: TableTag = tag.as_str().parse().unwrap();
            assert_eq!(*tag, parsed);
        }
        assert!("environment".parse::<TableTag>().is_err());
    }

    #[test]
    fn test_key_and_env_columns_are_real_columns() {
        for tag in TableTag::all() {
            assert!(tag.has_column(tag.key_column()), "{}", tag);
            if let Some(env) = tag.env_column() {
                assert!(tag.has_column(env), "{}", tag);
            }
        }
    }

    #[test]
    fn test_edge_link() {
        let edge = Edge::link(EnvId(1), TableTag::Package, "MdePkg", TableTag::Inf, "MdePkg/A.inf");
        assert_eq!(edge.env, EnvId(1));
        assert_eq!(edge.source.to_string(), "package:MdePkg");
        assert_eq!(edge.target, EntityKey::new(TableTag::Inf, "MdePkg/A.inf"));
    }
}
