//! Entity types - rows of the build database
//!
//! Every build is described by one `Environment`. Descriptor-level rows
//! (`Package`, `ModuleDescriptor`, `SourceFile`) are shared across builds and
//! reach an environment through `junction` edges; instance rows
//! (`InstancedModule`, `InstancedFv`) carry their environment directly.

use crate::Error;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Environment identifier. Unique within one database only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvId(pub i64);

impl std::fmt::Display for EnvId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EnvId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(EnvId)
            .map_err(|_| Error::Query(format!("Invalid environment id: {}", s)))
    }
}

impl ToSql for EnvId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for EnvId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(EnvId)
    }
}

/// Metadata for one build/run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: EnvId,
    pub version: String,
    /// Creation timestamp, stored as sortable text (`YYYY-MM-DD HH:MM:SS`)
    pub date: String,
    /// Environment variable name -> value
    pub values: BTreeMap<String, String>,
}

impl Environment {
    pub fn new(id: i64, version: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: EnvId(id),
            version: version.into(),
            date: date.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach a variable
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub repository: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: Some(repository.into()),
        }
    }
}

/// A module descriptor (INF). `library_class` is `None` for components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub path: String,
    pub guid: Option<String>,
    pub library_class: Option<String>,
    pub package: Option<String>,
}

impl ModuleDescriptor {
    pub fn component(path: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            guid: None,
            library_class: None,
            package: Some(package.into()),
        }
    }

    pub fn library(
        path: impl Into<String>,
        library_class: impl Into<String>,
        package: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            guid: None,
            library_class: Some(library_class.into()),
            package: Some(package.into()),
        }
    }

    pub fn is_component(&self) -> bool {
        self.library_class.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub license: Option<String>,
    pub total_lines: i64,
    pub code_lines: i64,
    pub comment_lines: i64,
    pub blank_lines: i64,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, total_lines: i64) -> Self {
        Self {
            path: path.into(),
            license: None,
            total_lines,
            code_lines: total_lines,
            comment_lines: 0,
            blank_lines: 0,
        }
    }
}

/// A module as built into one component for one environment.
///
/// Components are instanced with `component == path`; libraries linked into
/// a component carry the component's path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancedModule {
    pub env: EnvId,
    pub path: String,
    pub component: String,
    pub class: Option<String>,
    pub name: Option<String>,
    pub arch: Option<String>,
    pub dsc: Option<String>,
}

impl InstancedModule {
    pub fn new(
        env: EnvId,
        path: impl Into<String>,
        component: impl Into<String>,
        class: Option<&str>,
    ) -> Self {
        Self {
            env,
            path: path.into(),
            component: component.into(),
            class: class.map(str::to_string),
            name: None,
            arch: None,
            dsc: None,
        }
    }

    pub fn is_component(&self) -> bool {
        self.path == self.component
    }
}

/// A firmware volume as laid out for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancedFv {
    pub env: EnvId,
    pub fv_name: String,
    pub fdf: Option<String>,
    pub path: Option<String>,
}

impl InstancedFv {
    pub fn new(env: EnvId, fv_name: impl Into<String>) -> Self {
        Self {
            env,
            fv_name: fv_name.into(),
            fdf: None,
            path: None,
        }
    }
}
