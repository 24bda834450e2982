//! Traversal builder
//!
//! A traversal starts at one entity table and follows junction hops to other
//! entity tables, all inside one environment. The environment id is bound once
//! as `:env`; every junction hop and every directly scoped entity table filters
//! on it, so an edge from another environment can never be followed.
//!
//! ```text
//! instanced_fv s0
//!   JOIN junction j1 ON j1.table1 = 'instanced_fv' AND j1.key1 = s0.fv_name
//!                   AND j1.table2 = 'instanced_inf' AND j1.env = :env
//!   JOIN instanced_inf s1 ON s1.component = j1.key2 AND s1.env = :env
//!   ...
//! ```
//!
//! Lookups are `LEFT JOIN`s that pull descriptive attributes onto a row
//! without filtering it out when the attribute row is missing. Optional hops
//! left-join both the junction and the target, so a row with no such edge
//! survives with NULL target columns. The env filters of an optional hop sit
//! in its `ON` clauses.

use crate::edge::{TableTag, JUNCTION_TABLE};
use crate::entity::EnvId;
use crate::storage::schema::quote_ident;
use crate::{Error, Result};

/// Table alias inside a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alias {
    /// Entity reached at hop `n` (0 is the start table)
    Step(usize),
    /// Attribute table joined by the `n`th lookup
    Lookup(usize),
}

impl std::fmt::Display for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alias::Step(n) => write!(f, "s{}", n),
            Alias::Lookup(n) => write!(f, "l{}", n),
        }
    }
}

/// A column of an aliased table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: Alias,
    pub column: &'static str,
}

impl ColumnRef {
    pub fn step(n: usize, column: &'static str) -> Self {
        Self { alias: Alias::Step(n), column }
    }

    pub fn lookup(n: usize, column: &'static str) -> Self {
        Self { alias: Alias::Lookup(n), column }
    }
}

#[derive(Debug, Clone)]
enum Selection {
    Column(ColumnRef),
    /// `1` when the column is NULL, else `0`
    IsNull(ColumnRef),
}

#[derive(Debug, Clone, Copy)]
struct Hop {
    tag: TableTag,
    /// Column of `tag` matched against the junction's target key
    on: &'static str,
    optional: bool,
}

#[derive(Debug, Clone, Copy)]
struct Lookup {
    tag: TableTag,
    on: ColumnRef,
}

/// An environment-scoped multi-hop query over the junction table.
#[derive(Debug, Clone)]
pub struct Traversal {
    env: EnvId,
    start: TableTag,
    hops: Vec<Hop>,
    lookups: Vec<Lookup>,
    select: Vec<Selection>,
    order_by: Vec<ColumnRef>,
    distinct: bool,
}

impl Traversal {
    /// Start a traversal at `start` inside `env`
    pub fn from(env: EnvId, start: TableTag) -> Self {
        Self {
            env,
            start,
            hops: Vec::new(),
            lookups: Vec::new(),
            select: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
        }
    }

    pub fn env(&self) -> EnvId {
        self.env
    }

    /// Follow edges from the last step to `tag`, landing on its key column
    pub fn to(self, tag: TableTag) -> Self {
        self.to_via(tag, tag.key_column())
    }

    /// Follow edges from the last step to `tag`, landing on rows whose `on`
    /// column equals the edge's target key
    pub fn to_via(mut self, tag: TableTag, on: &'static str) -> Self {
        self.hops.push(Hop { tag, on, optional: false });
        self
    }

    /// Like `to`, but keeps rows of the last step that have no edge to `tag`
    pub fn to_optional(mut self, tag: TableTag) -> Self {
        self.hops.push(Hop { tag, on: tag.key_column(), optional: true });
        self
    }

    /// Left-join `tag` on its key column equal to `on`
    pub fn lookup(mut self, tag: TableTag, on: ColumnRef) -> Self {
        self.lookups.push(Lookup { tag, on });
        self
    }

    pub fn column(mut self, column: ColumnRef) -> Self {
        self.select.push(Selection::Column(column));
        self
    }

    /// Derived flag computed from a nullable classifying column
    pub fn is_null(mut self, column: ColumnRef) -> Self {
        self.select.push(Selection::IsNull(column));
        self
    }

    pub fn order_by(mut self, column: ColumnRef) -> Self {
        self.order_by.push(column);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    fn step_tag(&self, n: usize) -> Option<TableTag> {
        if n == 0 {
            Some(self.start)
        } else {
            self.hops.get(n - 1).map(|h| h.tag)
        }
    }

    fn alias_tag(&self, alias: Alias) -> Option<TableTag> {
        match alias {
            Alias::Step(n) => self.step_tag(n),
            Alias::Lookup(n) => self.lookups.get(n).map(|l| l.tag),
        }
    }

    fn check_column(&self, column: &ColumnRef) -> Result<()> {
        let tag = self
            .alias_tag(column.alias)
            .ok_or_else(|| Error::Query(format!("Unknown table alias: {}", column.alias)))?;
        if !tag.has_column(column.column) {
            return Err(Error::Query(format!(
                "Table {} has no column {}",
                tag, column.column
            )));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.hops.is_empty() && self.start.env_column().is_none() {
            return Err(Error::Query(format!(
                "Traversal from {} without hops is not environment scoped",
                self.start
            )));
        }
        if self.select.is_empty() {
            return Err(Error::Query("Traversal selects no columns".into()));
        }
        for (i, hop) in self.hops.iter().enumerate() {
            if !hop.tag.has_column(hop.on) {
                return Err(Error::Query(format!("Table {} has no column {}", hop.tag, hop.on)));
            }
            // an inner join after a left join would drop the rows it kept
            if !hop.optional && self.hops[..i].iter().any(|h| h.optional) {
                return Err(Error::Query(format!(
                    "Required hop to {} follows an optional hop",
                    hop.tag
                )));
            }
        }
        for (i, lookup) in self.lookups.iter().enumerate() {
            // a lookup may only refer to steps or earlier lookups
            if let Alias::Lookup(n) = lookup.on.alias {
                if n >= i {
                    return Err(Error::Query(format!("Lookup l{} refers to later alias l{}", i, n)));
                }
            }
            self.check_column(&lookup.on)?;
        }
        for selection in &self.select {
            match selection {
                Selection::Column(c) | Selection::IsNull(c) => self.check_column(c)?,
            }
        }
        for column in &self.order_by {
            self.check_column(column)?;
        }
        Ok(())
    }

    fn render_column(column: &ColumnRef) -> String {
        format!("{}.{}", column.alias, quote_ident(column.column))
    }

    /// Render the traversal as SQL with a single `:env` parameter
    pub fn to_sql(&self) -> Result<String> {
        self.validate()?;

        let select = self
            .select
            .iter()
            .map(|s| match s {
                Selection::Column(c) => Self::render_column(c),
                Selection::IsNull(c) => {
                    format!("CASE WHEN {} IS NULL THEN 1 ELSE 0 END", Self::render_column(c))
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT {}{}\nFROM {} AS s0",
            if self.distinct { "DISTINCT " } else { "" },
            select,
            quote_ident(self.start.as_str()),
        );

        let mut prev = self.start;
        for (i, hop) in self.hops.iter().enumerate() {
            let n = i + 1;
            let join = if hop.optional { "LEFT JOIN" } else { "JOIN" };
            sql.push_str(&format!(
                "\n{join} {junction} AS j{n} ON j{n}.table1 = '{from}' AND j{n}.key1 = s{p}.{from_key} \
                 AND j{n}.table2 = '{to}' AND j{n}.env = :env",
                junction = JUNCTION_TABLE,
                from = prev.as_str(),
                from_key = quote_ident(prev.key_column()),
                to = hop.tag.as_str(),
                p = n - 1,
            ));
            sql.push_str(&format!(
                "\n{join} {table} AS s{n} ON s{n}.{on} = j{n}.key2",
                table = quote_ident(hop.tag.as_str()),
                on = quote_ident(hop.on),
            ));
            if let Some(env_col) = hop.tag.env_column() {
                sql.push_str(&format!(" AND s{n}.{} = :env", quote_ident(env_col)));
            }
            prev = hop.tag;
        }

        for (i, lookup) in self.lookups.iter().enumerate() {
            sql.push_str(&format!(
                "\nLEFT JOIN {table} AS l{i} ON l{i}.{key} = {on}",
                table = quote_ident(lookup.tag.as_str()),
                key = quote_ident(lookup.tag.key_column()),
                on = Self::render_column(&lookup.on),
            ));
            if let Some(env_col) = lookup.tag.env_column() {
                sql.push_str(&format!(" AND l{i}.{} = :env", quote_ident(env_col)));
            }
        }

        if let Some(env_col) = self.start.env_column() {
            sql.push_str(&format!("\nWHERE s0.{} = :env", quote_ident(env_col)));
        }

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(Self::render_column)
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!("\nORDER BY {}", order));
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_hop_is_env_filtered() {
        let sql = Traversal::from(EnvId(3), TableTag::InstancedFv)
            .to_via(TableTag::InstancedInf, "component")
            .to(TableTag::Source)
            .column(ColumnRef::step(2, "path"))
            .to_sql()
            .unwrap();

        assert!(sql.contains("j1.env = :env"));
        assert!(sql.contains("j2.env = :env"));
        assert!(sql.contains("s1.\"env\" = :env"));
        assert!(sql.contains("WHERE s0.\"env\" = :env"));
        assert!(sql.contains("s1.\"component\" = j1.key2"));
        assert!(sql.contains("j2.key1 = s1.\"path\""));
    }

    #[test]
    fn test_lookup_and_derived_flag() {
        let sql = Traversal::from(EnvId(1), TableTag::Package)
            .to(TableTag::Inf)
            .lookup(TableTag::Package, ColumnRef::step(1, "package"))
            .column(ColumnRef::lookup(0, "repository"))
            .is_null(ColumnRef::step(1, "library_class"))
            .distinct()
            .order_by(ColumnRef::lookup(0, "repository"))
            .to_sql()
            .unwrap();

        assert!(sql.starts_with("SELECT DISTINCT l0.\"repository\""));
        assert!(sql.contains("CASE WHEN s1.\"library_class\" IS NULL THEN 1 ELSE 0 END"));
        assert!(sql.contains("LEFT JOIN \"package\" AS l0 ON l0.\"name\" = s1.\"package\""));
        assert!(sql.ends_with("ORDER BY l0.\"repository\""));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_optional_hop_is_left_joined() {
        let sql = Traversal::from(EnvId(1), TableTag::InstancedFv)
            .to_via(TableTag::InstancedInf, "component")
            .to_optional(TableTag::Source)
            .column(ColumnRef::step(1, "path"))
            .column(ColumnRef::step(2, "path"))
            .to_sql()
            .unwrap();

        assert!(sql.contains("\nJOIN junction AS j1 ON"));
        assert!(sql.contains("\nLEFT JOIN junction AS j2 ON"));
        assert!(sql.contains("AND j2.env = :env"));
        assert!(sql.contains("\nLEFT JOIN \"source\" AS s2 ON s2.\"path\" = j2.key2"));
    }

    #[test]
    fn test_required_hop_after_optional_rejected() {
        let err = Traversal::from(EnvId(1), TableTag::InstancedFv)
            .to_optional(TableTag::InstancedInf)
            .to(TableTag::Source)
            .column(ColumnRef::step(2, "path"))
            .to_sql()
            .unwrap_err();
        assert!(err.to_string().contains("follows an optional hop"));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = Traversal::from(EnvId(1), TableTag::Package)
            .to(TableTag::Inf)
            .column(ColumnRef::step(1, "total_lines"))
            .to_sql()
            .unwrap_err();
        assert!(err.to_string().contains("no column total_lines"));

        let err = Traversal::from(EnvId(1), TableTag::Package)
            .to(TableTag::Inf)
            .column(ColumnRef::step(5, "path"))
            .to_sql()
            .unwrap_err();
        assert!(err.to_string().contains("Unknown table alias"));
    }

    #[test]
    fn test_unscoped_traversal_rejected() {
        let result = Traversal::from(EnvId(1), TableTag::Package)
            .column(ColumnRef::step(0, "name"))
            .to_sql();
        assert!(result.is_err());

        let scoped = Traversal::from(EnvId(1), TableTag::InstancedFv)
            .column(ColumnRef::step(0, "fv_name"))
            .to_sql();
        assert!(scoped.is_ok());
    }
}
