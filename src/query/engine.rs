//! Query engine implementation
//!
//! Provides the query operations reports build on:
//! - Running a `Traversal` and mapping its rows
//! - One-hop neighbour lookups through the junction table
//!
//! A traversal over an environment id that does not exist returns no rows.
//! Telling "no data" apart from "no such environment" is left to callers.

use rusqlite::{named_params, params};
use crate::Result;
use crate::edge::{EntityKey, TableTag, JUNCTION_TABLE};
use crate::entity::EnvId;
use crate::storage::ReportDb;
use super::traversal::Traversal;

/// Query engine over one open database
pub struct QueryEngine<'a> {
    db: &'a ReportDb,
}

impl<'a> QueryEngine<'a> {
    /// Create a new query engine
    pub fn new(db: &'a ReportDb) -> Self {
        Self { db }
    }

    /// Run a traversal, mapping each row with `f`
    pub fn rows<T, F>(&self, traversal: &Traversal, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let sql = traversal.to_sql()?;
        tracing::trace!("traversal sql:\n{}", sql);

        let mut stmt = self.db.connection().prepare(&sql)?;
        let rows = stmt
            .query_map(named_params! { ":env": traversal.env() }, |row| f(row))?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    /// Keys of `to` entities linked from `from` inside `env`, sorted
    pub fn neighbours(&self, env: EnvId, from: &EntityKey, to: TableTag) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT key2 FROM {} WHERE env = ?1 AND table1 = ?2 AND key1 = ?3 AND table2 = ?4 ORDER BY key2",
            JUNCTION_TABLE
        );
        let mut stmt = self.db.connection().prepare(&sql)?;
        let keys = stmt
            .query_map(params![env, from.tag.as_str(), from.key, to.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}
