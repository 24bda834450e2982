//! SQLite storage implementation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::debug;
use crate::{Result, Error};
use crate::edge::{Edge, EntityKey, TableTag, JUNCTION_TABLE};
use crate::entity::{
    EnvId, Environment, InstancedFv, InstancedModule, ModuleDescriptor, Package, SourceFile,
};
use super::schema::{self, quote_ident};

/// Handle on one build database.
///
/// Opened once per report run and released by `close` (or on drop).
pub struct ReportDb {
    conn: Connection,
    path: PathBuf,
}

impl ReportDb {
    /// Open an existing database read-only
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::DatabaseNotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        debug!("Opened database at {}", path.display());
        Ok(Self { conn, path: path.to_path_buf() })
    }

    /// Create (or open read-write) a database with the full schema
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn, path: path.to_path_buf() };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: PathBuf::from(":memory:") };
        db.initialize_schema()?;
        Ok(db)
    }

    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Path this database was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw connection, for report-specific queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, surfacing any error from SQLite
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| Error::Storage(e))?;
        debug!("Closed database at {}", path.display());
        Ok(())
    }

    /// Names of all user tables, sorted
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Count rows in a table
    pub fn row_count(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let mut tables = Vec::new();
        for name in self.table_names()? {
            let count = self.row_count(&name)?;
            tables.push((name, count));
        }
        Ok(DbStats { tables })
    }

    // ========== Environment Operations ==========

    /// All environments, newest first
    pub fn environments(&self) -> Result<Vec<Environment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, version, date FROM environment ORDER BY date DESC, id DESC")?;
        let rows = stmt
            .query_map([], |row| self.row_to_environment(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut envs = Vec::with_capacity(rows.len());
        for mut env in rows {
            env.values = self.environment_values(env.id)?;
            envs.push(env);
        }
        Ok(envs)
    }

    /// Get one environment with its variables
    pub fn environment(&self, id: EnvId) -> Result<Option<Environment>> {
        let env = self
            .conn
            .query_row(
                "SELECT id, version, date FROM environment WHERE id = ?1",
                [id],
                |row| self.row_to_environment(row),
            )
            .optional()?;

        match env {
            Some(mut env) => {
                env.values = self.environment_values(id)?;
                Ok(Some(env))
            }
            None => Ok(None),
        }
    }

    /// Most recently created environment
    pub fn latest_environment(&self) -> Result<Option<EnvId>> {
        self.conn
            .query_row(
                "SELECT id FROM environment ORDER BY date DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Pick the environment a query should run against.
    ///
    /// An explicit request is returned as-is without an existence check;
    /// otherwise the latest environment is used.
    pub fn resolve_environment(&self, requested: Option<EnvId>) -> Result<Option<EnvId>> {
        match requested {
            Some(id) => Ok(Some(id)),
            None => self.latest_environment(),
        }
    }

    /// Variables recorded for an environment
    pub fn environment_values(&self, id: EnvId) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM environment_values WHERE id = ?1 ORDER BY key")?;
        let values = stmt
            .query_map([id], |row| {
                let key: String = row.get(0)?;
                let value: Option<String> = row.get(1)?;
                Ok((key, value.unwrap_or_default()))
            })?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(values)
    }

    fn row_to_environment(&self, row: &rusqlite::Row) -> rusqlite::Result<Environment> {
        Ok(Environment {
            id: row.get(0)?,
            version: row.get(1)?,
            date: row.get(2)?,
            values: BTreeMap::new(),
        })
    }

    // ========== Edge Operations ==========

    /// Junction records of one environment.
    ///
    /// Records naming a table outside `TableTag` are skipped.
    pub fn edges(&self, env: EnvId) -> Result<Vec<Edge>> {
        let sql = format!(
            "SELECT table1, key1, table2, key2 FROM {} WHERE env = ?1 ORDER BY table1, key1, table2, key2",
            JUNCTION_TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([env], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let edges = rows
            .into_iter()
            .filter_map(|(t1, k1, t2, k2)| {
                let source = t1.parse::<TableTag>().ok()?;
                let target = t2.parse::<TableTag>().ok()?;
                Some(Edge::new(EntityKey::new(source, k1), EntityKey::new(target, k2), env))
            })
            .collect();
        Ok(edges)
    }

    /// Modules instanced into one component
    pub fn component_modules(&self, env: EnvId, component: &str) -> Result<Vec<InstancedModule>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT env, path, component, class, name, arch, dsc
            FROM instanced_inf
            WHERE env = ?1 AND component = ?2
            ORDER BY path
            "#,
        )?;
        let modules = stmt
            .query_map(params![env, component], |row| {
                Ok(InstancedModule {
                    env: row.get(0)?,
                    path: row.get(1)?,
                    component: row.get(2)?,
                    class: row.get(3)?,
                    name: row.get(4)?,
                    arch: row.get(5)?,
                    dsc: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(modules)
    }

    /// Paths of every component instanced in an environment
    pub fn components(&self, env: EnvId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT component FROM instanced_inf WHERE env = ?1 AND path = component ORDER BY component",
        )?;
        let paths = stmt
            .query_map([env], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    // ========== Write Operations ==========
    //
    // The upstream collector owns these tables; writers exist so fixtures
    // can be built through typed rows.

    /// Insert or replace an environment and its variables
    pub fn insert_environment(&self, env: &Environment) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO environment (id, date, version) VALUES (?1, ?2, ?3)",
            params![env.id, env.date, env.version],
        )?;
        for (key, value) in &env.values {
            self.conn.execute(
                "INSERT OR REPLACE INTO environment_values (id, key, value) VALUES (?1, ?2, ?3)",
                params![env.id, key, value],
            )?;
        }
        Ok(())
    }

    pub fn insert_package(&self, package: &Package) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO package (name, repository) VALUES (?1, ?2)",
            params![package.name, package.repository],
        )?;
        Ok(())
    }

    pub fn insert_module(&self, module: &ModuleDescriptor) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO inf (path, guid, library_class, package) VALUES (?1, ?2, ?3, ?4)",
            params![module.path, module.guid, module.library_class, module.package],
        )?;
        Ok(())
    }

    pub fn insert_source(&self, source: &SourceFile) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO source (path, license, total_lines, code_lines, comment_lines, blank_lines)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                source.path,
                source.license,
                source.total_lines,
                source.code_lines,
                source.comment_lines,
                source.blank_lines,
            ],
        )?;
        Ok(())
    }

    pub fn insert_instanced_module(&self, module: &InstancedModule) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO instanced_inf (env, path, component, class, name, arch, dsc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                module.env,
                module.path,
                module.component,
                module.class,
                module.name,
                module.arch,
                module.dsc,
            ],
        )?;
        Ok(())
    }

    pub fn insert_instanced_fv(&self, fv: &InstancedFv) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO instanced_fv (env, fv_name, fdf, path) VALUES (?1, ?2, ?3, ?4)",
            params![fv.env, fv.fv_name, fv.fdf, fv.path],
        )?;
        Ok(())
    }

    /// Insert a junction record
    pub fn insert_edge(&self, edge: &Edge) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (env, table1, key1, table2, key2) VALUES (?1, ?2, ?3, ?4, ?5)",
            JUNCTION_TABLE
        );
        self.conn.execute(
            &sql,
            params![
                edge.env,
                edge.source.tag.as_str(),
                edge.source.key,
                edge.target.tag.as_str(),
                edge.target.key,
            ],
        )?;
        Ok(())
    }
}

/// Row counts per table
#[derive(Debug, Clone)]
pub struct DbStats {
    pub tables: Vec<(String, usize)>,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (table, count) in &self.tables {
            writeln!(f, "  {}: {}", table, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_crud() {
        let db = ReportDb::open_in_memory().unwrap();
        let env = Environment::new(1, "1.0", "2024-01-01 10:00:00")
            .with_value("TARGET", "DEBUG")
            .with_value("PLATFORM_NAME", "Qemu");
        db.insert_environment(&env).unwrap();

        let loaded = db.environment(EnvId(1)).unwrap().unwrap();
        assert_eq!(loaded, env);
        assert!(db.environment(EnvId(9)).unwrap().is_none());
    }

    #[test]
    fn test_latest_environment_by_date() {
        let db = ReportDb::open_in_memory().unwrap();
        assert_eq!(db.latest_environment().unwrap(), None);

        db.insert_environment(&Environment::new(1, "1.0", "2024-03-01 00:00:00")).unwrap();
        db.insert_environment(&Environment::new(2, "1.0", "2024-01-01 00:00:00")).unwrap();

        assert_eq!(db.latest_environment().unwrap(), Some(EnvId(1)));
        assert_eq!(db.resolve_environment(None).unwrap(), Some(EnvId(1)));
        assert_eq!(db.resolve_environment(Some(EnvId(77))).unwrap(), Some(EnvId(77)));

        let ids: Vec<_> = db.environments().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![EnvId(1), EnvId(2)]);
    }

    #[test]
    fn test_edges_are_environment_scoped() {
        let db = ReportDb::open_in_memory().unwrap();
        db.insert_edge(&Edge::link(EnvId(1), TableTag::Package, "APkg", TableTag::Inf, "A.inf")).unwrap();
        db.insert_edge(&Edge::link(EnvId(2), TableTag::Package, "BPkg", TableTag::Inf, "B.inf")).unwrap();
        db.connection()
            .execute(
                "INSERT INTO junction (env, table1, key1, table2, key2) VALUES (1, 'mystery', 'x', 'inf', 'A.inf')",
                [],
            )
            .unwrap();

        let edges = db.edges(EnvId(1)).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source.key, "APkg");
        assert!(db.edges(EnvId(3)).unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.db");
        match ReportDb::open(&missing) {
            Err(Error::DatabaseNotFound(path)) => assert_eq!(path, missing),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn test_open_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.db");
        ReportDb::create(&path).unwrap().close().unwrap();

        let db = ReportDb::open(&path).unwrap();
        assert!(db.insert_package(&Package::new("APkg", "repo")).is_err());
        db.close().unwrap();
    }

    #[test]
    fn test_stats() {
        let db = ReportDb::open_in_memory().unwrap();
        db.insert_package(&Package::new("APkg", "repo")).unwrap();
        db.insert_source(&SourceFile::new("A/a.c", 10)).unwrap();

        let stats = db.stats().unwrap();
        let package = stats.tables.iter().find(|(t, _)| t == "package").unwrap();
        assert_eq!(package.1, 1);
        assert!(stats.to_string().contains("source: 1"));
    }
}
