//! Database Merge Engine
//!
//! Folds N build databases into one new temporary database:
//! 1. The first database's bytes become the target's initial content.
//! 2. The target's table set is enumerated once; it fixes which tables merge.
//! 3. Each later source is attached read-only as `merge_src`, every table is
//!    copied with `INSERT OR REPLACE` keyed by its primary key, then the
//!    source is detached.
//!
//! Primary keys only identify the same record across databases when they are
//! namespaced. Environment ids are not (each collector starts counting on its
//! own), so `MergeStrategy::Rekey` rewrites them while copying. Descriptor
//! tables keyed by path or name keep last-listed-source-wins semantics.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params, types::ValueRef};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::schema::{env_column_for, quote_ident};
use crate::{Error, Result};

const SOURCE_ALIAS: &str = "merge_src";
const ENV_MAP_TABLE: &str = "merge_env_map";

/// How primary-key collisions between source databases are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Remap colliding environment ids so every source build stays distinct.
    /// Environments equal in version, date and variables collapse into one.
    #[default]
    Rekey,
    /// Copy rows verbatim; a later row with the same primary key replaces an
    /// earlier one. Only correct if equal keys denote the same record.
    Overwrite,
}

/// Merge `paths` into a new temporary database and return its path.
///
/// The caller owns the returned file and is responsible for deleting it.
/// No file is created unless every input exists, and the target is removed
/// again when a later step fails.
pub fn merge_databases(paths: &[PathBuf], strategy: MergeStrategy) -> Result<PathBuf> {
    let Some((first, rest)) = paths.split_first() else {
        return Err(Error::NoInput);
    };
    for path in paths {
        if !path.is_file() {
            return Err(Error::DatabaseNotFound(path.clone()));
        }
    }

    info!("Merging database: {}", first.display());
    let target = copy_to_temp(first)?;

    match merge_into(&target, first, rest, strategy) {
        Ok(()) => Ok(target),
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&target) {
                warn!("Could not remove {}: {}", target.display(), rm);
            }
            Err(e)
        }
    }
}

fn merge_into(target: &Path, first: &Path, rest: &[PathBuf], strategy: MergeStrategy) -> Result<()> {
    let mut conn = open_target(target)?;
    let tables = enumerate_tables(&conn).map_err(|e| merge_err(first, "reading table list", e))?;
    debug!("Merging {} tables: {:?}", tables.len(), tables);

    for source in rest {
        info!("Merging database: {}", source.display());
        merge_one(&mut conn, source, &tables, strategy)?;
    }

    conn.close().map_err(|(_, e)| Error::Storage(e))
}

/// URI filenames must be enabled on the target for `ATTACH` to honour
/// `mode=ro` on the sources.
fn open_target(target: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        target,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// `file:` URI opening `path` read-only
fn source_uri(path: &Path) -> String {
    let mut uri = String::from("file:");
    for c in path.to_string_lossy().chars() {
        match c {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            '\\' if cfg!(windows) => uri.push('/'),
            c => uri.push(c),
        }
    }
    uri.push_str("?mode=ro");
    uri
}

fn attach_source(conn: &Connection, source: &Path) -> Result<()> {
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", SOURCE_ALIAS),
        [source_uri(source)],
    )
    .map_err(|e| merge_err(source, "attaching database", e))?;
    Ok(())
}

/// Table name plus its columns, as declared in the first database
#[derive(Debug, Clone)]
struct TableInfo {
    name: String,
    columns: Vec<String>,
    env_column: Option<&'static str>,
}

fn copy_to_temp(first: &Path) -> Result<PathBuf> {
    let bytes = std::fs::read(first)?;
    let (mut file, path) = tempfile::Builder::new()
        .prefix("buildlens-merge-")
        .suffix(".db")
        .tempfile()?
        .keep()
        .map_err(|e| Error::Io(e.error))?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    debug!("Merge target: {}", path.display());
    Ok(path)
}

fn enumerate_tables(conn: &Connection) -> rusqlite::Result<Vec<TableInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM main.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let pragma = format!("PRAGMA main.table_info({})", quote_ident(&name));
        let mut stmt = conn.prepare(&pragma)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let env_column = env_column_for(&name, &columns);
        tables.push(TableInfo { name, columns, env_column });
    }
    Ok(tables)
}

fn merge_one(
    conn: &mut Connection,
    source: &Path,
    tables: &[TableInfo],
    strategy: MergeStrategy,
) -> Result<()> {
    attach_source(conn, source)?;

    let result = copy_tables(conn, source, tables, strategy);

    conn.execute(&format!("DETACH DATABASE {}", SOURCE_ALIAS), [])
        .map_err(|e| merge_err(source, "detaching database", e))?;
    result
}

fn copy_tables(
    conn: &mut Connection,
    source: &Path,
    tables: &[TableInfo],
    strategy: MergeStrategy,
) -> Result<()> {
    let rekey = strategy == MergeStrategy::Rekey && has_environment_table(tables);
    if rekey {
        let mapping = plan_env_mapping(conn).map_err(|e| merge_err(source, "planning environment ids", e))?;
        write_env_map(conn, &mapping).map_err(|e| merge_err(source, "writing environment map", e))?;
    }

    let tx = conn.transaction()?;
    for table in tables {
        let sql = copy_statement(table, rekey);
        tx.execute(&sql, [])
            .map_err(|e| merge_err(source, &format!("copying table {}", table.name), e))?;
    }
    tx.commit().map_err(|e| merge_err(source, "committing", e))?;
    Ok(())
}

fn has_environment_table(tables: &[TableInfo]) -> bool {
    tables.iter().any(|t| t.name == "environment")
}

/// Build the insert-or-replace for one table.
fn copy_statement(table: &TableInfo, rekey: bool) -> String {
    let target_cols = table
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let name = quote_ident(&table.name);

    match table.env_column {
        Some(env_col) if rekey => {
            let select_cols = table
                .columns
                .iter()
                .map(|c| {
                    if c == env_col {
                        format!("COALESCE(m.new_id, s.{})", quote_ident(c))
                    } else {
                        format!("s.{}", quote_ident(c))
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT OR REPLACE INTO main.{name} ({target_cols}) \
                 SELECT {select_cols} FROM {SOURCE_ALIAS}.{name} AS s \
                 LEFT JOIN temp.{ENV_MAP_TABLE} AS m ON m.old_id = s.{env}",
                env = quote_ident(env_col),
            )
        }
        _ => format!(
            "INSERT OR REPLACE INTO main.{name} ({target_cols}) \
             SELECT {target_cols} FROM {SOURCE_ALIAS}.{name}"
        ),
    }
}

/// What identifies a build independent of its id
#[derive(Debug, Clone, PartialEq, Eq)]
struct EnvFingerprint {
    version: Option<String>,
    date: Option<String>,
    values: BTreeMap<String, Option<String>>,
}

fn load_fingerprints(conn: &Connection, schema: &str) -> rusqlite::Result<BTreeMap<i64, EnvFingerprint>> {
    let mut envs = BTreeMap::new();
    let sql = format!("SELECT id, version, date FROM {}.environment", schema);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        envs.insert(
            id,
            EnvFingerprint {
                version: value_text(row.get_ref(1)?),
                date: value_text(row.get_ref(2)?),
                values: BTreeMap::new(),
            },
        );
    }

    let has_values: bool = conn.query_row(
        &format!(
            "SELECT EXISTS (SELECT 1 FROM {}.sqlite_master WHERE type = 'table' AND name = 'environment_values')",
            schema
        ),
        [],
        |row| row.get(0),
    )?;
    if has_values {
        let sql = format!("SELECT id, key, value FROM {}.environment_values", schema);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            if let Some(env) = envs.get_mut(&id) {
                let key = value_text(row.get_ref(1)?).unwrap_or_default();
                env.values.insert(key, value_text(row.get_ref(2)?));
            }
        }
    }
    Ok(envs)
}

fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

fn plan_env_mapping(conn: &Connection) -> rusqlite::Result<Vec<(i64, i64)>> {
    let existing = load_fingerprints(conn, "main")?;
    let incoming = load_fingerprints(conn, SOURCE_ALIAS)?;
    Ok(assign_env_ids(&existing, &incoming))
}

/// Map every incoming environment id to its id in the merged database.
///
/// Same fingerprint as an existing environment: reuse that id. Otherwise keep
/// the id when it is free, or allocate one above every id seen so far.
fn assign_env_ids(
    existing: &BTreeMap<i64, EnvFingerprint>,
    incoming: &BTreeMap<i64, EnvFingerprint>,
) -> Vec<(i64, i64)> {
    let mut next_id = existing
        .keys()
        .chain(incoming.keys())
        .copied()
        .max()
        .unwrap_or(0)
        + 1;
    let mut taken: BTreeSet<i64> = existing.keys().copied().collect();
    let mut mapping = Vec::with_capacity(incoming.len());

    for (&old_id, fingerprint) in incoming {
        let same_build = if existing.get(&old_id) == Some(fingerprint) {
            Some(old_id)
        } else {
            existing
                .iter()
                .find(|(_, fp)| *fp == fingerprint)
                .map(|(&id, _)| id)
        };

        let new_id = match same_build {
            Some(id) => id,
            None if !taken.contains(&old_id) => old_id,
            None => {
                let id = next_id;
                next_id += 1;
                id
            }
        };
        taken.insert(new_id);
        if new_id != old_id {
            debug!("Remapping environment {} -> {}", old_id, new_id);
        }
        mapping.push((old_id, new_id));
    }
    mapping
}

fn write_env_map(conn: &Connection, mapping: &[(i64, i64)]) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TEMP TABLE IF NOT EXISTS {ENV_MAP_TABLE} (old_id INTEGER PRIMARY KEY, new_id INTEGER NOT NULL);
         DELETE FROM temp.{ENV_MAP_TABLE};"
    ))?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO temp.{ENV_MAP_TABLE} (old_id, new_id) VALUES (?1, ?2)"
    ))?;
    for (old_id, new_id) in mapping {
        stmt.execute(params![old_id, new_id])?;
    }
    Ok(())
}

fn merge_err(path: &Path, context: &str, source: rusqlite::Error) -> Error {
    Error::Merge {
        path: path.to_path_buf(),
        context: context.to_string(),
        source,
    }
}
