//! Storage Layer - SQLite build database
//!
//! The database is produced by an upstream collection pass and read here.
//! Tables:
//! - environment(id, date, version)
//! - environment_values(id, key, value)
//! - package(name, repository)
//! - inf(path, guid, library_class, package)
//! - source(path, license, total_lines, code_lines, comment_lines, blank_lines)
//! - instanced_inf(env, path, component, class, name, arch, dsc)
//! - instanced_fv(env, fv_name, fdf, path)
//! - junction(env, table1, key1, table2, key2)

pub mod schema;
pub mod sqlite;

pub use sqlite::{ReportDb, DbStats};
