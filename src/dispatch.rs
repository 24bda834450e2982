//! Report dispatch
//!
//! One run is: resolve input paths, merge when there is more than one, open
//! the result, run the selected report, close the database and hand back the
//! report's status.

use std::path::{Path, PathBuf};

use clap::ArgMatches;
use tracing::{debug, info, warn};

use crate::merge::{merge_databases, MergeStrategy};
use crate::report::ReportRegistry;
use crate::storage::ReportDb;
use crate::ui::Console;
use crate::{Error, Result};

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand a comma-separated list of database paths and glob patterns.
///
/// Order follows the list, then glob order within one pattern. Plain paths
/// are kept as given; every resulting path must be an existing file.
pub fn resolve_databases(spec: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !is_glob(pattern) {
            paths.push(PathBuf::from(pattern));
            continue;
        }

        let entries = glob::glob(pattern)
            .map_err(|e| Error::Config(format!("Invalid database pattern {}: {}", pattern, e)))?;
        let before = paths.len();
        for entry in entries {
            match entry {
                Ok(path) => paths.push(path),
                Err(e) => warn!("Skipping unreadable match for {}: {}", pattern, e),
            }
        }
        if paths.len() == before {
            warn!("No database at path: [{}]", pattern);
        }
    }

    if paths.is_empty() {
        return Err(Error::NoDatabaseFound { patterns: spec.to_string() });
    }
    for path in &paths {
        if !path.is_file() {
            return Err(Error::DatabaseNotFound(path.clone()));
        }
    }
    Ok(paths)
}

/// One report run
pub struct DispatchRequest<'a> {
    /// Comma-separated database paths or globs
    pub database: &'a str,
    pub report: &'a str,
    /// Matches of the report's own subcommand
    pub args: &'a ArgMatches,
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Status returned by the report
    pub status: i32,
    /// Database the report ran against
    pub database: PathBuf,
    /// True when `database` is a merged temporary file owned by the caller
    pub merged: bool,
}

pub struct Dispatcher<'a> {
    registry: &'a ReportRegistry,
    console: &'a Console,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a ReportRegistry, console: &'a Console) -> Self {
        Self { registry, console }
    }

    pub fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<DispatchOutcome> {
        let report = self
            .registry
            .find(request.report)
            .ok_or_else(|| Error::UnknownReport(request.report.to_string()))?;

        let paths = resolve_databases(request.database)?;
        let (database, merged) = match paths.as_slice() {
            [] => return Err(Error::NoInput),
            [single] => (single.clone(), false),
            many => {
                info!("Merging {} databases", many.len());
                (merge_databases(many, request.strategy)?, true)
            }
        };
        debug!("Running report {} against {}", report.name(), database.display());

        let db = match ReportDb::open(&database) {
            Ok(db) => db,
            Err(e) => {
                discard_merged(&database, merged);
                return Err(e);
            }
        };
        let result = report.run(&db, request.args, self.console);
        let closed = db.close();

        match result.and_then(|status| closed.map(|_| status)) {
            Ok(status) => Ok(DispatchOutcome { status, database, merged }),
            Err(e) => {
                discard_merged(&database, merged);
                Err(e)
            }
        }
    }
}

fn discard_merged(path: &Path, merged: bool) {
    if !merged {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Could not remove merged database {}: {}", path.display(), e);
    }
}
