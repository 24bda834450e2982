//! Module usage report
//!
//! For one environment: which modules end up in firmware volumes, grouped by
//! repository and split into components and libraries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command, ValueEnum};
use serde::Serialize;

use crate::edge::TableTag;
use crate::entity::EnvId;
use crate::query::{ColumnRef, QueryEngine, Traversal};
use crate::storage::ReportDb;
use crate::ui::Console;
use crate::Result;
use super::{env_arg, open_output, report_env, Report};

const UNKNOWN_REPOSITORY: &str = "unknown";
const DEFAULT_OUTPUT: &str = "usage_report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Html,
    Json,
}

impl OutputFormat {
    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Html => ".html",
            OutputFormat::Json => ".json",
        }
    }
}

pub struct UsageReport;

impl Report for UsageReport {
    fn name(&self) -> &'static str {
        "usage"
    }

    fn description(&self) -> &'static str {
        "Generates a report of module usage for a specific build."
    }

    fn add_cli_options(&self, command: Command) -> Command {
        command
            .arg(env_arg())
            .arg(
                Arg::new("output")
                    .short('o')
                    .long("output")
                    .value_name("FILE")
                    .help("The output file to write the report to. Defaults to the PLATFORM_NAME variable, else 'usage_report.html'."),
            )
            .arg(
                Arg::new("format")
                    .long("format")
                    .value_parser(clap::value_parser!(OutputFormat))
                    .default_value("html")
                    .help("Output format"),
            )
    }

    fn run(&self, db: &ReportDb, args: &ArgMatches, console: &Console) -> Result<i32> {
        let env = report_env(db, args)?;
        let format = args
            .get_one::<OutputFormat>("format")
            .copied()
            .unwrap_or(OutputFormat::Html);

        let summary = UsageSummary::collect(db, env)?;
        let path = output_path(
            args.get_one::<String>("output").map(String::as_str),
            &summary.variables,
            format,
        );

        let body = match format {
            OutputFormat::Html => render_html(&summary),
            OutputFormat::Json => serde_json::to_string_pretty(&summary)
                .map_err(|e| crate::Error::Report(e.to_string()))?,
        };
        let mut out = open_output(Some(&path))?;
        out.write_all(body.as_bytes())?;
        out.flush()?;

        console.summary_row("Modules:", &summary.modules.len().to_string());
        console.success(&format!("Usage report written to {}", path.display()));
        Ok(0)
    }
}

/// One module reachable from a firmware volume
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ModuleUsage {
    pub repository: String,
    pub package: Option<String>,
    pub path: String,
    pub component: bool,
}

/// Per-repository counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryUsage {
    pub components: usize,
    pub libraries: usize,
    pub source_lines: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub env: EnvId,
    pub version: String,
    pub variables: BTreeMap<String, String>,
    pub modules: Vec<ModuleUsage>,
    pub repositories: BTreeMap<String, RepositoryUsage>,
}

/// Row of the usage traversal
#[derive(Debug, Clone)]
struct UsageRow {
    repository: Option<String>,
    package: Option<String>,
    module: String,
    source: Option<String>,
    lines: Option<i64>,
    component: bool,
}

/// Firmware volume -> instanced module (every module of each component placed
/// in the volume) -> source file, with descriptor and package attributes.
/// Modules without a recorded source file are kept.
pub fn usage_traversal(env: EnvId) -> Traversal {
    Traversal::from(env, TableTag::InstancedFv)
        .to_via(TableTag::InstancedInf, "component")
        .to_optional(TableTag::Source)
        .lookup(TableTag::Inf, ColumnRef::step(1, "path"))
        .lookup(TableTag::Package, ColumnRef::lookup(0, "package"))
        .column(ColumnRef::lookup(1, "repository"))
        .column(ColumnRef::lookup(0, "package"))
        .column(ColumnRef::step(1, "path"))
        .column(ColumnRef::step(2, "path"))
        .column(ColumnRef::step(2, "total_lines"))
        .is_null(ColumnRef::lookup(0, "library_class"))
        .distinct()
        .order_by(ColumnRef::lookup(1, "repository"))
        .order_by(ColumnRef::lookup(0, "package"))
        .order_by(ColumnRef::step(1, "path"))
        .order_by(ColumnRef::step(2, "path"))
}

impl UsageSummary {
    /// Gather usage for `env`. An unknown environment yields an empty summary.
    pub fn collect(db: &ReportDb, env: EnvId) -> Result<Self> {
        let (version, variables) = match db.environment(env)? {
            Some(environment) => (environment.version, environment.values),
            None => {
                tracing::warn!("No environment with id {}", env);
                ("unknown".to_string(), BTreeMap::new())
            }
        };

        let rows = QueryEngine::new(db).rows(&usage_traversal(env), |row| {
            Ok(UsageRow {
                repository: row.get(0)?,
                package: row.get(1)?,
                module: row.get(2)?,
                source: row.get(3)?,
                lines: row.get(4)?,
                component: row.get(5)?,
            })
        })?;
        tracing::debug!("usage traversal returned {} rows", rows.len());

        let mut modules = BTreeSet::new();
        let mut sources: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        for row in rows {
            let repository = row
                .repository
                .unwrap_or_else(|| UNKNOWN_REPOSITORY.to_string());
            let files = sources.entry(repository.clone()).or_default();
            if let Some(source) = row.source {
                files.insert(source, row.lines.unwrap_or(0));
            }
            modules.insert(ModuleUsage {
                repository,
                package: row.package,
                path: row.module,
                component: row.component,
            });
        }

        let mut repositories: BTreeMap<String, RepositoryUsage> = BTreeMap::new();
        for module in &modules {
            let usage = repositories.entry(module.repository.clone()).or_default();
            if module.component {
                usage.components += 1;
            } else {
                usage.libraries += 1;
            }
        }
        for (repository, files) in sources {
            repositories.entry(repository).or_default().source_lines = files.values().sum();
        }

        Ok(Self {
            env,
            version,
            variables,
            modules: modules.into_iter().collect(),
            repositories,
        })
    }
}

/// Output file: explicit path, else `PLATFORM_NAME`, else the default name.
/// The format's extension is appended when missing.
pub fn output_path(
    requested: Option<&str>,
    variables: &BTreeMap<String, String>,
    format: OutputFormat,
) -> PathBuf {
    let base = requested
        .map(str::to_string)
        .or_else(|| variables.get("PLATFORM_NAME").cloned())
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let extension = format.extension();
    if base.ends_with(extension) {
        PathBuf::from(base)
    } else {
        PathBuf::from(format!("{}{}", base, extension))
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the summary as a standalone HTML document
pub fn render_html(summary: &UsageSummary) -> String {
    let mut html = String::new();
    let _ = writeln!(html, "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">");
    let _ = writeln!(html, "<title>Module Usage Report</title>\n</head>\n<body>");
    let _ = writeln!(
        html,
        "<h1>Module Usage Report</h1>\n<p>Environment {} &middot; version {}</p>",
        summary.env,
        escape(&summary.version)
    );

    let _ = writeln!(html, "<h2>Environment</h2>\n<table>\n<tr><th>Variable</th><th>Value</th></tr>");
    for (key, value) in &summary.variables {
        let _ = writeln!(html, "<tr><td>{}</td><td>{}</td></tr>", escape(key), escape(value));
    }
    let _ = writeln!(html, "</table>");

    let _ = writeln!(
        html,
        "<h2>Usage Per Repository</h2>\n<table>\n<tr><th>Repository</th><th>Components</th><th>Libraries</th><th>Source Lines</th></tr>"
    );
    for (repository, usage) in &summary.repositories {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(repository),
            usage.components,
            usage.libraries,
            usage.source_lines
        );
    }
    let _ = writeln!(html, "</table>");

    let _ = writeln!(
        html,
        "<h2>Modules</h2>\n<table>\n<tr><th>Repository</th><th>Package</th><th>Module</th><th>Kind</th></tr>"
    );
    for module in &summary.modules {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&module.repository),
            escape(module.package.as_deref().unwrap_or("")),
            escape(&module.path),
            if module.component { "component" } else { "library" }
        );
    }
    let _ = writeln!(html, "</table>\n</body>\n</html>");
    html
}
