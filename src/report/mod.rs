//! Report plugin framework
//!
//! A report is identified by a short name (its CLI subcommand), declares the
//! options it accepts on top of the global ones, and runs against one open
//! database. Reports are registered explicitly in `default_registry`.

pub mod component;
pub mod environments;
pub mod usage;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use clap::{Arg, ArgMatches, Command};

use crate::entity::EnvId;
use crate::storage::ReportDb;
use crate::ui::Console;
use crate::{Error, Result};

pub use component::ComponentLibsReport;
pub use environments::EnvironmentsReport;
pub use usage::UsageReport;

/// Trait implemented by every report type
pub trait Report {
    /// Subcommand name used to select the report
    fn name(&self) -> &'static str;

    /// One-line description shown in help output
    fn description(&self) -> &'static str;

    /// Add report-specific options to the report's subcommand
    fn add_cli_options(&self, command: Command) -> Command {
        command
    }

    /// Run the report and return a process-style status (0 = success)
    fn run(&self, db: &ReportDb, args: &ArgMatches, console: &Console) -> Result<i32>;
}

/// Registry of report plugins
#[derive(Default)]
pub struct ReportRegistry {
    reports: Vec<Box<dyn Report>>,
}

impl ReportRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a report
    pub fn register(&mut self, report: impl Report + 'static) {
        self.reports.push(Box::new(report));
    }

    /// Find the report registered under `name`
    pub fn find(&self, name: &str) -> Option<&dyn Report> {
        self.reports
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.as_ref())
    }

    /// Get all registered reports
    pub fn reports(&self) -> &[Box<dyn Report>] {
        &self.reports
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.reports.iter().map(|r| r.name()).collect()
    }

    /// One subcommand per report, carrying the report's own options
    pub fn commands(&self) -> Vec<Command> {
        self.reports
            .iter()
            .map(|r| r.add_cli_options(Command::new(r.name()).about(r.description())))
            .collect()
    }
}

/// Create a registry with all built-in reports
pub fn default_registry() -> ReportRegistry {
    let mut registry = ReportRegistry::new();
    registry.register(UsageReport);
    registry.register(ComponentLibsReport);
    registry.register(EnvironmentsReport);
    registry
}

// ========== Shared option helpers ==========

/// `-e/--env <ID>`: environment to report on (defaults to the latest)
pub fn env_arg() -> Arg {
    Arg::new("env")
        .short('e')
        .long("env")
        .value_name("ID")
        .help("The environment id to generate the report for. Defaults to the latest environment.")
        .value_parser(|s: &str| s.parse::<EnvId>().map_err(|e| e.to_string()))
}

pub fn requested_env(args: &ArgMatches) -> Option<EnvId> {
    args.try_get_one::<EnvId>("env").ok().flatten().copied()
}

/// Resolve the environment for a report, failing when the database has none
pub fn report_env(db: &ReportDb, args: &ArgMatches) -> Result<EnvId> {
    db.resolve_environment(requested_env(args))?
        .ok_or_else(|| Error::Report("Database contains no environments".into()))
}

/// Writer for report output: the named file (replaced if present) or stdout
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Ok(Box::new(BufWriter::new(File::create(path)?)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestReport;

    impl Report for TestReport {
        fn name(&self) -> &'static str {
            "test"
        }

        fn description(&self) -> &'static str {
            "A test report."
        }

        fn add_cli_options(&self, command: Command) -> Command {
            command.arg(env_arg())
        }

        fn run(&self, _db: &ReportDb, _args: &ArgMatches, _console: &Console) -> Result<i32> {
            Ok(0)
        }
    }

    #[test]
    fn test_registry() {
        let mut registry = ReportRegistry::new();
        registry.register(TestReport);

        assert!(registry.find("test").is_some());
        assert!(registry.find("other").is_none());
        assert_eq!(registry.names(), vec!["test"]);
    }

    #[test]
    fn test_commands_carry_report_options() {
        let mut registry = ReportRegistry::new();
        registry.register(TestReport);
        let command = registry.commands().remove(0);

        let matches = command.try_get_matches_from(["test", "-e", "4"]).unwrap();
        assert_eq!(requested_env(&matches), Some(EnvId(4)));
    }

    #[test]
    fn test_env_arg_rejects_garbage() {
        let command = Command::new("test").arg(env_arg());
        assert!(command.try_get_matches_from(["test", "--env", "latest"]).is_err());
    }

    #[test]
    fn test_default_registry_names_are_unique() {
        let registry = default_registry();
        let mut names = registry.names();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), registry.reports().len());
        assert!(registry.find("usage").is_some());
        assert!(registry.find("component-libs").is_some());
    }
}
