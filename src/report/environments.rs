//! Environment listing
//!
//! Lists the builds recorded in a (possibly merged) database, newest first,
//! so an id can be picked for the other reports' `--env` option.

use clap::{Arg, ArgAction, ArgMatches, Command};
use tabled::Tabled;

use crate::entity::Environment;
use crate::storage::ReportDb;
use crate::ui::console::ICON_DATABASE;
use crate::ui::{table, Console};
use crate::Result;
use super::Report;

/// Variables shown inline before the list is elided
const SHOWN_VARIABLES: usize = 3;

pub struct EnvironmentsReport;

#[derive(Tabled)]
struct EnvironmentRow {
    #[tabled(rename = "Id")]
    id: i64,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Variables")]
    variables: String,
}

impl From<&Environment> for EnvironmentRow {
    fn from(env: &Environment) -> Self {
        let mut variables: Vec<String> = env
            .values
            .iter()
            .take(SHOWN_VARIABLES)
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if env.values.len() > SHOWN_VARIABLES {
            variables.push(format!("(+{} more)", env.values.len() - SHOWN_VARIABLES));
        }
        Self {
            id: env.id.0,
            version: env.version.clone(),
            date: env.date.clone(),
            variables: variables.join(", "),
        }
    }
}

/// Render the environment table, or `None` when there are no environments
pub fn render_environments(envs: &[Environment]) -> Option<String> {
    if envs.is_empty() {
        return None;
    }
    let rows: Vec<EnvironmentRow> = envs.iter().map(EnvironmentRow::from).collect();
    Some(table::render(&rows))
}

impl Report for EnvironmentsReport {
    fn name(&self) -> &'static str {
        "environments"
    }

    fn description(&self) -> &'static str {
        "Lists the build environments recorded in the database."
    }

    fn add_cli_options(&self, command: Command) -> Command {
        command.arg(
            Arg::new("stats")
                .long("stats")
                .action(ArgAction::SetTrue)
                .help("Also print row counts for every table."),
        )
    }

    fn run(&self, db: &ReportDb, args: &ArgMatches, console: &Console) -> Result<i32> {
        let envs = db.environments()?;
        console.header(ICON_DATABASE, &db.path().display().to_string());

        match render_environments(&envs) {
            Some(table) => console.block(&table),
            None => console.warn("Database contains no environments"),
        }

        if args.get_flag("stats") {
            let stats = db.stats()?;
            console.section("Tables");
            console.block(&table::counts(&stats.tables));
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_environments() {
        let envs = vec![
            Environment::new(2, "1.1", "2024-03-01 10:00:00")
                .with_value("ARCH", "X64")
                .with_value("BUILD_TARGET", "DEBUG")
                .with_value("PLATFORM_NAME", "QemuQ35")
                .with_value("TOOL_CHAIN_TAG", "GCC5"),
            Environment::new(1, "1.0", "2024-01-01 10:00:00"),
        ];
        let table = render_environments(&envs).unwrap();
        assert!(table.contains("Version"));
        assert!(table.contains("2024-03-01 10:00:00"));
        assert!(table.contains("ARCH=X64"));
        assert!(table.contains("(+1 more)"));
        assert!(!table.contains("TOOL_CHAIN_TAG"));
    }

    #[test]
    fn test_empty_database_has_no_table() {
        assert!(render_environments(&[]).is_none());
    }

    #[test]
    fn test_run_with_stats() {
        let db = ReportDb::open_in_memory().unwrap();
        db.insert_environment(&Environment::new(1, "1.0", "2024-01-01 00:00:00")).unwrap();
        let args = EnvironmentsReport
            .add_cli_options(Command::new("environments"))
            .try_get_matches_from(["environments", "--stats"])
            .unwrap();
        assert_eq!(EnvironmentsReport.run(&db, &args, &Console::new(true)).unwrap(), 0);
    }
}
