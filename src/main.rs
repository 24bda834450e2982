//! Buildlens CLI - reports over build introspection databases

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgMatches, Args, Command, FromArgMatches};

use buildlens::config::{load_config, Settings};
use buildlens::logging::LogSession;
use buildlens::report::{default_registry, ReportRegistry};
use buildlens::ui::Console;
use buildlens::{DispatchRequest, Dispatcher, MergeStrategy};

const LONG_ABOUT: &str = r#"
Buildlens renders reports over the databases written by a build
introspection pass. When several databases are given they are merged
first, keeping each build's environment separate.

Example usage:
  buildlens usage --env 2
  buildlens --database "Build/*/DATABASE.db" environments
  buildlens --database a.db,b.db component-libs OemPkg/App/App.inf --flatten
"#;

/// Options shared by every report
#[derive(Args, Debug)]
struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors and warnings to the console
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Database path(s): a comma-separated list of paths or glob patterns
    #[arg(long, visible_alias = "db", global = true)]
    database: Option<String>,

    /// Config file (defaults to ./buildlens.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// How environment ids are reconciled when merging databases
    #[arg(long, value_enum, global = true)]
    merge_strategy: Option<MergeStrategy>,

    /// Keep the merged temporary database instead of deleting it
    #[arg(long, global = true)]
    keep_merged: bool,

    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

fn exit_status(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<buildlens::Error>()
        .map(buildlens::Error::exit_code)
        .unwrap_or(1)
}

fn to_exit_code(status: i32) -> ExitCode {
    ExitCode::from(u8::try_from(status).unwrap_or(1))
}

fn run_report(
    registry: &ReportRegistry,
    settings: &Settings,
    report: &str,
    args: &ArgMatches,
    console: &Console,
) -> anyhow::Result<i32> {
    let dispatcher = Dispatcher::new(registry, console);
    let outcome = dispatcher.dispatch(&DispatchRequest {
        database: &settings.database,
        report,
        args,
        strategy: settings.merge_strategy,
    })?;

    if outcome.merged {
        if settings.keep_merged {
            console.info("Merged database", &outcome.database.display().to_string());
        } else {
            std::fs::remove_file(&outcome.database).with_context(|| {
                format!("removing merged database {}", outcome.database.display())
            })?;
        }
    }
    Ok(outcome.status)
}

fn main() -> ExitCode {
    let registry = default_registry();
    let command = Command::new("buildlens")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reports over build introspection databases")
        .long_about(LONG_ABOUT)
        .subcommands(registry.commands())
        // unknown report names are rejected by the dispatcher
        .allow_external_subcommands(true)
        .subcommand_required(true)
        .arg_required_else_help(true);
    let matches = GlobalArgs::augment_args(command).get_matches();
    let cli = GlobalArgs::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    let console = Console::new(cli.quiet);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            console.error(&e.to_string());
            return to_exit_code(e.exit_code());
        }
    };
    let settings = Settings::resolve(
        config,
        cli.database,
        cli.merge_strategy,
        cli.keep_merged,
        cli.log_file,
    );

    let session = match LogSession::init(cli.verbose, settings.log_file.as_deref()) {
        Ok(session) => session,
        Err(e) => {
            console.error(&format!("Could not start logging: {}", e));
            return to_exit_code(e.exit_code());
        }
    };

    let status = match matches.subcommand() {
        Some((report, args)) => match run_report(&registry, &settings, report, args, &console) {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("{:#}", e);
                if let Some(buildlens::Error::UnknownReport(_)) = e.downcast_ref() {
                    tracing::info!("Available reports: {}", registry.names().join(", "));
                }
                exit_status(&e)
            }
        },
        None => {
            tracing::error!("No report requested");
            2
        }
    };

    if let Err(e) = session.finish(status) {
        console.error(&format!("Could not flush log: {}", e));
    }
    to_exit_code(status)
}
