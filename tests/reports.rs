mod common;

use buildlens::report::default_registry;
use buildlens::ui::Console;
use buildlens::{DispatchRequest, Dispatcher, Error, MergeStrategy};
use clap::ArgMatches;
use common::Build;

fn report_args(report: &str, argv: &[&str]) -> ArgMatches {
    let registry = default_registry();
    let command = registry
        .commands()
        .into_iter()
        .find(|c| c.get_name() == report)
        .unwrap();
    command
        .try_get_matches_from(std::iter::once(report).chain(argv.iter().copied()))
        .unwrap()
}

fn two_builds(dir: &std::path::Path) -> String {
    let a = Build { env: 1, date: "2024-01-01 08:00:00", platform: "QemuQ35", package: "APkg", repository: "repo-a" }
        .write(&dir.join("a.db"));
    let b = Build { env: 1, date: "2024-02-01 08:00:00", platform: "QemuSbsa", package: "BPkg", repository: "repo-b" }
        .write(&dir.join("b.db"));
    format!("{},{}", a.display(), b.display())
}

#[test]
fn usage_report_over_merged_databases_sees_one_build() {
    let dir = tempfile::tempdir().unwrap();
    let database = two_builds(dir.path());
    let out = dir.path().join("usage.json");

    let registry = default_registry();
    let console = Console::new(true);
    let args = report_args("usage", &["--env", "1", "--format", "json", "-o", out.to_str().unwrap()]);

    let outcome = Dispatcher::new(&registry, &console)
        .dispatch(&DispatchRequest {
            database: &database,
            report: "usage",
            args: &args,
            strategy: MergeStrategy::Rekey,
        })
        .unwrap();
    assert_eq!(outcome.status, 0);
    assert!(outcome.merged);
    std::fs::remove_file(&outcome.database).unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["version"], "1.0");
    assert_eq!(json["variables"]["PLATFORM_NAME"], "QemuQ35");

    let repositories = json["repositories"].as_object().unwrap();
    assert_eq!(repositories.keys().collect::<Vec<_>>(), vec!["repo-a"]);
    assert_eq!(repositories["repo-a"]["components"], 1);
    assert_eq!(repositories["repo-a"]["libraries"], 1);
    assert_eq!(repositories["repo-a"]["source_lines"], 150);
}

#[test]
fn usage_report_defaults_to_latest_environment() {
    let dir = tempfile::tempdir().unwrap();
    let database = two_builds(dir.path());
    let out = dir.path().join("latest.json");

    let registry = default_registry();
    let console = Console::new(true);
    let args = report_args("usage", &["--format", "json", "-o", out.to_str().unwrap()]);

    let outcome = Dispatcher::new(&registry, &console)
        .dispatch(&DispatchRequest {
            database: &database,
            report: "usage",
            args: &args,
            strategy: MergeStrategy::Rekey,
        })
        .unwrap();
    std::fs::remove_file(&outcome.database).unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["env"], 2);
    assert_eq!(json["variables"]["PLATFORM_NAME"], "QemuSbsa");
    assert!(json["repositories"].get("repo-b").is_some());
}

#[test]
fn component_libs_report_follows_links_in_one_build() {
    let dir = tempfile::tempdir().unwrap();
    let database = two_builds(dir.path());
    let out = dir.path().join("libs.txt");

    let registry = default_registry();
    let console = Console::new(true);
    let args = report_args(
        "component-libs",
        &["BPkg/App/App.inf", "--env", "2", "--out", out.to_str().unwrap()],
    );

    let outcome = Dispatcher::new(&registry, &console)
        .dispatch(&DispatchRequest {
            database: &database,
            report: "component-libs",
            args: &args,
            strategy: MergeStrategy::Rekey,
        })
        .unwrap();
    assert_eq!(outcome.status, 0);
    std::fs::remove_file(&outcome.database).unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec!["BPkg/App/App.inf", "  - BPkgLib| BPkg/Library/Lib.inf"]
    );
}

#[test]
fn unknown_report_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let database = two_builds(dir.path());

    let registry = default_registry();
    let console = Console::new(true);
    let args = report_args("environments", &[]);

    let err = Dispatcher::new(&registry, &console)
        .dispatch(&DispatchRequest {
            database: &database,
            report: "bogus",
            args: &args,
            strategy: MergeStrategy::Rekey,
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnknownReport(_)));
    assert_eq!(err.exit_code(), 4);
}
