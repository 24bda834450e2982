//! Component library report
//!
//! Prints the libraries a component links against, either as a tree that
//! follows library-to-library links or as a flat list of every library
//! instanced into the component. Links are only followed between libraries
//! of the requested component, since a shared library may link different
//! instances in each component that uses it.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::edge::{EntityKey, TableTag};
use crate::entity::EnvId;
use crate::query::QueryEngine;
use crate::storage::ReportDb;
use crate::ui::Console;
use crate::{Error, Result};
use super::{env_arg, open_output, report_env, Report};

const DEFAULT_DEPTH: usize = 999;
const NO_CLASS: &str = "NULL";

pub struct ComponentLibsReport;

impl Report for ComponentLibsReport {
    fn name(&self) -> &'static str {
        "component-libs"
    }

    fn description(&self) -> &'static str {
        "Dumps the library instances used by a component."
    }

    fn add_cli_options(&self, command: Command) -> Command {
        command
            .arg(
                Arg::new("component")
                    .required(true)
                    .help("The component to query."),
            )
            .arg(env_arg())
            .arg(
                Arg::new("out")
                    .short('o')
                    .long("out")
                    .value_name("FILE")
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("The file to write the report to. Defaults to stdout."),
            )
            .arg(
                Arg::new("depth")
                    .short('d')
                    .long("depth")
                    .value_parser(clap::value_parser!(usize))
                    .default_value("999")
                    .help("The depth to recurse when printing libraries."),
            )
            .arg(
                Arg::new("flatten")
                    .short('f')
                    .long("flatten")
                    .action(ArgAction::SetTrue)
                    .help("Flatten the list of libraries used in the component."),
            )
            .arg(
                Arg::new("sort")
                    .short('s')
                    .long("sort")
                    .action(ArgAction::SetTrue)
                    .help("Sort the libraries by library class."),
            )
    }

    fn run(&self, db: &ReportDb, args: &ArgMatches, console: &Console) -> Result<i32> {
        let env = report_env(db, args)?;
        let requested = args
            .get_one::<String>("component")
            .ok_or_else(|| Error::Report("No component given".into()))?;
        let options = TreeOptions {
            depth: args.get_one::<usize>("depth").copied().unwrap_or(DEFAULT_DEPTH),
            sort: args.get_flag("sort"),
        };

        let Some(component) = find_component(db, env, requested)? else {
            console.warn(&format!("Component {} not found in environment {}", requested, env));
            return Ok(1);
        };
        tracing::debug!("Matched component {} for {}", component, requested);

        let out_path = args.get_one::<PathBuf>("out");
        let mut out = open_output(out_path.map(PathBuf::as_path))?;
        let listing = LibraryListing::load(db, env, &component)?;
        if args.get_flag("flatten") {
            listing.write_flat(&mut out, options)?;
        } else {
            listing.write_tree(&mut out, options)?;
        }
        out.flush()?;

        if let Some(path) = out_path {
            console.success(&format!("Component libraries written to {}", path.display()));
        }
        Ok(0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TreeOptions {
    pub depth: usize,
    pub sort: bool,
}

/// Match a user-supplied component path against the components of `env`.
///
/// Backslashes are normalised and the longest stored path contained in the
/// request wins, so absolute and workspace-relative paths both resolve.
pub fn find_component(db: &ReportDb, env: EnvId, requested: &str) -> Result<Option<String>> {
    let requested = requested.replace('\\', "/");
    let found = db
        .components(env)?
        .into_iter()
        .filter(|c| requested == *c || requested.ends_with(&format!("/{}", c)))
        .max_by_key(|c| c.len());
    Ok(found)
}

/// Libraries instanced into one component, with their library classes
pub struct LibraryListing<'a> {
    db: &'a ReportDb,
    env: EnvId,
    component: String,
    classes: BTreeMap<String, String>,
}

impl<'a> LibraryListing<'a> {
    pub fn load(db: &'a ReportDb, env: EnvId, component: &str) -> Result<Self> {
        let classes = db
            .component_modules(env, component)?
            .into_iter()
            .filter(|m| !m.is_component())
            .map(|m| {
                let class = m.class.unwrap_or_else(|| NO_CLASS.to_string());
                (m.path, class)
            })
            .collect();
        Ok(Self { db, env, component: component.to_string(), classes })
    }

    fn class_of(&self, path: &str) -> &str {
        self.classes.get(path).map(String::as_str).unwrap_or(NO_CLASS)
    }

    fn order(&self, paths: &mut [String], sort: bool) {
        if sort {
            paths.sort_by(|a, b| self.class_of(a).cmp(self.class_of(b)).then_with(|| a.cmp(b)));
        }
    }

    fn line(&self, path: &str) -> String {
        format!("- {}| {}", self.class_of(path), path)
    }

    /// Libraries as a tree. A library is not expanded again below itself.
    pub fn write_tree(&self, out: &mut dyn Write, options: TreeOptions) -> Result<()> {
        writeln!(out, "{}", self.component)?;
        let mut path = vec![self.component.clone()];
        self.write_children(out, &self.component, 1, options, &mut path)
    }

    fn write_children(
        &self,
        out: &mut dyn Write,
        node: &str,
        level: usize,
        options: TreeOptions,
        path: &mut Vec<String>,
    ) -> Result<()> {
        if level > options.depth {
            return Ok(());
        }
        let engine = QueryEngine::new(self.db);
        let mut children = engine.neighbours(
            self.env,
            &EntityKey::new(TableTag::InstancedInf, node),
            TableTag::InstancedInf,
        )?;
        children.retain(|child| self.classes.contains_key(child));
        self.order(&mut children, options.sort);

        for child in children {
            writeln!(out, "{}{}", "  ".repeat(level), self.line(&child))?;
            if path.contains(&child) {
                continue;
            }
            path.push(child.clone());
            self.write_children(out, &child, level + 1, options, path)?;
            path.pop();
        }
        Ok(())
    }

    /// Every library instanced into the component, once each, by path
    /// unless sorted by class. Depth does not apply.
    pub fn write_flat(&self, out: &mut dyn Write, options: TreeOptions) -> Result<()> {
        let mut paths: Vec<String> = self.classes.keys().cloned().collect();
        self.order(&mut paths, options.sort);

        writeln!(out, "{}", self.component)?;
        for path in paths {
            writeln!(out, "{}", self.line(&path))?;
        }
        Ok(())
    }
}
