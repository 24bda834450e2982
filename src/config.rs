use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::merge::MergeStrategy;
use crate::{Error, Result};

/// Database pattern used when neither the CLI nor the config names one
pub const DEFAULT_DATABASE: &str = "Report/DATABASE.db";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildlensConfig {
    /// Comma-separated list of database paths or glob patterns
    pub database: Option<String>,
    pub merge_strategy: Option<MergeStrategy>,
    /// Keep the merged temporary database after the run
    pub keep_merged: Option<bool>,
    pub log_file: Option<PathBuf>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("buildlens.toml")
}

/// Load the config file; a missing file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<Option<BuildlensConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: BuildlensConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(Some(config))
}

/// Settings after layering CLI flags over the config file over defaults
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database: String,
    pub merge_strategy: MergeStrategy,
    pub keep_merged: bool,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(
        config: Option<BuildlensConfig>,
        database: Option<String>,
        merge_strategy: Option<MergeStrategy>,
        keep_merged: bool,
        log_file: Option<PathBuf>,
    ) -> Self {
        let config = config.unwrap_or_default();
        Self {
            database: database
                .or(config.database)
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            merge_strategy: merge_strategy.or(config.merge_strategy).unwrap_or_default(),
            keep_merged: keep_merged || config.keep_merged.unwrap_or(false),
            log_file: log_file.or(config.log_file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buildlens.toml");
        std::fs::write(
            &path,
            "database = \"Build/*.db\"\nmerge_strategy = \"overwrite\"\nkeep_merged = true\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.database.as_deref(), Some("Build/*.db"));
        assert_eq!(config.merge_strategy, Some(MergeStrategy::Overwrite));
        assert_eq!(config.keep_merged, Some(true));
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buildlens.toml");
        std::fs::write(&path, "databse = \"x.db\"\n").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = BuildlensConfig {
            database: Some("from-config.db".into()),
            merge_strategy: Some(MergeStrategy::Overwrite),
            keep_merged: None,
            log_file: Some(PathBuf::from("config.log")),
        };
        let settings = Settings::resolve(Some(config), Some("cli.db".into()), None, false, None);
        assert_eq!(settings.database, "cli.db");
        assert_eq!(settings.merge_strategy, MergeStrategy::Overwrite);
        assert_eq!(settings.log_file, Some(PathBuf::from("config.log")));

        let defaults = Settings::resolve(None, None, None, false, None);
        assert_eq!(defaults.database, DEFAULT_DATABASE);
        assert_eq!(defaults.merge_strategy, MergeStrategy::Rekey);
    }
}
