//! Build configuration.
//!
//! Read from an optional JSON file; every field has a default so partial files work.
//! Command-line flags override whatever the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::build::BuildOptions;
use crate::errors::{NgmakeError, NgmakeResult};
use crate::runtime::DEFAULT_MAX_DEPTH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Parallel jobs.
    pub jobs: usize,
    /// Bound on nested macro invocations.
    pub max_depth: usize,
    /// Per-command timeout in seconds; absent means no limit.
    pub command_timeout_secs: Option<u64>,
    /// Target built when none is named.
    pub default_target: String,
    /// Shell used to run commands; `null` executes tokens directly.
    pub shell: Option<String>,
    /// Extra directories searched for imported modules.
    pub search_paths: Vec<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            max_depth: DEFAULT_MAX_DEPTH,
            command_timeout_secs: None,
            default_target: "default".to_string(),
            shell: Some("sh".to_string()),
            search_paths: Vec::new(),
        }
    }
}

impl BuildConfig {
    pub fn load(path: impl AsRef<Path>) -> NgmakeResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| NgmakeError::io(path.display(), e))?;
        Self::from_json(&content).map_err(|e| NgmakeError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            jobs: self.jobs.max(1),
            max_depth: self.max_depth,
            timeout: self.timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config =
            BuildConfig::from_json(r#"{ "jobs": 4, "command_timeout_secs": 30 }"#).unwrap();
        assert_eq!(config.jobs, 4);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.default_target, "default");
        assert_eq!(config.shell.as_deref(), Some("sh"));
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn null_shell_means_direct_execution() {
        let config = BuildConfig::from_json(r#"{ "shell": null }"#).unwrap();
        assert_eq!(config.shell, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(BuildConfig::from_json(r#"{ "job": 2 }"#).is_err());
    }

    #[test]
    fn zero_jobs_still_runs_one() {
        let config = BuildConfig {
            jobs: 0,
            ..BuildConfig::default()
        };
        assert_eq!(config.build_options().jobs, 1);
    }
}
