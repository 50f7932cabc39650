//! Freshness oracles.
//!
//! The scheduler never looks at timestamps itself; it asks a [`FreshnessOracle`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

/// Decides whether a target can be skipped.
pub trait FreshnessOracle: Send + Sync {
    fn is_up_to_date(&self, target: &str, deps: &[String]) -> bool;
}

/// Treats every target as out of date (`--always-make`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysStale;

impl FreshnessOracle for AlwaysStale {
    fn is_up_to_date(&self, _target: &str, _deps: &[String]) -> bool {
        false
    }
}

/// Compares file modification times relative to a root directory.
///
/// A target is up to date when it exists and is not older than any of its
/// dependencies. A missing dependency makes the target stale.
#[derive(Debug, Clone, Default)]
pub struct FsOracle {
    root: PathBuf,
}

impl FsOracle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn modified(&self, name: &str) -> Option<SystemTime> {
        let path = Path::new(name);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

impl FreshnessOracle for FsOracle {
    fn is_up_to_date(&self, target: &str, deps: &[String]) -> bool {
        let Some(built) = self.modified(target) else {
            trace!(target_name = target, "target missing");
            return false;
        };
        deps.iter().all(|dep| match self.modified(dep) {
            Some(changed) => changed <= built,
            None => {
                trace!(target_name = target, dependency = %dep, "dependency missing");
                false
            }
        })
    }
}
