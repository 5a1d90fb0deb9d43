use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A named click position in UV space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickTarget {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "U")]
    pub u: f64,
    #[serde(alias = "V")]
    pub v: f64,
}

/// Named click targets loaded from a JSON file, shared and hot-reloadable
#[derive(Clone)]
pub struct ClickTargets {
    path: PathBuf,
    targets: Arc<RwLock<HashMap<String, ClickTarget>>>,
}

impl ClickTargets {
    /// Load targets from `path`. A missing file yields an empty table.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let targets = Self {
            path: path.into(),
            targets: Arc::new(RwLock::new(HashMap::new())),
        };
        targets.reload()?;
        Ok(targets)
    }

    pub fn from_targets(targets: Vec<ClickTarget>) -> Self {
        let table = targets.into_iter().map(|t| (t.name.clone(), t)).collect();
        Self {
            path: PathBuf::new(),
            targets: Arc::new(RwLock::new(table)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file. On error the previous table is kept.
    pub fn reload(&self) -> Result<usize> {
        if !self.path.exists() {
            info!("No click target file at {}", self.path.display());
            return Ok(self.len());
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let parsed: Vec<ClickTarget> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        let table: HashMap<_, _> = parsed.into_iter().map(|t| (t.name.clone(), t)).collect();
        let count = table.len();
        *self.targets.write().unwrap_or_else(PoisonError::into_inner) = table;

        info!("Click targets reloaded: {} entries", count);
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<ClickTarget> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All targets, sorted by name
    pub fn list(&self) -> Vec<ClickTarget> {
        let mut targets: Vec<_> = self
            .targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        targets
    }

    pub fn len(&self) -> usize {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll the file's modification time and reload on change
    pub fn spawn_watcher(&self, interval: Duration) -> JoinHandle<()> {
        let targets = self.clone();

        tokio::spawn(async move {
            let mut last_modified = modified_time(&targets.path);
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));

            loop {
                ticker.tick().await;

                let modified = modified_time(&targets.path);
                if modified == last_modified {
                    continue;
                }
                last_modified = modified;

                if let Err(e) = targets.reload() {
                    warn!("Failed to reload click targets: {:#}", e);
                }
            }
        })
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
