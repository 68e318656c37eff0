//! Wiring of the item store, the configuration and the controllers

use anyhow::{Context, Result};
use autostate_config::{load_yaml, ConfigTree};
use autostate_engine::{seed_items, Clock, ControllerManager, Services, SystemClock, TokioScheduler};
use autostate_items::ItemStore;
use autostate_template::ExpressionEngine;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A loaded autostate instance
pub struct AutoState {
    /// Host items, seeded from the configuration
    pub items: Arc<ItemStore>,
    pub tree: Arc<ConfigTree>,
    /// Controllers of all object items
    pub manager: ControllerManager,
}

impl AutoState {
    /// Load the configuration file at `path` and build every controller
    pub fn load(path: &Path) -> Result<Self> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let file = path
            .file_name()
            .with_context(|| format!("{} is not a file", path.display()))?;
        let document = load_yaml(dir, file)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let tree = Arc::new(ConfigTree::from_document(&document).context("Invalid item tree")?);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let items = Arc::new(ItemStore::with_clock(clock.clone()));
        let seeded = seed_items(&tree, &items).context("Failed to seed items")?;
        info!(items = seeded, "Item tree loaded");

        let services = Services {
            items: items.clone(),
            evaluator: Arc::new(ExpressionEngine::new(items.clone())),
            scheduler: Arc::new(TokioScheduler::new()),
            clock,
        };
        let manager = ControllerManager::new(tree.clone(), services);
        manager.load();

        Ok(Self {
            items,
            tree,
            manager,
        })
    }

    /// Detailed description of every controller
    pub fn describe(&self) -> String {
        self.manager
            .ids()
            .iter()
            .filter_map(|id| self.manager.cli_detail(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
location:
  latitude: 52.52
  longitude: 13.40
items:
  hall:
    light:
      type: bool
      value: false
    automatic:
      as_plugin: active
      as_startup_delay: 0
      as_item_light: ..light
      lit:
        name: Lit
        as_set_light: true
"#;

    fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("autostate.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_builds_controllers() {
        let dir = TempDir::new().unwrap();
        let app = AutoState::load(&write_config(&dir, CONFIG)).unwrap();

        assert_eq!(app.manager.ids(), vec!["hall.automatic"]);
        assert!(app.items.contains("hall.light"));
        assert!(app.tree.location().is_some());
        assert!(app.describe().starts_with("AutoState Item hall.automatic:\n"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = AutoState::load(&dir.path().join("missing.yaml"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_enters_states() {
        let dir = TempDir::new().unwrap();
        let app = AutoState::load(&write_config(&dir, CONFIG)).unwrap();

        app.manager.start().await;

        assert_eq!(app.manager.cli_list(), "hall.automatic: Lit\n");
        assert_eq!(
            app.items.value("hall.light"),
            Some(autostate_core::Value::Bool(true))
        );
        app.manager.stop();
    }
}
