//! Controller manager
//!
//! This module provides the `ControllerManager` which builds one
//! [`Controller`] per object item of the configuration tree, listens for
//! item changes and routes them to the controllers.

use crate::controller::{Controller, Services};
use crate::error::{EngineError, EngineResult};
use crate::manual;
use autostate_config::ConfigTree;
use autostate_core::{TriggerInfo, Value};
use autostate_items::{ItemChanged, ItemStore};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Attribute marking an object item
pub const PLUGIN_ATTRIBUTE: &str = "as_plugin";

/// Create every configured item in `items`
///
/// Returns the number of items created.
pub fn seed_items(tree: &ConfigTree, items: &ItemStore) -> EngineResult<usize> {
    for node in tree.nodes() {
        let cast = node.item_type()?;
        let value = node.initial_value()?;
        items.insert(node.id().clone(), value, cast)?;
    }
    debug!(count = tree.len(), "Seeded items");
    Ok(tree.len())
}

/// Owner of all controllers
pub struct ControllerManager {
    tree: Arc<ConfigTree>,
    services: Services,
    controllers: Arc<DashMap<String, Arc<Controller>>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ControllerManager {
    pub fn new(tree: Arc<ConfigTree>, services: Services) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tree,
            services,
            controllers: Arc::new(DashMap::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Build the controllers of all items with `as_plugin: active`
    ///
    /// Object items that fail to build are logged and skipped. Returns the
    /// number of controllers built.
    pub fn load(&self) -> usize {
        for node in self.tree.nodes_with_attr(PLUGIN_ATTRIBUTE, "active") {
            match Controller::new(&self.tree, node, self.services.clone()) {
                Ok(controller) => {
                    self.controllers.insert(node.id().to_string(), controller);
                }
                Err(e) => error!(item = %node.id(), error = %e, "Ignoring object item"),
            }
        }
        info!(count = self.controllers.len(), "Controllers loaded");
        self.controllers.len()
    }

    /// Start listening for item changes, then start every controller
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Controller manager already running");
            return;
        }

        info!("Starting controller manager");

        let mut change_rx = self.services.items.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let controllers = self.controllers.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = change_rx.recv() => {
                        match change {
                            Ok(change) => Self::dispatch_to(&controllers, &change),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Controller manager lagged by {} item changes", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Item store closed, stopping controller manager");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("Controller manager stopped");
        });

        for controller in self.snapshot() {
            if let Err(e) = controller.start() {
                error!(item = %controller.id(), error = %e, "Can not start controller");
            }
        }
    }

    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        info!("Stopping controller manager");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Route one item change to every controller
    pub fn dispatch(&self, change: &ItemChanged) {
        Self::dispatch_to(&self.controllers, change);
    }

    fn dispatch_to(controllers: &DashMap<String, Arc<Controller>>, change: &ItemChanged) {
        let targets: Vec<Arc<Controller>> = controllers.iter().map(|c| c.value().clone()).collect();
        for controller in targets {
            controller.handle_item_change(change);
        }
    }

    fn snapshot(&self) -> Vec<Arc<Controller>> {
        let mut controllers: Vec<Arc<Controller>> =
            self.controllers.iter().map(|c| c.value().clone()).collect();
        controllers.sort_by(|a, b| a.id().cmp(b.id()));
        controllers
    }

    pub fn get(&self, id: &str) -> Option<Arc<Controller>> {
        self.controllers.get(id).map(|c| c.value().clone())
    }

    /// Ids of all controllers, sorted
    pub fn ids(&self) -> Vec<String> {
        self.snapshot().iter().map(|c| c.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// One line per controller with its current state
    pub fn cli_list(&self) -> String {
        self.snapshot().iter().map(|c| c.cli_list()).collect()
    }

    pub fn cli_detail(&self, id: &str) -> Option<String> {
        self.get(id).map(|c| c.cli_detail())
    }

    /// New value of the "manual" flag item `item_id` after a change caused
    /// by `trigger`
    pub fn manual_item_update_eval(&self, item_id: &str, trigger: &TriggerInfo) -> EngineResult<Value> {
        let node = self
            .tree
            .get(item_id)
            .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))?;
        manual::manual_item_update_eval(node, &self.services.items, trigger)
    }
}
