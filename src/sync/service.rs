use super::monitor::ContainerHandler;
use crate::config_cli::DebugTarget;
use crate::model::{Container, Containers, Hostname, TemplateContext, TracingSink};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::watch;
use tracing::{error, info};

/// Latest published model, shared with the HTTP endpoints and the publisher.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    /// Set once the initial container snapshot has been applied.
    pub ready: bool,
    pub context: Arc<TemplateContext>,
}

/// Running containers keyed by id; rebuilds the hostname model after every change.
pub struct Registry {
    containers: Containers,
    wildcard_domains: Vec<String>,
    debug: Vec<DebugTarget>,
    state_tx: watch::Sender<ModelState>,
}

impl Registry {
    pub fn new(
        state_tx: watch::Sender<ModelState>,
        wildcard_domains: Vec<String>,
        debug: Vec<DebugTarget>,
    ) -> Self {
        Self {
            containers: Containers::new(),
            wildcard_domains,
            debug,
            state_tx,
        }
    }

    fn publish(&self) {
        let context = TemplateContext::new(&self.containers, &self.wildcard_domains);

        if self.debug.contains(&DebugTarget::Containers) {
            for container in &context.containers {
                info!(
                    "Container {} ({}): {:?}",
                    container.name, container.id, container.labels
                );
            }
        }
        if self.debug.contains(&DebugTarget::Hostnames) {
            for hostname in context.hostnames.values() {
                info!(
                    "Hostname {}: alternatives {:?}, {} containers, auth {}",
                    hostname.name,
                    hostname.alternatives,
                    hostname.containers.len(),
                    if hostname.requires_auth {
                        hostname.auth_group.as_str()
                    } else {
                        "none"
                    }
                );
            }
        }

        self.state_tx
            .send_modify(|state| state.context = Arc::new(context));
    }
}

impl ContainerHandler for Registry {
    fn added(&mut self, container: Container) {
        info!(
            "Container added: {} (proxied: {})",
            container.name,
            container.should_proxy(&TracingSink)
        );
        self.containers.insert(container.id.clone(), container);
        self.publish();
    }

    fn removed(&mut self, name: &str) {
        let before = self.containers.len();
        self.containers.retain(|_, c| c.name != name);
        if self.containers.len() == before {
            info!("Container removed: {} (not tracked)", name);
            return;
        }
        info!("Container removed: {}", name);
        self.publish();
    }

    fn synced(&mut self) {
        info!("Initial snapshot applied: {} containers", self.containers.len());
        self.state_tx.send_modify(|state| state.ready = true);
    }
}

// ============================================================================
// Change publication
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Update,
    Remove,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeType::Add => "Added",
            ChangeType::Update => "Updated",
            ChangeType::Remove => "Removed",
        })
    }
}

pub fn calculate_changes(
    current: &BTreeMap<String, Hostname>,
    new: &BTreeMap<String, Hostname>,
) -> BTreeMap<String, ChangeType> {
    let mut changes = BTreeMap::new();
    let current_names: BTreeSet<_> = current.keys().cloned().collect();
    let new_names: BTreeSet<_> = new.keys().cloned().collect();

    for name in &new_names - &current_names {
        changes.insert(name, ChangeType::Add);
    }

    for name in &current_names - &new_names {
        changes.insert(name, ChangeType::Remove);
    }

    for name in current_names.intersection(&new_names) {
        if current[name] != new[name] {
            changes.insert(name.clone(), ChangeType::Update);
        }
    }

    changes
}

/// Hex SHA-256 of a serialised model.
pub fn fingerprint(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Logs hostname changes and writes the model to `output` whenever its content changes.
pub async fn run_publisher(mut state_rx: watch::Receiver<ModelState>, output: Option<PathBuf>) {
    let mut current: BTreeMap<String, Hostname> = BTreeMap::new();
    let mut written: Option<String> = None;

    while state_rx.changed().await.is_ok() {
        let context = Arc::clone(&state_rx.borrow_and_update().context);

        for (name, change) in calculate_changes(&current, &context.hostnames) {
            info!("{} hostname: {}", change, name);
        }
        current = context.hostnames.clone();

        let Some(path) = &output else {
            continue;
        };
        match write_model(path, &context, written.as_deref()).await {
            Ok(Some(digest)) => written = Some(digest),
            Ok(None) => {}
            Err(e) => error!("Model publication failed: {:#}", e),
        }
    }
}

/// Returns the new fingerprint if the file was written, `None` if the content was unchanged.
async fn write_model(
    path: &Path,
    context: &TemplateContext,
    previous: Option<&str>,
) -> Result<Option<String>> {
    let json = serde_json::to_vec_pretty(context).context("Failed to serialise model")?;
    let digest = fingerprint(&json);
    if previous == Some(digest.as_str()) {
        return Ok(None);
    }

    tokio::fs::write(path, &json)
        .await
        .with_context(|| format!("Failed to write model to {}", path.display()))?;
    info!("Wrote model to {} ({})", path.display(), &digest[..12]);
    Ok(Some(digest))
}
