use crate::model::Container;

use anyhow::{Context, Result, anyhow, bail};
use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;
use url::Url;

// ============================================================================
// Runtime API models
// ============================================================================

/// Entry returned by the container list call.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Labels", default)]
    pub labels: Option<HashMap<String, String>>,
}

/// Result of inspecting a single container.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerDetails {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Config", default)]
    pub config: Option<ContainerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "Labels", default)]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeEvent {
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Actor")]
    pub actor: EventActor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventActor {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
}

impl From<ContainerSummary> for Container {
    fn from(summary: ContainerSummary) -> Self {
        let name = summary.names.first().map(String::as_str).unwrap_or_default();
        Container::new(
            summary.id.clone(),
            name,
            summary.labels.unwrap_or_default(),
        )
    }
}

impl From<ContainerDetails> for Container {
    fn from(details: ContainerDetails) -> Self {
        let labels = details
            .config
            .and_then(|config| config.labels)
            .unwrap_or_default();
        Container::new(details.id, &details.name, labels)
    }
}

/// Restricts an event subscription to one resource type and a set of actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub resource_type: &'static str,
    pub actions: Vec<&'static str>,
}

impl EventFilter {
    pub fn container_lifecycle() -> Self {
        Self {
            resource_type: "container",
            actions: vec!["create", "destroy"],
        }
    }

    /// Encodes the filter in the runtime's `filters` query format.
    pub fn to_query(&self) -> Result<String> {
        let mut filters: HashMap<&str, Vec<&str>> = HashMap::new();
        filters.insert("type", vec![self.resource_type]);
        filters.insert("event", self.actions.clone());
        serde_json::to_string(&filters).context("Failed to encode event filter")
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Live event subscription: an event channel, an error channel, and the task feeding them.
///
/// Cancelling (or dropping) the subscription stops the feeding task.
pub struct Subscription {
    pub events: mpsc::Receiver<RuntimeEvent>,
    pub errors: mpsc::Receiver<anyhow::Error>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::Receiver<RuntimeEvent>,
        errors: mpsc::Receiver<anyhow::Error>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            events,
            errors,
            task,
        }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.close();
        self.errors.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Capabilities the monitor needs from a container runtime.
pub trait RuntimeClient {
    async fn subscribe(&self, filter: &EventFilter) -> Result<Subscription>;
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails>;
}

// ============================================================================
// Docker Engine compatible HTTP client
// ============================================================================

pub struct HttpRuntimeClient {
    client: reqwest::Client,
    base: Url,
}

impl HttpRuntimeClient {
    pub fn new(endpoint: &Url, api_version: Option<&str>, connect_timeout: Duration) -> Result<Self> {
        // No overall timeout: the event stream stays open for the life of the process.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base = with_trailing_slash(endpoint.clone());
        if let Some(version) = api_version.filter(|v| !v.is_empty()) {
            base = base
                .join(&format!("{}/", version.trim_matches('/')))
                .with_context(|| format!("Invalid API version {}", version))?;
        }

        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Invalid runtime API path {}", path))
    }
}

impl RuntimeClient for HttpRuntimeClient {
    async fn subscribe(&self, filter: &EventFilter) -> Result<Subscription> {
        let mut url = self.url("events")?;
        url.query_pairs_mut()
            .append_pair("filters", &filter.to_query()?);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to connect to event stream")?
            .error_for_status()
            .context("Event stream request rejected")?;

        let (event_tx, events) = mpsc::channel(64);
        let (error_tx, errors) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            if let Err(e) = forward_events(response, &event_tx).await {
                let _ = error_tx.send(e).await;
            }
        });

        Ok(Subscription::new(events, errors, Some(task)))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let url = self.url("containers/json")?;
        let containers = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(containers)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        let url = self.url(&format!("containers/{}/json", id))?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            bail!("No such container: {}", id);
        }
        let details = response.error_for_status()?.json().await?;
        Ok(details)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Decodes the newline delimited event body until it fails or the receiver goes away.
async fn forward_events(
    response: reqwest::Response,
    event_tx: &mpsc::Sender<RuntimeEvent>,
) -> Result<()> {
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk.context("Event stream failed")?);
        for line in drain_lines(&mut buffer) {
            let event: RuntimeEvent =
                serde_json::from_slice(&line).context("Failed to decode runtime event")?;
            debug!("Runtime event {} {} {}", event.kind, event.action, event.actor.id);
            if event_tx.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
    Err(anyhow!("Event stream closed by runtime"))
}

/// Removes every complete, non-blank line from `buffer`, leaving any partial tail.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = line.trim_ascii();
        if !line.is_empty() {
            lines.push(line.to_vec());
        }
    }
    lines
}
