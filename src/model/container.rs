use super::{LABEL_PROXY, LABEL_VHOST};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Receives non-fatal problems found while reading container labels.
pub trait WarningSink {
    fn warn(&self, message: &str);
}

/// Forwards label warnings to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl WarningSink for TracingSink {
    fn warn(&self, message: &str) {
        warn!("{}", message);
    }
}

/// A running container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl Container {
    /// Builds a container from the runtime's raw name, which carries a leading `/`.
    pub fn new(id: impl Into<String>, raw_name: &str, labels: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            name: raw_name.strip_prefix('/').unwrap_or(raw_name).to_string(),
            labels,
        }
    }

    pub fn vhost(&self) -> Option<&str> {
        self.labels.get(LABEL_VHOST).map(|s| s.as_str())
    }

    /// Whether the container carries a vhost and a usable port.
    pub fn should_proxy(&self, sink: &dyn WarningSink) -> bool {
        self.vhost().is_some() && self.port(sink).is_some()
    }

    /// Port the container accepts traffic on.
    ///
    /// A missing label yields `None` silently; a malformed or out of range
    /// label yields `None` and reports a warning to `sink`.
    pub fn port(&self, sink: &dyn WarningSink) -> Option<u16> {
        let label = self.labels.get(LABEL_PROXY)?;
        match label.parse::<i64>() {
            Ok(port) if (1..=i64::from(u16::MAX)).contains(&port) => u16::try_from(port).ok(),
            Ok(_) => {
                sink.warn(&format!(
                    "Invalid port specification on container {}: {} (out of range)",
                    self.name, label
                ));
                None
            }
            Err(e) => {
                sink.warn(&format!(
                    "Invalid port specification on container {}: {} ({})",
                    self.name, label, e
                ));
                None
            }
        }
    }
}
