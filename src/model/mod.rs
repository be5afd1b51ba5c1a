mod container;
mod hostname;
mod tls;

pub use container::{Container, TracingSink};
pub use hostname::{Containers, Hostname, TemplateContext, aggregate};

// ============================================================================
// Routing labels
// ============================================================================

/// Comma/space separated list of hostnames, primary first.
pub const LABEL_VHOST: &str = "com.chameth.vhost";
/// Port the container accepts proxied traffic on.
pub const LABEL_PROXY: &str = "com.chameth.proxy";
/// Auth group required to access the container's hostnames.
pub const LABEL_AUTH: &str = "com.chameth.auth";

/// Splits a comma or space separated list, dropping empty segments.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split([',', ' '])
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
