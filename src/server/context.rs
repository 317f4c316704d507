//! Per-vhost state shared by every handler registered for that vhost.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, HstsConfig};
use crate::metrics::Metrics;

/// Everything a handler needs to serve requests for one vhost (or the
/// main configuration, when virtual hosting is disabled).
pub struct VhostContext {
    /// Directory static files are served from.
    pub serve_dir: String,
    /// Index file name served for the root path.
    pub serve_index: String,
    /// Extra response headers applied to every response for this vhost.
    pub headers: HashMap<String, String>,
    /// Response content-type overrides, keyed by full request path.
    pub response_mime_types: HashMap<String, String>,
    /// Whether the download index is enabled, and which extensions it covers.
    pub download_enabled: bool,
    /// File extensions eligible for the download index.
    pub download_exts: Vec<String>,
    /// Proxy rules: host -> upstream base URL.
    pub proxy_rules: HashMap<String, String>,
    /// Custom error page paths, keyed by status code as a string.
    pub errors: HashMap<String, String>,
    /// Whether TLS termination is active for this vhost's listener.
    pub tls_enabled: bool,
    /// HSTS settings, applied only when `tls_enabled`.
    pub hsts: HstsConfig,
    /// Shared request metrics.
    pub metrics: Arc<Metrics>,
    /// HTTP client used to forward proxied requests upstream.
    pub http_client: reqwest::Client,
}

impl VhostContext {
    /// Build a context from a resolved vhost (or main) configuration.
    pub fn from_config(config: &Config, metrics: Arc<Metrics>, http_client: reqwest::Client) -> Self {
        Self {
            serve_dir: config.serve.serve_dir.clone(),
            serve_index: config.serve.serve_index.clone(),
            headers: config.serve.headers.clone(),
            response_mime_types: config.serve.mime_types.response_types.clone(),
            download_enabled: config.serve.download.enabled,
            download_exts: config.serve.download.exts.clone(),
            proxy_rules: config.proxy.rules.clone(),
            errors: config.errors.clone(),
            tls_enabled: config.core.tls.enabled,
            hsts: config.core.tls.hsts.clone(),
            metrics,
            http_client,
        }
    }
}
