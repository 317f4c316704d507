//! Configuration schema, JSON loader, and validation.
//!
//! The schema mirrors the reference server's configuration tree
//! (`Core`, `Serve`, `Proxy`, `Guard`, `Metrics`) field for field. JSON
//! is used as the wire format rather than HCL: the shape and the
//! validation rules are unchanged, only the serializer differs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration, loaded from a single JSON file per vhost
/// (or per main server, when virtual hosting is disabled).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener, TLS, and process-wide settings. Ignored for vhosts.
    #[serde(default)]
    pub core: CoreConfig,
    /// Static file serving settings.
    #[serde(default)]
    pub serve: ServeConfig,
    /// Custom error page overrides, keyed by status code as a string.
    #[serde(default)]
    pub errors: HashMap<String, String>,
    /// Reverse proxy settings.
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Rate limiting and firewall settings.
    #[serde(default)]
    pub guard: GuardConfig,
    /// Metrics endpoint settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Core server settings: listener address, TLS, logging, virtual hosting.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CoreConfig {
    /// Bind address, e.g. `0.0.0.0`.
    pub address: String,
    /// Bind port, e.g. `8080`.
    pub port: String,
    /// Directory the server treats as its working root for relative paths.
    pub file_dir: String,
    /// Minimum `tracing` level to emit: 0=error .. 4=trace.
    pub log_level: i32,
    /// Log output target: `stdout`, `stderr`, or a file path.
    pub log_out: String,

    /// Read timeout, seconds.
    pub read_timeout: u64,
    /// Read header timeout, seconds.
    pub read_header_timeout: u64,
    /// Write timeout, seconds.
    pub write_timeout: u64,

    /// Whether virtual hosting is enabled.
    pub virtual_hosting: bool,
    /// Host name -> path to that vhost's own config file.
    pub virtual_hosts: HashMap<String, String>,
    /// TLS settings.
    pub tls: TlsConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: String::new(),
            file_dir: String::new(),
            log_level: 1,
            log_out: String::new(),
            read_timeout: 0,
            read_header_timeout: 0,
            write_timeout: 0,
            virtual_hosting: false,
            virtual_hosts: HashMap::new(),
            tls: TlsConfig::default(),
        }
    }
}

/// TLS settings: static cert/key, autocert, HSTS.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TlsConfig {
    /// Whether TLS termination is enabled.
    pub enabled: bool,
    /// Path to a PEM certificate chain.
    pub tls_cert: String,
    /// Path to a PEM private key.
    pub tls_key: String,
    /// Paths to additional trusted CA certificates.
    pub private_ca: Vec<String>,
    /// ACME autocert settings.
    pub auto_cert: AutocertConfig,
    /// HTTP Strict-Transport-Security settings.
    pub hsts: HstsConfig,
}

/// ACME autocert settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AutocertConfig {
    /// Whether autocert is enabled.
    pub enabled: bool,
    /// Hostnames to request certificates for.
    pub certificates: Vec<String>,
}

/// HTTP Strict-Transport-Security header settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HstsConfig {
    /// `max-age` directive, seconds.
    pub max_age: u64,
    /// Whether to append `preload`.
    pub preload: bool,
    /// Whether to append `includeSubdomains`.
    pub include_subdomains: bool,
}

/// Static file serving settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServeConfig {
    /// Directory to serve files from.
    pub serve_dir: String,
    /// Index file name served for directory requests.
    pub serve_index: String,
    /// Extra response headers to set on every served response.
    pub headers: HashMap<String, String>,
    /// Path -> `;`-joined list of HTTP methods to register a route for.
    pub methods: HashMap<String, String>,
    /// MIME type overrides for matching and rendering.
    pub mime_types: MimeTypes,
    /// Download index settings.
    pub download: DownloadConfig,
}

/// Content-type overrides used on the request-matching side and the
/// response-rendering side respectively.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MimeTypes {
    /// Path -> expected incoming `Content-Type`, used when registering routes.
    pub request_types: HashMap<String, String>,
    /// Path -> `Content-Type` to send back, overriding extension inference.
    pub response_types: HashMap<String, String>,
}

/// Settings for the downloadable-file index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DownloadConfig {
    /// Whether the download index is enabled.
    pub enabled: bool,
    /// File extensions eligible for the download index.
    pub exts: Vec<String>,
}

/// Reverse proxy settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProxyConfig {
    /// Whether the proxy is enabled.
    pub enabled: bool,
    /// Path -> upstream base URL.
    pub rules: HashMap<String, String>,
    /// HTTP methods the proxy forwards; empty means all methods.
    pub methods: Vec<String>,
}

/// Rate limiting and firewall settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GuardConfig {
    /// Token refill rate, tokens per minute.
    pub rate: f64,
    /// Bucket burst capacity.
    pub rate_burst: u64,
    /// Whether to key rate limit buckets on IP alone (true) or
    /// IP + User-Agent (false).
    pub filter_on_ip: bool,
    /// Firewall settings.
    pub firewall: FirewallConfig,
}

/// Host/path firewall settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FirewallConfig {
    /// Whether the firewall is enabled.
    pub enabled: bool,
    /// `true` for blacklist mode, `false` for whitelist mode.
    pub blacklisting: bool,
    /// Whether a rule at a path also governs its subpaths.
    pub subpath: bool,
    /// Path -> allowed/denied host patterns.
    pub rules: HashMap<String, Vec<String>>,
}

/// Metrics endpoint settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MetricsConfig {
    /// Whether the metrics endpoint is enabled.
    pub enabled: bool,
    /// Path the metrics endpoint is served at.
    pub path: String,
    /// Path metrics snapshots are periodically written to.
    pub out: String,
    /// Basic-Auth users: username -> argon2 password hash.
    pub users: HashMap<String, String>,
}

impl Config {
    /// Parse a configuration from a JSON file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate the configuration, filling in defaults for unset
    /// timeouts. `is_vhost` suppresses checks that only apply to the
    /// main server configuration (listener address, TLS, virtual
    /// hosting).
    pub fn validate(&mut self, path: &Path, is_vhost: bool) -> Result<(), ConfigError> {
        let err = |field: &str, reason: &str| ConfigError::Validation {
            path: path.to_path_buf(),
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if !is_vhost {
            if self.core.address.is_empty() || self.core.port.is_empty() {
                return Err(err("core.address/core.port", "must both be set"));
            }
            if self.core.log_out.is_empty() {
                return Err(err("core.log_out", "must be set"));
            }
            if self.core.log_level < 0 {
                return Err(err("core.log_level", "must not be negative"));
            }
            if self.core.file_dir.is_empty() || self.core.file_dir == "/" {
                return Err(err("core.file_dir", "must be set and not point to root"));
            }
            if !self.core.file_dir.ends_with('/') {
                self.core.file_dir.push('/');
            }

            if self.core.read_timeout == 0 {
                self.core.read_timeout = 30;
            }
            if self.core.read_header_timeout == 0 {
                self.core.read_header_timeout = 8;
            }
            if self.core.write_timeout == 0 {
                self.core.write_timeout = 30;
            }

            if self.core.tls.enabled {
                if self.core.tls.auto_cert.enabled {
                    if self.core.tls.auto_cert.certificates.is_empty() {
                        return Err(err(
                            "core.tls.auto_cert.certificates",
                            "autocert is enabled but no certificates are listed",
                        ));
                    }
                    if self.core.port != "443" {
                        return Err(err(
                            "core.tls.auto_cert",
                            "autocert requires core.port to be \"443\"",
                        ));
                    }
                } else if self.core.tls.tls_cert.is_empty() || self.core.tls.tls_key.is_empty() {
                    return Err(err(
                        "core.tls.tls_cert/core.tls.tls_key",
                        "TLS is enabled but no certificate/key pair is configured",
                    ));
                }
            }
        }

        if !is_vhost && self.core.virtual_hosting {
            if self.core.virtual_hosts.is_empty() {
                return Err(err(
                    "core.virtual_hosts",
                    "virtual hosting is enabled but no hosts are configured",
                ));
            }
            for (host, target) in &self.core.virtual_hosts {
                if target.is_empty() {
                    return Err(err("core.virtual_hosts", &format!("no config path set for host {host}")));
                }
            }
            return Ok(());
        } else if self.core.virtual_hosting {
            return Err(err(
                "core.virtual_hosting",
                "virtual hosting cannot be enabled in a vhost configuration",
            ));
        }

        if !self.proxy.enabled && self.serve.download.enabled {
            if self.serve.serve_dir.is_empty() || self.serve.serve_index.is_empty() {
                return Err(err(
                    "serve.serve_dir/serve.serve_index",
                    "download index is enabled but serve_dir or serve_index is unset",
                ));
            }
            if !self.serve.serve_dir.ends_with('/') {
                self.serve.serve_dir.push('/');
            }
        }

        if self.proxy.enabled && self.proxy.rules.is_empty() {
            return Err(err("proxy.rules", "proxy is enabled but no rules are defined"));
        }

        Ok(())
    }
}

/// Load and validate a configuration file in one step.
pub fn load_and_validate(path: impl AsRef<Path>, is_vhost: bool) -> Result<Config, ConfigError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let mut config = Config::load(&path)?;
    config.validate(&path, is_vhost)?;
    Ok(config)
}
