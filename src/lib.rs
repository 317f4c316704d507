//! # MicroHTTP (maguro)
//!
//! A small, security-oriented HTTP edge server. It can act simultaneously
//! as a static file server with per-virtual-host rules, a reverse proxy,
//! and a downloadable-file index, all dispatched through a single router.
//!
//! ## Architecture
//!
//! - `cache`: a sharded, lock-striped, preallocated ring buffer used as
//!   the substrate for per-client rate limiters and other keyed state.
//! - `limiter`: token-bucket rate limiting backed by `cache`.
//! - `firewall`: host/path allow-or-deny decisions for HTTP and proxy flows.
//! - `router`: dispatches requests by (host, path, method, content-type)
//!   with host fallback, path fallback, and an ordered middleware chain.
//! - `config`: the configuration schema, loader, and validator.
//! - `server`: wires configuration, vhosts, router, TLS and handlers
//!   together, and owns startup/shutdown.
//! - `handlers`: the serve, proxy, download, and metrics terminal handlers.
//! - `tls`: TLS configuration assembly.
//! - `metrics`: aggregate request counters.
//! - `logging`: `tracing` subscriber setup driven by configuration.

#![warn(missing_docs)]

/// Sharded ring cache: the substrate for rate limiters and other keyed state.
pub mod cache;

/// Host/path firewall for HTTP and proxy flows.
pub mod firewall;

/// Token-bucket rate limiting, backed by the cache.
pub mod limiter;

/// Request router: host+path+method+content-type matching with middleware.
pub mod router;

/// Configuration schema, loader and validator.
pub mod config;

/// Server assembly: vhosts, router, TLS, shutdown.
pub mod server;

/// Terminal handlers: serve, proxy, download, metrics.
pub mod handlers;

/// TLS configuration assembly.
pub mod tls;

/// Aggregate request metrics.
pub mod metrics;

/// Logging setup.
pub mod logging;

/// Crate-wide error types.
pub mod error;

/// Current MicroHTTP version, reported in the startup banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
