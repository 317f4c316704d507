//! Server assembly: configuration, vhosts, router, TLS, and shutdown.
//!
//! Grounded on `original_source/micro/server.go`'s `NewInstanceFromConfig`
//! and `original_source/micro/serve.go`'s `Serve`.

pub mod assemble;
pub mod context;
pub mod dispatch;
pub mod middleware;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::http::StatusCode;
use axum::Router as AxumRouter;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cache::Cache;
use crate::config::{self, Config};
use crate::error::StartupError;
use crate::metrics::Metrics;
use crate::router::Router;

/// A fully assembled server instance: configuration, routing table, and
/// the shared state every handler closure captures.
pub struct Server {
    /// The main configuration (or the only configuration, without vhosts).
    pub config: Config,
    /// Vhost name -> that vhost's own configuration.
    pub vhosts: HashMap<String, Config>,
    /// The assembled request router.
    pub router: Arc<Router>,
    /// Shared aggregate metrics.
    pub metrics: Arc<Metrics>,
    /// Custom error pages, keyed by vhost name, for router-level errors.
    pub error_pages_by_host: HashMap<String, HashMap<String, String>>,
    /// Custom error pages for the main configuration.
    pub default_error_pages: HashMap<String, String>,
}

impl Server {
    /// Load, validate, and assemble a server instance from its main
    /// configuration file path.
    pub fn from_config_path(path: impl AsRef<Path>) -> Result<Arc<Self>, StartupError> {
        let path = path.as_ref();
        let config = config::load_and_validate(path, false)?;

        let mut vhosts = HashMap::new();
        if config.core.virtual_hosting {
            for (host, vhost_path) in &config.core.virtual_hosts {
                let vhost_config = config::load_and_validate(vhost_path, true)?;
                vhosts.insert(host.clone(), vhost_config);
            }
        }

        let metrics = Arc::new(if config.metrics.enabled {
            Metrics::load(&config.metrics.out)
        } else {
            Metrics::disabled()
        });

        let cache = Cache::new();
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let router = Router::new();
        assemble::assemble_routes(&router, &config, &vhosts, &cache, metrics.clone(), http_client);

        let error_pages_by_host = assemble::error_pages_by_host(&config, &vhosts);
        let default_error_pages = config.errors.clone();

        Ok(Arc::new(Self {
            config,
            vhosts,
            router: Arc::new(router),
            metrics,
            error_pages_by_host,
            default_error_pages,
        }))
    }

    /// Build the top-level `axum` service: a single fallback route that
    /// defers entirely to [`dispatch::dispatch`].
    ///
    /// `axum-server` does not expose hyper's per-phase read/write
    /// timeouts, so `core.read_timeout`, `core.read_header_timeout` and
    /// `core.write_timeout` are applied as a single combined
    /// [`TimeoutLayer`] budget for the whole request/response cycle —
    /// the closest enforcement point this stack exposes.
    pub fn into_make_service(
        self: Arc<Self>,
    ) -> IntoMakeServiceWithConnectInfo<AxumRouter, SocketAddr> {
        let budget = Duration::from_secs(
            self.config.core.read_timeout
                + self.config.core.read_header_timeout
                + self.config.core.write_timeout,
        );

        AxumRouter::new()
            .fallback(dispatch::dispatch)
            .layer(TraceLayer::new_for_http())
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(|_: tower::BoxError| async {
                        StatusCode::REQUEST_TIMEOUT
                    }))
                    .layer(TimeoutLayer::new(budget)),
            )
            .with_state(self)
            .into_make_service_with_connect_info::<SocketAddr>()
    }

    /// Bind and serve forever, honoring TLS when configured, until a
    /// SIGINT/SIGTERM triggers a 30-second graceful shutdown.
    pub async fn serve(self: Arc<Self>) -> Result<(), StartupError> {
        let addr: SocketAddr = format!("{}:{}", self.config.core.address, self.config.core.port)
            .parse()
            .map_err(|_| StartupError::Bind {
                addr: format!("{}:{}", self.config.core.address, self.config.core.port),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid bind address"),
            })?;

        if self.config.metrics.enabled {
            let metrics = self.metrics.clone();
            let out_path: PathBuf = self.config.metrics.out.clone().into();
            tokio::spawn(async move {
                metrics.flush_loop(out_path).await;
            });
        }

        let make_service = self.clone().into_make_service();
        let handle = axum_server::Handle::new();
        tokio::spawn(shutdown_signal(handle.clone()));

        let result = if self.config.core.tls.enabled {
            let tls_config = crate::tls::build_server_config(&self.config.core.tls)?;
            let rustls_config = axum_server::tls_rustls::RustlsConfig::from_config(tls_config);
            tracing::info!(addr = %addr, "maguro listening with TLS");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(make_service)
                .await
                .map_err(|source| StartupError::Bind {
                    addr: addr.to_string(),
                    source,
                })
        } else {
            tracing::info!(addr = %addr, "maguro listening");
            axum_server::bind(addr)
                .handle(handle)
                .serve(make_service)
                .await
                .map_err(|source| StartupError::Bind {
                    addr: addr.to_string(),
                    source,
                })
        };

        if self.config.metrics.enabled {
            tracing::info!("flushing metrics before exit");
            if let Err(err) = self.metrics.flush(&self.config.metrics.out) {
                tracing::error!(error = %err, "failed to flush metrics on shutdown");
            }
        }

        result
    }
}

/// Waits for SIGINT or SIGTERM, then gives in-flight connections 30
/// seconds to finish before the listener is torn down.
async fn shutdown_signal(handle: axum_server::Handle) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(30)));
}
