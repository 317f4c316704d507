//! Route assembly from configuration.
//!
//! Grounded on `original_source/micro/routes.go`'s `addRoutesFromConfig`:
//! for each vhost (or the main config alone, when virtual hosting is
//! disabled), build one `Limiter` and, if enabled, one `Firewall`, then
//! register either proxy routes, a download route, or serve routes —
//! in that priority order — all carrying the limiter (and firewall)
//! as middleware.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;

use crate::cache::Cache;
use crate::config::Config;
use crate::firewall::{self, Firewall};
use crate::handlers;
use crate::limiter::Limiter;
use crate::metrics::Metrics;
use crate::router::{Handler, Router, DEFAULT_HOST};
use crate::server::context::VhostContext;
use crate::server::middleware;

const PROXY_METHODS: &[Method] = &[
    Method::GET,
    Method::PUT,
    Method::POST,
    Method::DELETE,
    Method::HEAD,
    Method::CONNECT,
    Method::PATCH,
    Method::OPTIONS,
];

fn parse_method(name: &str) -> Option<Method> {
    Method::from_bytes(name.as_bytes()).ok()
}

/// Register every route (and its middleware) for one vhost's
/// configuration under `host` (or [`DEFAULT_HOST`] when virtual hosting
/// is disabled).
fn register_vhost(
    router: &Router,
    host: &str,
    config: &Config,
    cache: &Cache,
    metrics: Arc<Metrics>,
    http_client: reqwest::Client,
) {
    let ctx = Arc::new(VhostContext::from_config(config, metrics, http_client));

    let limiter = Limiter::new(cache.clone(), config.guard.rate, config.guard.rate_burst);
    let firewall = if config.guard.firewall.enabled {
        let mode = if config.guard.firewall.blacklisting {
            firewall::Mode::Blacklist
        } else {
            firewall::Mode::Whitelist
        };
        Some(Arc::new(Firewall::new(
            config.guard.firewall.rules.clone(),
            mode,
            config.guard.firewall.subpath,
        )))
    } else {
        None
    };

    if config.proxy.enabled {
        for proxy_host in config.proxy.rules.keys() {
            let ctx_for_host = ctx.clone();
            let handler: Handler = Arc::new(move |req| {
                let ctx = ctx_for_host.clone();
                Box::pin(handlers::proxy::proxy(ctx, req)) as crate::router::BoxFuture
            });
            for method in PROXY_METHODS {
                router.add_route(proxy_host, "/", true, method.clone(), "*", handler.clone());
            }
            if let Some(firewall) = &firewall {
                router.use_middleware(
                    proxy_host,
                    "/",
                    middleware::firewall_proxy(firewall.clone(), ctx.clone()),
                );
            }
            router.use_middleware(
                proxy_host,
                "/",
                middleware::rate_limit(limiter.clone(), config.guard.filter_on_ip, ctx.clone()),
            );
        }
    } else if config.serve.download.enabled {
        let ctx_for_route = ctx.clone();
        let handler: Handler = Arc::new(move |req| {
            let ctx = ctx_for_route.clone();
            Box::pin(handlers::download::download(ctx, req)) as crate::router::BoxFuture
        });
        router.add_route(host, "/", true, Method::GET, "", handler);

        if let Some(firewall) = &firewall {
            router.use_middleware(host, "/", middleware::firewall_http(firewall.clone(), ctx.clone()));
        }
        router.use_middleware(
            host,
            "/",
            middleware::rate_limit(limiter.clone(), config.guard.filter_on_ip, ctx.clone()),
        );
    } else {
        for (path, methods) in &config.serve.methods {
            let fallback = path.ends_with('/');
            let content_type = config
                .serve
                .mime_types
                .request_types
                .get(path)
                .cloned()
                .unwrap_or_else(|| ";".to_string());

            let ctx_for_route = ctx.clone();
            let handler: Handler = Arc::new(move |req| {
                let ctx = ctx_for_route.clone();
                Box::pin(handlers::serve::serve(ctx, req)) as crate::router::BoxFuture
            });

            for verb in methods.split(';') {
                let Some(method) = parse_method(verb) else { continue };
                router.add_route(host, path, fallback, method, &content_type, handler.clone());
            }

            if let Some(firewall) = &firewall {
                router.use_middleware(host, path, middleware::firewall_http(firewall.clone(), ctx.clone()));
            }
            router.use_middleware(
                host,
                path,
                middleware::rate_limit(limiter.clone(), config.guard.filter_on_ip, ctx.clone()),
            );
        }
    }
}

/// Register the metrics endpoint, if enabled, gated by Basic-Auth.
fn register_metrics(router: &Router, config: &Config, metrics: Arc<Metrics>, http_client: reqwest::Client) {
    if !config.metrics.enabled {
        return;
    }

    let ctx = Arc::new(VhostContext::from_config(config, metrics, http_client));
    let handler: Handler = Arc::new(move |req| {
        let ctx = ctx.clone();
        Box::pin(handlers::metrics_page::metrics_page(ctx, req)) as crate::router::BoxFuture
    });

    router.add_route(DEFAULT_HOST, &config.metrics.path, false, Method::GET, "", handler);

    let users = Arc::new(config.metrics.users.clone());
    router.use_middleware(
        DEFAULT_HOST,
        &config.metrics.path,
        handlers::metrics_page::require_basic_auth(users),
    );
}

/// Assemble every route for the main configuration and, if virtual
/// hosting is enabled, every named vhost.
pub fn assemble_routes(
    router: &Router,
    config: &Config,
    vhosts: &HashMap<String, Config>,
    cache: &Cache,
    metrics: Arc<Metrics>,
    http_client: reqwest::Client,
) {
    if config.core.virtual_hosting {
        for (host, vhost_config) in vhosts {
            register_vhost(
                router,
                host,
                vhost_config,
                cache,
                metrics.clone(),
                http_client.clone(),
            );
        }
    } else {
        register_vhost(
            router,
            DEFAULT_HOST,
            config,
            cache,
            metrics.clone(),
            http_client.clone(),
        );
    }

    register_metrics(router, config, metrics, http_client);
}

/// Build the `host -> custom error pages` lookup used to render router-
/// level errors (404/405/406) before any vhost handler has run.
pub fn error_pages_by_host(config: &Config, vhosts: &HashMap<String, Config>) -> HashMap<String, HashMap<String, String>> {
    let mut out = HashMap::new();
    if config.core.virtual_hosting {
        for (host, vhost_config) in vhosts {
            out.insert(host.clone(), vhost_config.errors.clone());
        }
    }
    out
}
