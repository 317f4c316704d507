//! Firewall and rate-limit middleware, attached per vhost during route
//! assembly.
//!
//! Grounded on `original_source/guard/firewall.go`'s `BlockHTTP`/
//! `BlockProxy` and `original_source/guard/limiter.go`'s `LimitHTTP`:
//! both are plain `net/http` middleware functions in the reference;
//! here they are [`crate::router::Middleware`] closures.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;

use crate::firewall::Firewall;
use crate::handlers::error_page;
use crate::limiter::Limiter;
use crate::router::{strip_host_port, BoxFuture, Handler, Middleware};
use crate::server::context::VhostContext;

pub(crate) fn remote_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

fn request_host(req: &Request<Body>) -> String {
    req.headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_host_port)
        .unwrap_or("")
        .to_string()
}

/// Middleware that denies requests the firewall blocks for HTTP (serve
/// or download) traffic, keyed by ancestor-path walk.
pub fn firewall_http(firewall: Arc<Firewall>, ctx: Arc<VhostContext>) -> Middleware {
    Arc::new(move |next: Handler| {
        let firewall = firewall.clone();
        let ctx = ctx.clone();
        Arc::new(move |req: Request<Body>| -> BoxFuture {
            let firewall = firewall.clone();
            let ctx = ctx.clone();
            let next = next.clone();
            Box::pin(async move {
                let ip = remote_ip(&req);
                let path = req.uri().path().to_string();
                if firewall.allow_http(&ip, &path) {
                    next(req).await
                } else {
                    error_page::render(403, &ctx.errors, &ctx.metrics).await
                }
            })
        })
    })
}

/// Middleware that denies requests the firewall blocks for proxy
/// traffic, keyed by a direct host lookup.
pub fn firewall_proxy(firewall: Arc<Firewall>, ctx: Arc<VhostContext>) -> Middleware {
    Arc::new(move |next: Handler| {
        let firewall = firewall.clone();
        let ctx = ctx.clone();
        Arc::new(move |req: Request<Body>| -> BoxFuture {
            let firewall = firewall.clone();
            let ctx = ctx.clone();
            let next = next.clone();
            Box::pin(async move {
                let ip = remote_ip(&req);
                let host = request_host(&req);
                if firewall.allow_proxy(&ip, &host) {
                    next(req).await
                } else {
                    error_page::render(403, &ctx.errors, &ctx.metrics).await
                }
            })
        })
    })
}

/// Rate-limit middleware, keyed on the remote IP (and optionally the
/// `User-Agent` header, per `guard.filter_on_ip`).
pub fn rate_limit(limiter: Limiter, filter_on_ip: bool, ctx: Arc<VhostContext>) -> Middleware {
    Arc::new(move |next: Handler| {
        let limiter = limiter.clone();
        let ctx = ctx.clone();
        Arc::new(move |req: Request<Body>| -> BoxFuture {
            let limiter = limiter.clone();
            let ctx = ctx.clone();
            let next = next.clone();
            Box::pin(async move {
                let mut key = remote_ip(&req);
                if !filter_on_ip {
                    if let Some(ua) = req.headers().get(axum::http::header::USER_AGENT) {
                        key.push('|');
                        key.push_str(ua.to_str().unwrap_or(""));
                    }
                }
                if limiter.check(key.as_bytes()) {
                    next(req).await
                } else {
                    error_page::render(429, &ctx.errors, &ctx.metrics).await
                }
            })
        })
    })
}
