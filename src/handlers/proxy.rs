//! The reverse proxy handler.
//!
//! Grounded on `original_source/micro/handleproxy.go`: clone the
//! request's headers onto a new outbound request built from the
//! matched rule's upstream base URL plus the request URI, dial it, and
//! copy the response back header-first, then body. Any dial or read
//! failure becomes a 502 and is never retried.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;

use crate::error::ProxyError;
use crate::handlers::error_page;
use crate::router::strip_host_port;
use crate::server::context::VhostContext;

/// Forward `req` to the upstream named by the proxy rule matching its
/// `Host` header, or render a 502 if no rule matches or the upstream
/// fails.
pub async fn proxy(ctx: Arc<VhostContext>, req: Request<Body>) -> Response {
    match forward(&ctx, req).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "proxy request failed");
            error_page::render(502, &ctx.errors, &ctx.metrics).await
        }
    }
}

async fn forward(ctx: &Arc<VhostContext>, req: Request<Body>) -> Result<Response, ProxyError> {
    let host = req
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_host_port)
        .unwrap_or("")
        .to_string();

    let base = ctx
        .proxy_rules
        .get(&host)
        .ok_or_else(|| ProxyError::NoRule(host.clone()))?;

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", base.trim_end_matches('/'), path_and_query);

    let method = req.method().clone();
    let headers = req.headers().clone();
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(ProxyError::BodyRead)?
        .to_bytes();

    let upstream = ctx
        .http_client
        .request(method, &url)
        .headers(clone_headers(&headers))
        .body(body.to_vec())
        .send()
        .await
        .map_err(ProxyError::Dial)?;

    let status = upstream.status().as_u16();
    let mut builder =
        Response::builder().status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in upstream.headers() {
        builder = builder.header(name, value);
    }
    let response_body = upstream.bytes().await.map_err(ProxyError::Read)?;
    ctx.metrics.record(status, &url);
    Ok(builder
        .body(Body::from(response_body))
        .unwrap_or_else(|_| Response::new(Body::empty())))
}

fn clone_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        out.append(name, value.clone());
    }
    out
}
