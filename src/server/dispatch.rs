//! Adapts `axum`'s request/response types to [`crate::router::Router`]
//! and back, per `SPEC_FULL.md`'s router design: the router itself
//! knows nothing about `axum`, so this module is the only place the
//! two meet.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;

use crate::handlers::error_page;
use crate::logging::log_network;
use crate::router::{compose, strip_host_port, RouteOutcome};
use crate::server::middleware::remote_ip;
use crate::server::Server;

/// The single fallback handler every inbound request passes through.
pub async fn dispatch(State(server): State<Arc<Server>>, req: Request<Body>) -> Response {
    let host = req
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_host_port)
        .unwrap_or("")
        .to_string();
    let path = req.uri().path().to_string();
    let method = req.method().clone();
    let content_type = req
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let remote_addr = remote_ip(&req);
    let user_agent = req
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let outcome = server.router.lookup(&host, &path, &method, &content_type);

    let response = match outcome {
        RouteOutcome::Matched { handler, middleware } => {
            let handler = compose(handler, &middleware);
            handler(req).await
        }
        RouteOutcome::NotFound => render_router_error(&server, &host, 404).await,
        RouteOutcome::MethodNotAllowed => render_router_error(&server, &host, 405).await,
        RouteOutcome::MediaNotSupported => render_router_error(&server, &host, 406).await,
    };

    log_network(
        response.status().as_u16(),
        method.as_str(),
        &host,
        &path,
        &query,
        &remote_addr,
        &user_agent,
    );

    response
}

async fn render_router_error(server: &Server, host: &str, status: u16) -> Response {
    let errors = server
        .error_pages_by_host
        .get(host)
        .unwrap_or(&server.default_error_pages);
    error_page::render(status, errors, &server.metrics).await
}
