//! The static file handler: serves files under a vhost's `serve_dir`.
//!
//! Grounded on `original_source/micro/handledownload.go`'s sibling serve
//! path (there is no standalone `handleserve.go`; plain serving is the
//! `http.ServeFile` branch of the download handler, factored out here
//! since the download index is a distinct, optional mode in this crate).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;

use crate::handlers::error_page;
use crate::handlers::headers::{apply_security_headers, content_type_for};
use crate::handlers::path_safety::sanitize;
use crate::server::context::VhostContext;

/// Serve a single static file from `ctx.serve_dir`, resolving the root
/// path to `ctx.serve_index`.
pub async fn serve(ctx: Arc<VhostContext>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();

    let Some(full_path) = resolve(&ctx, &path) else {
        return error_page::render(404, &ctx.errors, &ctx.metrics).await;
    };

    match tokio::fs::read(&full_path).await {
        Ok(bytes) => {
            let content_type = content_type_for(&path, &ctx.response_mime_types);
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header("content-type", content_type)
                .body(Body::from(bytes))
                .unwrap_or_else(|_| Response::new(Body::empty()));
            apply_security_headers(&mut response, &ctx.headers, ctx.tls_enabled, &ctx.hsts);
            ctx.metrics.record(200, &path);
            response
        }
        Err(_) => error_page::render(404, &ctx.errors, &ctx.metrics).await,
    }
}

/// Resolve a request path to a filesystem path under `ctx.serve_dir`,
/// refusing anything that would escape it.
fn resolve(ctx: &VhostContext, path: &str) -> Option<String> {
    if path == "/" {
        return Some(format!("{}{}", ctx.serve_dir, ctx.serve_index));
    }
    let relative = sanitize(path)?;
    Some(format!("{}{}", ctx.serve_dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use http_body_util::BodyExt;
    use std::collections::HashMap;

    fn test_ctx(serve_dir: String, serve_index: String) -> Arc<VhostContext> {
        Arc::new(VhostContext {
            serve_dir,
            serve_index,
            headers: HashMap::new(),
            response_mime_types: HashMap::new(),
            download_enabled: false,
            download_exts: vec![],
            proxy_rules: HashMap::new(),
            errors: HashMap::new(),
            tls_enabled: false,
            hsts: Default::default(),
            metrics: Arc::new(Metrics::disabled()),
            http_client: reqwest::Client::new(),
        })
    }

    #[tokio::test]
    async fn serves_existing_file() {
        let dir = std::env::temp_dir().join(format!("maguro-serve-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("hello.txt"), b"hi").await.unwrap();

        let ctx = test_ctx(format!("{}/", dir.display()), "index.html".to_string());
        let req = Request::builder().uri("/hello.txt").body(Body::empty()).unwrap();
        let response = serve(ctx, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hi");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let dir = std::env::temp_dir();
        let ctx = test_ctx(format!("{}/", dir.display()), "index.html".to_string());
        let req = Request::builder().uri("/does-not-exist-xyz").body(Body::empty()).unwrap();
        let response = serve(ctx, req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn parent_traversal_is_404_not_escape() {
        let dir = std::env::temp_dir().join(format!("maguro-serve-test3-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let ctx = test_ctx(format!("{}/", dir.display()), "index.html".to_string());
        let req = Request::builder()
            .uri("/../../../../etc/passwd")
            .body(Body::empty())
            .unwrap();
        let response = serve(ctx, req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
