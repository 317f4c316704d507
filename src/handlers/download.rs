//! The download index handler: lists eligible files at the index path,
//! forces a download for any other matching path.
//!
//! Grounded on `original_source/micro/handledownload.go`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;

use crate::handlers::error_page;
use crate::handlers::headers::apply_security_headers;
use crate::handlers::path_safety::sanitize;
use crate::server::context::VhostContext;

const PAGE_START: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body>";
const PAGE_END: &str = "</body></html>";

async fn collect_downloads(ctx: &VhostContext) -> Vec<(String, u64)> {
    let mut out = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(&ctx.serve_dir).await else {
        return out;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else { continue };
        if metadata.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let matches_ext = ctx
            .download_exts
            .iter()
            .any(|ext| name.ends_with(ext.as_str()));
        if matches_ext {
            out.push((name, metadata.len()));
        }
    }
    out
}

fn render_index(files: &[(String, u64)]) -> String {
    let mut out = String::from(PAGE_START);
    out.push_str("<h1>Downloads</h1>");
    out.push_str("<table border=\"0\" cellpadding=\"0\" cellspacing=\"0\">");
    out.push_str(
        "<tr><td><b>Name</b></td><td><b>Size</b></td></tr>",
    );
    for (name, size) in files {
        out.push_str(&format!(
            "<tr><td><a href=\"/{name}\">{name}</a></td><td>{size}</td></tr>"
        ));
    }
    out.push_str("</table>");
    out.push_str(PAGE_END);
    out
}

/// Serve either the generated download index (at the vhost's index
/// path) or a forced-download of a single eligible file.
pub async fn download(ctx: Arc<VhostContext>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();

    if !ctx.download_enabled {
        return error_page::render(404, &ctx.errors, &ctx.metrics).await;
    }

    if path == "/" {
        let files = collect_downloads(&ctx).await;
        let body = render_index(&files);
        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/html; charset=utf-8")
            .body(Body::from(body))
            .unwrap_or_else(|_| Response::new(Body::empty()));
        apply_security_headers(&mut response, &ctx.headers, ctx.tls_enabled, &ctx.hsts);
        ctx.metrics.record(200, &path);
        return response;
    }

    let Some(relative) = sanitize(&path) else {
        return error_page::render(404, &ctx.errors, &ctx.metrics).await;
    };
    let full_path = format!("{}{}", ctx.serve_dir, relative);
    match tokio::fs::read(&full_path).await {
        Ok(bytes) => {
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "application/octet-stream")
                .header("content-disposition", "attachment")
                .body(Body::from(bytes))
                .unwrap_or_else(|_| Response::new(Body::empty()));
            apply_security_headers(&mut response, &ctx.headers, ctx.tls_enabled, &ctx.hsts);
            ctx.metrics.record(200, &path);
            response
        }
        Err(_) => error_page::render(404, &ctx.errors, &ctx.metrics).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use http_body_util::BodyExt;
    use std::collections::HashMap;

    fn test_ctx(serve_dir: String, exts: Vec<String>) -> Arc<VhostContext> {
        Arc::new(VhostContext {
            serve_dir,
            serve_index: "index.html".to_string(),
            headers: HashMap::new(),
            response_mime_types: HashMap::new(),
            download_enabled: true,
            download_exts: exts,
            proxy_rules: HashMap::new(),
            errors: HashMap::new(),
            tls_enabled: false,
            hsts: Default::default(),
            metrics: Arc::new(Metrics::disabled()),
            http_client: reqwest::Client::new(),
        })
    }

    #[tokio::test]
    async fn index_lists_matching_extensions_only() {
        let dir = std::env::temp_dir().join(format!("maguro-dl-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("a.zip"), b"z").await.unwrap();
        tokio::fs::write(dir.join("b.txt"), b"t").await.unwrap();

        let ctx = test_ctx(format!("{}/", dir.display()), vec![".zip".to_string()]);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = download(ctx, req).await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains("a.zip"));
        assert!(!html.contains("b.txt"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn forces_download_disposition_for_file() {
        let dir = std::env::temp_dir().join(format!("maguro-dl-test2-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("a.zip"), b"z").await.unwrap();

        let ctx = test_ctx(format!("{}/", dir.display()), vec![".zip".to_string()]);
        let req = Request::builder().uri("/a.zip").body(Body::empty()).unwrap();
        let response = download(ctx, req).await;
        assert_eq!(
            response.headers().get("content-disposition").unwrap(),
            "attachment"
        );

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn parent_traversal_is_404_not_escape() {
        let dir = std::env::temp_dir().join(format!("maguro-dl-test3-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let ctx = test_ctx(format!("{}/", dir.display()), vec![".zip".to_string()]);
        let req = Request::builder()
            .uri("/../../../../etc/passwd")
            .body(Body::empty())
            .unwrap();
        let response = download(ctx, req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
