//! The single error-rendering path every handler and the router's error
//! arbitration funnels through.
//!
//! Grounded on `original_source/micro/handleerror.go`: a custom error
//! page file, keyed by status code, takes priority; otherwise a plain
//! built-in page is rendered.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;

use crate::metrics::Metrics;

const PAGE_START: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body>";
const PAGE_END: &str = "</body></html>";

fn message_for(status: u16) -> &'static str {
    match status {
        403 => "Error 403 - Forbidden",
        404 => "Error 404 - Page not found",
        405 => "Error 405 - Method not allowed",
        406 => "Error 406 - Unacceptable",
        429 => "Error 429 - Too many requests",
        502 => "Error 502 - Bad gateway",
        _ => "",
    }
}

/// Build an error response for `status`, preferring a custom error page
/// file named in `errors` (status code as a string key) when one exists
/// and is readable, and logging the outcome to `metrics`.
pub async fn render(status: u16, errors: &HashMap<String, String>, metrics: &Metrics) -> Response {
    metrics.record(status, "<error>");

    if let Some(custom_path) = errors.get(&status.to_string()) {
        if let Ok(body) = tokio::fs::read(custom_path).await {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return Response::builder()
                .status(code)
                .header("content-type", "text/html; charset=utf-8")
                .body(Body::from(body))
                .unwrap_or_else(|_| Response::new(Body::empty()));
        }
    }

    let message = match message_for(status) {
        "" => format!("Error {status}"),
        text => text.to_string(),
    };
    let body = format!("{PAGE_START}<h3>{message}</h3>{PAGE_END}");
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    Response::builder()
        .status(code)
        .header("content-type", "text/html; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn unknown_status_falls_back_to_generic_message() {
        let metrics = Metrics::disabled();
        let response = render(418, &HashMap::new(), &metrics).await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("Error 418"));
    }

    #[tokio::test]
    async fn known_status_renders_its_message() {
        let metrics = Metrics::disabled();
        let response = render(404, &HashMap::new(), &metrics).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("Page not found"));
    }
}
