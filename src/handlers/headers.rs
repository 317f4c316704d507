//! Security headers and content-type inference shared by every handler.
//!
//! Grounded on `original_source/http_utils.go`: `httpSetHeaders` and
//! `httpGetContentType`.

use std::collections::HashMap;

use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;

use crate::config::HstsConfig;

/// Apply the server's strict default security headers to `response`,
/// then overlay any operator-configured overrides from `custom`.
pub fn apply_security_headers(
    response: &mut Response,
    custom: &HashMap<String, String>,
    tls_enabled: bool,
    hsts: &HstsConfig,
) {
    let headers = response.headers_mut();
    set(headers, "x-frame-options", "SAMEORIGIN");
    set(headers, "x-content-type-options", "nosniff");
    set(headers, "x-xss-protection", "1; mode=block");
    set(headers, "referrer-policy", "no-referrer");
    set(headers, "content-security-policy", "default-src 'self'");
    set(
        headers,
        "feature-policy",
        "geolocation 'none'; midi 'none'; notifications 'none'; push 'none'; \
         sync-xhr 'none'; microphone 'none'; camera 'none'; magnetometer 'none'; \
         gyroscope 'none'; speaker 'none'; vibrate 'none'; fullscreen 'none'; payment 'none';",
    );
    set(headers, "server", "maguro");

    if tls_enabled {
        let mut value = format!("max-age={};", hsts.max_age);
        if hsts.include_subdomains {
            value.push_str(" includeSubdomains;");
        }
        if hsts.preload {
            value.push_str(" preload");
        }
        set(headers, "strict-transport-security", &value);
    }

    for (name, value) in custom {
        set(headers, name, value);
    }
}

fn set(headers: &mut axum::http::HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(name.to_ascii_lowercase()),
        HeaderValue::from_str(value),
    ) {
        headers.insert(name, value);
    }
}

/// Infer a response `Content-Type` from a served file's extension, with
/// `overrides` (operator-configured, keyed by full path) consulted first.
pub fn content_type_for(path: &str, overrides: &HashMap<String, String>) -> String {
    if let Some(value) = overrides.get(path) {
        return value.clone();
    }

    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "aac" => "audio/aac",
        "avi" => "video/x-msvideo",
        "bmp" => "image/bmp",
        "css" => "text/css; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "gif" => "image/gif",
        "html" | "htm" => "text/html; charset=utf-8",
        "jpeg" | "jpg" => "image/jpeg",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "mpeg" => "video/mpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "xhtml" => "application/xhtml-xml",
        "xml" => "application/xml; charset=utf-8",
        "zip" => "application/zip",
        _ => "application/x-unknown",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn content_type_known_extension() {
        assert_eq!(content_type_for("/a/b.css", &HashMap::new()), "text/css; charset=utf-8");
    }

    #[test]
    fn content_type_unknown_extension_falls_back() {
        assert_eq!(content_type_for("/a/b.weird", &HashMap::new()), "application/x-unknown");
    }

    #[test]
    fn security_headers_are_set() {
        let mut response = Response::new(Body::empty());
        apply_security_headers(&mut response, &HashMap::new(), false, &HstsConfig::default());
        assert_eq!(
            response.headers().get("x-frame-options").unwrap(),
            "SAMEORIGIN"
        );
        assert!(response.headers().get("strict-transport-security").is_none());
    }

    #[test]
    fn hsts_header_set_only_when_tls_enabled() {
        let mut response = Response::new(Body::empty());
        let hsts = HstsConfig {
            max_age: 3600,
            preload: true,
            include_subdomains: true,
        };
        apply_security_headers(&mut response, &HashMap::new(), true, &hsts);
        let value = response
            .headers()
            .get("strict-transport-security")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(value.contains("max-age=3600"));
        assert!(value.contains("includeSubdomains"));
        assert!(value.contains("preload"));
    }
}
