//! The metrics endpoint and its HTTP Basic-Auth middleware.
//!
//! Grounded on `original_source/micro/metrics.go`'s `handleMetrics`; the
//! reference's cookie/session login flow (`guard/authorizer.go` +
//! `html/templatehandler.go`) is replaced with HTTP Basic-Auth per
//! `spec.md` §6, hashed with `argon2` rather than the reference's
//! `bcrypt` (no bcrypt crate is part of this crate's dependency stack).

use std::collections::HashMap;
use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use base64::Engine;

use crate::router::{BoxFuture, Handler};
use crate::server::context::VhostContext;

/// Render the metrics page.
pub async fn metrics_page(ctx: Arc<VhostContext>, _req: Request<Body>) -> Response {
    let body = format!(
        "<!DOCTYPE html><html><body>{}</body></html>",
        ctx.metrics.render_html()
    );
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/html; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn unauthorized() -> Response {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("www-authenticate", "Basic realm=\"maguro metrics\"")
        .body(Body::empty())
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn verify(users: &HashMap<String, String>, header: &str) -> bool {
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(text) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = text.split_once(':') else {
        return false;
    };
    let Some(hash) = users.get(user) else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(pass.as_bytes(), &parsed).is_ok()
}

/// Build Basic-Auth middleware that gates access to `users`' argon2 hashes.
pub fn require_basic_auth(users: Arc<HashMap<String, String>>) -> crate::router::Middleware {
    Arc::new(move |next: Handler| {
        let users = users.clone();
        let next = next.clone();
        Arc::new(move |req: Request<Body>| -> BoxFuture {
            let users = users.clone();
            let next = next.clone();
            Box::pin(async move {
                let authorized = req
                    .headers()
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(|header| verify(&users, header))
                    .unwrap_or(false);

                if authorized {
                    next(req).await
                } else {
                    unauthorized()
                }
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};

    fn hash_password(password: &str) -> String {
        let salt = SaltString::generate(&mut rand_core_shim());
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    // argon2's SaltString::generate wants an OsRng-shaped source; the
    // argon2 crate re-exports `password_hash::rand_core::OsRng` for this.
    fn rand_core_shim() -> argon2::password_hash::rand_core::OsRng {
        argon2::password_hash::rand_core::OsRng
    }

    #[test]
    fn verify_accepts_correct_password() {
        let mut users = HashMap::new();
        users.insert("admin".to_string(), hash_password("hunter2"));

        let creds = base64::engine::general_purpose::STANDARD.encode("admin:hunter2");
        assert!(verify(&users, &format!("Basic {creds}")));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let mut users = HashMap::new();
        users.insert("admin".to_string(), hash_password("hunter2"));

        let creds = base64::engine::general_purpose::STANDARD.encode("admin:wrong");
        assert!(!verify(&users, &format!("Basic {creds}")));
    }

    #[test]
    fn verify_rejects_unknown_user() {
        let users = HashMap::new();
        let creds = base64::engine::general_purpose::STANDARD.encode("nobody:x");
        assert!(!verify(&users, &format!("Basic {creds}")));
    }
}
