//! A host/path/method/content-type request router.
//!
//! Unlike axum's own path router, `Router` matches on the 4-tuple of
//! host, path, method and `Content-Type`, with an explicit fallback
//! arbitration between a request's actual host and the
//! [`DEFAULT_HOST`] sentinel. It is framework-agnostic: it owns no
//! socket and borrows nothing from axum beyond the `http` request and
//! response types, so it can be exercised directly in tests without a
//! listener. The HTTP transport (`crate::server`) dispatches into a
//! single `Router` as its only route.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use http::{Method, Request};
use parking_lot::RwLock;

/// Host value that matches any host lacking a more specific route.
pub const DEFAULT_HOST: &str = "DEFAULT";

/// A boxed, pinned future yielding a response. Handlers and middleware
/// are expressed in terms of this so the router stays executor-agnostic.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A route handler: takes ownership of the request, returns a response.
pub type Handler = Arc<dyn Fn(Request<Body>) -> BoxFuture + Send + Sync>;

/// Middleware wraps one handler to produce another.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// The result of looking up a route: either a handler ready to run
/// (together with any middleware registered on its path), or the HTTP
/// status that should be returned instead.
#[derive(Clone)]
pub enum RouteOutcome {
    /// A route matched; dispatch to `handler` with `middleware` applied
    /// outermost-last (the first entry wraps everything else).
    Matched {
        /// The terminal handler for the matched route.
        handler: Handler,
        /// Middleware registered on the matched path, in registration order.
        middleware: Vec<Middleware>,
    },
    /// No host+path combination matched at all.
    NotFound,
    /// Host and path matched but no route exists for the request method.
    MethodNotAllowed,
    /// Host, path and method matched but the request's `Content-Type`
    /// is not one the route accepts.
    MediaNotSupported,
}

#[derive(Clone)]
struct MethodRoute {
    handler: Handler,
    path_fallback: bool,
    content: String,
}

impl MethodRoute {
    fn content_allowed(&self, content_type: &str) -> bool {
        if self.content == "*" {
            return true;
        }
        let content_type = content_type.split(';').next().unwrap_or("").trim();
        if self.content.contains(';') {
            return self
                .content
                .split(';')
                .any(|v| v.trim() == content_type);
        }
        self.content == content_type
    }
}

#[derive(Clone, Default)]
struct PathRoute {
    sub_routes: HashMap<Method, MethodRoute>,
    middleware: Vec<Middleware>,
}

/// Routes HTTP requests to handlers by host, path, method and content type.
pub struct Router {
    routes: RwLock<HashMap<(String, String), PathRoute>>,
}

impl Router {
    /// An empty router with no registered routes.
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Register a route. `host` should be a concrete hostname or
    /// [`DEFAULT_HOST`]. `content` may list multiple accepted
    /// `Content-Type` values separated by `;`, or `"*"` to accept any.
    ///
    /// # Panics
    ///
    /// Panics if `host` or `path` is empty, mirroring the reference
    /// router's refusal to register a route nobody could ever reach.
    pub fn add_route(
        &self,
        host: &str,
        path: &str,
        fallback: bool,
        method: Method,
        content: &str,
        handler: Handler,
    ) {
        assert!(!host.is_empty(), "router: empty host");
        assert!(!path.is_empty(), "router: empty path");

        let path = normalize_path(path);
        let mut routes = self.routes.write();
        let entry = routes
            .entry((host.to_string(), path))
            .or_insert_with(PathRoute::default);
        entry.sub_routes.insert(
            method,
            MethodRoute {
                handler,
                path_fallback: fallback,
                content: content.to_string(),
            },
        );
    }

    /// Register middleware on a host+path pair. Applies to every method
    /// registered (now or later) under that exact path.
    pub fn use_middleware(&self, host: &str, path: &str, middleware: Middleware) {
        assert!(!host.is_empty(), "router: empty host");
        assert!(!path.is_empty(), "router: empty path");

        let path = normalize_path(path);
        let mut routes = self.routes.write();
        let entry = routes
            .entry((host.to_string(), path))
            .or_insert_with(PathRoute::default);
        entry.middleware.push(middleware);
    }

    /// Resolve a request's host, path, method and content type to a
    /// route, following the reference router's seven-case arbitration
    /// between the request host and [`DEFAULT_HOST`].
    pub fn lookup(&self, host: &str, path: &str, method: &Method, content_type: &str) -> RouteOutcome {
        let routes = self.routes.read();
        let path = normalize_path(path);

        let (host_found, host_exact, host_match) = match_route(&routes, host, &path);
        let (default_found, default_exact, default_match) =
            match_route(&routes, DEFAULT_HOST, &path);

        let (path_route, exact_match) = match (
            host_found,
            host_exact,
            default_found,
            default_exact,
        ) {
            // case 1: a route for host only.
            (true, _, false, _) => (host_match, host_exact),
            // case 2: a route for DEFAULT_HOST only.
            (false, _, true, _) => (default_match, default_exact),
            // case 3: both found, host was exact, default was not.
            (true, true, true, false) => (host_match, host_exact),
            // case 4: both found, default was exact, host was not.
            (true, false, true, true) => (default_match, default_exact),
            // case 5: both found and both exact -> host wins.
            (true, true, true, true) => (host_match, host_exact),
            // case 6: both found and neither exact -> host wins.
            (true, false, true, false) => (host_match, host_exact),
            // case 7: nothing found at all.
            _ => return RouteOutcome::NotFound,
        };

        let path_route = match path_route {
            Some(route) => route,
            None => return RouteOutcome::NotFound,
        };

        let method_route = match path_route.sub_routes.get(method) {
            Some(route) => route,
            None => return RouteOutcome::MethodNotAllowed,
        };

        if !method_route.content_allowed(content_type) {
            return RouteOutcome::MediaNotSupported;
        }

        if !exact_match && !method_route.path_fallback {
            return RouteOutcome::NotFound;
        }

        RouteOutcome::Matched {
            handler: method_route.handler.clone(),
            middleware: path_route.middleware.clone(),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose a handler with its middleware, innermost handler last, so the
/// first middleware registered wraps outermost (runs first).
pub fn compose(handler: Handler, middleware: &[Middleware]) -> Handler {
    let mut wrapped = handler;
    for mw in middleware.iter().rev() {
        wrapped = mw(wrapped);
    }
    wrapped
}

fn match_route<'a>(
    routes: &'a HashMap<(String, String), PathRoute>,
    host: &str,
    path: &str,
) -> (bool, bool, Option<PathRoute>) {
    if let Some(route) = routes.get(&(host.to_string(), path.to_string())) {
        return (true, true, Some(route.clone()));
    }

    for ancestor in path_ancestors(path) {
        if let Some(route) = routes.get(&(host.to_string(), ancestor.to_string())) {
            return (true, false, Some(route.clone()));
        }
    }

    if let Some(route) = routes.get(&(host.to_string(), "/".to_string())) {
        return (true, false, Some(route.clone()));
    }

    (false, false, None)
}

/// Yield each strict ancestor directory of `path`, down to (not
/// including) `/`, e.g. `/a/b/c` -> `/a/b`, `/a`.
fn path_ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(
        if path == "/" {
            None
        } else {
            Some(parent_of(path))
        },
        |p| {
            if *p == "/" {
                None
            } else {
                Some(parent_of(p))
            }
        },
    )
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

/// Strip a trailing slash from a non-root path, matching the reference
/// router's registration-time normalization.
fn normalize_path(path: &str) -> String {
    if path != "/" && path.ends_with('/') {
        path[..path.len() - 1].to_string()
    } else {
        path.to_string()
    }
}

/// Strip an optional `:port` suffix from a `Host` header value.
pub fn strip_host_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn noop_handler() -> Handler {
        Arc::new(|_req| Box::pin(async { Response::new(Body::empty()) }))
    }

    fn lookup_status(router: &Router, host: &str, path: &str, method: Method, content: &str) -> Option<&'static str> {
        match router.lookup(host, path, &method, content) {
            RouteOutcome::Matched { .. } => None,
            RouteOutcome::NotFound => Some("404"),
            RouteOutcome::MethodNotAllowed => Some("405"),
            RouteOutcome::MediaNotSupported => Some("406"),
        }
    }

    #[test]
    fn exact_match_dispatches() {
        let router = Router::new();
        router.add_route(DEFAULT_HOST, "/foo", false, Method::GET, "*", noop_handler());
        assert!(lookup_status(&router, "example.com", "/foo", Method::GET, "text/plain").is_none());
    }

    #[test]
    fn unmatched_path_is_404() {
        let router = Router::new();
        router.add_route(DEFAULT_HOST, "/foo", false, Method::GET, "*", noop_handler());
        assert_eq!(
            lookup_status(&router, "example.com", "/bar", Method::GET, "text/plain"),
            Some("404")
        );
    }

    #[test]
    fn wrong_method_is_405() {
        let router = Router::new();
        router.add_route(DEFAULT_HOST, "/foo", false, Method::GET, "*", noop_handler());
        assert_eq!(
            lookup_status(&router, "example.com", "/foo", Method::POST, "text/plain"),
            Some("405")
        );
    }

    #[test]
    fn wrong_content_type_is_406() {
        let router = Router::new();
        router.add_route(
            DEFAULT_HOST,
            "/foo",
            false,
            Method::POST,
            "application/json",
            noop_handler(),
        );
        assert_eq!(
            lookup_status(&router, "example.com", "/foo", Method::POST, "text/plain"),
            Some("406")
        );
    }

    #[test]
    fn multi_value_content_type_matches_any() {
        let router = Router::new();
        router.add_route(
            DEFAULT_HOST,
            "/foo",
            false,
            Method::POST,
            "application/json;text/plain",
            noop_handler(),
        );
        assert!(lookup_status(&router, "h", "/foo", Method::POST, "text/plain").is_none());
        assert!(lookup_status(&router, "h", "/foo", Method::POST, "application/json; charset=utf-8").is_none());
    }

    #[test]
    fn subpath_without_fallback_is_404() {
        let router = Router::new();
        router.add_route(DEFAULT_HOST, "/foo", false, Method::GET, "*", noop_handler());
        assert_eq!(
            lookup_status(&router, "h", "/foo/bar", Method::GET, "text/plain"),
            Some("404")
        );
    }

    #[test]
    fn subpath_with_fallback_dispatches() {
        let router = Router::new();
        router.add_route(DEFAULT_HOST, "/foo", true, Method::GET, "*", noop_handler());
        assert!(lookup_status(&router, "h", "/foo/bar", Method::GET, "text/plain").is_none());
    }

    /// Case 1: a route exists for the host but not DEFAULT_HOST -> host wins.
    #[test]
    fn host_specific_route_wins_when_default_absent() {
        let router = Router::new();
        router.add_route("example.com", "/foo", false, Method::GET, "*", noop_handler());
        assert!(lookup_status(&router, "example.com", "/foo", Method::GET, "t").is_none());
        assert_eq!(
            lookup_status(&router, "other.com", "/foo", Method::GET, "t"),
            Some("404")
        );
    }

    /// Case 2: only DEFAULT_HOST has a route -> it serves every host.
    #[test]
    fn default_host_route_serves_any_host_when_host_specific_absent() {
        let router = Router::new();
        router.add_route(DEFAULT_HOST, "/foo", false, Method::GET, "*", noop_handler());
        assert!(lookup_status(&router, "whatever.com", "/foo", Method::GET, "t").is_none());
    }

    /// Case 4: DEFAULT_HOST route is exact, host route is only a subpath
    /// fallback match -> DEFAULT_HOST wins.
    #[test]
    fn exact_default_host_beats_inexact_specific_host() {
        let router = Router::new();
        router.add_route(DEFAULT_HOST, "/foo", false, Method::GET, "*", noop_handler());
        router.add_route("example.com", "/foo/bar", true, Method::GET, "*", noop_handler());
        // example.com requests /foo: host route /foo/bar is not an ancestor
        // match for /foo, so only the DEFAULT_HOST exact match applies.
        assert!(lookup_status(&router, "example.com", "/foo", Method::GET, "t").is_none());
    }

    #[test]
    fn middleware_is_attached_to_matched_route() {
        let router = Router::new();
        router.add_route(DEFAULT_HOST, "/foo", false, Method::GET, "*", noop_handler());
        let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen2 = seen.clone();
        let mw: Middleware = Arc::new(move |next| {
            let seen = seen2.clone();
            Arc::new(move |req| {
                seen.store(true, std::sync::atomic::Ordering::SeqCst);
                next(req)
            })
        });
        router.use_middleware(DEFAULT_HOST, "/foo", mw);

        match router.lookup("h", "/foo", &Method::GET, "*") {
            RouteOutcome::Matched { handler, middleware } => {
                let wrapped = compose(handler, &middleware);
                let req = Request::builder().body(Body::empty()).unwrap();
                let _ = futures_executor_block_on(wrapped(req));
                assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
            }
            _ => panic!("expected match"),
        }
    }

    #[test]
    fn strip_host_port_removes_port() {
        assert_eq!(strip_host_port("localhost"), "localhost");
        assert_eq!(strip_host_port("localhost:8080"), "localhost");
    }

    // Minimal block_on so router tests don't need a tokio runtime just to
    // drive a handful of boxed futures.
    fn futures_executor_block_on<F: Future>(fut: F) -> F::Output {
        let mut fut = Box::pin(fut);
        let waker = noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        loop {
            if let std::task::Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
                return out;
            }
        }
    }

    fn noop_waker() -> std::task::Waker {
        use std::task::{RawWaker, RawWakerVTable, Waker};
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }
}
