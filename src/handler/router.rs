//! Request dispatch module
//!
//! Entry point for HTTP request processing: method validation, static file
//! dispatch, response finalization, and access logging.

use crate::config::AppState;
use crate::handler::static_files;
use crate::http::{self, Body};
use crate::logger::{self, AccessLogEntry};
use hyper::body::Body as _;
use hyper::header::{HeaderName, REFERER, USER_AGENT};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    /// Raw (still percent-encoded) request path
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
}

/// Main entry point for HTTP request handling
///
/// Every response, whatever branch produced it, passes through
/// [`http::finalize`] exactly once before it is returned.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    let started = Instant::now();
    // request bodies are never read
    let (parts, _) = req.into_parts();

    let mut response = dispatch(&parts, &state).await;
    http::finalize(&mut response, &state.config.http);

    if state.config.logging.access_log {
        log_access(&parts, &response, &state, peer_addr, started);
    }

    Ok(response)
}

async fn dispatch(req: &Parts, state: &AppState) -> Response<Body> {
    let is_head = match req.method {
        Method::GET => false,
        Method::HEAD => true,
        ref other => {
            logger::log_warning(&format!("Method not implemented: {other}"));
            return http::build_501_response();
        }
    };

    let ctx = RequestContext {
        path: req.uri.path(),
        query: req.uri.query(),
        is_head,
    };

    static_files::serve(&ctx, state).await
}

fn log_access(
    req: &Parts,
    response: &Response<Body>,
    state: &AppState,
    peer_addr: SocketAddr,
    started: Instant,
) {
    let header = |name: HeaderName| {
        req.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        &peer_addr,
        req.method.to_string(),
        req.uri.path().to_string(),
    );
    entry.query = req.uri.query().map(ToString::to_string);
    entry.http_version = version_label(req.version).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default();
    entry.referer = header(REFERER);
    entry.user_agent = header(USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

    logger::log_access(&entry, &state.config.logging.access_log_format);
}

fn version_label(version: hyper::Version) -> &'static str {
    match version {
        hyper::Version::HTTP_09 => "0.9",
        hyper::Version::HTTP_10 => "1.0",
        hyper::Version::HTTP_2 => "2",
        hyper::Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;
    use hyper::StatusCode;

    fn state_for(dir: &std::path::Path) -> Arc<AppState> {
        let mut config = Config::default();
        config.server.root = dir.to_path_buf();
        config.logging.access_log = false;
        Arc::new(AppState::new(config).unwrap())
    }

    async fn call(state: &Arc<AppState>, method: Method, uri: &str) -> Response<Body> {
        let req = Request::builder().method(method).uri(uri).body(()).unwrap();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        handle_request(req, Arc::clone(state), peer).await.unwrap()
    }

    fn assert_isolated(resp: &Response<Body>) {
        assert_eq!(resp.headers()["cross-origin-opener-policy"], "same-origin");
        assert_eq!(resp.headers()["cross-origin-embedder-policy"], "require-corp");
    }

    #[tokio::test]
    async fn test_get_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("module.mjs"), "export default 1;").unwrap();
        let state = state_for(dir.path());

        let resp = call(&state, Method::GET, "/module.mjs").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/javascript");
        assert_isolated(&resp);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"export default 1;");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());

        let resp = call(&state, Method::GET, "/missing.txt").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let state = state_for(dir.path());

        for method in [Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS] {
            let resp = call(&state, method, "/a.txt").await;
            assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
            assert_isolated(&resp);
        }
    }

    #[tokio::test]
    async fn test_directory_redirect_keeps_query() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        let state = state_for(dir.path());

        let resp = call(&state, Method::GET, "/docs?lang=en").await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.headers()["location"], "/docs/?lang=en");
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_directory_redirect_stays_on_site() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("evil.example")).unwrap();
        let state = state_for(dir.path());

        for target in ["//evil.example", "///evil.example?x=1", "/./evil.example"] {
            let resp = call(&state, Method::GET, target).await;
            assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
            let location = resp.headers()["location"].to_str().unwrap();
            assert!(location.starts_with("/evil.example/"), "{target} -> {location}");
        }
    }

    #[tokio::test]
    async fn test_index_file_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        let state = state_for(dir.path());

        let resp = call(&state, Method::GET, "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/html");
    }

    #[tokio::test]
    async fn test_listing_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.root = dir.path().to_path_buf();
        config.http.directory_listing = false;
        let state = Arc::new(AppState::new(config).unwrap());

        let resp = call(&state, Method::GET, "/").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_isolated(&resp);
    }

    #[tokio::test]
    async fn test_file_with_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let state = state_for(dir.path());

        let resp = call(&state, Method::GET, "/a.txt/").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());

        let resp = call(&state, Method::GET, "/a%00.txt").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_isolated(&resp);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_root_refused() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt"))
            .unwrap();
        let state = state_for(dir.path());

        let resp = call(&state, Method::GET, "/link.txt").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(!body.windows(6).any(|w| w == b"secret"));
    }
}
