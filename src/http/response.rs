//! HTTP response building module
//!
//! Provides builders for the responses the file server emits. None of these
//! set the isolation headers; that happens once in [`super::headers::finalize`].

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use hyper::{Response, StatusCode};

pub type Body = Full<Bytes>;

/// Build 200 response for file contents
///
/// `Content-Length` always reflects the full file, even for HEAD.
pub fn build_file_response(data: Bytes, content_type: &str, is_head: bool) -> Response<Body> {
    let content_length = data.len();
    let body = if is_head { Bytes::new() } else { data };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, content_length)
        .body(Full::new(body))
        .unwrap_or_else(|e| {
            log_build_error("200", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build generic HTML response
pub fn build_html_response(content: String, is_head: bool) -> Response<Body> {
    build_file_response(Bytes::from(content), "text/html; charset=utf-8", is_head)
}

/// Build 301 redirect response
pub fn build_redirect_response(location: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, location)
        .header(CONTENT_LENGTH, 0)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("301", &e);
            error_fallback(StatusCode::INTERNAL_SERVER_ERROR)
        })
}

/// Build a plain-text error response, e.g. `404 Not Found`
pub fn build_error_response(status: StatusCode) -> Response<Body> {
    let text = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CONTENT_LENGTH, text.len())
        .body(Full::new(Bytes::from(text)))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            error_fallback(status)
        })
}

pub fn build_400_response() -> Response<Body> {
    build_error_response(StatusCode::BAD_REQUEST)
}

pub fn build_403_response() -> Response<Body> {
    build_error_response(StatusCode::FORBIDDEN)
}

pub fn build_404_response() -> Response<Body> {
    build_error_response(StatusCode::NOT_FOUND)
}

pub fn build_500_response() -> Response<Body> {
    build_error_response(StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn build_501_response() -> Response<Body> {
    build_error_response(StatusCode::NOT_IMPLEMENTED)
}

fn error_fallback(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
