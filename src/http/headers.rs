//! Response finalization module
//!
//! Every response leaves the service through [`finalize`]. Responses hyper
//! writes on its own (requests it cannot parse never reach the service) get
//! the same headers through [`finalize_raw_head`]. These two are the only
//! places the cross-origin isolation headers are written.

use hyper::header::{HeaderName, HeaderValue, SERVER};
use hyper::Response;

use crate::config::HttpConfig;
use crate::logger;

pub const CROSS_ORIGIN_OPENER_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-opener-policy");
pub const CROSS_ORIGIN_EMBEDDER_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-embedder-policy");

pub const COOP_VALUE: &str = "same-origin";
pub const COEP_VALUE: &str = "require-corp";

/// Headers that make a document cross-origin isolated
pub const ISOLATION_HEADERS: [(HeaderName, &str); 2] = [
    (CROSS_ORIGIN_OPENER_POLICY, COOP_VALUE),
    (CROSS_ORIGIN_EMBEDDER_POLICY, COEP_VALUE),
];

/// Stamp the isolation headers and `Server` onto `response`.
///
/// Existing values for these headers are replaced.
pub fn finalize<B>(response: &mut Response<B>, http: &HttpConfig) {
    let headers = response.headers_mut();

    for (name, value) in ISOLATION_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }

    match HeaderValue::from_str(&http.server_name) {
        Ok(value) => {
            headers.insert(SERVER, value);
        }
        Err(e) => logger::log_debug(&format!(
            "Skipping Server header, invalid value '{}': {e}",
            http.server_name
        )),
    }
}

/// Raw-bytes counterpart of [`finalize`] for a serialized response head
/// (status line through the blank line).
///
/// Returns `None` when the head already carries
/// `Cross-Origin-Opener-Policy`, i.e. it came out of [`finalize`].
pub fn finalize_raw_head(head: &[u8]) -> Option<Vec<u8>> {
    if raw_header_value(head, CROSS_ORIGIN_OPENER_POLICY.as_str()).is_some() {
        return None;
    }
    let status_line_end = head.windows(2).position(|w| w == b"\r\n")? + 2;

    let mut out = Vec::with_capacity(head.len() + 96);
    out.extend_from_slice(&head[..status_line_end]);
    for (name, value) in ISOLATION_HEADERS {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(&head[status_line_end..]);
    Some(out)
}

/// Value of header `name` in a serialized response head, matched
/// case-insensitively
pub fn raw_header_value<'a>(head: &'a [u8], name: &str) -> Option<&'a [u8]> {
    head.split(|&b| b == b'\n').skip(1).find_map(|line| {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let colon = line.iter().position(|&b| b == b':')?;
        line[..colon]
            .eq_ignore_ascii_case(name.as_bytes())
            .then(|| line[colon + 1..].trim_ascii())
    })
}
