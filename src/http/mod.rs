//! HTTP protocol layer module
//!
//! Protocol-level building blocks, decoupled from request dispatch:
//! MIME lookup, request path resolution, response builders, and the
//! finalization hook that stamps isolation headers.

pub mod headers;
pub mod mime;
pub mod path;
pub mod response;

// Re-export commonly used types
pub use headers::finalize;
pub use response::{
    build_400_response, build_403_response, build_404_response, build_500_response,
    build_501_response, build_file_response, build_html_response, build_redirect_response, Body,
};
