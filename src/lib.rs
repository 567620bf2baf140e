//! A static file server that makes every page it serves cross-origin isolated.
//!
//! Each response carries `Cross-Origin-Opener-Policy: same-origin` and
//! `Cross-Origin-Embedder-Policy: require-corp`, which browsers require before
//! enabling `SharedArrayBuffer` and threaded WebAssembly.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
