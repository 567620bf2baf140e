//! Server module
//!
//! Listener creation, the accept loop, and per-connection tasks.

pub mod connection;
pub mod io;
pub mod listener;
pub mod serve;

pub use listener::create_listener;
pub use serve::run;
