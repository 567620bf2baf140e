//! Connection handling module
//!
//! Each accepted TCP connection is served on its own tokio task, so a slow
//! client never blocks the accept loop or other connections. The socket is
//! wrapped in [`IsolatedIo`] so responses hyper writes without the service
//! still carry the isolation headers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::body::Body as _;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use super::io::{IsolatedIo, ResponseFrames};
use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Accept a connection, enforcing `performance.max_connections`.
///
/// `active` counts connections currently being served.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    active: &Arc<AtomicUsize>,
) {
    // increment first, then check, so two racing accepts cannot both slip in
    let prev_count = active.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = connection_limit(state.config.performance.max_connections) {
        if prev_count >= max_conn {
            active.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, Arc::clone(state), Arc::clone(active));
}

/// Effective connection cap; `max_connections = 0` means no limit
pub fn connection_limit(max_connections: Option<u64>) -> Option<usize> {
    max_connections
        .filter(|&max| max > 0)
        .map(|max| usize::try_from(max).unwrap_or(usize::MAX))
}

/// Serve one connection on a spawned task until the client goes away.
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    active: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        let frames = ResponseFrames::default();
        let io = TokioIo::new(IsolatedIo::new(stream, frames.clone()));

        let mut builder = http1::Builder::new();
        builder.keep_alive(state.config.performance.keep_alive);

        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let state = Arc::clone(&state);
                let frames = frames.clone();
                async move {
                    let response = handler::handle_request(req, state, peer_addr).await?;
                    frames.push(response.body().size_hint().exact().unwrap_or_default());
                    Ok::<_, Infallible>(response)
                }
            }),
        );

        if let Err(err) = conn.await {
            // clients hanging up mid-response are routine
            if err.is_incomplete_message() || err.is_canceled() {
                logger::log_debug(&format!("Connection {peer_addr} closed early: {err}"));
            } else {
                logger::log_connection_error(&peer_addr, &err);
            }
        }

        active.fetch_sub(1, Ordering::SeqCst);
    });
}
