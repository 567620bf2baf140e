//! Static file serving module
//!
//! Resolves a request path under the served root and answers with the file,
//! a directory index, a directory listing, or an error status.

use std::io;
use std::path::{Path, PathBuf};

use hyper::body::Bytes;
use hyper::Response;
use tokio::fs;

use crate::config::AppState;
use crate::handler::listing;
use crate::handler::router::RequestContext;
use crate::http::path::{PathError, RequestPath};
use crate::http::{self, Body};
use crate::logger;

/// Serve whatever `ctx.path` names under the served root
pub async fn serve(ctx: &RequestContext<'_>, state: &AppState) -> Response<Body> {
    let request_path = match RequestPath::parse(ctx.path) {
        Ok(p) => p,
        Err(PathError::Malformed) => {
            logger::log_warning(&format!("Malformed request path: {}", ctx.path));
            return http::build_400_response();
        }
        Err(PathError::Traversal) => {
            logger::log_warning(&format!("Path traversal attempt blocked: {}", ctx.path));
            return http::build_404_response();
        }
    };

    let resolved = match resolve_within_root(state, &request_path.to_fs_path(&state.root)).await {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let metadata = match fs::metadata(&resolved).await {
        Ok(m) => m,
        Err(e) => return io_error_response(&e, &resolved),
    };

    if metadata.is_dir() {
        serve_directory(ctx, state, &request_path, &resolved).await
    } else if metadata.is_file() && !request_path.has_trailing_slash() {
        serve_file(ctx, state, &resolved).await
    } else {
        // "/file.txt/" or a special file (socket, fifo, device)
        http::build_404_response()
    }
}

/// Serve a directory: redirect to the slash form, then index file, then listing
async fn serve_directory(
    ctx: &RequestContext<'_>,
    state: &AppState,
    request_path: &RequestPath,
    dir: &Path,
) -> Response<Body> {
    if !request_path.has_trailing_slash() && !request_path.is_root() {
        // built from the normalized path: a raw "//host" would redirect off-site
        let location = match ctx.query {
            Some(q) => format!("{}/?{q}", request_path.url_path()),
            None => format!("{}/", request_path.url_path()),
        };
        return http::build_redirect_response(&location);
    }

    for index_file in &state.config.http.index_files {
        let candidate = dir.join(index_file);
        let is_file = fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        return match resolve_within_root(state, &candidate).await {
            Ok(index_path) => serve_file(ctx, state, &index_path).await,
            Err(resp) => resp,
        };
    }

    if !state.config.http.directory_listing {
        return http::build_404_response();
    }

    match listing::read_entries(dir).await {
        Ok(entries) => {
            let html = listing::render(&request_path.display(), &entries);
            http::build_html_response(html, ctx.is_head)
        }
        Err(e) => io_error_response(&e, dir),
    }
}

/// Serve a regular file that is already known to be inside the root
async fn serve_file(ctx: &RequestContext<'_>, state: &AppState, path: &Path) -> Response<Body> {
    let content = match fs::read(path).await {
        Ok(c) => c,
        Err(e) => return io_error_response(&e, path),
    };

    let content_type = state.mime.content_type(path);
    http::build_file_response(Bytes::from(content), content_type, ctx.is_head)
}

/// Canonicalize `path` and make sure it has not left the served root.
///
/// Symlinks are followed, so a link pointing outside the root is refused.
async fn resolve_within_root(state: &AppState, path: &Path) -> Result<PathBuf, Response<Body>> {
    // File not found is common (404), no need to log at warning level
    let canonical = fs::canonicalize(path).await.map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => http::build_403_response(),
        _ => http::build_404_response(),
    })?;

    if !canonical.starts_with(&state.root) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {} -> {}",
            path.display(),
            canonical.display()
        ));
        return Err(http::build_404_response());
    }

    Ok(canonical)
}

/// Map a filesystem error to a response status
fn io_error_response(err: &io::Error, path: &Path) -> Response<Body> {
    match err.kind() {
        io::ErrorKind::NotFound => http::build_404_response(),
        io::ErrorKind::PermissionDenied => {
            logger::log_debug(&format!("Permission denied: {}", path.display()));
            http::build_403_response()
        }
        _ => {
            logger::log_error(&format!("Failed to read '{}': {err}", path.display()));
            http::build_500_response()
        }
    }
}
