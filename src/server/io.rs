//! Connection I/O wrapper
//!
//! hyper answers requests it cannot parse (400, 431, 505) by itself, before
//! the service ever runs. [`IsolatedIo`] sits between hyper and the socket
//! and passes those response heads through
//! [`headers::finalize_raw_head`]. Heads the service produced already carry
//! the isolation headers and go out untouched.
//!
//! Response boundaries are tracked on the write side: the service records
//! the body length of every response it returns in [`ResponseFrames`], and
//! heads written by hyper itself declare theirs in `Content-Length`.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::http::headers;
use crate::logger;

/// Heads larger than this are not examined; the rest of the connection
/// passes through as-is
const MAX_HEAD_LEN: usize = 64 * 1024;

/// Body lengths of the responses the service has handed to hyper, in order
#[derive(Debug, Clone, Default)]
pub struct ResponseFrames(Arc<Mutex<VecDeque<u64>>>);

impl ResponseFrames {
    /// Record a response about to be written; `body_len` is what hyper will
    /// put on the wire after the head (0 for HEAD requests)
    pub fn push(&self, body_len: u64) {
        if let Ok(mut frames) = self.0.lock() {
            frames.push_back(body_len);
        }
    }

    fn pop(&self) -> Option<u64> {
        self.0.lock().ok().and_then(|mut frames| frames.pop_front())
    }
}

enum WriteState {
    /// Collecting the next response head
    Head(Vec<u8>),
    /// Passing through this many body bytes
    Body(u64),
    Passthrough,
}

/// Stream wrapper that finalizes response heads hyper writes on its own
pub struct IsolatedIo<T> {
    inner: T,
    frames: ResponseFrames,
    state: WriteState,
    /// Head waiting to reach the socket
    pending: Vec<u8>,
    written: usize,
}

impl<T> IsolatedIo<T> {
    pub fn new(inner: T, frames: ResponseFrames) -> Self {
        Self {
            inner,
            frames,
            state: WriteState::Head(Vec::new()),
            pending: Vec::new(),
            written: 0,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn finish_head(&mut self, head: Vec<u8>) {
        let (bytes, body_len) = match headers::finalize_raw_head(&head) {
            None => {
                let body_len = self.frames.pop().unwrap_or_else(|| content_length(&head));
                (head, body_len)
            }
            Some(stamped) => {
                logger::log_debug("Adding isolation headers to a response written by hyper");
                (stamped, content_length(&head))
            }
        };

        self.pending = bytes;
        self.written = 0;
        self.state = if body_len == 0 {
            WriteState::Head(Vec::new())
        } else {
            WriteState::Body(body_len)
        };
    }
}

impl<T: AsyncWrite + Unpin> IsolatedIo<T> {
    fn poll_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.written < self.pending.len() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.pending[self.written..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.written += n;
        }
        self.pending.clear();
        self.written = 0;
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for IsolatedIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for IsolatedIo<T> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_pending(cx))?;

        match &mut this.state {
            WriteState::Passthrough => Pin::new(&mut this.inner).poll_write(cx, buf),
            WriteState::Body(remaining) => {
                let limit = usize::try_from(*remaining).map_or(buf.len(), |r| r.min(buf.len()));
                let n = ready!(Pin::new(&mut this.inner).poll_write(cx, &buf[..limit]))?;
                *remaining = remaining.saturating_sub(u64::try_from(n).unwrap_or(u64::MAX));
                if *remaining == 0 {
                    this.state = WriteState::Head(Vec::new());
                }
                Poll::Ready(Ok(n))
            }
            WriteState::Head(head) => {
                let old_len = head.len();
                // the terminator may straddle the previous write
                let search_from = old_len.saturating_sub(3);
                head.extend_from_slice(buf);

                match head[search_from..].windows(4).position(|w| w == b"\r\n\r\n") {
                    Some(pos) => {
                        let end = search_from + pos + 4;
                        head.truncate(end);
                        let head = std::mem::take(head);
                        this.finish_head(head);
                        Poll::Ready(Ok(end - old_len))
                    }
                    None if head.len() > MAX_HEAD_LEN => {
                        this.pending = std::mem::take(head);
                        this.written = 0;
                        this.state = WriteState::Passthrough;
                        Poll::Ready(Ok(buf.len()))
                    }
                    None => Poll::Ready(Ok(buf.len())),
                }
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_pending(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // an incomplete head is sent as-is rather than dropped
        if let WriteState::Head(head) = &mut this.state {
            if !head.is_empty() && this.pending.is_empty() {
                this.pending = std::mem::take(head);
                this.written = 0;
            }
        }
        ready!(this.poll_pending(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

fn content_length(head: &[u8]) -> u64 {
    headers::raw_header_value(head, "content-length")
        .and_then(|v| std::str::from_utf8(v).ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const HYPER_400: &[u8] = b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

    fn stamped_400() -> Vec<u8> {
        headers::finalize_raw_head(HYPER_400).unwrap()
    }

    async fn write_all_in_chunks(io: &mut IsolatedIo<Vec<u8>>, data: &[u8], chunk: usize) {
        for part in data.chunks(chunk) {
            io.write_all(part).await.unwrap();
        }
        io.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_hyper_error_head_stamped() {
        let mut io = IsolatedIo::new(Vec::new(), ResponseFrames::default());
        write_all_in_chunks(&mut io, HYPER_400, HYPER_400.len()).await;

        let out = io.into_inner();
        assert_eq!(out, stamped_400());
        assert!(out.starts_with(b"HTTP/1.1 400 Bad Request\r\ncross-origin-opener-policy: same-origin\r\n"));
    }

    #[tokio::test]
    async fn test_head_split_across_writes() {
        let mut io = IsolatedIo::new(Vec::new(), ResponseFrames::default());
        write_all_in_chunks(&mut io, HYPER_400, 3).await;
        assert_eq!(io.into_inner(), stamped_400());
    }

    #[tokio::test]
    async fn test_service_response_body_not_rewritten() {
        let frames = ResponseFrames::default();
        let mut io = IsolatedIo::new(Vec::new(), frames.clone());

        // a served file whose contents look like a response head
        let body = b"HTTP/1.1 400 Bad Request\r\n\r\n";
        let mut response = format!(
            "HTTP/1.1 200 OK\r\ncross-origin-opener-policy: same-origin\r\n\
             cross-origin-embedder-policy: require-corp\r\ncontent-length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        frames.push(body.len() as u64);

        write_all_in_chunks(&mut io, &response, 7).await;
        write_all_in_chunks(&mut io, HYPER_400, 64).await;

        let mut expected = response.clone();
        expected.extend_from_slice(&stamped_400());
        assert_eq!(io.into_inner(), expected);
    }

    #[tokio::test]
    async fn test_head_response_has_no_body() {
        let frames = ResponseFrames::default();
        let mut io = IsolatedIo::new(Vec::new(), frames.clone());

        // HEAD: Content-Length announces 5 bytes that never follow
        let head = b"HTTP/1.1 200 OK\r\ncross-origin-opener-policy: same-origin\r\ncontent-length: 5\r\n\r\n";
        frames.push(0);

        write_all_in_chunks(&mut io, head, head.len()).await;
        write_all_in_chunks(&mut io, HYPER_400, HYPER_400.len()).await;

        let mut expected = head.to_vec();
        expected.extend_from_slice(&stamped_400());
        assert_eq!(io.into_inner(), expected);
    }
}
