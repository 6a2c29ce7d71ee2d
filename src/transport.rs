use std::future::Future;
use std::io;

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;

/// Where a delivery writes its response.
///
/// The head is sent exactly once, before any body chunk. Writes to a peer
/// that has gone away fail with a disconnect kind (`BrokenPipe`,
/// `ConnectionReset` or `ConnectionAborted`).
pub trait TransportSink: Send {
    fn send_head(
        &mut self,
        status: StatusCode,
        headers: HeaderMap,
    ) -> impl Future<Output = io::Result<()>> + Send;

    fn write(&mut self, chunk: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Pushes anything buffered towards the client.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Whether the client is still listening.
    fn is_connected(&self) -> bool;
}

/// Whether `err` means the client went away rather than a real failure.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}
