use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::range::ByteRange;
use crate::transport::{is_disconnect, TransportSink};

/// Bytes written between explicit flushes.
pub const DEFAULT_FLUSH_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Lifecycle of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Seeking,
    Transmitting,
    Closed,
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub bytes_sent: u64,
    /// The client disconnected before the window was fully sent.
    pub aborted: bool,
}

/// Copies a byte window from a reader to a [`TransportSink`] in bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct StreamingEngine {
    chunk_size: u64,
    flush_threshold: u64,
}

impl StreamingEngine {
    pub fn new(chunk_size: u32, flush_threshold: u64) -> Self {
        StreamingEngine {
            chunk_size: u64::from(chunk_size.max(1)),
            flush_threshold,
        }
    }

    /// Sends `range` of `body` to `sink`.
    ///
    /// Stops early, without error, when the client disconnects or the body
    /// ends before the window does. `body` is dropped and `sink` flushed on
    /// every exit path.
    pub async fn transmit<B, T>(&self, mut body: B, range: ByteRange, sink: &mut T) -> io::Result<Transfer>
    where
        B: AsyncRead + AsyncSeek + Unpin,
        T: TransportSink,
    {
        let mut state = StreamState::Open;
        let mut transfer = Transfer { bytes_sent: 0, aborted: false };

        let result = self.pump(&mut body, range, sink, &mut state, &mut transfer).await;

        drop(body);
        state = StreamState::Closed;
        let flushed = sink.flush().await;
        tracing::trace!(?state, bytes = transfer.bytes_sent, aborted = transfer.aborted, "stream closed");

        match (result, flushed) {
            (Err(e), _) if is_disconnect(&e) => {
                transfer.aborted = true;
                Ok(transfer)
            }
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) if !transfer.aborted && !is_disconnect(&e) => Err(e),
            (Ok(()), Err(_)) => {
                transfer.aborted = true;
                Ok(transfer)
            }
            (Ok(()), Ok(())) => Ok(transfer),
        }
    }

    async fn pump<B, T>(
        &self,
        body: &mut B,
        range: ByteRange,
        sink: &mut T,
        state: &mut StreamState,
        transfer: &mut Transfer,
    ) -> io::Result<()>
    where
        B: AsyncRead + AsyncSeek + Unpin,
        T: TransportSink,
    {
        if range.start() > 0 {
            *state = StreamState::Seeking;
            body.seek(io::SeekFrom::Start(range.start())).await?;
        }

        *state = StreamState::Transmitting;
        let mut remaining = range.len();
        let mut since_flush = 0;

        while remaining > 0 {
            if !sink.is_connected() {
                tracing::debug!(sent = transfer.bytes_sent, remaining, "client disconnected");
                transfer.aborted = true;
                break;
            }

            let chunk = read_chunk(body, self.chunk_size.min(remaining)).await?;
            if chunk.is_empty() {
                // file shrank since it was probed
                tracing::debug!(sent = transfer.bytes_sent, remaining, "end of file before end of range");
                break;
            }

            let n = chunk.len() as u64;
            sink.write(chunk).await?;
            transfer.bytes_sent += n;
            remaining -= n;

            since_flush += n;
            if since_flush >= self.flush_threshold {
                sink.flush().await?;
                since_flush = 0;
            }
        }
        Ok(())
    }
}

/// Reads up to `len` bytes, fewer only at end of file.
async fn read_chunk<B>(body: &mut B, len: u64) -> io::Result<Bytes>
where
    B: AsyncRead + Unpin,
{
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    let mut buffer = BytesMut::zeroed(len);
    let mut filled = 0;
    while filled < len {
        match body.read(&mut buffer[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    buffer.truncate(filled);
    Ok(buffer.freeze())
}
