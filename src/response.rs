use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::header::RANGE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{ContentLength, HeaderMapExt};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use tokio::sync::{mpsc, oneshot};

use crate::deliver::Deliverer;
use crate::error::DeliveryError;
use crate::headers;
use crate::options::OptionOverrides;
use crate::transport::TransportSink;

type Head = (StatusCode, HeaderMap);

/// [`TransportSink`] feeding an axum response from a separate task.
///
/// The head travels over a oneshot, body chunks over a bounded channel, so
/// a slow client applies backpressure to the file reads. Dropping the
/// response body closes the channel, which the streaming loop sees as a
/// disconnect.
#[derive(Debug)]
pub struct ChannelSink {
    head: Option<oneshot::Sender<Head>>,
    body: mpsc::Sender<io::Result<Bytes>>,
}

/// Response body stream. Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[derive(Debug)]
pub struct DeliveryBody {
    length: Option<u64>,
    chunks: mpsc::Receiver<io::Result<Bytes>>,
}

/// Creates a connected sink, head receiver and body.
pub fn channel(buffer: usize) -> (ChannelSink, oneshot::Receiver<Head>, DeliveryBody) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(buffer.max(1));
    let sink = ChannelSink { head: Some(head_tx), body: body_tx };
    let body = DeliveryBody { length: None, chunks: body_rx };
    (sink, head_rx, body)
}

impl ChannelSink {
    /// Ends the body with `err`, so the client sees a broken transfer rather
    /// than a short one.
    pub async fn fail(&mut self, err: io::Error) {
        let _ = self.body.send(Err(err)).await;
    }
}

impl TransportSink for ChannelSink {
    async fn send_head(&mut self, status: StatusCode, headers: HeaderMap) -> io::Result<()> {
        let head = self
            .head
            .take()
            .ok_or_else(|| io::Error::other("response head already sent"))?;
        head.send((status, headers))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.body
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    async fn flush(&mut self) -> io::Result<()> {
        // chunks are handed to the connection as soon as they are sent
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.body.is_closed()
    }
}

impl DeliveryBody {
    fn with_length(mut self, length: Option<u64>) -> Self {
        self.length = length;
        self
    }
}

impl IntoResponse for DeliveryBody {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl Body for DeliveryBody {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        match self.length {
            Some(length) => SizeHint::with_exact(length),
            None => SizeHint::default(),
        }
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl Stream for DeliveryBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        self.get_mut().chunks.poll_recv(cx)
    }
}

impl Deliverer {
    /// Delivers `path` as an axum [`Response`], reading the `Range` header
    /// from `request_headers`.
    ///
    /// The transfer runs on its own task; the returned response streams
    /// from it and cancels it when dropped.
    pub async fn respond(
        &self,
        path: impl Into<PathBuf>,
        request_headers: &HeaderMap,
        overrides: OptionOverrides,
    ) -> Response {
        let path = path.into();
        let range = request_headers
            .get(RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let (mut sink, head, body) = channel(self.config().body_buffer);

        let deliverer = self.clone();
        tokio::spawn(async move {
            let result = deliverer.deliver(&path, range.as_deref(), &overrides, &mut sink).await;
            if let Err(DeliveryError::Io(err)) = result {
                sink.fail(err).await;
            }
        });

        match head.await {
            Ok((status, headers)) => {
                let length = headers.typed_get::<ContentLength>().map(|length| length.0);
                let mut response = body.with_length(length).into_response();
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                response
            }
            Err(_) => {
                tracing::error!("delivery task ended without a response");
                (StatusCode::INTERNAL_SERVER_ERROR, headers::error()).into_response()
            }
        }
    }
}
