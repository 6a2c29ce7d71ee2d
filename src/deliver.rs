use std::path::Path;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use tokio::fs::File;

use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, Result};
use crate::headers::{self, HeaderBuilder};
use crate::offload::{self, Offload, OffloadHooks, ServerEnvironment};
use crate::options::{DeliveryOptions, OptionOverrides};
use crate::probe::{self, GuessSniffer, MimeSniffer};
use crate::range::{parse_range, ByteRange};
use crate::stream::StreamingEngine;
use crate::transport::{is_disconnect, TransportSink};

/// What a successful delivery sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryKind {
    /// `200` with the whole file.
    Full,
    /// `206` with one byte window.
    Partial(ByteRange),
    /// `200` with a delegation header and no body.
    Delegated(Offload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub kind: DeliveryKind,
    pub bytes_sent: u64,
    /// The client disconnected mid-transfer.
    pub aborted: bool,
}

/// Delivers pre-authorized files. Cheap to clone; share one per application.
#[derive(Clone)]
pub struct Deliverer {
    config: Arc<DeliveryConfig>,
    environment: Arc<ServerEnvironment>,
    hooks: Arc<dyn OffloadHooks>,
    sniffer: Arc<dyn MimeSniffer>,
}

impl std::fmt::Debug for Deliverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deliverer")
            .field("config", &self.config)
            .field("environment", &self.environment)
            .finish()
    }
}

impl Deliverer {
    /// A deliverer for a standalone host (no offload), with Nginx hooks
    /// taken from `config` should the environment be replaced later.
    pub fn new(config: DeliveryConfig) -> Self {
        let hooks = Arc::new(config.offload_hooks());
        Deliverer {
            config: Arc::new(config),
            environment: Arc::new(ServerEnvironment::standalone()),
            hooks,
            sniffer: Arc::new(GuessSniffer),
        }
    }

    pub fn with_environment(mut self, environment: ServerEnvironment) -> Self {
        self.environment = Arc::new(environment);
        self
    }

    pub fn with_hooks(mut self, hooks: impl OffloadHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_sniffer(mut self, sniffer: impl MimeSniffer + 'static) -> Self {
        self.sniffer = Arc::new(sniffer);
        self
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Sends `path` to `sink`, honouring `range_header` when range support
    /// is enabled.
    ///
    /// Exactly one response is written: the file (whole or partial), a
    /// delegation header, or a bodiless error. On `Err` the error response
    /// has already been sent, unless the failure happened mid-body.
    pub async fn deliver<T>(
        &self,
        path: &Path,
        range_header: Option<&str>,
        overrides: &OptionOverrides,
        sink: &mut T,
    ) -> Result<Delivered>
    where
        T: TransportSink,
    {
        let metadata = match probe::probe(path, self.sniffer.as_ref()).await {
            Ok(metadata) => metadata,
            Err(err) => return Err(reject(sink, err).await),
        };
        let options = DeliveryOptions::resolve(
            path,
            &metadata,
            &self.config.defaults,
            overrides,
            &self.config.chunk_sizes,
        );
        tracing::debug!(
            path = %path.display(),
            size = metadata.size_bytes,
            mime_type = %options.mime_type,
            force_download = options.force_download,
            chunk_size = options.chunk_size_bytes,
            range_enabled = options.range_enabled,
            "resolved delivery options"
        );
        let builder = HeaderBuilder::new(&options);

        if let Some(offload) = offload::detect(&self.environment, self.hooks.as_ref(), path) {
            if let Some(headers) = builder.delegated(&offload) {
                tracing::debug!(header = %offload.header_name(), destination = offload.header_value(), "delegating to front end");
                send_head(sink, StatusCode::OK, headers).await?;
                return Ok(Delivered { kind: DeliveryKind::Delegated(offload), bytes_sent: 0, aborted: false });
            }
            tracing::warn!(destination = offload.header_value(), "offload target not representable as a header, streaming instead");
        }

        let size = metadata.size_bytes;
        let range = match range_header.filter(|_| options.range_enabled) {
            Some(header) => match parse_range(header, size) {
                Ok(range) => range,
                Err(err) => {
                    tracing::debug!(header, size, "range not satisfiable");
                    send_head(sink, StatusCode::RANGE_NOT_SATISFIABLE, headers::not_satisfiable(err)).await?;
                    return Err(err.into());
                }
            },
            None => None,
        };

        let file = match File::open(path).await {
            Ok(file) => file,
            Err(source) => {
                let err = DeliveryError::OpenFailure { path: path.to_owned(), source };
                return Err(reject(sink, err).await);
            }
        };

        let (kind, status, head, window) = match range {
            Some(range) => (
                DeliveryKind::Partial(range),
                StatusCode::PARTIAL_CONTENT,
                builder.partial(range, size),
                Some(range),
            ),
            None => (DeliveryKind::Full, StatusCode::OK, builder.full(size), ByteRange::full(size)),
        };

        if let Err(err) = sink.send_head(status, head).await {
            if is_disconnect(&err) {
                tracing::debug!(path = %path.display(), "client gone before response head");
                return Ok(Delivered { kind, bytes_sent: 0, aborted: true });
            }
            return Err(DeliveryError::Transport(err.to_string()));
        }

        let Some(window) = window else {
            // empty file, nothing to stream
            if let Err(err) = sink.flush().await {
                if is_disconnect(&err) {
                    tracing::debug!(path = %path.display(), "client gone before flush");
                    return Ok(Delivered { kind, bytes_sent: 0, aborted: true });
                }
                tracing::warn!(path = %path.display(), error = %err, "flush failed");
                return Err(DeliveryError::Io(err));
            }
            return Ok(Delivered { kind, bytes_sent: 0, aborted: false });
        };

        let engine = StreamingEngine::new(options.chunk_size_bytes, self.config.flush_threshold);
        let transfer = engine.transmit(file, window, sink).await.map_err(|err| {
            tracing::warn!(path = %path.display(), error = %err, "transfer failed");
            DeliveryError::Io(err)
        })?;

        if transfer.aborted {
            tracing::warn!(path = %path.display(), bytes = transfer.bytes_sent, "client disconnected mid-transfer");
        } else {
            tracing::info!(path = %path.display(), status = status.as_u16(), bytes = transfer.bytes_sent, "delivered");
        }

        Ok(Delivered { kind, bytes_sent: transfer.bytes_sent, aborted: transfer.aborted })
    }
}

async fn send_head<T: TransportSink>(sink: &mut T, status: StatusCode, headers: HeaderMap) -> Result<()> {
    match sink.send_head(status, headers).await {
        Ok(()) => Ok(()),
        Err(err) if is_disconnect(&err) => Ok(()),
        Err(err) => Err(DeliveryError::Transport(err.to_string())),
    }
}

/// Answers with `err`'s status and no body, then hands `err` back.
async fn reject<T: TransportSink>(sink: &mut T, err: DeliveryError) -> DeliveryError {
    tracing::debug!(error = %err, "rejecting delivery");
    if let Err(send_err) = sink.send_head(err.status_code(), headers::error()).await {
        tracing::debug!(error = %send_err, "could not send error response");
    }
    err
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::ops::Deref;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;
    use crate::offload::{PrefixHooks, XSENDFILE_MODULE};
    use crate::probe::NoSniffer;
    use crate::transport::testing::RecordingSink;

    static NEXT_FILE: AtomicU32 = AtomicU32::new(0);

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    /// A file in the temp dir, removed on drop.
    struct TempFile(PathBuf);

    impl Deref for TempFile {
        type Target = Path;

        fn deref(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    async fn temp_file(extension: &str, data: &[u8]) -> TempFile {
        let name = format!(
            "axum-deliver-{}-{}.{extension}",
            std::process::id(),
            NEXT_FILE.fetch_add(1, Ordering::SeqCst)
        );
        let path = std::env::temp_dir().join(name);
        tokio::fs::write(&path, data).await.unwrap();
        TempFile(path)
    }

    /// Counts how often the content type had to be guessed from the path.
    #[derive(Clone, Default)]
    struct CountingSniffer(Arc<AtomicUsize>);

    impl MimeSniffer for CountingSniffer {
        fn sniff(&self, _path: &Path) -> Option<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    fn deliverer() -> Deliverer {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Deliverer::new(DeliveryConfig::default())
    }

    #[tokio::test]
    async fn test_partial_first_hundred_bytes() {
        let data = content(1000);
        let path = temp_file("bin", &data).await;
        let mut sink = RecordingSink::new();

        let delivered = deliverer()
            .deliver(&path, Some("bytes=0-99"), &OptionOverrides::default(), &mut sink)
            .await
            .unwrap();

        assert_eq!(Some(StatusCode::PARTIAL_CONTENT), sink.status);
        assert_eq!("bytes 0-99/1000", sink.headers["content-range"]);
        assert_eq!("100", sink.headers["content-length"]);
        assert_eq!("bytes", sink.headers["accept-ranges"]);
        assert_eq!(&data[..100], &sink.body[..]);
        assert_matches!(delivered.kind, DeliveryKind::Partial(range) if range.start() == 0 && range.end() == 99);
        assert_eq!(100, delivered.bytes_sent);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range_is_terminal() {
        let path = temp_file("bin", &content(1000)).await;
        let mut sink = RecordingSink::new();

        let err = deliverer()
            .deliver(&path, Some("bytes=2000-3000"), &OptionOverrides::default(), &mut sink)
            .await
            .unwrap_err();

        assert_matches!(err, DeliveryError::RangeNotSatisfiable { size: 1000 });
        assert_eq!(Some(StatusCode::RANGE_NOT_SATISFIABLE), sink.status);
        assert_eq!("bytes */1000", sink.headers["content-range"]);
        assert_eq!(1, sink.heads);
        assert_eq!(0, sink.writes);
        assert!(sink.body.is_empty());
    }

    #[tokio::test]
    async fn test_full_response() {
        let mut sink = RecordingSink::new();

        let delivered = deliverer()
            .deliver(Path::new("test/fixture.txt"), None, &OptionOverrides::default(), &mut sink)
            .await
            .unwrap();

        assert_eq!(Some(StatusCode::OK), sink.status);
        assert_eq!("54", sink.headers["content-length"]);
        assert_eq!("bytes", sink.headers["accept-ranges"]);
        assert_eq!("text/plain", sink.headers["content-type"]);
        assert_eq!("inline; filename=\"fixture.txt\"", sink.headers["content-disposition"]);
        assert!(sink.headers.get("content-range").is_none());
        assert_eq!(b"Hello world this is a file to test range requests on!\n", &sink.body[..]);
        assert_eq!(Delivered { kind: DeliveryKind::Full, bytes_sent: 54, aborted: false }, delivered);
    }

    #[tokio::test]
    async fn test_unrecognized_range_serves_full_file() {
        let mut sink = RecordingSink::new();

        deliverer()
            .deliver(Path::new("test/fixture.txt"), Some("bytes=0-4,10-14"), &OptionOverrides::default(), &mut sink)
            .await
            .unwrap();

        assert_eq!(Some(StatusCode::OK), sink.status);
        assert_eq!(54, sink.body.len());
    }

    #[tokio::test]
    async fn test_range_disabled_ignores_header() {
        let mut sink = RecordingSink::new();
        let overrides = OptionOverrides::default().range_enabled(false);

        deliverer()
            .deliver(Path::new("test/fixture.txt"), Some("bytes=999-"), &overrides, &mut sink)
            .await
            .unwrap();

        assert_eq!(Some(StatusCode::OK), sink.status);
        assert_eq!("none", sink.headers["accept-ranges"]);
        assert_eq!(54, sink.body.len());
    }

    #[tokio::test]
    async fn test_missing_file_is_404_before_anything_else() {
        let mut sink = RecordingSink::new();

        let err = deliverer()
            .deliver(Path::new("test/missing.pdf"), Some("bytes=0-1"), &OptionOverrides::default(), &mut sink)
            .await
            .unwrap_err();

        assert_matches!(err, DeliveryError::NotFound { .. });
        assert_eq!(Some(StatusCode::NOT_FOUND), sink.status);
        assert_eq!(1, sink.heads);
        assert!(sink.body.is_empty());
        assert!(sink.headers.get("content-type").is_none());
    }

    #[tokio::test]
    async fn test_apache_offload_reads_nothing() {
        let path = temp_file("unknownext", &content(1000)).await;
        let sniffer = CountingSniffer::default();
        let mut sink = RecordingSink::new();
        let deliverer = deliverer()
            .with_environment(ServerEnvironment::new("Apache/2.4.57", [XSENDFILE_MODULE]))
            .with_sniffer(sniffer.clone());

        let delivered = deliverer
            .deliver(&path, Some("bytes=0-99"), &OptionOverrides::default(), &mut sink)
            .await
            .unwrap();

        assert_eq!(Some(StatusCode::OK), sink.status);
        let sendfile: Vec<_> = sink.headers.get_all("x-sendfile").iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(vec![path.to_str().unwrap()], sendfile);
        assert!(sink.headers.get("content-length").is_none());
        assert_eq!("application/octet-stream", sink.headers["content-type"]);
        // classified from the path alone, and the streaming engine never ran
        assert_eq!(1, sniffer.0.load(Ordering::SeqCst));
        assert_eq!(0, sink.writes);
        assert_eq!(0, sink.flushes);
        assert!(sink.body.is_empty());
        assert_eq!(0, delivered.bytes_sent);
        assert_matches!(delivered.kind, DeliveryKind::Delegated(Offload::Sendfile(_)));
    }

    #[tokio::test]
    async fn test_nginx_offload_uses_internal_uri() {
        let path = temp_file("zip", &content(10)).await;
        let file_name = path.file_name().unwrap().to_str().unwrap().to_owned();
        let mut sink = RecordingSink::new();
        let deliverer = deliverer()
            .with_environment(ServerEnvironment::new("nginx/1.25.3", Vec::<String>::new()))
            .with_hooks(PrefixHooks { enabled: true, internal_prefix: Some("/protected/".to_owned()) });

        deliverer
            .deliver(&path, None, &OptionOverrides::default(), &mut sink)
            .await
            .unwrap();

        assert_eq!(format!("/protected/{file_name}"), sink.headers["x-accel-redirect"].to_str().unwrap());
        assert!(sink.headers.get("x-sendfile").is_none());
        assert!(sink.body.is_empty());
    }

    #[tokio::test]
    async fn test_html_is_always_an_attachment() {
        let path = temp_file("html", b"<script>alert(1)</script>").await;
        let mut sink = RecordingSink::new();
        let overrides = OptionOverrides::default().force_download(false).filename("page.html");

        deliverer().deliver(&path, None, &overrides, &mut sink).await.unwrap();

        assert_eq!("application/octet-stream", sink.headers["content-type"]);
        assert_eq!("attachment; filename=\"page.html\"", sink.headers["content-disposition"]);
    }

    #[tokio::test]
    async fn test_sniffer_fallback_and_default_download() {
        let path = temp_file("unknownext", &content(10)).await;
        let mut sink = RecordingSink::new();

        deliverer()
            .with_sniffer(NoSniffer)
            .deliver(&path, None, &OptionOverrides::default(), &mut sink)
            .await
            .unwrap();

        assert_eq!("application/octet-stream", sink.headers["content-type"]);
        assert!(sink.headers["content-disposition"].to_str().unwrap().starts_with("attachment;"));
    }

    #[tokio::test]
    async fn test_instance_defaults_and_call_overrides() {
        let config = DeliveryConfig {
            defaults: OptionOverrides::default().force_download(true).chunk_size(7),
            ..DeliveryConfig::default()
        };
        let deliverer = Deliverer::new(config);
        let mut sink = RecordingSink::new();

        deliverer
            .deliver(Path::new("test/fixture.txt"), None, &OptionOverrides::default().filename("notes.txt"), &mut sink)
            .await
            .unwrap();

        assert_eq!("attachment; filename=\"notes.txt\"", sink.headers["content-disposition"]);
        // 54 bytes in chunks of 7
        assert_eq!(8, sink.writes);
    }

    #[tokio::test]
    async fn test_disconnect_is_not_an_error() {
        let path = temp_file("bin", &content(1000)).await;
        let mut sink = RecordingSink::disconnecting_after(2);
        let overrides = OptionOverrides::default().chunk_size(100);

        let delivered = deliverer().deliver(&path, None, &overrides, &mut sink).await.unwrap();

        assert!(delivered.aborted);
        assert_eq!(200, delivered.bytes_sent);
        assert_eq!(1, sink.flushes);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let path = temp_file("txt", b"").await;

        let mut sink = RecordingSink::new();
        let delivered = deliverer().deliver(&path, None, &OptionOverrides::default(), &mut sink).await.unwrap();
        assert_eq!(Some(StatusCode::OK), sink.status);
        assert_eq!("0", sink.headers["content-length"]);
        assert_eq!(0, delivered.bytes_sent);

        let mut sink = RecordingSink::new();
        let err = deliverer().deliver(&path, Some("bytes=0-"), &OptionOverrides::default(), &mut sink).await.unwrap_err();
        assert_matches!(err, DeliveryError::RangeNotSatisfiable { size: 0 });
        assert_eq!("bytes */0", sink.headers["content-range"]);
    }

    #[tokio::test]
    async fn test_empty_file_flush_failure() {
        let path = temp_file("txt", b"").await;

        let mut sink = RecordingSink::failing_flush(io::ErrorKind::ConnectionReset);
        let delivered = deliverer().deliver(&path, None, &OptionOverrides::default(), &mut sink).await.unwrap();
        assert!(delivered.aborted);
        assert_eq!(1, sink.flushes);

        let mut sink = RecordingSink::failing_flush(io::ErrorKind::Other);
        let err = deliverer().deliver(&path, None, &OptionOverrides::default(), &mut sink).await.unwrap_err();
        assert_matches!(err, DeliveryError::Io(_));
    }

    #[tokio::test]
    async fn test_temp_file_is_removed_on_drop() {
        let file = temp_file("bin", b"x").await;
        let path = file.to_path_buf();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_identical_requests_identical_responses() {
        let path = temp_file("mp4", &content(5000)).await;
        let mut first = RecordingSink::new();
        let mut second = RecordingSink::new();

        for sink in [&mut first, &mut second] {
            deliverer()
                .deliver(&path, Some("bytes=100-4999"), &OptionOverrides::default(), sink)
                .await
                .unwrap();
        }

        assert_eq!(first.status, second.status);
        assert_eq!(first.headers, second.headers);
        assert_eq!(first.body, second.body);
    }
}
