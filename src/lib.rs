//! # axum-deliver
//!
//! Resumable single-file delivery for [`axum`][1].
//!
//! Given an absolute path the caller has already authorized, a [`Deliverer`]
//! classifies the file, decides between inline display and download, and then
//! either hands the transfer to the front-end server (`X-Sendfile` for Apache
//! and LiteSpeed, `X-Accel-Redirect` for Nginx) or streams the bytes itself,
//! honouring a single-range `Range` header.
//!
//! Any [`TransportSink`] can receive the response. [`Deliverer::respond`]
//! wires one up to an axum [`Response`](axum::response::Response).
//!
//! ```
//! use axum::Router;
//! use axum::extract::State;
//! use axum::http::HeaderMap;
//! use axum::response::Response;
//! use axum::routing::get;
//!
//! use axum_deliver::{Deliverer, DeliveryConfig, OptionOverrides};
//!
//! async fn report(State(deliverer): State<Deliverer>, headers: HeaderMap) -> Response {
//!     // access checks happen before this point
//!     deliverer
//!         .respond("/srv/files/report.pdf", &headers, OptionOverrides::default())
//!         .await
//! }
//!
//! let _app: Router = Router::new()
//!     .route("/report", get(report))
//!     .with_state(Deliverer::new(DeliveryConfig::default()));
//! ```
//!
//! [1]: https://docs.rs/axum

mod chunk;
mod config;
mod deliver;
mod disposition;
mod error;
mod headers;
mod offload;
mod options;
mod probe;
mod range;
mod response;
mod stream;
mod transport;

pub use chunk::{chunk_size_for, ChunkSizes};
pub use config::DeliveryConfig;
pub use deliver::{Delivered, Deliverer, DeliveryKind};
pub use disposition::{is_dangerous, should_force_download, Disposition};
pub use error::{DeliveryError, Result};
pub use headers::{content_disposition, sanitize_filename, EffectiveContent, HeaderBuilder};
pub use offload::{
    detect as detect_offload, NoHooks, Offload, OffloadHooks, PrefixHooks, ServerEnvironment, ServerKind,
    XSENDFILE_MODULE,
};
pub use options::{DeliveryOptions, OptionOverrides};
pub use probe::{probe, FileMetadata, GuessSniffer, MimeSniffer, NoSniffer};
pub use range::{parse_range, ByteRange, RangeNotSatisfiable};
pub use response::{channel, ChannelSink, DeliveryBody};
pub use stream::{StreamState, StreamingEngine, Transfer, DEFAULT_FLUSH_THRESHOLD};
pub use transport::{is_disconnect, TransportSink};
