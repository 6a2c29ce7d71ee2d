use std::borrow::Cow;
use std::fmt::Write;

use axum::http::header::{
    ACCEPT_RANGES, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, EXPIRES, X_CONTENT_TYPE_OPTIONS,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, HeaderMapExt, Pragma};

use crate::disposition::{is_dangerous, Disposition};
use crate::offload::Offload;
use crate::options::DeliveryOptions;
use crate::probe::OCTET_STREAM;
use crate::range::{ByteRange, RangeNotSatisfiable};

pub const X_ROBOTS_TAG: HeaderName = HeaderName::from_static("x-robots-tag");
pub const CONTENT_DESCRIPTION: HeaderName = HeaderName::from_static("content-description");
pub const CONTENT_TRANSFER_ENCODING: HeaderName = HeaderName::from_static("content-transfer-encoding");

/// Content type and disposition after the dangerous-type override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveContent {
    pub mime_type: String,
    pub disposition: Disposition,
}

impl EffectiveContent {
    /// Script and markup types are always sent as an octet-stream attachment,
    /// whatever the disposition policy or the caller decided.
    pub fn of(options: &DeliveryOptions) -> Self {
        if is_dangerous(&options.mime_type) {
            tracing::debug!(mime_type = %options.mime_type, "forcing dangerous type to download");
            return EffectiveContent {
                mime_type: OCTET_STREAM.to_owned(),
                disposition: Disposition::Attachment,
            };
        }
        EffectiveContent {
            mime_type: options.mime_type.clone(),
            disposition: Disposition::from_force_download(options.force_download),
        }
    }
}

/// Builds response header sets for one resolved request.
#[derive(Debug, Clone, Copy)]
pub struct HeaderBuilder<'a> {
    options: &'a DeliveryOptions,
}

impl<'a> HeaderBuilder<'a> {
    pub fn new(options: &'a DeliveryOptions) -> Self {
        HeaderBuilder { options }
    }

    /// Cache, security, type and disposition headers shared by every
    /// successful response.
    pub fn common(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert_no_cache(&mut headers);
        insert_security(&mut headers);

        let content = EffectiveContent::of(self.options);
        let content_type = HeaderValue::from_str(&content.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM));
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(CONTENT_DESCRIPTION, HeaderValue::from_static("File Transfer"));
        headers.insert(CONTENT_TRANSFER_ENCODING, HeaderValue::from_static("binary"));
        headers.insert(
            CONTENT_DISPOSITION,
            content_disposition(content.disposition, &self.options.filename),
        );
        headers
    }

    /// Headers for a `200` response carrying all `size` bytes.
    pub fn full(&self, size: u64) -> HeaderMap {
        let mut headers = self.common();
        if self.options.range_enabled {
            headers.typed_insert(AcceptRanges::bytes());
        } else {
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("none"));
        }
        headers.typed_insert(ContentLength(size));
        headers
    }

    /// Headers for a `206` response carrying `range` of a `size`-byte entity.
    pub fn partial(&self, range: ByteRange, size: u64) -> HeaderMap {
        let mut headers = self.common();
        headers.typed_insert(AcceptRanges::bytes());
        if let Ok(content_range) = ContentRange::bytes(range.start()..=range.end(), size) {
            headers.typed_insert(content_range);
        }
        headers.typed_insert(ContentLength(range.len()));
        headers
    }

    /// Headers handing delivery to the front-end server, or `None` if the
    /// target can't be carried in a header. No length headers: the front end
    /// computes those itself.
    pub fn delegated(&self, offload: &Offload) -> Option<HeaderMap> {
        // non-ASCII paths go through as raw bytes
        let value = HeaderValue::from_bytes(offload.header_value().as_bytes()).ok()?;
        let mut headers = self.common();
        headers.insert(offload.header_name(), value);
        Some(headers)
    }
}

/// Headers for a terminal `416` response.
pub fn not_satisfiable(err: RangeNotSatisfiable) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_no_cache(&mut headers);
    insert_security(&mut headers);
    headers.typed_insert(err.content_range());
    headers.typed_insert(ContentLength(0));
    headers
}

/// Headers for a bodiless error response (404, 500).
pub fn error() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_no_cache(&mut headers);
    insert_security(&mut headers);
    headers.typed_insert(ContentLength(0));
    headers
}

fn insert_no_cache(headers: &mut HeaderMap) {
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store, must-revalidate"));
    headers.typed_insert(Pragma::no_cache());
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

fn insert_security(headers: &mut HeaderMap) {
    headers.insert(X_ROBOTS_TAG, HeaderValue::from_static("noindex, nofollow"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
}

/// `<token>; filename="<sanitized>"[; filename*=UTF-8''<encoded>]`
///
/// The extended parameter is only added when sanitizing changed the name.
pub fn content_disposition(disposition: Disposition, filename: &str) -> HeaderValue {
    let sanitized = sanitize_filename(filename);
    let mut value = format!("{}; filename=\"{}\"", disposition, sanitized);
    if let Cow::Owned(_) = sanitized {
        value.push_str("; filename*=UTF-8''");
        value.push_str(&encode_ext_value(filename));
    }
    // only ASCII survives sanitizing and encoding
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Replaces everything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(filename: &str) -> Cow<'_, str> {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if filename.chars().all(is_safe) {
        return Cow::Borrowed(filename);
    }
    Cow::Owned(
        filename
            .chars()
            .map(|c| if is_safe(c) { c } else { '_' })
            .collect(),
    )
}

/// Percent-encodes UTF-8 bytes outside the RFC 3986 unreserved set.
pub fn encode_ext_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
