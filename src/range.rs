use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{ContentLength, ContentRange};
use axum_extra::TypedHeader;

use crate::error::DeliveryError;

/// An inclusive byte window, always inside `[0, size)` of the entity it was
/// validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Validates `start..=end` against an entity of `size` bytes.
    pub fn new(start: u64, end: u64, size: u64) -> Result<Self, RangeNotSatisfiable> {
        if start > end || start >= size || end >= size {
            return Err(RangeNotSatisfiable { size });
        }
        Ok(ByteRange { start, end })
    }

    /// The whole entity, or `None` if it is empty.
    pub fn full(size: u64) -> Option<Self> {
        size.checked_sub(1).map(|end| ByteRange { start: 0, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeNotSatisfiable {
    pub size: u64,
}

impl RangeNotSatisfiable {
    pub fn content_range(&self) -> ContentRange {
        ContentRange::unsatisfied_bytes(self.size)
    }
}

impl From<RangeNotSatisfiable> for DeliveryError {
    fn from(err: RangeNotSatisfiable) -> Self {
        DeliveryError::RangeNotSatisfiable { size: err.size }
    }
}

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        (status, TypedHeader(self.content_range()), TypedHeader(ContentLength(0)), ()).into_response()
    }
}

/// Parses a raw `Range` header against an entity of `size` bytes.
///
/// Only the single-range form `bytes=<start>-<end>` is recognized, with either
/// bound optional (a missing start means 0, a missing end means the last byte).
/// Anything else, multi-range sets included, yields `Ok(None)` and the full
/// entity should be served. A recognized but out-of-bounds or inverted range
/// is an error.
pub fn parse_range(header: &str, size: u64) -> Result<Option<ByteRange>, RangeNotSatisfiable> {
    let Some((start, end)) = split_single_range(header) else {
        tracing::debug!(header, "ignoring unrecognized range header");
        return Ok(None);
    };

    let start = match start {
        "" => 0,
        digits => match parse_position(digits) {
            Some(start) => start,
            None => return Ok(None),
        },
    };
    let end = match end {
        "" => size.checked_sub(1).ok_or(RangeNotSatisfiable { size })?,
        digits => match parse_position(digits) {
            Some(end) => end,
            None => return Ok(None),
        },
    };

    ByteRange::new(start, end, size).map(Some)
}

fn split_single_range(header: &str) -> Option<(&str, &str)> {
    let (unit, set) = header.trim().split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") || set.contains(',') {
        return None;
    }
    let (start, end) = set.split_once('-')?;
    Some((start.trim(), end.trim()))
}

fn parse_position(digits: &str) -> Option<u64> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use axum_extra::headers::HeaderMapExt;

    use super::*;

    fn range(start: u64, end: u64, size: u64) -> Option<ByteRange> {
        Some(ByteRange::new(start, end, size).unwrap())
    }

    #[test]
    fn test_bounded_range() {
        assert_eq!(Ok(range(0, 99, 1000)), parse_range("bytes=0-99", 1000));
        assert_eq!(Ok(range(30, 30, 54)), parse_range("bytes=30-30", 54));
        assert_eq!(100, parse_range("bytes=0-99", 1000).unwrap().unwrap().len());
    }

    #[test]
    fn test_open_ended_range() {
        assert_eq!(Ok(range(40, 53, 54)), parse_range("bytes=40-", 54));
        assert_eq!(Ok(range(0, 19, 54)), parse_range("bytes=-19", 54));
        assert_eq!(Ok(range(0, 53, 54)), parse_range("bytes=-", 54));
    }

    #[test]
    fn test_unsatisfiable_range() {
        let err = Err(RangeNotSatisfiable { size: 1000 });
        assert_eq!(err, parse_range("bytes=2000-3000", 1000));
        assert_eq!(err, parse_range("bytes=500-400", 1000));
        assert_eq!(err, parse_range("bytes=0-1000", 1000));
        assert_eq!(err, parse_range("bytes=1000-", 1000));
        assert_eq!(Err(RangeNotSatisfiable { size: 0 }), parse_range("bytes=0-", 0));
    }

    #[test]
    fn test_unrecognized_forms_serve_full_entity() {
        assert_eq!(Ok(None), parse_range("bytes=0-10,20-30", 1000));
        assert_eq!(Ok(None), parse_range("items=0-10", 1000));
        assert_eq!(Ok(None), parse_range("bytes=abc-10", 1000));
        assert_eq!(Ok(None), parse_range("bytes=+5-10", 1000));
        assert_eq!(Ok(None), parse_range("bytes=10", 1000));
        assert_eq!(Ok(None), parse_range("", 1000));
    }

    #[test]
    fn test_unit_is_case_insensitive() {
        assert_eq!(Ok(range(5, 9, 10)), parse_range(" Bytes=5-9 ", 10));
    }

    #[test]
    fn test_valid_ranges_cover_exact_length() {
        let size = 37;
        for start in 0..size {
            for end in start..size {
                let parsed = parse_range(&format!("bytes={start}-{end}"), size).unwrap().unwrap();
                assert_eq!(end - start + 1, parsed.len());
            }
        }
    }

    #[test]
    fn test_not_satisfiable_response() {
        let response = RangeNotSatisfiable { size: 1000 }.into_response();
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
        assert_eq!(
            Some(ContentRange::unsatisfied_bytes(1000)),
            response.headers().typed_get::<ContentRange>()
        );
        assert_eq!("bytes */1000", response.headers()["content-range"]);
    }

    #[test]
    fn test_full_range() {
        assert_eq!(None, ByteRange::full(0));
        assert_eq!(range(0, 53, 54), ByteRange::full(54));
    }
}
