use std::fmt;

/// Content types that must never be rendered by the browser.
const DANGEROUS_TYPES: &[&str] = &[
    "text/html",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "application/x-httpd-php",
];

/// Inline rendering types outside the `image/`, `video/` and `audio/` families.
const INLINE_TYPES: &[&str] = &["application/pdf", "text/plain", "text/csv"];

/// The `Content-Disposition` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    pub fn from_force_download(force_download: bool) -> Self {
        if force_download {
            Disposition::Attachment
        } else {
            Disposition::Inline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a file of `mime_type` should be saved rather than shown.
///
/// Only consulted when the caller left `force_download` unset. Images, audio,
/// video, PDF, plain text and CSV render inline; everything else downloads.
pub fn should_force_download(mime_type: &str) -> bool {
    let mime_type = essence(mime_type).to_ascii_lowercase();
    if mime_type.starts_with("image/")
        || mime_type.starts_with("video/")
        || mime_type.starts_with("audio/")
    {
        return false;
    }
    !INLINE_TYPES.contains(&mime_type.as_str())
}

/// Script or markup types, matched case-insensitively and ignoring
/// parameters such as `charset`.
pub fn is_dangerous(mime_type: &str) -> bool {
    let mime_type = essence(mime_type);
    DANGEROUS_TYPES
        .iter()
        .any(|dangerous| dangerous.eq_ignore_ascii_case(mime_type))
}

/// `type/subtype` without parameters.
fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or_default().trim()
}
