use std::io;
use std::path::Path;

use tokio::fs;

use crate::error::{DeliveryError, Result};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Known extensions, checked before asking the host's sniffer.
const EXTENSION_TYPES: &[(&str, &str)] = &[
    // documents
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    // media
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    // images
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    // archives
    ("zip", "application/zip"),
    ("rar", "application/x-rar-compressed"),
    ("7z", "application/x-7z-compressed"),
    ("tar", "application/x-tar"),
    ("gz", "application/gzip"),
    // text
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("xml", "application/xml"),
];

/// Size and type of the file about to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Host-provided content type detection, consulted for extensions the
/// built-in table doesn't know.
pub trait MimeSniffer: Send + Sync {
    fn sniff(&self, path: &Path) -> Option<String>;
}

/// [`MimeSniffer`] backed by the `mime_guess` database.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuessSniffer;

impl MimeSniffer for GuessSniffer {
    fn sniff(&self, path: &Path) -> Option<String> {
        mime_guess::from_path(path).first_raw().map(str::to_owned)
    }
}

/// A sniffer that never recognizes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSniffer;

impl MimeSniffer for NoSniffer {
    fn sniff(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Looks `path`'s extension up in the built-in table.
pub fn mime_type_from_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Resolves the content type: extension table, then sniffer, then octet-stream.
pub fn detect_mime_type(path: &Path, sniffer: &dyn MimeSniffer) -> String {
    mime_type_from_extension(path)
        .map(str::to_owned)
        .or_else(|| sniffer.sniff(path))
        .unwrap_or_else(|| OCTET_STREAM.to_owned())
}

/// Stats and classifies `path`. Fails before anything is written to the client.
pub async fn probe(path: &Path, sniffer: &dyn MimeSniffer) -> Result<FileMetadata> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Err(DeliveryError::NotFound { path: path.to_owned() }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(DeliveryError::NotFound { path: path.to_owned() });
        }
        Err(_) => return Err(DeliveryError::NotReadable { path: path.to_owned() }),
    };

    // opening without reading is the only portable readability check
    if fs::File::open(path).await.is_err() {
        return Err(DeliveryError::NotReadable { path: path.to_owned() });
    }

    Ok(FileMetadata {
        size_bytes: metadata.len(),
        mime_type: detect_mime_type(path, sniffer),
    })
}
