use std::path::Path;

use serde::Deserialize;

use crate::chunk::ChunkSizes;
use crate::disposition::should_force_download;
use crate::probe::FileMetadata;

/// One layer of delivery settings. Unset fields defer to the layer below,
/// and finally to detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OptionOverrides {
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub force_download: Option<bool>,
    pub chunk_size: Option<u32>,
    pub range_enabled: Option<bool>,
}

impl OptionOverrides {
    /// Built-in defaults, the bottom layer.
    pub fn builtin() -> Self {
        OptionOverrides { range_enabled: Some(true), ..Default::default() }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn force_download(mut self, force_download: bool) -> Self {
        self.force_download = Some(force_download);
        self
    }

    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn range_enabled(mut self, range_enabled: bool) -> Self {
        self.range_enabled = Some(range_enabled);
        self
    }

    /// Stacks `upper` on top of `self`, key by key.
    pub fn layer(&self, upper: &OptionOverrides) -> OptionOverrides {
        OptionOverrides {
            filename: upper.filename.clone().or_else(|| self.filename.clone()),
            mime_type: upper.mime_type.clone().or_else(|| self.mime_type.clone()),
            force_download: upper.force_download.or(self.force_download),
            chunk_size: upper.chunk_size.filter(|&size| size > 0).or(self.chunk_size),
            range_enabled: upper.range_enabled.or(self.range_enabled),
        }
    }
}

/// Fully resolved settings for a single request. Never mutated after
/// [`DeliveryOptions::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub filename: String,
    pub mime_type: String,
    pub force_download: bool,
    pub chunk_size_bytes: u32,
    pub range_enabled: bool,
}

impl DeliveryOptions {
    /// Merges built-in defaults, `instance` and `call` (later wins), then
    /// fills the remaining gaps from `path`, `metadata` and the policies.
    pub fn resolve(
        path: &Path,
        metadata: &FileMetadata,
        instance: &OptionOverrides,
        call: &OptionOverrides,
        chunk_sizes: &ChunkSizes,
    ) -> DeliveryOptions {
        let merged = OptionOverrides::builtin().layer(instance).layer(call);

        let mime_type = merged
            .mime_type
            .filter(|mime| !mime.trim().is_empty())
            .unwrap_or_else(|| metadata.mime_type.clone());
        let filename = merged.filename.unwrap_or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let force_download = merged
            .force_download
            .unwrap_or_else(|| should_force_download(&mime_type));
        let chunk_size_bytes = merged
            .chunk_size
            .filter(|&size| size > 0)
            .unwrap_or_else(|| chunk_sizes.chunk_size_for(&mime_type));

        DeliveryOptions {
            filename,
            mime_type,
            force_download,
            chunk_size_bytes,
            range_enabled: merged.range_enabled.unwrap_or(true),
        }
    }
}
