use serde::Deserialize;

pub const KIB: u32 = 1024;
pub const MIB: u32 = 1024 * KIB;

/// I/O chunk sizes per content category.
///
/// Large sequential media and archives get bigger reads to amortize syscall
/// overhead; small assets get smaller ones to keep buffering low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChunkSizes {
    pub video: u32,
    pub archive: u32,
    pub audio: u32,
    pub image: u32,
    pub default: u32,
}

impl Default for ChunkSizes {
    fn default() -> Self {
        ChunkSizes {
            video: 2 * MIB,
            archive: 4 * MIB,
            audio: MIB,
            image: 512 * KIB,
            default: MIB,
        }
    }
}

impl ChunkSizes {
    /// First matching rule wins: video, archive, audio, image, default.
    pub fn chunk_size_for(&self, mime_type: &str) -> u32 {
        let mime_type = mime_type.to_ascii_lowercase();
        let size = if mime_type.starts_with("video/") {
            self.video
        } else if ["zip", "compressed", "tar"].iter().any(|needle| mime_type.contains(needle)) {
            self.archive
        } else if mime_type.starts_with("audio/") {
            self.audio
        } else if mime_type.starts_with("image/") {
            self.image
        } else {
            self.default
        };
        // a zero from configuration would stall the streaming loop
        if size == 0 { ChunkSizes::default().chunk_size_for(&mime_type) } else { size }
    }
}

/// [`ChunkSizes::chunk_size_for`] with the built-in table.
pub fn chunk_size_for(mime_type: &str) -> u32 {
    ChunkSizes::default().chunk_size_for(mime_type)
}
