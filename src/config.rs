use serde::Deserialize;

use crate::chunk::ChunkSizes;
use crate::offload::PrefixHooks;
use crate::options::OptionOverrides;
use crate::stream::DEFAULT_FLUSH_THRESHOLD;

/// Instance-level configuration of a [`Deliverer`](crate::Deliverer).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Option layer applied beneath every per-call override.
    pub defaults: OptionOverrides,
    pub chunk_sizes: ChunkSizes,
    /// Bytes written between explicit flushes.
    pub flush_threshold: u64,
    /// The Nginx front end has an internal location for `X-Accel-Redirect`.
    pub nginx_offload: bool,
    /// Prefix of that internal location, e.g. `/protected-files/`.
    pub nginx_internal_prefix: Option<String>,
    /// Body chunks buffered between the streaming task and the HTTP connection.
    pub body_buffer: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            defaults: OptionOverrides::default(),
            chunk_sizes: ChunkSizes::default(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            nginx_offload: false,
            nginx_internal_prefix: None,
            body_buffer: 2,
        }
    }
}

impl DeliveryConfig {
    pub fn offload_hooks(&self) -> PrefixHooks {
        PrefixHooks {
            enabled: self.nginx_offload,
            internal_prefix: self.nginx_internal_prefix.clone(),
        }
    }
}
