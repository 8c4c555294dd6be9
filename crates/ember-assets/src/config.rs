//! Manager configuration.

use std::fmt;
use std::sync::Arc;

use crate::io::StreamProvider;

/// Configuration for an [`AssetManager`](crate::AssetManager).
#[derive(Clone)]
pub struct AssetManagerDescriptor {
    /// Number of load/save worker threads. Clamped to at least one.
    pub max_worker_threads: usize,

    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,

    /// Opens the streams catalogs point at. Defaults to files under the working directory.
    pub streamer: Option<Arc<dyn StreamProvider>>,
}

impl Default for AssetManagerDescriptor {
    fn default() -> Self {
        Self {
            max_worker_threads: num_cpus::get().max(1),
            thread_name_prefix: "ember-asset".to_string(),
            streamer: None,
        }
    }
}

impl AssetManagerDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_worker_threads(mut self, count: usize) -> Self {
        self.max_worker_threads = count;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_streamer(mut self, streamer: Arc<dyn StreamProvider>) -> Self {
        self.streamer = Some(streamer);
        self
    }
}

impl fmt::Debug for AssetManagerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetManagerDescriptor")
            .field("max_worker_threads", &self.max_worker_threads)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("custom_streamer", &self.streamer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStreamer;

    #[test]
    fn test_defaults() {
        let desc = AssetManagerDescriptor::default();
        assert!(desc.max_worker_threads >= 1);
        assert!(desc.streamer.is_none());
    }

    #[test]
    fn test_builder() {
        let desc = AssetManagerDescriptor::new()
            .with_max_worker_threads(2)
            .with_thread_name_prefix("loader")
            .with_streamer(Arc::new(MemoryStreamer::new()));
        assert_eq!(desc.max_worker_threads, 2);
        assert_eq!(desc.thread_name_prefix, "loader");
        assert!(format!("{desc:?}").contains("custom_streamer: true"));
    }
}
