//! An in-memory manager setup for tests.

use std::sync::Arc;

use ember_assets::prelude::*;
use serde::Serialize;

use crate::json_handler::JsonAssetHandler;

/// A manager backed by a [`MemoryStreamer`] and a [`SimpleCatalog`], with one
/// [`JsonAssetHandler`] registered for every type it was built with.
pub struct TestAssets {
    pub manager: AssetManager,
    pub streamer: MemoryStreamer,
    pub catalog: Arc<SimpleCatalog>,
    pub handler: Arc<JsonAssetHandler>,
}

impl TestAssets {
    pub fn new(workers: usize, handler: JsonAssetHandler) -> Self {
        let streamer = MemoryStreamer::new();
        let manager = AssetManager::new(
            AssetManagerDescriptor::default()
                .with_max_worker_threads(workers)
                .with_thread_name_prefix("ember-test")
                .with_streamer(Arc::new(streamer.clone())),
        )
        .expect("failed to create the test asset manager");

        let handler = Arc::new(handler);
        let catalog = Arc::new(SimpleCatalog::new());
        for asset_type in handler.handled_asset_types() {
            assert!(manager.register_handler(handler.clone(), asset_type));
            manager.register_catalog(catalog.clone(), asset_type);
        }

        Self {
            manager,
            streamer,
            catalog,
            handler,
        }
    }

    /// Store `value` as JSON and point the catalog at it.
    pub fn add_json<T: Serialize>(&self, id: AssetId, value: &T) {
        let bytes = serde_json::to_vec(value).expect("failed to serialize test asset");
        self.add_bytes(id, bytes);
    }

    pub fn add_bytes(&self, id: AssetId, bytes: Vec<u8>) {
        let name = Self::stream_name(id);
        self.streamer.insert(name.clone(), bytes);
        self.catalog.insert(id, name);
    }

    pub fn stream_name(id: AssetId) -> String {
        format!("{id}.json")
    }
}

impl Drop for TestAssets {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}
