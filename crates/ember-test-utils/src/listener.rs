//! Listener that records every notification it receives.

use std::any::Any;

use ember_assets::prelude::*;
use parking_lot::Mutex;

/// One notification, as seen by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub kind: AssetEventMask,
    pub id: AssetId,
    /// Only set for `Saved` notifications.
    pub success: Option<bool>,
}

#[derive(Default)]
pub struct RecordingListener {
    received: Mutex<Vec<Received>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    pub fn count(&self, kind: AssetEventMask) -> usize {
        self.received.lock().iter().filter(|event| event.kind == kind).count()
    }

    pub fn count_for(&self, kind: AssetEventMask, id: AssetId) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|event| event.kind == kind && event.id == id)
            .count()
    }

    /// Kinds received for `id`, in delivery order.
    pub fn kinds_for(&self, id: AssetId) -> Vec<AssetEventMask> {
        self.received
            .lock()
            .iter()
            .filter(|event| event.id == id)
            .map(|event| event.kind)
            .collect()
    }

    pub fn clear(&self) {
        self.received.lock().clear();
    }

    fn push(&self, kind: AssetEventMask, id: AssetId, success: Option<bool>) {
        self.received.lock().push(Received { kind, id, success });
    }
}

impl AssetListener for RecordingListener {
    fn on_asset_ready(&self, asset: &UntypedAsset) {
        self.push(AssetEventMask::READY, asset.id(), None);
    }

    fn on_asset_moved(&self, asset: &UntypedAsset, _previous: &(dyn Any + Send + Sync)) {
        self.push(AssetEventMask::MOVED, asset.id(), None);
    }

    fn on_asset_reloaded(&self, asset: &UntypedAsset) {
        self.push(AssetEventMask::RELOADED, asset.id(), None);
    }

    fn on_asset_saved(&self, asset: &UntypedAsset, success: bool) {
        self.push(AssetEventMask::SAVED, asset.id(), Some(success));
    }

    fn on_asset_unloaded(&self, id: AssetId, _asset_type: AssetType) {
        self.push(AssetEventMask::UNLOADED, id, None);
    }

    fn on_asset_error(&self, asset: &UntypedAsset, _message: &str) {
        self.push(AssetEventMask::ERROR, asset.id(), None);
    }
}
