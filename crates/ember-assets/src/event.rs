//! Asset notifications and the listeners that receive them.
//!
//! Worker threads only enqueue [`AssetEvent`]s. Listeners are called from
//! [`AssetManager::dispatch_events`](crate::AssetManager::dispatch_events) on the
//! thread that owns the manager.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use parking_lot::RwLock;

use crate::data::ErasedPayload;
use crate::handle::UntypedAsset;
use crate::id::{AssetId, AssetType};

/// Events emitted by the asset manager.
#[derive(Debug)]
pub enum AssetEvent {
    /// A load finished successfully.
    Ready {
        asset: UntypedAsset,
    },

    /// A reload replaced the payload. `previous` is dropped after dispatch.
    Moved {
        asset: UntypedAsset,
        previous: ErasedPayload,
    },

    /// A reload finished successfully.
    Reloaded {
        asset: UntypedAsset,
    },

    /// A save job finished.
    Saved {
        asset: UntypedAsset,
        success: bool,
    },

    /// The last handle went away and the instance is about to be destroyed.
    Unloaded {
        id: AssetId,
        asset_type: AssetType,
    },

    /// A load or reload failed.
    Error {
        asset: UntypedAsset,
        message: String,
    },
}

impl AssetEvent {
    pub fn id(&self) -> AssetId {
        match self {
            AssetEvent::Unloaded { id, .. } => *id,
            other => other.asset().map_or(AssetId::INVALID, UntypedAsset::id),
        }
    }

    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetEvent::Unloaded { asset_type, .. } => *asset_type,
            other => other.asset().map_or(AssetType::NIL, UntypedAsset::asset_type),
        }
    }

    /// The handle carried by the event, if any.
    pub fn asset(&self) -> Option<&UntypedAsset> {
        match self {
            AssetEvent::Ready { asset }
            | AssetEvent::Moved { asset, .. }
            | AssetEvent::Reloaded { asset }
            | AssetEvent::Saved { asset, .. }
            | AssetEvent::Error { asset, .. } => Some(asset),
            AssetEvent::Unloaded { .. } => None,
        }
    }

    pub fn kind(&self) -> AssetEventMask {
        match self {
            AssetEvent::Ready { .. } => AssetEventMask::READY,
            AssetEvent::Moved { .. } => AssetEventMask::MOVED,
            AssetEvent::Reloaded { .. } => AssetEventMask::RELOADED,
            AssetEvent::Saved { .. } => AssetEventMask::SAVED,
            AssetEvent::Unloaded { .. } => AssetEventMask::UNLOADED,
            AssetEvent::Error { .. } => AssetEventMask::ERROR,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, AssetEvent::Ready { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AssetEvent::Error { .. })
    }

    pub fn is_unloaded(&self) -> bool {
        matches!(self, AssetEvent::Unloaded { .. })
    }
}

bitflags! {
    /// Selects which event kinds a listener receives.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AssetEventMask: u32 {
        const READY = 1 << 0;
        const MOVED = 1 << 1;
        const RELOADED = 1 << 2;
        const SAVED = 1 << 3;
        const UNLOADED = 1 << 4;
        const ERROR = 1 << 5;
    }
}

/// Receives asset notifications. Every method defaults to doing nothing.
pub trait AssetListener: Send + Sync {
    fn on_asset_ready(&self, _asset: &UntypedAsset) {}

    fn on_asset_moved(&self, _asset: &UntypedAsset, _previous: &(dyn Any + Send + Sync)) {}

    fn on_asset_reloaded(&self, _asset: &UntypedAsset) {}

    fn on_asset_saved(&self, _asset: &UntypedAsset, _success: bool) {}

    fn on_asset_unloaded(&self, _id: AssetId, _asset_type: AssetType) {}

    fn on_asset_error(&self, _asset: &UntypedAsset, _message: &str) {}
}

/// Which events a listener is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerFilter {
    pub mask: AssetEventMask,
    /// Only events for this asset. `None` means every asset.
    pub asset_id: Option<AssetId>,
}

impl ListenerFilter {
    pub fn all() -> Self {
        Self {
            mask: AssetEventMask::all(),
            asset_id: None,
        }
    }

    pub fn for_asset(id: AssetId) -> Self {
        Self {
            asset_id: Some(id),
            ..Self::all()
        }
    }

    pub fn with_mask(mut self, mask: AssetEventMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn matches(&self, event: &AssetEvent) -> bool {
        self.mask.intersects(event.kind()) && self.asset_id.is_none_or(|id| id == event.id())
    }
}

impl Default for ListenerFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Returned by `add_request_listener`; pass it back to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    filter: ListenerFilter,
    listener: Arc<dyn AssetListener>,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    entries: RwLock<Vec<ListenerEntry>>,
}

impl ListenerRegistry {
    pub(crate) fn add(
        &self,
        listener: Arc<dyn AssetListener>,
        filter: ListenerFilter,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(ListenerEntry { id, filter, listener });
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Calls every matching listener. The list lock is not held during callbacks,
    /// so listeners may add or remove listeners.
    pub(crate) fn notify(&self, event: &AssetEvent) {
        let targets: Vec<Arc<dyn AssetListener>> = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.filter.matches(event))
            .map(|entry| Arc::clone(&entry.listener))
            .collect();

        for listener in targets {
            match event {
                AssetEvent::Ready { asset } => listener.on_asset_ready(asset),
                AssetEvent::Moved { asset, previous } => {
                    listener.on_asset_moved(asset, &**previous)
                }
                AssetEvent::Reloaded { asset } => listener.on_asset_reloaded(asset),
                AssetEvent::Saved { asset, success } => listener.on_asset_saved(asset, *success),
                AssetEvent::Unloaded { id, asset_type } => {
                    listener.on_asset_unloaded(*id, *asset_type)
                }
                AssetEvent::Error { asset, message } => listener.on_asset_error(asset, message),
            }
        }
    }
}

pub type AssetCallback = Box<dyn Fn(&UntypedAsset) + Send + Sync>;
pub type MovedCallback = Box<dyn Fn(&UntypedAsset, &(dyn Any + Send + Sync)) + Send + Sync>;
pub type SavedCallback = Box<dyn Fn(&UntypedAsset, bool) + Send + Sync>;
pub type UnloadedCallback = Box<dyn Fn(AssetId, AssetType) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&UntypedAsset, &str) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    ready: Option<AssetCallback>,
    moved: Option<MovedCallback>,
    reloaded: Option<AssetCallback>,
    saved: Option<SavedCallback>,
    unloaded: Option<UnloadedCallback>,
    error: Option<ErrorCallback>,
}

/// Listener built from closures.
///
/// ```
/// use std::sync::Arc;
/// use ember_assets::prelude::*;
///
/// let callbacks = Arc::new(AssetCallbacks::new());
/// callbacks.set_callbacks(
///     Some(Box::new(|asset: &UntypedAsset| println!("{} ready", asset.id()))),
///     None,
///     None,
///     None,
///     None,
///     Some(Box::new(|asset: &UntypedAsset, message: &str| {
///         eprintln!("{}: {message}", asset.id())
///     })),
/// );
/// ```
#[derive(Default)]
pub struct AssetCallbacks {
    callbacks: RwLock<Callbacks>,
}

impl AssetCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every callback. `None` entries ignore their event.
    pub fn set_callbacks(
        &self,
        ready: Option<AssetCallback>,
        moved: Option<MovedCallback>,
        reloaded: Option<AssetCallback>,
        saved: Option<SavedCallback>,
        unloaded: Option<UnloadedCallback>,
        error: Option<ErrorCallback>,
    ) {
        *self.callbacks.write() = Callbacks {
            ready,
            moved,
            reloaded,
            saved,
            unloaded,
            error,
        };
    }

    /// Drop every callback; later events are ignored.
    pub fn clear_callbacks(&self) {
        *self.callbacks.write() = Callbacks::default();
    }
}

impl AssetListener for AssetCallbacks {
    fn on_asset_ready(&self, asset: &UntypedAsset) {
        if let Some(cb) = &self.callbacks.read().ready {
            cb(asset);
        }
    }

    fn on_asset_moved(&self, asset: &UntypedAsset, previous: &(dyn Any + Send + Sync)) {
        if let Some(cb) = &self.callbacks.read().moved {
            cb(asset, previous);
        }
    }

    fn on_asset_reloaded(&self, asset: &UntypedAsset) {
        if let Some(cb) = &self.callbacks.read().reloaded {
            cb(asset);
        }
    }

    fn on_asset_saved(&self, asset: &UntypedAsset, success: bool) {
        if let Some(cb) = &self.callbacks.read().saved {
            cb(asset, success);
        }
    }

    fn on_asset_unloaded(&self, id: AssetId, asset_type: AssetType) {
        if let Some(cb) = &self.callbacks.read().unloaded {
            cb(id, asset_type);
        }
    }

    fn on_asset_error(&self, asset: &UntypedAsset, message: &str) {
        if let Some(cb) = &self.callbacks.read().error {
            cb(asset, message);
        }
    }
}
