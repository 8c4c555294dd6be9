//! Load request options, load behaviours and dependency filters.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::id::{AssetId, AssetType};

/// How a reference embedded in another asset is resolved while its owner loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetLoadBehavior {
    /// Loaded before the owner reports ready.
    #[default]
    PreLoad,
    /// Queued when the owner loads; the owner does not wait for it.
    QueueLoad,
    /// Left as an id-only reference.
    NoLoad,
}

impl AssetLoadBehavior {
    pub fn is_default(&self) -> bool {
        *self == AssetLoadBehavior::default()
    }
}

/// What a dependency filter gets to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetFilterInfo {
    pub id: AssetId,
    pub asset_type: AssetType,
    pub load_behavior: AssetLoadBehavior,
}

/// Decides whether a nested reference is loaded. Returning `false` skips it.
pub type AssetFilter = Arc<dyn Fn(&AssetFilterInfo) -> bool + Send + Sync>;

/// Filter that rejects every nested reference.
pub fn asset_filter_no_asset_loading(_info: &AssetFilterInfo) -> bool {
    false
}

/// Wrap a closure as an [`AssetFilter`].
pub fn filter_fn(f: impl Fn(&AssetFilterInfo) -> bool + Send + Sync + 'static) -> AssetFilter {
    Arc::new(f)
}

/// Options for [`AssetManager::get_asset`](crate::AssetManager::get_asset).
///
/// The default queues a non-blocking load.
#[derive(Clone)]
pub struct LoadSettings {
    /// Queue a load if the asset has never been loaded.
    pub queue_load: bool,

    /// Do not return until the load and its pre-loaded dependencies finish.
    pub blocking: bool,

    /// Reload the asset if it already exists.
    pub force_reload: bool,

    /// Applied to every nested reference the load resolves.
    pub filter: Option<AssetFilter>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            queue_load: true,
            blocking: false,
            force_reload: false,
            filter: None,
        }
    }
}

impl LoadSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the instance without loading it.
    pub fn create_only() -> Self {
        Self {
            queue_load: false,
            ..Self::default()
        }
    }

    pub fn queue_load(mut self, queue_load: bool) -> Self {
        self.queue_load = queue_load;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn force_reload(mut self, force: bool) -> Self {
        self.force_reload = force;
        self
    }

    pub fn with_filter(mut self, filter: AssetFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl fmt::Debug for LoadSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadSettings")
            .field("queue_load", &self.queue_load)
            .field("blocking", &self.blocking)
            .field("force_reload", &self.force_reload)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queues_without_blocking() {
        let settings = LoadSettings::default();
        assert!(settings.queue_load);
        assert!(!settings.blocking);
        assert!(!settings.force_reload);
        assert!(settings.filter.is_none());
        assert!(!LoadSettings::create_only().queue_load);
    }

    #[test]
    fn test_no_asset_loading_filter() {
        let info = AssetFilterInfo {
            id: AssetId::from_u128(1, 0),
            asset_type: AssetType::NIL,
            load_behavior: AssetLoadBehavior::PreLoad,
        };
        let filter: AssetFilter = Arc::new(asset_filter_no_asset_loading);
        assert!(!filter(&info));

        let only_queued = filter_fn(|info| info.load_behavior == AssetLoadBehavior::QueueLoad);
        assert!(!only_queued(&info));
    }

    #[test]
    fn test_behavior_serde_names() {
        assert_eq!(serde_json::to_string(&AssetLoadBehavior::QueueLoad).unwrap(), "\"queue_load\"");
        assert!(AssetLoadBehavior::PreLoad.is_default());
    }
}
