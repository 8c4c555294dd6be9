//! The context a handler loads with, and how nested references get resolved.

use crate::data::AssetPayload;
use crate::handle::{Asset, UntypedAsset};
use crate::id::{AssetId, AssetType};
use crate::manager::AssetManager;
use crate::settings::{AssetFilter, AssetFilterInfo, AssetLoadBehavior, LoadSettings};

/// Passed to [`AssetHandler::load_asset_data`](crate::AssetHandler::load_asset_data).
pub struct LoadContext<'a> {
    manager: &'a AssetManager,
    asset_id: AssetId,
    asset_type: AssetType,
    filter: Option<&'a AssetFilter>,
    is_reload: bool,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(
        manager: &'a AssetManager,
        asset_id: AssetId,
        asset_type: AssetType,
        filter: Option<&'a AssetFilter>,
        is_reload: bool,
    ) -> Self {
        Self {
            manager,
            asset_id,
            asset_type,
            filter,
            is_reload,
        }
    }

    pub fn manager(&self) -> &AssetManager {
        self.manager
    }

    /// The asset being loaded.
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    pub fn filter(&self) -> Option<&AssetFilter> {
        self.filter
    }

    pub fn is_reload(&self) -> bool {
        self.is_reload
    }

    /// Resolve a typed reference deserialized from the payload being loaded.
    pub fn resolve<T: AssetPayload>(&self, asset: &mut Asset<T>) -> bool {
        self.resolve_untyped(asset.untyped_mut())
    }

    /// Resolve a reference deserialized from the payload being loaded.
    ///
    /// Invalid ids, references that already hold an instance, references the filter
    /// rejects and [`AssetLoadBehavior::NoLoad`] references are left untouched.
    /// Everything else is swapped for a handle to the registered instance:
    /// `PreLoad` references are loaded before this returns, `QueueLoad` ones are
    /// queued. Returns true if the reference now holds an instance.
    pub fn resolve_untyped(&self, asset: &mut UntypedAsset) -> bool {
        let id = asset.id();
        if !id.is_valid() || asset.has_data() {
            return false;
        }

        let behavior = asset.load_behavior();
        let info = AssetFilterInfo {
            id,
            asset_type: asset.asset_type(),
            load_behavior: behavior,
        };
        if self.filter.is_some_and(|filter| !filter(&info)) {
            return false;
        }
        if behavior == AssetLoadBehavior::NoLoad {
            return false;
        }

        let mut settings = LoadSettings::default().blocking(behavior == AssetLoadBehavior::PreLoad);
        settings.filter = self.filter.cloned();

        let resolved = self.manager.get_asset_untyped(id, asset.asset_type(), &settings);
        if behavior == AssetLoadBehavior::PreLoad && resolved.is_error() {
            tracing::error!(
                "Dependent asset {} ({}) failed to load while loading {}",
                id,
                asset.hint(),
                self.asset_id
            );
        }

        asset.adopt(resolved);
        asset.has_data()
    }
}
