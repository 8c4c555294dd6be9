//! Id to instance registry and the retire list.

use std::sync::Arc;

use ember_core::alloc::HashMap;
use parking_lot::Mutex;

use crate::data::AssetData;
use crate::error::AssetResult;
use crate::handle::UntypedAsset;
use crate::id::AssetId;

/// Maps each id to its single live instance.
///
/// Instances whose use count reached zero wait on the dead list until
/// [`remove_if_unused`](AssetRegistry::remove_if_unused) runs on the dispatching thread.
#[derive(Default)]
pub(crate) struct AssetRegistry {
    assets: Mutex<HashMap<AssetId, Arc<AssetData>>>,
    dead: Mutex<Vec<Arc<AssetData>>>,
}

impl AssetRegistry {
    /// A new handle to the instance registered for `id`.
    pub(crate) fn find(&self, id: AssetId) -> Option<UntypedAsset> {
        let assets = self.assets.lock();
        assets.get(&id).map(UntypedAsset::from_data)
    }

    /// A handle to the instance for `id`, creating and registering it if there is none.
    ///
    /// `create` runs under the registry lock. The flag is true if it ran.
    pub(crate) fn find_or_create(
        &self,
        id: AssetId,
        create: impl FnOnce() -> AssetResult<Arc<AssetData>>,
    ) -> AssetResult<(UntypedAsset, bool)> {
        let mut assets = self.assets.lock();
        if let Some(existing) = assets.get(&id) {
            return Ok((UntypedAsset::from_data(existing), false));
        }
        let data = create()?;
        let handle = UntypedAsset::from_data(&data);
        assets.insert(id, data);
        Ok((handle, true))
    }

    pub(crate) fn retire(&self, data: Arc<AssetData>) {
        self.dead.lock().push(data);
    }

    pub(crate) fn take_dead(&self) -> Vec<Arc<AssetData>> {
        std::mem::take(&mut *self.dead.lock())
    }

    pub(crate) fn dead_len(&self) -> usize {
        self.dead.lock().len()
    }

    /// Unregister `data` if nobody picked up a new handle to it since it was retired.
    ///
    /// Returns true exactly once per instance; the caller then destroys it.
    pub(crate) fn remove_if_unused(&self, data: &Arc<AssetData>) -> bool {
        let mut assets = self.assets.lock();
        if data.use_count() != 0 || data.is_retired() {
            return false;
        }
        if assets.get(&data.id()).is_some_and(|current| Arc::ptr_eq(current, data)) {
            assets.remove(&data.id());
        }
        data.retire()
    }

    pub(crate) fn len(&self) -> usize {
        self.assets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::AssetType;

    fn make(id: AssetId) -> AssetResult<Arc<AssetData>> {
        Ok(AssetData::unmanaged(id, AssetType::NIL, Box::new(())))
    }

    #[test]
    fn test_find_or_create_coalesces() {
        let registry = AssetRegistry::default();
        let id = AssetId::from_u128(1, 0);

        let (first, created) = registry.find_or_create(id, || make(id)).unwrap();
        assert!(created);
        let (second, created) =
            registry.find_or_create(id, || panic!("must not create twice")).unwrap();
        assert!(!created);

        assert_eq!(first, second);
        assert_eq!(first.use_count(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_if_unused_skips_resurrected() {
        let registry = AssetRegistry::default();
        let id = AssetId::from_u128(2, 0);
        let (handle, _) = registry.find_or_create(id, || make(id)).unwrap();
        let data = Arc::clone(handle.data().unwrap());
        drop(handle);

        let again = registry.find(id).unwrap();
        assert!(!registry.remove_if_unused(&data));
        drop(again);

        assert!(registry.remove_if_unused(&data));
        assert!(!registry.remove_if_unused(&data));
        assert!(registry.find(id).is_none());
    }

    #[test]
    fn test_dead_list() {
        let registry = AssetRegistry::default();
        registry.retire(make(AssetId::from_u128(3, 0)).unwrap());
        assert_eq!(registry.dead_len(), 1);
        assert_eq!(registry.take_dead().len(), 1);
        assert_eq!(registry.dead_len(), 0);
    }
}
