//! Asset handlers: per-type create, load, save and destroy behaviour.

use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ember_core::alloc::HashMap;
use parking_lot::RwLock;

use crate::catalog::AssetCatalog;
use crate::context::LoadContext;
use crate::data::{AssetData, AssetPayload, ErasedPayload};
use crate::error::{AssetError, AssetResult};
use crate::handle::UntypedAsset;
use crate::id::{AssetId, AssetType};
use crate::io::AssetStream;

/// Creates, loads, saves and destroys payloads for one or more asset types.
///
/// `load_asset_data` and `save_asset_data` run on worker threads. `create_asset` runs
/// under the registry lock and must not call back into the manager. `destroy_asset`
/// only runs inside [`dispatch_events`](crate::AssetManager::dispatch_events).
pub trait AssetHandler: Send + Sync + 'static {
    /// Create an empty payload for `asset_type`, or `None` if the type is not handled.
    fn create_asset(&self, id: AssetId, asset_type: AssetType) -> Option<ErasedPayload>;

    /// Fill `asset` from `stream`. Nested references are resolved through `ctx`.
    fn load_asset_data(
        &self,
        asset: &UntypedAsset,
        stream: &mut AssetStream,
        ctx: &LoadContext<'_>,
    ) -> AssetResult<()>;

    fn save_asset_data(&self, asset: &UntypedAsset, _writer: &mut dyn Write) -> AssetResult<()> {
        Err(AssetError::HandlerFailed {
            id: asset.id(),
            message: "handler does not support saving".into(),
        })
    }

    fn destroy_asset(&self, data: Arc<AssetData>) {
        drop(data);
    }

    fn handled_asset_types(&self) -> Vec<AssetType>;
}

/// Typed handler for a single payload kind.
///
/// Wrap it in [`TypedHandler`] to register it with the manager.
pub trait PayloadHandler: Send + Sync + 'static {
    type Payload: AssetPayload + Default;

    fn load(&self, stream: &mut AssetStream, ctx: &LoadContext<'_>) -> AssetResult<Self::Payload>;

    fn save(&self, _payload: &Self::Payload, _writer: &mut dyn Write) -> AssetResult<()> {
        Err(AssetError::Other(format!(
            "saving {} is not supported",
            Self::Payload::type_name()
        )))
    }
}

/// Adapts a [`PayloadHandler`] to the type-erased [`AssetHandler`] interface.
pub struct TypedHandler<H: PayloadHandler> {
    inner: H,
    _marker: PhantomData<fn() -> H::Payload>,
}

impl<H: PayloadHandler> TypedHandler<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: PayloadHandler> AssetHandler for TypedHandler<H> {
    fn create_asset(&self, _id: AssetId, asset_type: AssetType) -> Option<ErasedPayload> {
        (asset_type == H::Payload::ASSET_TYPE)
            .then(|| Box::new(H::Payload::default()) as ErasedPayload)
    }

    fn load_asset_data(
        &self,
        asset: &UntypedAsset,
        stream: &mut AssetStream,
        ctx: &LoadContext<'_>,
    ) -> AssetResult<()> {
        let payload = self.inner.load(stream, ctx)?;
        let mut slot = asset.write::<H::Payload>().ok_or(AssetError::TypeMismatch {
            expected: H::Payload::ASSET_TYPE,
            actual: asset.asset_type(),
        })?;
        *slot = payload;
        Ok(())
    }

    fn save_asset_data(&self, asset: &UntypedAsset, writer: &mut dyn Write) -> AssetResult<()> {
        let payload = asset.read::<H::Payload>().ok_or(AssetError::TypeMismatch {
            expected: H::Payload::ASSET_TYPE,
            actual: asset.asset_type(),
        })?;
        self.inner.save(&*payload, writer)
    }

    fn handled_asset_types(&self) -> Vec<AssetType> {
        vec![H::Payload::ASSET_TYPE]
    }
}

/// A registered handler plus the number of live instances it created.
///
/// Instances point at the slot that created them, so the count stays correct even
/// if the handler is unregistered and registered again in the meantime.
pub(crate) struct HandlerSlot {
    handler: Arc<dyn AssetHandler>,
    active: AtomicUsize,
}

impl HandlerSlot {
    fn new(handler: Arc<dyn AssetHandler>) -> Self {
        Self {
            handler,
            active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn handler(&self) -> &Arc<dyn AssetHandler> {
        &self.handler
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn instance_created(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn instance_destroyed(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    fn holds(&self, handler: *const ()) -> bool {
        addr_of(&self.handler) == handler
    }
}

/// Address of the value behind an `Arc`, without trait-object metadata.
pub(crate) fn addr_of<T: ?Sized>(arc: &Arc<T>) -> *const () {
    Arc::as_ptr(arc) as *const ()
}

/// Type-keyed handler and catalog tables.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: RwLock<HashMap<AssetType, Arc<HandlerSlot>>>,
    catalogs: RwLock<HashMap<AssetType, Arc<dyn AssetCatalog>>>,
}

impl HandlerRegistry {
    /// Returns false if another handler already owns `asset_type`.
    pub(crate) fn register_handler(
        &self,
        handler: Arc<dyn AssetHandler>,
        asset_type: AssetType,
    ) -> bool {
        let addr = addr_of(&handler);
        let mut handlers = self.handlers.write();
        if let Some(existing) = handlers.get(&asset_type) {
            if existing.holds(addr) {
                return true;
            }
            tracing::error!("Asset type {} already has a handler registered", asset_type);
            return false;
        }

        // One slot per handler, shared by every type it is registered for.
        let slot = handlers
            .values()
            .find(|slot| slot.holds(addr))
            .cloned()
            .unwrap_or_else(|| Arc::new(HandlerSlot::new(handler)));
        handlers.insert(asset_type, slot);
        true
    }

    /// Removes every registration of `handler`.
    ///
    /// The registration is removed even when instances are still alive; that case
    /// is reported once through `tracing` and returned as [`AssetError::HandlerInUse`].
    pub(crate) fn unregister_handler(&self, handler: *const ()) -> AssetResult<()> {
        let mut removed_types = Vec::new();
        let mut slot = None;
        self.handlers.write().retain(|asset_type, entry| {
            if entry.holds(handler) {
                removed_types.push(*asset_type);
                slot = Some(Arc::clone(entry));
                false
            } else {
                true
            }
        });

        let Some(slot) = slot else {
            tracing::warn!("Tried to unregister a handler that was never registered");
            return Ok(());
        };

        removed_types.sort();
        let active = slot.active();
        if active > 0 {
            tracing::error!(
                "Unregistering asset handler for {:?} with {} active asset(s)",
                removed_types,
                active
            );
            return Err(AssetError::HandlerInUse {
                asset_types: removed_types,
                active,
            });
        }
        Ok(())
    }

    pub(crate) fn handler_for(&self, asset_type: AssetType) -> Option<Arc<HandlerSlot>> {
        self.handlers.read().get(&asset_type).cloned()
    }

    pub(crate) fn register_catalog(&self, catalog: Arc<dyn AssetCatalog>, asset_type: AssetType) {
        if self.catalogs.write().insert(asset_type, catalog).is_some() {
            tracing::debug!("Replaced catalog for asset type {}", asset_type);
        }
    }

    pub(crate) fn unregister_catalog(&self, catalog: *const ()) -> usize {
        let mut catalogs = self.catalogs.write();
        let before = catalogs.len();
        catalogs.retain(|_, entry| addr_of(entry) != catalog);
        before - catalogs.len()
    }

    pub(crate) fn catalog_for(&self, asset_type: AssetType) -> Option<Arc<dyn AssetCatalog>> {
        self.catalogs.read().get(&asset_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SimpleCatalog;

    struct NullHandler(Vec<AssetType>);

    impl AssetHandler for NullHandler {
        fn create_asset(&self, _id: AssetId, _asset_type: AssetType) -> Option<ErasedPayload> {
            Some(Box::new(()))
        }

        fn load_asset_data(
            &self,
            _asset: &UntypedAsset,
            _stream: &mut AssetStream,
            _ctx: &LoadContext<'_>,
        ) -> AssetResult<()> {
            Ok(())
        }

        fn handled_asset_types(&self) -> Vec<AssetType> {
            self.0.clone()
        }
    }

    const TYPE_A: AssetType = AssetType::from_u128(0xA);
    const TYPE_B: AssetType = AssetType::from_u128(0xB);

    #[test]
    fn test_one_slot_per_handler() {
        let registry = HandlerRegistry::default();
        let handler: Arc<dyn AssetHandler> = Arc::new(NullHandler(vec![TYPE_A, TYPE_B]));
        assert!(registry.register_handler(Arc::clone(&handler), TYPE_A));
        assert!(registry.register_handler(Arc::clone(&handler), TYPE_B));

        let a = registry.handler_for(TYPE_A).unwrap();
        let b = registry.handler_for(TYPE_B).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let registry = HandlerRegistry::default();
        let first: Arc<dyn AssetHandler> = Arc::new(NullHandler(vec![TYPE_A]));
        let second: Arc<dyn AssetHandler> = Arc::new(NullHandler(vec![TYPE_A]));
        assert!(registry.register_handler(Arc::clone(&first), TYPE_A));
        assert!(!registry.register_handler(second, TYPE_A));
        assert!(registry.handler_for(TYPE_A).unwrap().holds(addr_of(&first)));
    }

    #[test]
    fn test_unregister_with_live_instances_still_removes() {
        let registry = HandlerRegistry::default();
        let handler: Arc<dyn AssetHandler> = Arc::new(NullHandler(vec![TYPE_A]));
        registry.register_handler(Arc::clone(&handler), TYPE_A);
        registry.handler_for(TYPE_A).unwrap().instance_created();

        let err = registry.unregister_handler(addr_of(&handler)).unwrap_err();
        assert!(matches!(err, AssetError::HandlerInUse { active: 1, .. }));
        assert!(registry.handler_for(TYPE_A).is_none());

        // A fresh registration starts a fresh count.
        registry.register_handler(Arc::clone(&handler), TYPE_A);
        assert!(registry.unregister_handler(addr_of(&handler)).is_ok());
    }

    #[test]
    fn test_catalog_registration() {
        let registry = HandlerRegistry::default();
        let catalog: Arc<dyn AssetCatalog> = Arc::new(SimpleCatalog::new());
        registry.register_catalog(Arc::clone(&catalog), TYPE_A);
        registry.register_catalog(Arc::clone(&catalog), TYPE_B);
        assert!(registry.catalog_for(TYPE_A).is_some());
        assert_eq!(registry.unregister_catalog(addr_of(&catalog)), 2);
        assert!(registry.catalog_for(TYPE_B).is_none());
    }
}
