//! Asset manager - owns every instance and coordinates loading, saving and events.

use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use ember_core::profiling::{profile_function, profile_scope};
use parking_lot::RwLock;

use crate::catalog::AssetCatalog;
use crate::config::AssetManagerDescriptor;
use crate::context::LoadContext;
use crate::data::{AssetData, AssetPayload};
use crate::error::{AssetError, AssetResult};
use crate::event::{AssetEvent, AssetListener, ListenerFilter, ListenerId, ListenerRegistry};
use crate::handle::{Asset, UntypedAsset};
use crate::handler::{AssetHandler, HandlerRegistry, HandlerSlot, addr_of};
use crate::id::{AssetId, AssetType};
use crate::inflight::{InFlightTable, LoadRequest, WaitOutcome};
use crate::io::{FileStreamer, StreamProvider};
use crate::job::JobPool;
use crate::registry::AssetRegistry;
use crate::settings::{AssetFilter, LoadSettings};
use crate::state::AssetStatus;

static INSTANCE: RwLock<Option<AssetManager>> = parking_lot::const_rwlock(None);

/// State shared between the manager handles, the worker jobs and every managed instance.
pub(crate) struct Shared {
    registry: AssetRegistry,
    handlers: HandlerRegistry,
    in_flight: InFlightTable,
    listeners: ListenerRegistry,
    event_tx: Sender<AssetEvent>,
    event_rx: Receiver<AssetEvent>,
    streamer: Arc<dyn StreamProvider>,
    pool: JobPool,
}

impl Shared {
    /// Called when the last handle to a managed instance goes away.
    pub(crate) fn retire(&self, data: Arc<AssetData>) {
        self.registry.retire(data);
    }

    fn post(&self, event: AssetEvent) {
        // The receiver lives in `self`, so this only fails while tearing down.
        let _ = self.event_tx.send(event);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let leaked = self.registry.len();
        if leaked > 0 {
            tracing::warn!("Asset manager dropped with {} registered asset(s)", leaked);
        }
    }
}

/// Owns every managed asset instance, keyed by [`AssetId`].
///
/// Handles are cheap to clone and share the same manager. Loads and saves run on an
/// internal worker pool; their notifications are queued and delivered to listeners
/// from whichever thread calls [`dispatch_events`](Self::dispatch_events), which is
/// also where instances whose last handle was dropped get destroyed.
///
/// # Example
///
/// ```ignore
/// let manager = AssetManager::new(AssetManagerDescriptor::default())?;
///
/// // Register a handler and tell the manager where the data lives
/// manager.register_handler(Arc::new(TypedHandler::new(MeshHandler)), Mesh::ASSET_TYPE);
/// manager.register_catalog(catalog, Mesh::ASSET_TYPE);
///
/// // Request the asset; the load runs on a worker
/// let mesh: Asset<Mesh> = manager.get_asset(mesh_id, &LoadSettings::default());
///
/// // Once per frame
/// manager.dispatch_events();
///
/// if let Some(mesh) = mesh.get() {
///     // Use the mesh
/// }
/// ```
#[derive(Clone)]
pub struct AssetManager {
    shared: Arc<Shared>,
}

impl AssetManager {
    pub fn new(descriptor: AssetManagerDescriptor) -> AssetResult<Self> {
        let streamer = descriptor
            .streamer
            .clone()
            .unwrap_or_else(|| Arc::new(FileStreamer::new(".")) as Arc<dyn StreamProvider>);
        let pool = JobPool::new(descriptor.max_worker_threads, &descriptor.thread_name_prefix)?;
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        tracing::info!("Asset manager created with {} worker thread(s)", pool.size());
        Ok(Self {
            shared: Arc::new(Shared {
                registry: AssetRegistry::default(),
                handlers: HandlerRegistry::default(),
                in_flight: InFlightTable::default(),
                listeners: ListenerRegistry::default(),
                event_tx,
                event_rx,
                streamer,
                pool,
            }),
        })
    }

    // ===== Global instance =====

    /// Create the process-wide manager. Fails if one already exists.
    pub fn create(descriptor: AssetManagerDescriptor) -> AssetResult<Self> {
        let mut slot = INSTANCE.write();
        if slot.is_some() {
            return Err(AssetError::Other("the global asset manager already exists".into()));
        }
        let manager = Self::new(descriptor)?;
        *slot = Some(manager.clone());
        Ok(manager)
    }

    /// The process-wide manager, if [`create`](Self::create) was called.
    pub fn instance() -> Option<Self> {
        INSTANCE.read().clone()
    }

    pub fn is_ready() -> bool {
        INSTANCE.read().is_some()
    }

    /// Shut down and forget the process-wide manager.
    pub fn destroy() {
        let manager = INSTANCE.write().take();
        if let Some(manager) = manager {
            manager.shutdown();
        }
    }

    /// Finish queued jobs, stop the workers and run a last dispatch.
    ///
    /// Loads queued after this point fail with [`AssetError::Shutdown`].
    pub fn shutdown(&self) {
        profile_function!();
        self.shared.pool.shutdown();
        self.dispatch_events();

        let remaining = self.shared.registry.len();
        if remaining > 0 {
            tracing::warn!("Asset manager shut down with {} asset(s) still referenced", remaining);
        } else {
            tracing::debug!("Asset manager shut down");
        }
    }

    // ===== Handlers and catalogs =====

    /// Route `asset_type` to `handler`. Returns false if another handler already has it.
    pub fn register_handler(&self, handler: Arc<dyn AssetHandler>, asset_type: AssetType) -> bool {
        self.shared.handlers.register_handler(handler, asset_type)
    }

    /// Register `handler` for every type it reports. Returns how many were accepted.
    pub fn register_handler_for_types(&self, handler: Arc<dyn AssetHandler>) -> usize {
        handler
            .handled_asset_types()
            .into_iter()
            .filter(|asset_type| self.register_handler(Arc::clone(&handler), *asset_type))
            .count()
    }

    /// Remove every registration of `handler`.
    ///
    /// Unregistering while instances it created are still alive is a usage error:
    /// the registration is removed anyway, the error is logged and returned.
    pub fn unregister_handler<H: AssetHandler + ?Sized>(
        &self,
        handler: &Arc<H>,
    ) -> AssetResult<()> {
        self.shared.handlers.unregister_handler(addr_of(handler))
    }

    pub fn register_catalog(&self, catalog: Arc<dyn AssetCatalog>, asset_type: AssetType) {
        self.shared.handlers.register_catalog(catalog, asset_type);
    }

    /// Remove `catalog` from every type it serves. Returns how many types it served.
    pub fn unregister_catalog<C: AssetCatalog + ?Sized>(&self, catalog: &Arc<C>) -> usize {
        self.shared.handlers.unregister_catalog(addr_of(catalog))
    }

    // ===== Lookup =====

    /// Register an instance for `id` without loading it.
    pub fn create_asset<T: AssetPayload>(&self, id: AssetId) -> Asset<T> {
        self.get_asset(id, &LoadSettings::create_only())
    }

    pub fn create_asset_untyped(&self, id: AssetId, asset_type: AssetType) -> UntypedAsset {
        self.get_asset_untyped(id, asset_type, &LoadSettings::create_only())
    }

    /// The instance for `id`, created and loaded according to `settings`.
    ///
    /// On failure the returned handle is an empty reference to `id`.
    pub fn get_asset<T: AssetPayload>(&self, id: AssetId, settings: &LoadSettings) -> Asset<T> {
        match self.get_asset_untyped(id, T::ASSET_TYPE, settings).into_typed::<T>() {
            Ok(asset) => asset,
            Err(_) => Asset::reference(id),
        }
    }

    pub fn get_asset_untyped(
        &self,
        id: AssetId,
        asset_type: AssetType,
        settings: &LoadSettings,
    ) -> UntypedAsset {
        profile_function!();
        if !id.is_valid() {
            tracing::warn!("Requested an asset with an invalid id");
            return UntypedAsset::reference(id, asset_type);
        }

        let (asset, created) = match self.find_or_create(id, asset_type) {
            Ok(found) => found,
            Err(err) => {
                tracing::error!("Failed to create asset {}: {}", id, err);
                return UntypedAsset::reference(id, asset_type);
            }
        };
        if !asset_type.is_nil() && asset.asset_type() != asset_type {
            tracing::error!(
                "Asset {} was requested as type {} but is registered as {}",
                id,
                asset_type,
                asset.asset_type()
            );
            return UntypedAsset::reference(id, asset_type);
        }

        if settings.force_reload && !created {
            self.reload_handle(&asset, settings.filter.clone());
        } else if settings.queue_load {
            self.queue_load(&asset, settings.filter.clone());
        }
        if settings.blocking {
            self.block_until_load_complete(&asset);
        }
        asset
    }

    /// The instance registered for `id`, without creating or loading anything.
    pub fn find_asset<T: AssetPayload>(&self, id: AssetId) -> Asset<T> {
        match self.find_asset_untyped(id).into_typed::<T>() {
            Ok(asset) => asset,
            Err(found) => {
                tracing::debug!(
                    "Asset {} is registered as {}, not {}",
                    id,
                    found.asset_type(),
                    T::type_name()
                );
                Asset::new()
            }
        }
    }

    pub fn find_asset_untyped(&self, id: AssetId) -> UntypedAsset {
        self.shared.registry.find(id).unwrap_or_default()
    }

    fn find_or_create(
        &self,
        id: AssetId,
        asset_type: AssetType,
    ) -> AssetResult<(UntypedAsset, bool)> {
        self.shared.registry.find_or_create(id, || {
            let slot = self
                .shared
                .handlers
                .handler_for(asset_type)
                .ok_or(AssetError::NoHandler { asset_type })?;
            let payload = slot
                .handler()
                .create_asset(id, asset_type)
                .ok_or_else(|| AssetError::HandlerFailed {
                    id,
                    message: format!("handler could not create an asset of type {asset_type}"),
                })?;
            slot.instance_created();
            tracing::trace!("Created asset {}", id);
            Ok(AssetData::managed(id, asset_type, payload, Arc::downgrade(&self.shared), slot))
        })
    }

    // ===== Loading =====

    /// Queue a load of `asset` on the worker pool.
    ///
    /// Returns true if a new load was queued; false if the asset is not in the
    /// `NotLoaded` state, a load is already in flight, or it cannot be loaded.
    pub fn queue_load(&self, asset: &UntypedAsset, filter: Option<AssetFilter>) -> bool {
        let Some(data) = asset.data() else {
            return false;
        };
        let id = data.id();
        let Some(owner) = data.owner() else {
            tracing::warn!("Asset {} is not owned by a manager and cannot be loaded", id);
            return false;
        };
        let Some(catalog) = self.shared.handlers.catalog_for(data.asset_type()) else {
            if data.transition(AssetStatus::NotLoaded, AssetStatus::Queued) {
                let err = AssetError::NoCatalog {
                    asset_type: data.asset_type(),
                };
                tracing::warn!("Cannot load asset {}: {}", id, err);
                let message = err.to_string();
                data.complete(&Err(err));
                self.shared.post(AssetEvent::Error {
                    asset: asset.clone(),
                    message,
                });
            }
            return false;
        };

        let request = LoadRequest {
            asset: asset.clone(),
            handler: Arc::clone(&owner.handler),
            catalog,
            filter,
            reload: false,
        };
        let admit = || data.transition(AssetStatus::NotLoaded, AssetStatus::Queued);
        match self.shared.in_flight.enqueue(id, admit, request) {
            Some(ticket) => {
                tracing::debug!("Queued load of asset {}", id);
                self.submit_load(id, ticket);
                true
            }
            None => false,
        }
    }

    /// Reload the registered instance for `id` from its catalog.
    ///
    /// Listeners get `Moved` with the previous payload and then `Reloaded`. If the
    /// reload fails the previous payload stays in place.
    pub fn reload_asset(&self, id: AssetId) -> bool {
        let Some(asset) = self.shared.registry.find(id) else {
            tracing::warn!("Cannot reload asset {}: it is not registered", id);
            return false;
        };
        self.reload_handle(&asset, None)
    }

    fn reload_handle(&self, asset: &UntypedAsset, filter: Option<AssetFilter>) -> bool {
        let Some(data) = asset.data() else {
            return false;
        };
        if data.status() == AssetStatus::NotLoaded {
            return self.queue_load(asset, filter);
        }

        let id = data.id();
        let Some(owner) = data.owner() else {
            tracing::warn!("Asset {} is not owned by a manager and cannot be reloaded", id);
            return false;
        };
        let Some(catalog) = self.shared.handlers.catalog_for(data.asset_type()) else {
            tracing::warn!("Cannot reload asset {}: no catalog for type {}", id, data.asset_type());
            return false;
        };

        let request = LoadRequest {
            asset: asset.clone(),
            handler: Arc::clone(&owner.handler),
            catalog,
            filter,
            reload: true,
        };
        match self.shared.in_flight.enqueue(id, || !data.is_loading(), request) {
            Some(ticket) => {
                tracing::debug!("Queued reload of asset {}", id);
                self.submit_load(id, ticket);
                true
            }
            None => {
                tracing::debug!("Asset {} is already loading, reload skipped", id);
                false
            }
        }
    }

    /// Block until no load is in flight for `asset`, then return its status.
    ///
    /// A load that no worker has started yet runs on the calling thread. Called from
    /// inside a load, waiting on an asset this thread is already loading further up
    /// (a reference cycle) returns immediately with the current status.
    pub fn block_until_load_complete(&self, asset: &UntypedAsset) -> AssetStatus {
        profile_function!();
        let id = asset.id();
        loop {
            match self.shared.in_flight.wait_or_claim(id) {
                WaitOutcome::Claimed(request) => self.run_load(request),
                WaitOutcome::Done => break,
                WaitOutcome::Cycle => {
                    tracing::debug!(
                        "Not waiting on asset {}: it is being loaded further up this thread",
                        id
                    );
                    break;
                }
            }
        }
        asset.status()
    }

    fn submit_load(&self, id: AssetId, ticket: u64) {
        let manager = self.clone();
        let submitted = self.shared.pool.submit(Box::new(move || {
            if let Some(request) = manager.shared.in_flight.claim(id, ticket) {
                manager.run_load(request);
            }
        }));

        if let Err(err) = submitted {
            if let Some(request) = self.shared.in_flight.claim(id, ticket) {
                self.complete_load(request, Err(err));
            }
        }
    }

    /// Execute `request` and publish its outcome. A panic anywhere in the load still
    /// completes it, so the in-flight entry is always released.
    fn run_load(&self, request: LoadRequest) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute_load(&request)))
            .unwrap_or_else(|payload| {
                let id = request.asset.id();
                let reason = panic_message(&*payload);
                tracing::error!("Loading asset {} panicked: {}", id, reason);
                Err(AssetError::HandlerFailed {
                    id,
                    message: format!("load panicked: {reason}"),
                })
            });
        self.complete_load(request, outcome);
    }

    /// Load into the live payload, or into a scratch payload for a reload.
    fn execute_load(&self, request: &LoadRequest) -> AssetResult<Option<Arc<AssetData>>> {
        profile_function!();
        let asset = &request.asset;
        let id = asset.id();
        let asset_type = asset.asset_type();
        if let Some(data) = asset.data() {
            data.set_status(AssetStatus::Loading);
        }

        let scratch = if request.reload {
            let payload = request
                .handler
                .handler()
                .create_asset(id, asset_type)
                .ok_or_else(|| AssetError::HandlerFailed {
                    id,
                    message: "handler could not create a payload to reload into".into(),
                })?;
            Some(UntypedAsset::from_data(&AssetData::unmanaged(id, asset_type, payload)))
        } else {
            None
        };

        let target = scratch.as_ref().unwrap_or(asset);
        self.load_from_catalog(request, target)?;
        Ok(scratch.and_then(|scratch| scratch.data().cloned()))
    }

    fn load_from_catalog(&self, request: &LoadRequest, target: &UntypedAsset) -> AssetResult<()> {
        let id = target.id();
        let asset_type = target.asset_type();
        let info = request
            .catalog
            .stream_info_for_load(id, asset_type)
            .ok_or(AssetError::NotFound { id })?;
        let mut stream = self.shared.streamer.open_read(&info)?;

        tracing::trace!("Loading asset {} from {}", id, info.stream_name);
        let ctx = LoadContext::new(self, id, asset_type, request.filter.as_ref(), request.reload);
        request.handler.handler().load_asset_data(target, &mut stream, &ctx)
    }

    /// Publish the outcome of a load, then release the in-flight entry.
    fn complete_load(&self, request: LoadRequest, outcome: AssetResult<Option<Arc<AssetData>>>) {
        let LoadRequest { asset, reload, .. } = request;
        let id = asset.id();

        if let Some(data) = asset.data() {
            match outcome {
                Ok(Some(fresh)) => {
                    let previous = data.take_payload_from(&fresh);
                    data.complete(&Ok(()));
                    tracing::debug!("Reloaded asset {}", id);
                    self.shared.post(AssetEvent::Moved {
                        asset: asset.clone(),
                        previous,
                    });
                    self.shared.post(AssetEvent::Reloaded { asset: asset.clone() });
                }
                Ok(None) => {
                    data.complete(&Ok(()));
                    tracing::debug!("Loaded asset {}", id);
                    self.shared.post(AssetEvent::Ready { asset: asset.clone() });
                }
                Err(err) if reload && data.version() > 0 => {
                    tracing::warn!(
                        "Failed to reload asset {}, keeping the previous data: {}",
                        id,
                        err
                    );
                    data.set_status(AssetStatus::Ready);
                    self.shared.post(AssetEvent::Error {
                        asset: asset.clone(),
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    tracing::warn!("Failed to load asset {}: {}", id, err);
                    let message = err.to_string();
                    data.complete(&Err(err));
                    self.shared.post(AssetEvent::Error {
                        asset: asset.clone(),
                        message,
                    });
                }
            }
        }

        self.shared.in_flight.finish(id);
    }

    // ===== Saving =====

    /// Write the current payload of `asset` through its handler on the worker pool.
    ///
    /// Listeners get `Saved` with the outcome. Returns false if no save was started.
    pub fn save_asset(&self, asset: &UntypedAsset) -> bool {
        let Some(data) = asset.data() else {
            tracing::warn!("Cannot save an empty asset reference");
            return false;
        };
        let id = data.id();
        let Some(handler) = data
            .owner()
            .map(|owner| Arc::clone(&owner.handler))
            .or_else(|| self.shared.handlers.handler_for(data.asset_type()))
        else {
            tracing::warn!("Cannot save asset {}: no handler for type {}", id, data.asset_type());
            return false;
        };
        let Some(catalog) = self.shared.handlers.catalog_for(data.asset_type()) else {
            tracing::warn!("Cannot save asset {}: no catalog for type {}", id, data.asset_type());
            return false;
        };

        let manager = self.clone();
        let asset = asset.clone();
        match self
            .shared
            .pool
            .submit(Box::new(move || manager.run_save(asset, &handler, catalog.as_ref())))
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("Cannot save asset {}: {}", id, err);
                false
            }
        }
    }

    fn run_save(&self, asset: UntypedAsset, handler: &HandlerSlot, catalog: &dyn AssetCatalog) {
        profile_function!();
        let id = asset.id();
        let result = self.write_asset(&asset, handler, catalog);
        match &result {
            Ok(()) => tracing::debug!("Saved asset {}", id),
            Err(err) => tracing::warn!("Failed to save asset {}: {}", id, err),
        }
        self.shared.post(AssetEvent::Saved {
            asset,
            success: result.is_ok(),
        });
    }

    fn write_asset(
        &self,
        asset: &UntypedAsset,
        handler: &HandlerSlot,
        catalog: &dyn AssetCatalog,
    ) -> AssetResult<()> {
        let id = asset.id();
        let info = catalog
            .stream_info_for_save(id, asset.asset_type())
            .ok_or(AssetError::NotFound { id })?;
        let mut writer = self.shared.streamer.open_write(&info)?;

        let handler = handler.handler();
        panic::catch_unwind(AssertUnwindSafe(|| handler.save_asset_data(asset, &mut *writer)))
            .unwrap_or_else(|payload| {
                Err(AssetError::HandlerFailed {
                    id,
                    message: format!("handler panicked: {}", panic_message(&*payload)),
                })
            })?;
        writer
            .flush()
            .map_err(|err| AssetError::from(err).with_stream(&info.stream_name))
    }

    // ===== Events =====

    pub fn add_request_listener(
        &self,
        listener: Arc<dyn AssetListener>,
        filter: ListenerFilter,
    ) -> ListenerId {
        self.shared.listeners.add(listener, filter)
    }

    pub fn remove_request_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Deliver queued notifications on the calling thread, then destroy unused instances.
    ///
    /// Only notifications queued before the call are delivered, so a listener that
    /// triggers more work cannot keep this from returning.
    pub fn dispatch_events(&self) {
        profile_function!();
        let pending = self.shared.event_rx.len();
        for event in self.shared.event_rx.try_iter().take(pending) {
            self.shared.listeners.notify(&event);
        }
        self.collect_garbage();
    }

    /// Destroy retired instances. Destroying one can retire its children, so repeat
    /// until the dead list stays empty.
    fn collect_garbage(&self) {
        profile_scope!("collect_garbage");
        loop {
            let dead = self.shared.registry.take_dead();
            if dead.is_empty() {
                break;
            }
            for data in dead {
                if !self.shared.registry.remove_if_unused(&data) {
                    continue;
                }
                tracing::trace!("Destroying asset {}", data.id());
                self.shared.listeners.notify(&AssetEvent::Unloaded {
                    id: data.id(),
                    asset_type: data.asset_type(),
                });
                match data.owner().map(|owner| Arc::clone(&owner.handler)) {
                    Some(slot) => {
                        slot.instance_destroyed();
                        slot.handler().destroy_asset(data);
                    }
                    None => drop(data),
                }
            }
        }
    }

    // ===== Inspection =====

    /// Number of registered instances, including ones awaiting destruction.
    pub fn asset_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.len()
    }

    pub fn is_in_flight(&self, id: AssetId) -> bool {
        self.shared.in_flight.contains(id)
    }

    pub fn pending_event_count(&self) -> usize {
        self.shared.event_rx.len()
    }

    /// Instances whose last handle was dropped since the last dispatch.
    pub fn pending_release_count(&self) -> usize {
        self.shared.registry.dead_len()
    }

    pub fn pending_job_count(&self) -> usize {
        self.shared.pool.pending()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.pool.size()
    }

    pub fn streamer(&self) -> &Arc<dyn StreamProvider> {
        &self.shared.streamer
    }
}

impl std::fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetManager")
            .field("assets", &self.asset_count())
            .field("in_flight", &self.in_flight_count())
            .field("workers", &self.worker_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::catalog::{AssetStreamInfo, SimpleCatalog};
    use crate::data::ErasedPayload;
    use crate::handler::{PayloadHandler, TypedHandler};
    use crate::io::{AssetStream, AssetWriter, MemoryStreamer};

    #[derive(Default)]
    struct Text(String);

    impl AssetPayload for Text {
        const ASSET_TYPE: AssetType = AssetType::from_u128(0x7E47);
    }

    struct TextHandler;

    impl PayloadHandler for TextHandler {
        type Payload = Text;

        fn load(&self, stream: &mut AssetStream, _ctx: &LoadContext<'_>) -> AssetResult<Text> {
            let text = stream.read_to_string()?;
            if text == "panic" {
                panic!("bad text");
            }
            Ok(Text(text))
        }

        fn save(&self, payload: &Text, writer: &mut dyn Write) -> AssetResult<()> {
            writer.write_all(payload.0.as_bytes())?;
            Ok(())
        }
    }

    fn setup() -> (AssetManager, MemoryStreamer, Arc<SimpleCatalog>) {
        let streamer = MemoryStreamer::new();
        let manager = AssetManager::new(
            AssetManagerDescriptor::default()
                .with_max_worker_threads(2)
                .with_streamer(Arc::new(streamer.clone())),
        )
        .unwrap();
        let catalog = Arc::new(SimpleCatalog::new());
        manager.register_handler(Arc::new(TypedHandler::new(TextHandler)), Text::ASSET_TYPE);
        manager.register_catalog(catalog.clone(), Text::ASSET_TYPE);
        (manager, streamer, catalog)
    }

    const ID: AssetId = AssetId::from_u128(0x1, 0);

    #[test]
    fn test_blocking_get_loads_payload() {
        let (manager, streamer, catalog) = setup();
        streamer.insert("a.txt", b"hello".to_vec());
        catalog.insert(ID, "a.txt");

        let text: Asset<Text> = manager.get_asset(ID, &LoadSettings::default().blocking(true));
        assert!(text.is_ready());
        assert_eq!(text.get().unwrap().0, "hello");
        assert_eq!(text.data().unwrap().version(), 1);
    }

    #[test]
    fn test_missing_stream_is_an_error() {
        let (manager, _, catalog) = setup();
        catalog.insert(ID, "missing.txt");

        let text: Asset<Text> = manager.get_asset(ID, &LoadSettings::default().blocking(true));
        assert!(text.is_error());
        assert!(text.data().unwrap().error().is_some());
    }

    #[test]
    fn test_handler_panic_becomes_error() {
        let (manager, streamer, catalog) = setup();
        streamer.insert("p.txt", b"panic".to_vec());
        catalog.insert(ID, "p.txt");

        let text: Asset<Text> = manager.get_asset(ID, &LoadSettings::default().blocking(true));
        assert!(text.is_error());
        assert!(text.data().unwrap().error().unwrap().contains("bad text"));
        assert_eq!(manager.in_flight_count(), 0);
    }

    struct PanickingCatalog;

    impl AssetCatalog for PanickingCatalog {
        fn stream_info_for_load(
            &self,
            _id: AssetId,
            _asset_type: AssetType,
        ) -> Option<AssetStreamInfo> {
            panic!("catalog lookup failed");
        }
    }

    struct PanickingStreamer;

    impl StreamProvider for PanickingStreamer {
        fn open_read(&self, _info: &AssetStreamInfo) -> AssetResult<AssetStream> {
            panic!("stream backend failed");
        }

        fn open_write(&self, _info: &AssetStreamInfo) -> AssetResult<AssetWriter> {
            panic!("stream backend failed");
        }
    }

    /// Hands out one payload, then panics on every later create.
    #[derive(Default)]
    struct CreateOnce(AtomicUsize);

    impl AssetHandler for CreateOnce {
        fn create_asset(&self, _id: AssetId, _asset_type: AssetType) -> Option<ErasedPayload> {
            if self.0.fetch_add(1, Ordering::SeqCst) > 0 {
                panic!("no more payloads");
            }
            Some(Box::new(Text::default()))
        }

        fn load_asset_data(
            &self,
            asset: &UntypedAsset,
            stream: &mut AssetStream,
            _ctx: &LoadContext<'_>,
        ) -> AssetResult<()> {
            let text = stream.read_to_string()?;
            if let Some(mut payload) = asset.write::<Text>() {
                payload.0 = text;
            }
            Ok(())
        }

        fn handled_asset_types(&self) -> Vec<AssetType> {
            vec![Text::ASSET_TYPE]
        }
    }

    fn wait_for_done(manager: &AssetManager, asset: &UntypedAsset) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            manager.dispatch_events();
            if asset.status().is_done() && !manager.is_in_flight(asset.id()) {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_catalog_panic_becomes_error() {
        let (manager, _, catalog) = setup();
        manager.unregister_catalog(&catalog);
        manager.register_catalog(Arc::new(PanickingCatalog), Text::ASSET_TYPE);

        let queued: Asset<Text> = manager.get_asset(ID, &LoadSettings::default());
        assert!(wait_for_done(&manager, &queued));
        assert!(queued.is_error());
        assert!(queued.data().unwrap().error().unwrap().contains("catalog lookup failed"));
        assert_eq!(manager.in_flight_count(), 0);
    }

    #[test]
    fn test_streamer_panic_does_not_block_waiters() {
        let manager = AssetManager::new(
            AssetManagerDescriptor::default()
                .with_max_worker_threads(1)
                .with_streamer(Arc::new(PanickingStreamer)),
        )
        .unwrap();
        let catalog = Arc::new(SimpleCatalog::new());
        catalog.insert(ID, "a.txt");
        manager.register_handler(Arc::new(TypedHandler::new(TextHandler)), Text::ASSET_TYPE);
        manager.register_catalog(catalog, Text::ASSET_TYPE);

        let text: Asset<Text> = manager.get_asset(ID, &LoadSettings::default().blocking(true));
        assert!(text.is_error());
        assert!(text.data().unwrap().error().unwrap().contains("stream backend failed"));
        assert_eq!(manager.in_flight_count(), 0);
        assert_eq!(manager.block_until_load_complete(&text), AssetStatus::Error);
    }

    #[test]
    fn test_reload_create_panic_keeps_previous_payload() {
        let streamer = MemoryStreamer::new();
        streamer.insert("a.txt", b"v1".to_vec());
        let manager = AssetManager::new(
            AssetManagerDescriptor::default()
                .with_max_worker_threads(2)
                .with_streamer(Arc::new(streamer.clone())),
        )
        .unwrap();
        let catalog = Arc::new(SimpleCatalog::new());
        catalog.insert(ID, "a.txt");
        manager.register_handler(Arc::new(CreateOnce::default()), Text::ASSET_TYPE);
        manager.register_catalog(catalog, Text::ASSET_TYPE);

        let text: Asset<Text> = manager.get_asset(ID, &LoadSettings::default().blocking(true));
        assert!(text.is_ready());

        streamer.insert("a.txt", b"v2".to_vec());
        assert!(manager.reload_asset(ID));
        assert_eq!(manager.block_until_load_complete(&text), AssetStatus::Ready);
        assert_eq!(text.get().unwrap().0, "v1");
        assert_eq!(text.data().unwrap().version(), 1);
        assert_eq!(manager.in_flight_count(), 0);
    }

    #[test]
    fn test_no_catalog_sets_error() {
        let (manager, _, catalog) = setup();
        manager.unregister_catalog(&catalog);

        let text: Asset<Text> = manager.get_asset(ID, &LoadSettings::default());
        assert!(text.is_error());
        assert_eq!(manager.pending_event_count(), 1);
    }

    #[test]
    fn test_create_only_does_not_load() {
        let (manager, _, _) = setup();
        let text: Asset<Text> = manager.create_asset(ID);
        assert_eq!(text.status(), AssetStatus::NotLoaded);
        assert_eq!(manager.in_flight_count(), 0);
    }

    #[test]
    fn test_release_is_deferred_to_dispatch() {
        let (manager, _, _) = setup();
        let text: Asset<Text> = manager.create_asset(ID);
        drop(text);

        assert_eq!(manager.pending_release_count(), 1);
        assert_eq!(manager.asset_count(), 1);
        manager.dispatch_events();
        assert_eq!(manager.asset_count(), 0);
        assert!(!manager.find_asset::<Text>(ID).has_data());
    }

    #[test]
    fn test_save_writes_through_streamer() {
        let (manager, streamer, catalog) = setup();
        catalog.insert(ID, "out.txt");
        let text = manager.create_asset::<Text>(ID);
        text.get_mut().unwrap().0 = "saved".into();

        assert!(manager.save_asset(&text));
        manager.shutdown();
        assert_eq!(&*streamer.get("out.txt").unwrap(), b"saved");
    }

    #[test]
    fn test_queue_after_shutdown_fails_cleanly() {
        let (manager, streamer, catalog) = setup();
        streamer.insert("a.txt", b"late".to_vec());
        catalog.insert(ID, "a.txt");
        manager.shutdown();

        let text: Asset<Text> = manager.get_asset(ID, &LoadSettings::default());
        assert!(text.is_error());
        assert_eq!(manager.in_flight_count(), 0);
    }
}
