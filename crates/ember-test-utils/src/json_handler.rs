//! A serde_json backed asset handler that records what it was asked to do.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ember_assets::prelude::*;
use ember_assets::ErasedPayload;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Payload stored as JSON.
///
/// `resolve` runs after deserialization, on the loading thread, and is where
/// nested references get resolved through the [`LoadContext`].
pub trait JsonAsset: AssetPayload + Default + Serialize + DeserializeOwned {
    fn resolve(&mut self, _ctx: &LoadContext<'_>) {}
}

type LoadFn = fn(&UntypedAsset, &[u8], &LoadContext<'_>) -> AssetResult<()>;
type SaveFn = fn(&UntypedAsset, &mut dyn Write) -> AssetResult<()>;

struct JsonType {
    create: fn() -> ErasedPayload,
    load: LoadFn,
    save: SaveFn,
}

/// Records a handler call for verification in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerCall {
    Create { id: AssetId, asset_type: AssetType },
    Load { id: AssetId, reload: bool },
    Save { id: AssetId },
    Destroy { id: AssetId },
}

/// Handles any number of [`JsonAsset`] types.
///
/// # Example
///
/// ```rust,ignore
/// let handler = Arc::new(JsonAssetHandler::new().with_type::<Mesh>().with_type::<Material>());
/// manager.register_handler_for_types(handler.clone());
/// // ... load some assets ...
/// assert_eq!(handler.created(), handler.destroyed());
/// ```
#[derive(Default)]
pub struct JsonAssetHandler {
    types: RwLock<Vec<(AssetType, JsonType)>>,
    calls: Mutex<Vec<HandlerCall>>,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    loads: AtomicUsize,
    load_delay: Mutex<Option<Duration>>,
}

impl JsonAssetHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type<T: JsonAsset>(self) -> Self {
        self.add_type::<T>();
        self
    }

    pub fn add_type<T: JsonAsset>(&self) {
        let entry = JsonType {
            create: create_default::<T>,
            load: load_json::<T>,
            save: save_json::<T>,
        };
        let mut types = self.types.write();
        types.retain(|(asset_type, _)| *asset_type != T::ASSET_TYPE);
        types.push((T::ASSET_TYPE, entry));
    }

    /// Sleep this long before parsing each stream, to widen race windows.
    pub fn with_load_delay(self, delay: Duration) -> Self {
        *self.load_delay.lock() = Some(delay);
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Instances created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.created().saturating_sub(self.destroyed())
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }

    pub fn count_loads_of(&self, id: AssetId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, HandlerCall::Load { id: loaded, .. } if *loaded == id))
            .count()
    }

    fn record(&self, call: HandlerCall) {
        self.calls.lock().push(call);
    }

    fn with_entry<R>(&self, asset_type: AssetType, f: impl FnOnce(&JsonType) -> R) -> Option<R> {
        let types = self.types.read();
        types.iter().find(|(ty, _)| *ty == asset_type).map(|(_, entry)| f(entry))
    }
}

impl AssetHandler for JsonAssetHandler {
    fn create_asset(&self, id: AssetId, asset_type: AssetType) -> Option<ErasedPayload> {
        let payload = self.with_entry(asset_type, |entry| (entry.create)())?;
        self.created.fetch_add(1, Ordering::SeqCst);
        self.record(HandlerCall::Create { id, asset_type });
        Some(payload)
    }

    fn load_asset_data(
        &self,
        asset: &UntypedAsset,
        stream: &mut AssetStream,
        ctx: &LoadContext<'_>,
    ) -> AssetResult<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.record(HandlerCall::Load {
            id: asset.id(),
            reload: ctx.is_reload(),
        });
        let delay = *self.load_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let bytes = stream.read_to_vec()?;
        let load = self
            .with_entry(asset.asset_type(), |entry| entry.load)
            .ok_or(AssetError::NoHandler {
                asset_type: asset.asset_type(),
            })?;
        load(asset, &bytes, ctx)
    }

    fn save_asset_data(&self, asset: &UntypedAsset, writer: &mut dyn Write) -> AssetResult<()> {
        self.record(HandlerCall::Save { id: asset.id() });
        let save = self
            .with_entry(asset.asset_type(), |entry| entry.save)
            .ok_or(AssetError::NoHandler {
                asset_type: asset.asset_type(),
            })?;
        save(asset, writer)
    }

    fn destroy_asset(&self, data: Arc<AssetData>) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        self.record(HandlerCall::Destroy { id: data.id() });
        drop(data);
    }

    fn handled_asset_types(&self) -> Vec<AssetType> {
        self.types.read().iter().map(|(asset_type, _)| *asset_type).collect()
    }
}

fn create_default<T: JsonAsset>() -> ErasedPayload {
    Box::new(T::default())
}

fn load_json<T: JsonAsset>(
    asset: &UntypedAsset,
    bytes: &[u8],
    ctx: &LoadContext<'_>,
) -> AssetResult<()> {
    let mut value: T = serde_json::from_slice(bytes).map_err(|err| AssetError::Serialization {
        id: asset.id(),
        message: err.to_string(),
    })?;
    value.resolve(ctx);

    let mut slot = asset.write::<T>().ok_or(AssetError::TypeMismatch {
        expected: T::ASSET_TYPE,
        actual: asset.asset_type(),
    })?;
    *slot = value;
    Ok(())
}

fn save_json<T: JsonAsset>(asset: &UntypedAsset, writer: &mut dyn Write) -> AssetResult<()> {
    let value = asset.read::<T>().ok_or(AssetError::TypeMismatch {
        expected: T::ASSET_TYPE,
        actual: asset.asset_type(),
    })?;
    serde_json::to_writer_pretty(writer, &*value).map_err(|err| AssetError::Serialization {
        id: asset.id(),
        message: err.to_string(),
    })
}
