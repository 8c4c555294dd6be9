//! Asset handles - reference-counted, type-checked references to asset instances.
//!
//! Cloning a handle adds a use; dropping it removes one. When the last use goes
//! away the instance is handed to the manager, which destroys it during the next
//! [`dispatch_events`](crate::AssetManager::dispatch_events).

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::data::{AssetData, AssetPayload, ErasedPayload};
use crate::id::{AssetId, AssetType};
use crate::manager::AssetManager;
use crate::settings::{AssetLoadBehavior, LoadSettings};
use crate::state::AssetStatus;

/// A handle that can reference any asset type.
///
/// An empty handle can still carry an id, a type and a hint. That is how references
/// are stored inside other assets before they are resolved.
pub struct UntypedAsset {
    data: Option<Arc<AssetData>>,
    id: AssetId,
    asset_type: AssetType,
    hint: String,
    load_behavior: AssetLoadBehavior,
}

impl UntypedAsset {
    pub fn new() -> Self {
        Self::reference(AssetId::INVALID, AssetType::NIL)
    }

    /// An unresolved reference to `id`.
    pub fn reference(id: AssetId, asset_type: AssetType) -> Self {
        Self {
            data: None,
            id,
            asset_type,
            hint: String::new(),
            load_behavior: AssetLoadBehavior::default(),
        }
    }

    /// A new handle sharing `data`.
    pub fn from_data(data: &Arc<AssetData>) -> Self {
        let mut handle = Self::new();
        handle.attach(data);
        handle
    }

    /// Wrap a payload that was built outside any manager.
    ///
    /// The instance is marked ready and is freed as soon as its last handle drops.
    /// It never counts toward a handler's active instances.
    pub fn from_payload(id: AssetId, asset_type: AssetType, payload: ErasedPayload) -> Self {
        let data = AssetData::unmanaged(id, asset_type, payload);
        data.set_status(AssetStatus::Ready);
        data.bump_version();
        Self::from_data(&data)
    }

    /// Point this handle at `data`, whatever its type.
    pub fn set_data(&mut self, data: &Arc<AssetData>) {
        self.attach(data);
    }

    fn attach(&mut self, data: &Arc<AssetData>) {
        if self.data.as_ref().is_some_and(|current| Arc::ptr_eq(current, data)) {
            return;
        }
        data.acquire();
        self.release();
        self.id = data.id();
        self.asset_type = data.asset_type();
        self.data = Some(Arc::clone(data));
    }

    /// Drop this handle's use of the instance. Id, type and hint are kept.
    pub fn release(&mut self) {
        if let Some(data) = self.data.take() {
            data.release();
        }
    }

    /// Release and forget the id as well.
    pub fn reset(&mut self) {
        self.release();
        self.id = AssetId::INVALID;
        self.hint.clear();
    }

    pub(crate) fn adopt(&mut self, mut resolved: UntypedAsset) {
        if resolved.hint.is_empty() {
            resolved.hint = std::mem::take(&mut self.hint);
        }
        resolved.load_behavior = self.load_behavior;
        *self = resolved;
    }

    pub fn data(&self) -> Option<&Arc<AssetData>> {
        self.data.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    pub fn hint(&self) -> &str {
        &self.hint
    }

    pub fn set_hint(&mut self, hint: impl Into<String>) {
        self.hint = hint.into();
    }

    pub fn load_behavior(&self) -> AssetLoadBehavior {
        self.load_behavior
    }

    pub fn set_load_behavior(&mut self, behavior: AssetLoadBehavior) {
        self.load_behavior = behavior;
    }

    /// `NotLoaded` for an empty handle.
    pub fn status(&self) -> AssetStatus {
        self.data.as_ref().map_or(AssetStatus::NotLoaded, |data| data.status())
    }

    pub fn is_ready(&self) -> bool {
        self.status() == AssetStatus::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.status().is_loading()
    }

    pub fn is_error(&self) -> bool {
        self.status() == AssetStatus::Error
    }

    /// Live handles to the instance, including this one. Zero for an empty handle.
    pub fn use_count(&self) -> usize {
        self.data.as_ref().map_or(0, |data| data.use_count())
    }

    pub fn read<T: Any>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        self.data.as_ref()?.read::<T>()
    }

    pub fn write<T: Any>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        self.data.as_ref()?.write::<T>()
    }

    /// A typed handle to the same instance, or `None` if the types differ.
    pub fn typed<T: AssetPayload>(&self) -> Option<Asset<T>> {
        if self.asset_type != T::ASSET_TYPE {
            return None;
        }
        Some(Asset {
            inner: self.clone(),
            _marker: PhantomData,
        })
    }

    /// Like [`typed`](Self::typed), but hands the reference over instead of cloning it.
    pub fn into_typed<T: AssetPayload>(self) -> Result<Asset<T>, UntypedAsset> {
        if self.asset_type != T::ASSET_TYPE {
            return Err(self);
        }
        Ok(Asset {
            inner: self,
            _marker: PhantomData,
        })
    }

    /// Look the asset up through `manager`, registering it if needed, and queue a load.
    pub fn create(
        &mut self,
        manager: &AssetManager,
        id: AssetId,
        asset_type: AssetType,
        queue_load: bool,
    ) -> bool {
        let settings = LoadSettings::default().queue_load(queue_load);
        let resolved = manager.get_asset_untyped(id, asset_type, &settings);
        let created = resolved.has_data();
        self.adopt(resolved);
        created
    }

    /// Queue a load of the referenced instance, resolving the reference first if needed.
    pub fn queue_load(&mut self, manager: &AssetManager) -> bool {
        if !self.has_data() {
            return self.create(manager, self.id, self.asset_type, true);
        }
        manager.queue_load(self, None)
    }

    pub fn save(&self, manager: &AssetManager) -> bool {
        manager.save_asset(self)
    }

    pub fn reload(&self, manager: &AssetManager) -> bool {
        manager.reload_asset(self.id)
    }

    /// Block until the load in flight for this asset finishes.
    pub fn block_until_load_complete(&self, manager: &AssetManager) -> AssetStatus {
        manager.block_until_load_complete(self)
    }
}

impl Default for UntypedAsset {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for UntypedAsset {
    fn clone(&self) -> Self {
        if let Some(data) = &self.data {
            data.acquire();
        }
        Self {
            data: self.data.clone(),
            id: self.id,
            asset_type: self.asset_type,
            hint: self.hint.clone(),
            load_behavior: self.load_behavior,
        }
    }
}

impl Drop for UntypedAsset {
    fn drop(&mut self) {
        self.release();
    }
}

impl PartialEq for UntypedAsset {
    fn eq(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => self.id == other.id && self.asset_type == other.asset_type,
            _ => false,
        }
    }
}

impl fmt::Debug for UntypedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UntypedAsset")
            .field("id", &self.id)
            .field("asset_type", &self.asset_type)
            .field("hint", &self.hint)
            .field("status", &self.status())
            .field("use_count", &self.use_count())
            .finish()
    }
}

/// A typed handle to an asset.
///
/// The type tag is always `T::ASSET_TYPE`; assigning an instance of another type
/// is refused and leaves the handle as it was.
///
/// # Example
///
/// ```ignore
/// let mesh: Asset<Mesh> = manager.get_asset(id, &LoadSettings::default().blocking(true));
///
/// if mesh.is_ready() {
///     let vertices = mesh.get().unwrap().vertices.len();
/// }
/// ```
pub struct Asset<T: AssetPayload> {
    inner: UntypedAsset,
    _marker: PhantomData<fn() -> T>,
}

impl<T: AssetPayload> Asset<T> {
    pub fn new() -> Self {
        Self::reference(AssetId::INVALID)
    }

    /// An unresolved reference to `id`.
    pub fn reference(id: AssetId) -> Self {
        Self {
            inner: UntypedAsset::reference(id, T::ASSET_TYPE),
            _marker: PhantomData,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.inner.set_hint(hint);
        self
    }

    pub fn with_load_behavior(mut self, behavior: AssetLoadBehavior) -> Self {
        self.inner.set_load_behavior(behavior);
        self
    }

    /// A handle to `data`, or an empty handle if `data` is not a `T`.
    pub fn from_data(data: &Arc<AssetData>) -> Self {
        let mut handle = Self::new();
        handle.set_data(data);
        handle
    }

    /// Wrap a payload built outside any manager. See [`UntypedAsset::from_payload`].
    pub fn from_payload(id: AssetId, payload: T) -> Self {
        Self {
            inner: UntypedAsset::from_payload(id, T::ASSET_TYPE, Box::new(payload)),
            _marker: PhantomData,
        }
    }

    /// Point this handle at `data`.
    ///
    /// Instances of another asset type are refused: the error is logged, `false` is
    /// returned and the handle keeps its previous state.
    pub fn set_data(&mut self, data: &Arc<AssetData>) -> bool {
        if data.asset_type() != T::ASSET_TYPE {
            tracing::error!(
                "Cannot assign asset {} of type {} to a handle of type {} ({})",
                data.id(),
                data.asset_type(),
                T::ASSET_TYPE,
                T::type_name()
            );
            return false;
        }
        self.inner.set_data(data);
        true
    }

    /// Borrow the payload. `None` for an empty handle.
    ///
    /// The payload exists before the load finishes; check [`is_ready`](UntypedAsset::is_ready)
    /// before relying on its contents.
    pub fn get(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        self.inner.read::<T>()
    }

    pub fn get_mut(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        self.inner.write::<T>()
    }

    pub fn set_hint(&mut self, hint: impl Into<String>) {
        self.inner.set_hint(hint);
    }

    pub fn set_load_behavior(&mut self, behavior: AssetLoadBehavior) {
        self.inner.set_load_behavior(behavior);
    }

    pub fn release(&mut self) {
        self.inner.release();
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn untyped(&self) -> &UntypedAsset {
        &self.inner
    }

    pub fn into_untyped(self) -> UntypedAsset {
        // `Asset` has no Drop of its own, so the inner handle moves out without a release.
        self.inner
    }

    pub(crate) fn untyped_mut(&mut self) -> &mut UntypedAsset {
        &mut self.inner
    }

    pub fn create(&mut self, manager: &AssetManager, id: AssetId, queue_load: bool) -> bool {
        self.inner.create(manager, id, T::ASSET_TYPE, queue_load)
    }

    pub fn queue_load(&mut self, manager: &AssetManager) -> bool {
        self.inner.queue_load(manager)
    }
}

impl<T: AssetPayload> Default for Asset<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AssetPayload> Clone for Asset<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: AssetPayload> PartialEq for Asset<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: AssetPayload> std::ops::Deref for Asset<T> {
    type Target = UntypedAsset;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: AssetPayload> From<Asset<T>> for UntypedAsset {
    fn from(asset: Asset<T>) -> Self {
        asset.into_untyped()
    }
}

impl<T: AssetPayload> fmt::Debug for Asset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("payload", &T::type_name())
            .field("id", &self.inner.id)
            .field("hint", &self.inner.hint)
            .field("status", &self.inner.status())
            .field("use_count", &self.inner.use_count())
            .finish()
    }
}

/// Persisted form of a reference: id, type, hint and a non-default load behaviour.
#[derive(Serialize, Deserialize)]
struct AssetReference {
    id: AssetId,
    #[serde(rename = "type")]
    asset_type: AssetType,
    #[serde(default)]
    hint: String,
    #[serde(default, skip_serializing_if = "AssetLoadBehavior::is_default")]
    load_behavior: AssetLoadBehavior,
}

impl AssetReference {
    fn of(asset: &UntypedAsset) -> Self {
        Self {
            id: asset.id,
            asset_type: asset.asset_type,
            hint: asset.hint.clone(),
            load_behavior: asset.load_behavior,
        }
    }

    fn into_handle(self) -> UntypedAsset {
        let mut handle = UntypedAsset::reference(self.id, self.asset_type);
        handle.hint = self.hint;
        handle.load_behavior = self.load_behavior;
        handle
    }
}

impl Serialize for UntypedAsset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        AssetReference::of(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UntypedAsset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        AssetReference::deserialize(deserializer).map(AssetReference::into_handle)
    }
}

impl<T: AssetPayload> Serialize for Asset<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl<'de, T: AssetPayload> Deserialize<'de> for Asset<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut reference = AssetReference::deserialize(deserializer)?;
        if reference.asset_type.is_nil() {
            reference.asset_type = T::ASSET_TYPE;
        } else if reference.asset_type != T::ASSET_TYPE {
            return Err(serde::de::Error::custom(format!(
                "asset reference of type {} stored where {} ({}) was expected",
                reference.asset_type,
                T::ASSET_TYPE,
                T::type_name()
            )));
        }
        Ok(Self {
            inner: reference.into_handle(),
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Texture {
        width: u32,
    }

    impl AssetPayload for Texture {
        const ASSET_TYPE: AssetType = AssetType::from_u128(0x7e47);
    }

    #[derive(Debug, Default)]
    struct Sound;

    impl AssetPayload for Sound {
        const ASSET_TYPE: AssetType = AssetType::from_u128(0x50d);
    }

    #[test]
    fn test_clone_and_drop_track_use_count() {
        let first = Asset::from_payload(AssetId::from_u128(1, 0), Texture { width: 4 });
        assert_eq!(first.use_count(), 1);

        let second = first.clone();
        assert_eq!(first.use_count(), 2);

        let moved = second;
        assert_eq!(first.use_count(), 2);

        drop(moved);
        assert_eq!(first.use_count(), 1);
        assert_eq!(first.get().unwrap().width, 4);
    }

    #[test]
    fn test_release_keeps_identity() {
        let id = AssetId::from_u128(2, 3);
        let mut asset = Asset::from_payload(id, Texture::default()).with_hint("tex/a.tex");
        asset.release();
        assert!(!asset.has_data());
        assert_eq!(asset.id(), id);
        assert_eq!(asset.hint(), "tex/a.tex");
        assert_eq!(asset.asset_type(), Texture::ASSET_TYPE);
    }

    #[test]
    fn test_incompatible_assignment_is_rejected() {
        let sound = UntypedAsset::from_payload(
            AssetId::from_u128(3, 0),
            Sound::ASSET_TYPE,
            Box::new(Sound),
        );
        let data = Arc::clone(sound.data().unwrap());

        let mut texture: Asset<Texture> = Asset::new();
        assert!(!texture.set_data(&data));
        assert!(texture.get().is_none());
        assert!(!texture.id().is_valid());
        assert_eq!(texture.asset_type(), Texture::ASSET_TYPE);
        assert_eq!(sound.use_count(), 1);

        let from_data = Asset::<Texture>::from_data(&data);
        assert!(!from_data.has_data());
    }

    #[test]
    fn test_typed_conversion() {
        let untyped = UntypedAsset::from_payload(
            AssetId::from_u128(4, 0),
            Texture::ASSET_TYPE,
            Box::new(Texture { width: 16 }),
        );
        assert!(untyped.typed::<Sound>().is_none());

        let typed = untyped.typed::<Texture>().unwrap();
        assert_eq!(typed.get().unwrap().width, 16);
        assert_eq!(untyped.use_count(), 2);
        assert_eq!(UntypedAsset::from(typed), untyped);
    }

    #[test]
    fn test_reference_serde() {
        let id = AssetId::from_u128(0x5B29FE2B_6B41_48C9_826A_C723951B0560, 1);
        let asset = Asset::<Texture>::reference(id)
            .with_hint("textures/wall.tex")
            .with_load_behavior(AssetLoadBehavior::QueueLoad);

        let json = serde_json::to_string(&asset).unwrap();
        assert!(json.contains("{5B29FE2B-6B41-48C9-826A-C723951B0560}:1"));

        let back: Asset<Texture> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), id);
        assert_eq!(back.asset_type(), Texture::ASSET_TYPE);
        assert_eq!(back.hint(), "textures/wall.tex");
        assert_eq!(back.load_behavior(), AssetLoadBehavior::QueueLoad);
        assert!(!back.has_data());
    }

    #[test]
    fn test_empty_reference_serde() {
        let json = serde_json::to_string(&Asset::<Texture>::new()).unwrap();
        let back: Asset<Texture> = serde_json::from_str(&json).unwrap();
        assert!(!back.id().is_valid());
        assert_eq!(back.asset_type(), Texture::ASSET_TYPE);
        assert_eq!(back.load_behavior(), AssetLoadBehavior::PreLoad);
    }

    #[test]
    fn test_mismatched_stored_type_fails() {
        let json =
            serde_json::to_string(&Asset::<Sound>::reference(AssetId::from_u128(9, 0))).unwrap();
        assert!(serde_json::from_str::<Asset<Texture>>(&json).is_err());
    }
}
