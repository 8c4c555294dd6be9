//! The shared asset instance behind every handle.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence};
use std::sync::{Arc, Weak};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::error::{AssetError, AssetResult};
use crate::handler::HandlerSlot;
use crate::id::{AssetId, AssetType};
use crate::manager::Shared;
use crate::state::{AssetStatus, AssetVersion, AtomicAssetStatus};

/// Type-erased payload storage.
pub type ErasedPayload = Box<dyn Any + Send + Sync>;

/// Trait for concrete payload kinds.
///
/// Each kind declares the [`AssetType`] tag its handler is registered under.
///
/// ```
/// use ember_assets::prelude::*;
///
/// #[derive(Default)]
/// struct Mesh {
///     vertices: Vec<[f32; 3]>,
/// }
///
/// impl AssetPayload for Mesh {
///     const ASSET_TYPE: AssetType =
///         AssetType::from_u128(0x6b2b_0e83_1c1d_4f5e_9a0f_6a43_01c2_77d1);
/// }
/// ```
pub trait AssetPayload: Any + Send + Sync {
    const ASSET_TYPE: AssetType;

    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Links a manager-created instance back to the manager and the handler that made it.
pub(crate) struct Owner {
    pub(crate) manager: Weak<Shared>,
    pub(crate) handler: Arc<HandlerSlot>,
}

/// One live asset instance.
///
/// There is at most one `AssetData` per [`AssetId`] inside a manager. Handles share it
/// and keep `use_count` up to date; the manager destroys it during
/// [`dispatch_events`](crate::AssetManager::dispatch_events) once the count reaches zero.
pub struct AssetData {
    id: AssetId,
    asset_type: AssetType,
    status: AtomicAssetStatus,
    use_count: AtomicUsize,
    version: AssetVersion,
    payload: RwLock<ErasedPayload>,
    error: Mutex<Option<String>>,
    owner: Option<Owner>,
    retired: AtomicBool,
}

impl AssetData {
    pub(crate) fn managed(
        id: AssetId,
        asset_type: AssetType,
        payload: ErasedPayload,
        manager: Weak<Shared>,
        handler: Arc<HandlerSlot>,
    ) -> Arc<Self> {
        Arc::new(Self::build(
            id,
            asset_type,
            payload,
            Some(Owner { manager, handler }),
        ))
    }

    pub(crate) fn unmanaged(
        id: AssetId,
        asset_type: AssetType,
        payload: ErasedPayload,
    ) -> Arc<Self> {
        Arc::new(Self::build(id, asset_type, payload, None))
    }

    fn build(
        id: AssetId,
        asset_type: AssetType,
        payload: ErasedPayload,
        owner: Option<Owner>,
    ) -> Self {
        Self {
            id,
            asset_type,
            status: AtomicAssetStatus::new(AssetStatus::NotLoaded),
            use_count: AtomicUsize::new(0),
            version: AssetVersion::new(),
            payload: RwLock::new(payload),
            error: Mutex::new(None),
            owner,
            retired: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> AssetId {
        self.id
    }

    #[inline]
    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    #[inline]
    pub fn status(&self) -> AssetStatus {
        self.status.load()
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

    /// Number of live handles.
    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::Acquire)
    }

    /// Bumped on every successful load or reload.
    pub fn version(&self) -> u32 {
        self.version.get()
    }

    /// Message of the last failed load, if the asset is in the `Error` state.
    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    /// Whether this instance was created by an [`AssetManager`](crate::AssetManager).
    pub fn is_managed(&self) -> bool {
        self.owner.is_some()
    }

    /// Borrow the payload as `T`, or `None` if it is a different type.
    pub fn read<T: Any>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.payload.read(), |payload| payload.downcast_ref::<T>()).ok()
    }

    /// Mutably borrow the payload as `T`, or `None` if it is a different type.
    pub fn write<T: Any>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.payload.write(), |payload| payload.downcast_mut::<T>()).ok()
    }

    /// Swap in a payload of the same concrete type, returning the previous one.
    pub fn replace_payload(&self, payload: ErasedPayload) -> AssetResult<ErasedPayload> {
        let mut guard = self.payload.write();
        if (*payload).type_id() != (**guard).type_id() {
            return Err(AssetError::HandlerFailed {
                id: self.id,
                message: "replacement payload has a different concrete type".into(),
            });
        }
        Ok(std::mem::replace(&mut *guard, payload))
    }

    pub(crate) fn set_status(&self, status: AssetStatus) {
        self.status.store(status);
    }

    pub(crate) fn transition(&self, from: AssetStatus, to: AssetStatus) -> bool {
        self.status.transition(from, to).is_ok()
    }

    pub(crate) fn complete(&self, result: &AssetResult<()>) {
        match result {
            Ok(()) => {
                *self.error.lock() = None;
                self.version.increment();
                self.set_status(AssetStatus::Ready);
            }
            Err(err) => {
                *self.error.lock() = Some(err.to_string());
                self.set_status(AssetStatus::Error);
            }
        }
    }

    pub(crate) fn bump_version(&self) {
        self.version.increment();
    }

    pub(crate) fn take_payload_from(&self, scratch: &AssetData) -> ErasedPayload {
        let mut fresh = scratch.payload.write();
        let mut live = self.payload.write();
        let fresh = std::mem::replace(&mut *fresh, Box::new(()));
        std::mem::replace(&mut *live, fresh)
    }

    pub(crate) fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    /// Marks the instance destroyed. Returns false if it already was.
    pub(crate) fn retire(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn acquire(&self) {
        // Relaxed is enough: a new reference is only ever made from an existing
        // handle or under the registry lock.
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn release(self: &Arc<Self>) {
        // Release so writes made through this handle happen-before the retirement.
        if self.use_count.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);

        if let Some(shared) = self.owner.as_ref().and_then(|owner| owner.manager.upgrade()) {
            shared.retire(Arc::clone(self));
        }
    }
}

impl fmt::Debug for AssetData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetData")
            .field("id", &self.id)
            .field("asset_type", &self.asset_type)
            .field("status", &self.status())
            .field("use_count", &self.use_count())
            .field("version", &self.version())
            .field("managed", &self.is_managed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Blob(Vec<u8>);

    fn blob(bytes: &[u8]) -> Arc<AssetData> {
        AssetData::unmanaged(
            AssetId::from_u128(1, 0),
            AssetType::from_u128(9),
            Box::new(Blob(bytes.to_vec())),
        )
    }

    #[test]
    fn test_read_and_write_typed_payload() {
        let data = blob(&[1, 2]);
        assert_eq!(data.read::<Blob>().unwrap().0, vec![1, 2]);
        data.write::<Blob>().unwrap().0.push(3);
        assert_eq!(data.read::<Blob>().unwrap().0, vec![1, 2, 3]);
        assert!(data.read::<String>().is_none());
    }

    #[test]
    fn test_replace_payload_checks_concrete_type() {
        let data = blob(&[1]);
        let old = data.replace_payload(Box::new(Blob(vec![2]))).unwrap();
        assert_eq!(old.downcast_ref::<Blob>(), Some(&Blob(vec![1])));
        assert!(data.replace_payload(Box::new(String::from("nope"))).is_err());
        assert_eq!(data.read::<Blob>().unwrap().0, vec![2]);
    }

    #[test]
    fn test_complete_sets_status_and_version() {
        let data = blob(&[]);
        data.complete(&Ok(()));
        assert!(data.is_ready());
        assert_eq!(data.version(), 1);

        data.complete(&Err(AssetError::Other("broken".into())));
        assert!(data.is_error());
        assert_eq!(data.error().as_deref(), Some("broken"));
        assert_eq!(data.version(), 1);
    }

    #[test]
    fn test_unmanaged_release_is_silent() {
        let data = blob(&[]);
        data.acquire();
        data.release();
        assert_eq!(data.use_count(), 0);
        assert!(!data.is_managed());
        assert!(!data.is_retired());
    }
}
