//! Asset status machine and version tracking.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Where an asset instance is in the loading pipeline.
///
/// `NotLoaded -> Queued -> Loading -> Ready | Error`, and `Ready -> Loading` while
/// a reload is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AssetStatus {
    /// Created but never asked to load.
    #[default]
    NotLoaded = 0,

    /// A load job has been submitted but has not started.
    Queued = 1,

    /// A load (or reload) is running.
    Loading = 2,

    /// The payload is populated.
    Ready = 3,

    /// The load failed. Identity and type stay valid.
    Error = 4,
}

impl AssetStatus {
    /// Returns true if loading has finished, successfully or not.
    pub fn is_done(&self) -> bool {
        matches!(self, AssetStatus::Ready | AssetStatus::Error)
    }

    /// Returns true while a job is queued or running.
    pub fn is_loading(&self) -> bool {
        matches!(self, AssetStatus::Queued | AssetStatus::Loading)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => AssetStatus::Queued,
            2 => AssetStatus::Loading,
            3 => AssetStatus::Ready,
            4 => AssetStatus::Error,
            _ => AssetStatus::NotLoaded,
        }
    }
}

/// Lock-free cell holding an [`AssetStatus`].
#[derive(Debug, Default)]
pub struct AtomicAssetStatus(AtomicU8);

impl AtomicAssetStatus {
    pub fn new(status: AssetStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    // Acquire pairs with the Release in `store` so a reader that sees Ready
    // also sees the payload written before it.
    pub fn load(&self) -> AssetStatus {
        AssetStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: AssetStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Move from `current` to `new`, failing if another thread got there first.
    pub fn transition(&self, current: AssetStatus, new: AssetStatus) -> Result<(), AssetStatus> {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(AssetStatus::from_u8)
    }
}

/// Version tracker for change detection.
///
/// Starts at 0 and increments every time a load or reload completes successfully.
#[derive(Debug, Default)]
pub struct AssetVersion {
    value: AtomicU32,
}

impl AssetVersion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current version number.
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Increment the version and return the new value.
    pub fn increment(&self) -> u32 {
        self.value.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(!AssetStatus::NotLoaded.is_done());
        assert!(AssetStatus::Queued.is_loading());
        assert!(AssetStatus::Loading.is_loading());
        assert!(AssetStatus::Ready.is_done());
        assert!(AssetStatus::Error.is_done());
        assert!(!AssetStatus::Error.is_loading());
    }

    #[test]
    fn test_transition_only_from_expected_state() {
        let status = AtomicAssetStatus::new(AssetStatus::NotLoaded);
        assert!(status.transition(AssetStatus::NotLoaded, AssetStatus::Queued).is_ok());
        assert_eq!(
            status.transition(AssetStatus::NotLoaded, AssetStatus::Queued),
            Err(AssetStatus::Queued)
        );
        status.store(AssetStatus::Ready);
        assert_eq!(status.load(), AssetStatus::Ready);
    }

    #[test]
    fn test_version_increments() {
        let version = AssetVersion::new();
        assert_eq!(version.get(), 0);
        assert_eq!(version.increment(), 1);
        assert_eq!(version.increment(), 2);
        assert_eq!(version.get(), 2);
    }
}
