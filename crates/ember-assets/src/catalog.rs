//! Catalog: maps an asset id to the stream holding its bytes.

use ember_core::alloc::HashMap;
use parking_lot::RwLock;

use crate::id::{AssetId, AssetType};

/// Direction a stream is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Read,
    Write,
}

/// Where the bytes of one asset live.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssetStreamInfo {
    /// Name understood by the [`StreamProvider`](crate::io::StreamProvider), usually a
    /// relative path.
    pub stream_name: String,
    /// Byte offset of the asset inside the stream.
    pub data_offset: u64,
    /// Length in bytes. Zero means "up to the end of the stream".
    pub data_len: u64,
    pub mode: OpenMode,
}

impl AssetStreamInfo {
    pub fn read(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            mode: OpenMode::Read,
            ..Default::default()
        }
    }

    pub fn write(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            mode: OpenMode::Write,
            ..Default::default()
        }
    }

    /// Restrict the stream to `len` bytes starting at `offset`, for packed archives.
    pub fn with_range(mut self, offset: u64, len: u64) -> Self {
        self.data_offset = offset;
        self.data_len = len;
        self
    }
}

/// Resolves asset ids to stream locations.
///
/// Registered per [`AssetType`]. Returning `None` makes the load fail with
/// [`AssetError::NotFound`](crate::AssetError::NotFound).
pub trait AssetCatalog: Send + Sync + 'static {
    fn stream_info_for_load(&self, id: AssetId, asset_type: AssetType) -> Option<AssetStreamInfo>;

    /// Defaults to the load location opened for writing.
    fn stream_info_for_save(&self, id: AssetId, asset_type: AssetType) -> Option<AssetStreamInfo> {
        self.stream_info_for_load(id, asset_type).map(|info| AssetStreamInfo {
            mode: OpenMode::Write,
            data_offset: 0,
            data_len: 0,
            ..info
        })
    }
}

/// Catalog backed by an explicit id to stream-name table.
#[derive(Default)]
pub struct SimpleCatalog {
    entries: RwLock<HashMap<AssetId, String>>,
}

impl SimpleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: AssetId, stream_name: impl Into<String>) {
        self.entries.write().insert(id, stream_name.into());
    }

    pub fn remove(&self, id: AssetId) -> Option<String> {
        self.entries.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AssetCatalog for SimpleCatalog {
    fn stream_info_for_load(&self, id: AssetId, _asset_type: AssetType) -> Option<AssetStreamInfo> {
        self.entries.read().get(&id).map(AssetStreamInfo::read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_catalog_lookup() {
        let catalog = SimpleCatalog::new();
        let id = AssetId::from_u128(5, 0);
        catalog.insert(id, "meshes/rock.mesh");

        let info = catalog.stream_info_for_load(id, AssetType::NIL).unwrap();
        assert_eq!(info.stream_name, "meshes/rock.mesh");
        assert_eq!(info.mode, OpenMode::Read);
        assert!(catalog.stream_info_for_load(AssetId::from_u128(6, 0), AssetType::NIL).is_none());
    }

    #[test]
    fn test_save_info_defaults_to_write_mode() {
        let catalog = SimpleCatalog::new();
        let id = AssetId::from_u128(5, 0);
        catalog.insert(id, "a.bin");

        let info = catalog.stream_info_for_save(id, AssetType::NIL).unwrap();
        assert_eq!(info, AssetStreamInfo::write("a.bin"));
    }

    #[test]
    fn test_with_range() {
        let info = AssetStreamInfo::read("pak0").with_range(128, 64);
        assert_eq!((info.data_offset, info.data_len), (128, 64));
    }
}
