//! Stream abstraction the load and save jobs read and write through.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ember_core::alloc::HashMap;
use parking_lot::RwLock;

use crate::catalog::AssetStreamInfo;
use crate::error::{AssetError, AssetResult};

/// A readable window over the bytes of one asset.
pub struct AssetStream {
    name: String,
    reader: Box<dyn Read + Send>,
    length: u64,
}

impl AssetStream {
    pub fn new(name: impl Into<String>, reader: Box<dyn Read + Send>, length: u64) -> Self {
        Self {
            name: name.into(),
            reader,
            length,
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        let length = bytes.len() as u64;
        Self::new(name, Box::new(Cursor::new(ArcBytes(bytes))), length)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of bytes the stream holds for this asset.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn read_to_vec(&mut self) -> AssetResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.length as usize);
        self.reader
            .read_to_end(&mut bytes)
            .map_err(|e| AssetError::from(e).with_stream(&self.name))?;
        Ok(bytes)
    }

    pub fn read_to_string(&mut self) -> AssetResult<String> {
        let bytes = self.read_to_vec()?;
        String::from_utf8(bytes).map_err(|e| AssetError::Io {
            stream: self.name.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }
}

impl Read for AssetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

struct ArcBytes(Arc<[u8]>);

impl AsRef<[u8]> for ArcBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Writable sink for one asset.
pub type AssetWriter = Box<dyn Write + Send>;

/// Opens the streams a catalog points at.
pub trait StreamProvider: Send + Sync + 'static {
    fn open_read(&self, info: &AssetStreamInfo) -> AssetResult<AssetStream>;

    fn open_write(&self, info: &AssetStreamInfo) -> AssetResult<AssetWriter>;
}

/// Streams backed by files under a root directory.
pub struct FileStreamer {
    root: PathBuf,
}

impl FileStreamer {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl StreamProvider for FileStreamer {
    fn open_read(&self, info: &AssetStreamInfo) -> AssetResult<AssetStream> {
        let path = self.resolve_path(&info.stream_name);
        let io_err = |e: std::io::Error| AssetError::from(e).with_stream(&info.stream_name);

        let mut file = File::open(&path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();
        if info.data_offset > file_len {
            return Err(io_err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("offset {} past end of {} byte file", info.data_offset, file_len),
            )));
        }
        file.seek(SeekFrom::Start(info.data_offset)).map_err(io_err)?;

        let remaining = file_len - info.data_offset;
        let length = match info.data_len {
            0 => remaining,
            len => len.min(remaining),
        };
        Ok(AssetStream::new(
            info.stream_name.clone(),
            Box::new(file.take(length)),
            length,
        ))
    }

    fn open_write(&self, info: &AssetStreamInfo) -> AssetResult<AssetWriter> {
        let path = self.resolve_path(&info.stream_name);
        let io_err = |e: std::io::Error| AssetError::from(e).with_stream(&info.stream_name);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(&path).map_err(io_err)?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

type MemoryFiles = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// In-memory streams for tests and embedded assets.
///
/// Writers publish their bytes when flushed or dropped.
#[derive(Clone, Default)]
pub struct MemoryStreamer {
    files: MemoryFiles,
}

impl MemoryStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.files.write().insert(name.into(), bytes.into());
    }

    pub fn get(&self, name: &str) -> Option<Arc<[u8]>> {
        self.files.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<[u8]>> {
        self.files.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }
}

impl StreamProvider for MemoryStreamer {
    fn open_read(&self, info: &AssetStreamInfo) -> AssetResult<AssetStream> {
        let bytes = self.get(&info.stream_name).ok_or_else(|| AssetError::Io {
            stream: info.stream_name.clone(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;

        let clamp = |value: u64| usize::try_from(value).unwrap_or(usize::MAX).min(bytes.len());
        let start = clamp(info.data_offset);
        let end = match info.data_len {
            0 => bytes.len(),
            len => start.saturating_add(clamp(len)).min(bytes.len()),
        };
        Ok(AssetStream::from_bytes(info.stream_name.clone(), &bytes[start..end]))
    }

    fn open_write(&self, info: &AssetStreamInfo) -> AssetResult<AssetWriter> {
        Ok(Box::new(MemoryWriter {
            name: info.stream_name.clone(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }
}

struct MemoryWriter {
    name: String,
    buffer: Vec<u8>,
    files: MemoryFiles,
}

impl MemoryWriter {
    fn publish(&self) {
        self.files
            .write()
            .insert(self.name.clone(), Arc::from(self.buffer.as_slice()));
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.publish();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.publish();
    }
}
