//! Local filesystem backend.
//!
//! Serves the same [`Directory`] and [`RandomAccessReader`] contracts from a
//! plain directory on disk, so callers are independent of where the index lives.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::directory::Directory;
use super::error::{StoreError, StoreResult};
use super::reader::{BufferSizing, BufferedReader, RandomAccessReader, RangeSource};

/// Reader over a local file.
pub type LocalReader = BufferedReader<LocalSource>;

/// Range source over a shared local file handle.
///
/// Clones and slices share the handle; each read seeks it under the lock.
#[derive(Clone)]
pub struct LocalSource {
    file: Arc<Mutex<File>>,
    path: Arc<PathBuf>,
}

impl LocalSource {
    /// Wrap an open file; `path` names it in errors.
    pub fn new(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
            path: Arc::new(path.into()),
        }
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RangeSource for LocalSource {
    async fn read_range(&self, start: u64, dst: &mut [u8]) -> StoreResult<()> {
        let file = self.file.clone();
        let len = dst.len();
        let buf = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
            let mut buf = vec![0u8; len];
            let mut file = file.lock();
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(&mut buf)?;
            Ok(buf)
        })
        .await
        .map_err(std::io::Error::other)?;

        let buf = buf.map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                StoreError::incomplete_read(self.path.display().to_string(), len as u64, 0)
            }
            _ => StoreError::Io(e),
        })?;
        dst.copy_from_slice(&buf);
        Ok(())
    }
}

/// Read-only directory of files on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
    sizing: BufferSizing,
}

impl LocalDirectory {
    /// Create a directory over `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let root = path.into();
        info!(path = %root.display(), "Opening local index directory");
        Self {
            root,
            sizing: BufferSizing::default(),
        }
    }

    /// Set the reader buffer bounds.
    pub fn with_buffer_sizing(mut self, sizing: BufferSizing) -> Self {
        self.sizing = sizing;
        self
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn map_not_found(name: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |e| match e.kind() {
        ErrorKind::NotFound => StoreError::not_found(name),
        _ => StoreError::Io(e),
    }
}

#[async_trait]
impl Directory for LocalDirectory {
    async fn list_all(&self) -> StoreResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        info!(path = %self.root.display(), files = names.len(), "Listed local index directory");
        Ok(names)
    }

    fn file_length(&self, name: &str) -> StoreResult<u64> {
        let metadata = std::fs::metadata(self.resolve(name)).map_err(map_not_found(name))?;
        if !metadata.is_file() {
            return Err(StoreError::not_found(name));
        }
        Ok(metadata.len())
    }

    fn open(&self, name: &str) -> StoreResult<Box<dyn RandomAccessReader>> {
        let path = self.resolve(name);
        let file = File::open(&path).map_err(map_not_found(name))?;
        let len = file.metadata()?.len();
        debug!(path = %path.display(), len, "Opening local file");

        let description = path.display().to_string();
        Ok(Box::new(BufferedReader::new(
            LocalSource::new(file, path),
            description,
            0,
            len,
            self.sizing,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_index(dir: &Path) {
        std::fs::write(dir.join("segments_1"), b"segments").unwrap();
        std::fs::write(dir.join("_0.cfs"), (0..=255u8).collect::<Vec<_>>()).unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();
    }

    #[tokio::test]
    async fn test_local_list_and_length() {
        let temp = tempfile::tempdir().unwrap();
        write_index(temp.path());
        let dir = LocalDirectory::new(temp.path());

        assert_eq!(dir.list_all().await.unwrap(), vec!["_0.cfs", "segments_1"]);
        assert_eq!(dir.file_length("_0.cfs").unwrap(), 256);
        assert!(matches!(
            dir.file_length("missing"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            dir.file_length("nested"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_read_slice_clone() {
        let temp = tempfile::tempdir().unwrap();
        write_index(temp.path());
        let dir = LocalDirectory::new(temp.path()).with_buffer_sizing(BufferSizing {
            min_bytes: 8,
            default_bytes: 16,
        });

        let mut input = dir.open("_0.cfs").unwrap();
        assert_eq!(input.length(), 256);

        let mut buf = [0u8; 4];
        input.read(&mut buf).await.unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);

        let mut copy = input.clone();
        input.seek(200).unwrap();
        assert_eq!(input.read_byte().await.unwrap(), 200);
        assert_eq!(copy.read_byte().await.unwrap(), 4);

        let mut slice = input.slice("tail", 250, 6).unwrap();
        assert_eq!(slice.length(), 6);
        let mut tail = [0u8; 6];
        slice.read(&mut tail).await.unwrap();
        assert_eq!(tail, [250, 251, 252, 253, 254, 255]);
        assert!(matches!(
            slice.read_byte().await,
            Err(StoreError::EndOfFile { .. })
        ));
        assert!(matches!(
            input.slice("bad", 250, 7),
            Err(StoreError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_is_read_only() {
        let temp = tempfile::tempdir().unwrap();
        let dir = LocalDirectory::new(temp.path());
        assert!(matches!(
            dir.delete_file("x"),
            Err(StoreError::Unsupported {
                operation: "delete_file"
            })
        ));
        assert!(matches!(
            dir.open("missing"),
            Err(StoreError::NotFound { .. })
        ));
    }
}
