//! The byte-store collaborator interface.
//!
//! The network core never touches a filesystem directly; it goes through
//! [`FileStore`]. Two implementations ship: [`DiskStore`] over `tokio::fs`
//! and the in-memory [`MemStore`] (diskless hosts and tests).
//!
//! Paths are absolute, `/`-separated, and already resolved/authorized by
//! the caller (see `ftp::paths`). Implementations serialize their own
//! operations internally; the gate is held for one file operation only,
//! never across network I/O.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub len: u64,
    pub is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub meta: Metadata,
}

pub trait FileStore: Send + Sync + 'static {
    fn mounted(&self) -> impl Future<Output = bool> + Send;
    fn stat(&self, path: &str) -> impl Future<Output = Option<Metadata>> + Send;
    fn read_at(
        &self,
        path: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<usize>> + Send;
    /// Creates or truncates a file.
    fn create(&self, path: &str) -> impl Future<Output = io::Result<()>> + Send;
    fn append(&self, path: &str, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
    fn list(&self, path: &str) -> impl Future<Output = io::Result<Vec<Entry>>> + Send;
    fn remove(&self, path: &str) -> impl Future<Output = io::Result<()>> + Send;
    fn remove_dir(&self, path: &str) -> impl Future<Output = io::Result<()>> + Send;
    fn make_dir(&self, path: &str) -> impl Future<Output = io::Result<()>> + Send;
    fn rename(&self, from: &str, to: &str) -> impl Future<Output = io::Result<()>> + Send;
}

/// `tokio::fs`-backed store rooted at one directory.
///
/// A single internal gate serializes operations so concurrent sessions
/// never interleave on slow flash. The root directory must not contain
/// symlinks pointing outside itself; the authorization boundary above this
/// store is a textual prefix check.
pub struct DiskStore {
    root: PathBuf,
    gate: Mutex<()>,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            gate: Mutex::new(()),
        })
    }

    fn real(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileStore for DiskStore {
    async fn mounted(&self) -> bool {
        tokio::fs::metadata(&self.root).await.is_ok()
    }

    async fn stat(&self, path: &str) -> Option<Metadata> {
        let _g = self.gate.lock().await;
        let meta = tokio::fs::metadata(self.real(path)).await.ok()?;
        Some(Metadata {
            len: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    async fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let _g = self.gate.lock().await;
        let mut file = tokio::fs::File::open(self.real(path)).await?;
        file.seek(io::SeekFrom::Start(offset)).await?;
        file.read(buf).await
    }

    async fn create(&self, path: &str) -> io::Result<()> {
        let _g = self.gate.lock().await;
        tokio::fs::File::create(self.real(path)).await?;
        Ok(())
    }

    async fn append(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let _g = self.gate.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.real(path))
            .await?;
        file.write_all(data).await
    }

    async fn list(&self, path: &str) -> io::Result<Vec<Entry>> {
        let _g = self.gate.lock().await;
        let mut dir = tokio::fs::read_dir(self.real(path)).await?;
        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let meta = item.metadata().await?;
            entries.push(Entry {
                name: item.file_name().to_string_lossy().into_owned(),
                meta: Metadata {
                    len: meta.len(),
                    is_dir: meta.is_dir(),
                },
            });
        }
        Ok(entries)
    }

    async fn remove(&self, path: &str) -> io::Result<()> {
        let _g = self.gate.lock().await;
        tokio::fs::remove_file(self.real(path)).await
    }

    async fn remove_dir(&self, path: &str) -> io::Result<()> {
        let _g = self.gate.lock().await;
        tokio::fs::remove_dir(self.real(path)).await
    }

    async fn make_dir(&self, path: &str) -> io::Result<()> {
        let _g = self.gate.lock().await;
        tokio::fs::create_dir(self.real(path)).await
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let _g = self.gate.lock().await;
        tokio::fs::rename(self.real(from), self.real(to)).await
    }
}

/// In-memory store: a flat map of absolute file paths plus a directory
/// set. The root directory `/` always exists.
pub struct MemStore {
    inner: Mutex<MemTree>,
}

struct MemTree {
    files: HashMap<String, Vec<u8>>,
    dirs: Vec<String>,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "/",
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MemTree {
                files: HashMap::new(),
                dirs: vec!["/".to_string()],
            }),
        })
    }

    /// Seeds a file, creating nothing else; convenience for fixtures.
    pub async fn put(&self, path: &str, data: &[u8]) {
        let mut tree = self.inner.lock().await;
        tree.files.insert(path.to_string(), data.to_vec());
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        let tree = self.inner.lock().await;
        tree.files.get(path).cloned()
    }
}

impl FileStore for MemStore {
    async fn mounted(&self) -> bool {
        true
    }

    async fn stat(&self, path: &str) -> Option<Metadata> {
        let tree = self.inner.lock().await;
        if let Some(data) = tree.files.get(path) {
            return Some(Metadata {
                len: data.len() as u64,
                is_dir: false,
            });
        }
        if tree.dirs.iter().any(|d| d == path) {
            return Some(Metadata { len: 0, is_dir: true });
        }
        None
    }

    async fn read_at(&self, path: &str, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let tree = self.inner.lock().await;
        let data = tree
            .files
            .get(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let start = (offset as usize).min(data.len());
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    async fn create(&self, path: &str) -> io::Result<()> {
        let mut tree = self.inner.lock().await;
        tree.files.insert(path.to_string(), Vec::new());
        Ok(())
    }

    async fn append(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let mut tree = self.inner.lock().await;
        tree.files
            .get_mut(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?
            .extend_from_slice(data);
        Ok(())
    }

    async fn list(&self, path: &str) -> io::Result<Vec<Entry>> {
        let tree = self.inner.lock().await;
        if !tree.dirs.iter().any(|d| d == path) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        let mut entries = Vec::new();
        for (file, data) in &tree.files {
            if parent_of(file) == path {
                entries.push(Entry {
                    name: name_of(file).to_string(),
                    meta: Metadata {
                        len: data.len() as u64,
                        is_dir: false,
                    },
                });
            }
        }
        for dir in &tree.dirs {
            if dir != "/" && parent_of(dir) == path {
                entries.push(Entry {
                    name: name_of(dir).to_string(),
                    meta: Metadata { len: 0, is_dir: true },
                });
            }
        }
        Ok(entries)
    }

    async fn remove(&self, path: &str) -> io::Result<()> {
        let mut tree = self.inner.lock().await;
        tree.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    async fn remove_dir(&self, path: &str) -> io::Result<()> {
        let mut tree = self.inner.lock().await;
        let occupied = tree.files.keys().any(|f| parent_of(f) == path)
            || tree.dirs.iter().any(|d| d != path && parent_of(d) == path);
        if occupied {
            return Err(io::Error::from(io::ErrorKind::DirectoryNotEmpty));
        }
        let before = tree.dirs.len();
        tree.dirs.retain(|d| d != path);
        if tree.dirs.len() == before {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> io::Result<()> {
        let mut tree = self.inner.lock().await;
        if tree.dirs.iter().any(|d| d == path) {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        tree.dirs.push(path.to_string());
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut tree = self.inner.lock().await;
        let data = tree
            .files
            .remove(from)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        tree.files.insert(to.to_string(), data);
        Ok(())
    }
}
