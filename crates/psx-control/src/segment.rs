use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use psx_control_protocol::QUERY_SEGMENT_SIZE;
use thiserror::Error;

use crate::sync::lock;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query of {len} bytes exceeds the {QUERY_SEGMENT_SIZE}-byte segment")]
    TooLong { len: u32 },

    #[error("failed to attach query segment {key}: {source}")]
    Attach { key: u8, source: io::Error },

    #[error("failed to write query segment {key}: {source}")]
    Write { key: u8, source: io::Error },
}

/// An attached 128-byte segment shared with the controller.
pub trait SharedSegment: Send {
    fn key(&self) -> u8;

    /// Copies `data` to the start of the segment; the rest is left as it was.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    fn release(self: Box<Self>) -> io::Result<()>;
}

pub trait SegmentProvider: Send {
    fn attach(&mut self, key: u8) -> io::Result<Box<dyn SharedSegment>>;
}

/// File-backed segments named `psx-query-<key>`, normally under `/dev/shm`.
#[derive(Debug, Clone)]
pub struct FileSegmentProvider {
    dir: PathBuf,
}

impl FileSegmentProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segment_path(&self, key: u8) -> PathBuf {
        self.dir.join(format!("psx-query-{key}"))
    }
}

impl SegmentProvider for FileSegmentProvider {
    fn attach(&mut self, key: u8) -> io::Result<Box<dyn SharedSegment>> {
        let path = self.segment_path(key);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.set_len(QUERY_SEGMENT_SIZE as u64)?;
        tracing::debug!("attached query segment {}", path.display());
        Ok(Box::new(FileSegment { key, path, file }))
    }
}

#[derive(Debug)]
struct FileSegment {
    key: u8,
    path: PathBuf,
    file: File,
}

impl SharedSegment for FileSegment {
    fn key(&self) -> u8 {
        self.key
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(data)?;
        self.file.flush()
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        let FileSegment { path, file, .. } = *self;
        drop(file);
        fs::remove_file(&path)
    }
}

/// Heap-backed segments, observable after the fact. Clones share the same segments.
#[derive(Debug, Clone, Default)]
pub struct InMemorySegments {
    segments: Arc<Mutex<HashMap<u8, [u8; QUERY_SEGMENT_SIZE]>>>,
}

impl InMemorySegments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, key: u8) -> Option<Vec<u8>> {
        lock(&self.segments).get(&key).map(|s| s.to_vec())
    }

    pub fn is_attached(&self, key: u8) -> bool {
        lock(&self.segments).contains_key(&key)
    }
}

impl SegmentProvider for InMemorySegments {
    fn attach(&mut self, key: u8) -> io::Result<Box<dyn SharedSegment>> {
        lock(&self.segments)
            .entry(key)
            .or_insert([0u8; QUERY_SEGMENT_SIZE]);
        Ok(Box::new(InMemorySegment {
            key,
            segments: self.segments.clone(),
        }))
    }
}

struct InMemorySegment {
    key: u8,
    segments: Arc<Mutex<HashMap<u8, [u8; QUERY_SEGMENT_SIZE]>>>,
}

impl SharedSegment for InMemorySegment {
    fn key(&self) -> u8 {
        self.key
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut segments = lock(&self.segments);
        let seg = segments
            .get_mut(&self.key)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "segment released"))?;
        seg[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        lock(&self.segments).remove(&self.key);
        Ok(())
    }
}

/// The lazily attached query segment.
///
/// The first query's key picks the segment; later queries reuse it whatever key they carry, until
/// [`QueryBuffer::release`].
pub struct QueryBuffer {
    provider: Box<dyn SegmentProvider>,
    attached: Option<Box<dyn SharedSegment>>,
}

impl QueryBuffer {
    pub fn new(provider: Box<dyn SegmentProvider>) -> Self {
        Self {
            provider,
            attached: None,
        }
    }

    pub fn attached_key(&self) -> Option<u8> {
        self.attached.as_ref().map(|s| s.key())
    }

    /// Rejects lengths the segment cannot hold, before anything is attached.
    pub fn check_len(len: u32) -> Result<usize, QueryError> {
        match usize::try_from(len) {
            Ok(n) if n <= QUERY_SEGMENT_SIZE => Ok(n),
            _ => Err(QueryError::TooLong { len }),
        }
    }

    pub fn store(&mut self, key: u8, data: &[u8]) -> Result<(), QueryError> {
        Self::check_len(data.len() as u32)?;
        if self.attached.is_none() {
            let segment = self
                .provider
                .attach(key)
                .map_err(|source| QueryError::Attach { key, source })?;
            self.attached = Some(segment);
        }
        match self.attached.as_mut() {
            Some(segment) => {
                let key = segment.key();
                segment
                    .write(data)
                    .map_err(|source| QueryError::Write { key, source })
            }
            None => Ok(()),
        }
    }

    /// Detaches and removes the segment. A no-op when nothing is attached.
    pub fn release(&mut self) {
        if let Some(segment) = self.attached.take() {
            let key = segment.key();
            match segment.release() {
                Ok(()) => tracing::debug!("released query segment {key}"),
                Err(err) => tracing::warn!("failed to release query segment {key}: {err}"),
            }
        }
    }
}

impl core::fmt::Debug for QueryBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueryBuffer")
            .field("attached", &self.attached_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_key_is_reused_until_release() {
        let segments = InMemorySegments::new();
        let mut buf = QueryBuffer::new(Box::new(segments.clone()));

        buf.store(7, &[1, 2, 3]).unwrap();
        buf.store(9, &[4]).unwrap();
        assert_eq!(buf.attached_key(), Some(7));
        assert!(!segments.is_attached(9));
        assert_eq!(&segments.contents(7).unwrap()[..4], &[4, 2, 3, 0]);

        buf.release();
        assert!(!segments.is_attached(7));
        buf.store(9, &[5]).unwrap();
        assert_eq!(buf.attached_key(), Some(9));
    }

    #[test]
    fn oversized_queries_never_attach() {
        let segments = InMemorySegments::new();
        let mut buf = QueryBuffer::new(Box::new(segments.clone()));
        assert!(matches!(
            buf.store(1, &[0u8; QUERY_SEGMENT_SIZE + 1]),
            Err(QueryError::TooLong { len: 129 })
        ));
        assert!(!segments.is_attached(1));
        assert!(QueryBuffer::check_len(128).is_ok());
    }

    #[test]
    fn file_segments_are_sized_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSegmentProvider::new(dir.path());
        let path = provider.segment_path(3);
        let mut buf = QueryBuffer::new(Box::new(provider));

        buf.store(3, &[0xaa, 0xbb]).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), QUERY_SEGMENT_SIZE);
        assert_eq!(&bytes[..3], &[0xaa, 0xbb, 0]);

        buf.release();
        assert!(!path.exists());
    }
}
