//! Random-access byte sources
//!
//! A codec session reads compressed blocks at arbitrary offsets through the
//! [`ByteSource`] trait. Sessions never share a handle: `open` takes its own
//! copy with [`ByteSource::duplicate`], so independent sessions over the same
//! file can run on separate threads.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Random-access readable resource
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes starting at `offset`
    ///
    /// # Returns
    /// Number of bytes actually read. Anything short of `buf.len()` means
    /// EOF or an I/O failure; callers do not retry.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> usize;

    /// Open an independent handle over the same data
    fn duplicate(&self) -> io::Result<Box<dyn ByteSource>>;

    /// Name used in log messages
    fn name(&self) -> String;

    /// Total size in bytes, if known
    fn size(&self) -> Option<u64> {
        None
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> usize {
        (**self).read_at(buf, offset)
    }

    fn duplicate(&self) -> io::Result<Box<dyn ByteSource>> {
        (**self).duplicate()
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }
}

/// File-backed byte source
///
/// Duplicating reopens the path so each handle has its own file cursor.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
}

impl FileSource {
    /// Open a file for random-access reads
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self { path, file })
    }

    fn try_read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < buf.len() {
            match self.file.read(&mut buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(done)
    }
}

impl ByteSource for FileSource {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> usize {
        match self.try_read_at(buf, offset) {
            Ok(n) => n,
            Err(e) => {
                crate::log_warning!("{}: read at 0x{:x} failed: {}", self.path.display(), offset, e);
                0
            }
        }
    }

    fn duplicate(&self) -> io::Result<Box<dyn ByteSource>> {
        Ok(Box::new(FileSource::open(&self.path)?))
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn size(&self) -> Option<u64> {
        self.file.metadata().ok().map(|m| m.len())
    }
}

/// In-memory byte source
///
/// The data is shared between duplicates; reads never fail except past the end.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Arc<[u8]>,
}

impl MemorySource {
    /// Wrap a byte buffer
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Underlying bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSource for MemorySource {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> usize {
        let len = self.data.len() as u64;
        if offset >= len {
            return 0;
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        n
    }

    fn duplicate(&self) -> io::Result<Box<dyn ByteSource>> {
        Ok(Box::new(self.clone()))
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_source_reads() {
        let mut src = MemorySource::new("mem", vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(src.read_at(&mut buf, 1), 3);
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn test_memory_source_short_read() {
        let mut src = MemorySource::new("mem", vec![1u8, 2, 3]);
        let mut buf = [0u8; 4];
        assert_eq!(src.read_at(&mut buf, 2), 1);
        assert_eq!(buf[0], 3);
        assert_eq!(src.read_at(&mut buf, 3), 0);
        assert_eq!(src.read_at(&mut buf, 100), 0);
    }

    #[test]
    fn test_memory_source_duplicate_is_independent() {
        let src = MemorySource::new("mem", vec![9u8; 16]);
        let mut dup = src.duplicate().unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(dup.read_at(&mut buf, 0), 16);
        assert_eq!(dup.name(), "mem");
        assert_eq!(dup.size(), Some(16));
        // original still usable
        assert_eq!(src.data().len(), 16);
    }

    #[test]
    fn test_file_source_read_and_duplicate() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&(0u8..64).collect::<Vec<_>>()).unwrap();
        tmp.flush().unwrap();

        let mut src = FileSource::open(tmp.path()).unwrap();
        assert_eq!(src.size(), Some(64));

        let mut dup = src.duplicate().unwrap();
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        assert_eq!(src.read_at(&mut a, 60), 4);
        assert_eq!(dup.read_at(&mut b, 10), 4);
        assert_eq!(a, [60, 61, 62, 63]);
        assert_eq!(b, [10, 11, 12, 13]);

        let mut past = [0u8; 8];
        assert_eq!(src.read_at(&mut past, 62), 2);
    }

    #[test]
    fn test_file_source_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSource::open(dir.path().join("missing.hca")).is_err());
    }
}
