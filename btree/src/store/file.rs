//! File-backed store.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::{Store, StoreError};

/// A store backed by a regular file holding one B-tree.
pub struct FileStore {
    file: File,
    /// Cached file length in bytes.
    size: u64,
}

impl FileStore {
    /// Create a new, empty tree file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self { file, size: 0 })
    }

    /// Open an existing tree file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self { file, size })
    }

    fn check_bounds(&self, offset: u64, len: usize) -> Result<(), StoreError> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(StoreError::OutOfBounds {
                offset,
                len,
                size: self.size,
            }),
        }
    }
}

impl Store for FileStore {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        self.check_bounds(offset, buf.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), StoreError> {
        self.check_bounds(offset, bytes.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn allocate_more(&mut self, new_size: u64) -> Result<u64, StoreError> {
        if new_size > self.size {
            // Extend the file; the new range reads back as zeroes
            self.file.set_len(new_size)?;
            self.size = new_size;
        }
        Ok(self.size)
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_write_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("extents.btree");

        {
            let mut store = FileStore::create(&path).expect("create");
            assert_eq!(store.size(), 0);
            assert_eq!(store.allocate_more(4096).expect("grow"), 4096);
            store.write(512, b"node data").expect("write");
            store.sync().expect("sync");
        }

        let mut store = FileStore::open(&path).expect("open");
        assert_eq!(store.size(), 4096);

        let mut buf = [0u8; 9];
        store.read(512, &mut buf).expect("read");
        assert_eq!(&buf, b"node data");
    }

    #[test]
    fn test_create_fails_if_exists() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("catalog.btree");

        let _store = FileStore::create(&path).expect("create");
        assert!(matches!(FileStore::create(&path), Err(StoreError::Io(_))));
    }

    #[test]
    fn test_read_past_end() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("short.btree");

        let mut store = FileStore::create(&path).expect("create");
        store.allocate_more(512).expect("grow");

        let mut buf = [0u8; 8];
        assert!(matches!(
            store.read(508, &mut buf),
            Err(StoreError::OutOfBounds { .. })
        ));
    }
}
