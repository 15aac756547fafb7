use std::{
    fs::{File, OpenOptions},
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use log::{info, trace};

use super::StorageError;
use crate::protocol::SECTOR_SIZE;

#[derive(Debug)]
pub struct BackingStore {
    file: File,
    capacity: u64,
    path: PathBuf,
}

impl BackingStore {
    /// Opens (or creates) the file at `path` and sizes it to exactly `capacity` bytes.
    pub fn open(path: impl AsRef<Path>, capacity: u64) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(StorageError::io("open"))?;

        file.set_len(capacity)
            .map_err(StorageError::io("resize"))?;

        info!("storage initialized: {} ({capacity} bytes)", path.display());
        Ok(Self {
            file,
            capacity,
            path,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validates that `length` bytes starting at `sector` lie inside the store and
    /// returns the starting byte offset.
    pub fn check_bounds(&self, sector: u64, length: u32) -> Result<u64, StorageError> {
        sector
            .checked_mul(SECTOR_SIZE)
            .and_then(|offset| {
                offset
                    .checked_add(u64::from(length))
                    .filter(|end| *end <= self.capacity)
                    .map(|_| offset)
            })
            .ok_or(StorageError::OutOfBounds {
                sector,
                length,
                capacity: self.capacity,
            })
    }

    /// Fills `buf` from `offset`. Callers validate bounds first.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        trace!("reading {} bytes at offset {offset}", buf.len());
        self.file
            .read_exact_at(buf, offset)
            .map_err(StorageError::io("read"))
    }

    /// Writes `data` at `offset` and syncs it to the medium before returning.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        trace!("writing {} bytes at offset {offset}", data.len());
        self.file
            .write_all_at(data, offset)
            .map_err(StorageError::io("write"))?;
        self.file.sync_data().map_err(StorageError::io("sync"))
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn store_open_sizes_file() {
        let temp = TempDir::new("open").unwrap();
        let store = BackingStore::open(temp.path().join("netblk.img"), MIB).unwrap();

        assert_eq!(store.capacity(), MIB);
        assert_eq!(std::fs::metadata(store.path()).unwrap().len(), MIB);
    }

    #[test]
    fn store_reopen_keeps_data() {
        let temp = TempDir::new("reopen").unwrap();
        let path = temp.path().join("netblk.img");

        let store = BackingStore::open(&path, MIB).unwrap();
        store.write_at(512, &[0x5A; 512]).unwrap();
        drop(store);

        let store = BackingStore::open(&path, MIB).unwrap();
        let mut buf = [0; 512];
        store.read_at(512, &mut buf).unwrap();
        assert_eq!(buf, [0x5A; 512]);
    }

    #[test]
    fn store_check_bounds() {
        let temp = TempDir::new("bounds").unwrap();
        let store = BackingStore::open(temp.path().join("netblk.img"), MIB).unwrap();

        assert_eq!(store.check_bounds(0, 512).unwrap(), 0);
        assert_eq!(store.check_bounds(2047, 512).unwrap(), MIB - 512);
        assert_eq!(store.check_bounds(2048, 0).unwrap(), MIB);
        assert!(matches!(
            store.check_bounds(2048, 512),
            Err(StorageError::OutOfBounds { sector: 2048, .. })
        ));
        assert!(store.check_bounds(2047, 513).is_err());
        assert!(store.check_bounds(u64::MAX, 1).is_err());
    }

    #[test]
    fn store_write_read() {
        let temp = TempDir::new("write").unwrap();
        let store = BackingStore::open(temp.path().join("netblk.img"), MIB).unwrap();

        let data: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        store.write_at(4096, &data).unwrap();

        let mut buf = vec![0; 1024];
        store.read_at(4096, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn store_read_past_end_fails() {
        let temp = TempDir::new("past_end").unwrap();
        let store = BackingStore::open(temp.path().join("netblk.img"), 1024).unwrap();

        let mut buf = [0; 512];
        assert!(matches!(
            store.read_at(1024, &mut buf),
            Err(StorageError::Io { action: "read", .. })
        ));
    }
}
