//! Durable key-value layer over RocksDB.
//!
//! The ledger needs exactly three things from storage: point reads, atomic
//! multi-row batches, and bounded prefix scans. Everything else (record
//! encoding, key layout, concurrency control) lives in `ledger::store`.

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rocksdb::Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key).ok().flatten()
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), rocksdb::Error> {
        self.db.put(key, value)
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), rocksdb::Error> {
        self.db.delete(key)
    }

    /// Write all items in one atomic batch. Either every row lands or none
    /// does — this is the single atomic unit the ledger's balance/entry
    /// commit relies on.
    pub fn batch_write<K, V>(&self, items: &[(K, V)]) -> Result<(), rocksdb::Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        self.db.write(batch)
    }

    /// Scan up to `limit` rows whose keys start with `prefix`, beginning
    /// after `cursor` when one is supplied. Returns (key, value) pairs in
    /// key order.
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        cursor: Option<&[u8]>,
        limit: usize,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let start = cursor.unwrap_or(prefix);
        let mode = IteratorMode::From(start, Direction::Forward);

        let mut rows = Vec::new();
        for item in self.db.iterator(mode) {
            let Ok((key, value)) = item else {
                break;
            };
            if !key.starts_with(prefix) {
                break;
            }
            // The cursor itself was returned by the previous page
            if let Some(c) = cursor {
                if key.as_ref() == c {
                    continue;
                }
            }
            rows.push((key.to_vec(), value.to_vec()));
            if rows.len() >= limit {
                break;
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::open(dir.path()).expect("open rocksdb");
        (storage, dir)
    }

    #[test]
    fn test_put_get_delete() {
        let (storage, _dir) = temp_storage();
        storage.put(b"k1", b"v1").unwrap();
        assert_eq!(storage.get(b"k1"), Some(b"v1".to_vec()));
        storage.delete(b"k1").unwrap();
        assert_eq!(storage.get(b"k1"), None);
    }

    #[test]
    fn test_batch_write_is_visible_atomically() {
        let (storage, _dir) = temp_storage();
        let items: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"a:1".to_vec(), b"1".to_vec()),
            (b"a:2".to_vec(), b"2".to_vec()),
            (b"b:1".to_vec(), b"3".to_vec()),
        ];
        storage.batch_write(&items).unwrap();
        assert_eq!(storage.get(b"a:2"), Some(b"2".to_vec()));
        assert_eq!(storage.get(b"b:1"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_scan_prefix_respects_bounds_and_cursor() {
        let (storage, _dir) = temp_storage();
        for i in 0..5u8 {
            storage.put(format!("p:{}", i).as_bytes(), &[i]).unwrap();
        }
        storage.put(b"q:0", b"x").unwrap();

        let first = storage.scan_prefix(b"p:", None, 3);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].0, b"p:0".to_vec());

        let cursor = first.last().unwrap().0.clone();
        let rest = storage.scan_prefix(b"p:", Some(&cursor), 10);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].0, b"p:3".to_vec());
    }
}
