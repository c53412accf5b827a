//! On-disk index stores, one embedded key-value store per logical file.
//!
//! A store is written exactly once, by a single batched writer, and is
//! considered immutable afterwards. Background flushing is disabled; the one
//! explicit flush before close is the only durability point.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{Key, MemIndex, Value};
use crate::constants::index_dir_name;
use crate::error::IndexError;

/// Size and table statistics for one store, as reported by the info mode.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub size_on_disk: u64,
    pub key_count: usize,
}

/// Handle on one `.idx` store.
pub struct IndexStore {
    db: sled::Db,
    path: PathBuf,
}

impl IndexStore {
    /// Open the store rooted at `path`.
    ///
    /// The query and info paths only ever read from the store they open; the
    /// store format has no read-only open mode, so immutability after the
    /// single write is by convention.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        let db = sled::Config::new()
            .path(&path)
            .flush_every_ms(None)
            .open()?;
        Ok(IndexStore { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point lookup. A missing key is not an error.
    pub fn get(&self, key: &Key) -> Result<Option<Value>, IndexError> {
        match self.db.get(key.to_bytes())? {
            Some(blob) => Ok(Some(Value::from_bytes(&blob)?)),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> Result<StoreStats, IndexError> {
        Ok(StoreStats {
            size_on_disk: self.db.size_on_disk()?,
            key_count: self.db.len(),
        })
    }

    /// Decode every key in the store, in key order, giving up once `deadline`
    /// has elapsed.
    pub fn scan_keys(&self, deadline: Duration) -> Result<Vec<Key>, IndexError> {
        let started = Instant::now();
        let mut keys = Vec::new();
        for entry in self.db.iter() {
            if started.elapsed() >= deadline {
                debug!(path = %self.path.display(), "key scan deadline reached");
                break;
            }
            let (k, _) = entry?;
            keys.push(Key::from_bytes(&k)?);
        }
        Ok(keys)
    }
}

/// Persist a MemIndex as the store `<base_path>/<file_base>.idx`.
///
/// All entries go through one write batch; the explicit flush before close is
/// what makes the store durable. Because each logical file owns its store,
/// keys are already aggregated in memory and no read-merge is needed here.
pub fn write_index_store(
    base_path: &Path,
    file_base: &str,
    index: &MemIndex,
) -> Result<(), IndexError> {
    let path = base_path.join(index_dir_name(file_base));
    debug!(store = %path.display(), keys = index.len(), "opening index store");

    let db = sled::Config::new()
        .path(&path)
        .flush_every_ms(None)
        .open()?;

    let mut batch = sled::Batch::default();
    for (key, value) in index.iter() {
        trace!(%key, locations = value.len(), "batching key");
        batch.insert(key.to_bytes(), value.to_bytes());
    }
    db.apply_batch(batch)?;
    db.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::index::ValueElement;

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = MemIndex::new();
        let key = Key::ipv4(Ipv4Addr::new(10, 0, 0, 1));
        index.put(key.clone(), ValueElement::new(0, 24));
        index.put(key.clone(), ValueElement::new(1, 140));
        index.put(Key::port(53), ValueElement::new(0, 24));

        write_index_store(dir.path(), "2020_01_01-00_00_00", &index).unwrap();

        let store = IndexStore::open(dir.path().join("2020_01_01-00_00_00.idx")).unwrap();
        let value = store.get(&key).unwrap().expect("key present");
        let got: Vec<_> = value.iter().copied().collect();
        assert_eq!(got, vec![ValueElement::new(0, 24), ValueElement::new(1, 140)]);

        // Missing key yields no rows and is not an error.
        assert!(store.get(&Key::port(9999)).unwrap().is_none());

        let stats = store.stats().unwrap();
        assert_eq!(stats.key_count, 2);

        let keys = store.scan_keys(Duration::from_secs(30)).unwrap();
        assert_eq!(keys.len(), 2);
    }
}
