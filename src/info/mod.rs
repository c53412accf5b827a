//! Diagnostic info mode: per-store statistics for every index on disk.
//!
//! Walks the index base path (every label, every `.idx` store), reports size
//! and key-count statistics and optionally enumerates the unique decoded
//! keys seen across all stores.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::constants::INDEX_SUFFIX;
use crate::error::Result;
use crate::index::IndexStore;

/// Deadline for each store's key scan.
const SCAN_DEADLINE: Duration = Duration::from_secs(30);

/// Print statistics for every index store under `base_path`.
pub fn run(base_path: &Path, show_keys: bool) -> Result<()> {
    let mut unique_keys = BTreeSet::new();

    for label in read_subdirs(base_path)? {
        for store_dir in read_subdirs(&label)? {
            if store_dir.extension().and_then(|e| e.to_str()) != Some(INDEX_SUFFIX) {
                continue;
            }
            println!("Index: {}", store_dir.display());

            let store = IndexStore::open(&store_dir)?;
            let stats = store.stats()?;
            println!("Store size (bytes): {}", stats.size_on_disk);
            println!("Total keys: {}", stats.key_count);

            if show_keys {
                debug!(store = %store_dir.display(), "scanning keys");
                for key in store.scan_keys(SCAN_DEADLINE)? {
                    unique_keys.insert(key.to_string());
                }
            }
            println!();
        }
    }

    if show_keys {
        println!("Unique Keys ({})", unique_keys.len());
        for key in unique_keys {
            println!("{key}");
        }
    }

    Ok(())
}

fn read_subdirs(path: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
