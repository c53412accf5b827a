//! Index writer stage: persists finished MemIndexes to their on-disk stores.
//!
//! The pipeline sink. A store write failure loses that index only; the
//! stage keeps draining its input.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::message::Message;
use crate::index::write_index_store;

/// Spawn the index writer stage rooted at `index_path`.
pub fn spawn_index_writer(mut rx: mpsc::Receiver<Message>, index_path: PathBuf) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        info!(component = "index-writer", "started");

        while let Some(msg) = rx.blocking_recv() {
            if let Message::MemoryIndex(flush) = msg {
                debug!(component = "index-writer", file_base = %flush.base, keys = flush.index.len(), "writing index");
                if let Err(e) = write_index_store(&index_path, &flush.base, &flush.index) {
                    error!(component = "index-writer", file_base = %flush.base, error = %e, "error writing index file");
                }
            }
        }

        info!(component = "index-writer", "completed");
    })
}
