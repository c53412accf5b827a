//! The capture pipeline.
//!
//! A multi-stage concurrent dataflow joined by bounded queues:
//!
//! ```text
//! Reader → Scheduler → (Writer₀ … Writerₙ) → Mux → Extractor → Indexer → IndexWriter
//! ```
//!
//! Data flows strictly forward; back-pressure propagates through the queues.
//! Each stage is a long-lived worker that terminates when its input closes,
//! flushes its side effects, then closes its output. Cancellation enters at
//! the reader only; everything downstream drains naturally.

pub mod message;

mod extractor;
mod index_writer;
mod indexer;
mod mux;
mod reader;
mod scheduler;
mod writer;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants::{MAX_PCAP_FILE_TIME, SNAP_LEN};
use crate::error::Result;

/// Where packets come from.
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// A live network interface.
    Interface { device: String, promiscuous: bool },
    /// An ordered list of offline capture files.
    Files(Vec<PathBuf>),
}

/// The capture service: owns the pipeline configuration and runs it to
/// completion.
#[derive(Debug, Clone)]
pub struct CaptureServer {
    source: CaptureSource,
    index_path: PathBuf,
    pcap_paths: Vec<PathBuf>,
    rotate_interval: Duration,
    snap_len: u32,
}

impl CaptureServer {
    pub fn new(source: CaptureSource, index_path: PathBuf, pcap_paths: Vec<PathBuf>) -> Self {
        CaptureServer {
            source,
            index_path,
            pcap_paths,
            rotate_interval: MAX_PCAP_FILE_TIME,
            snap_len: SNAP_LEN,
        }
    }

    /// Override the time-based rotation bound.
    pub fn with_rotate_interval(mut self, interval: Duration) -> Self {
        self.rotate_interval = interval;
        self
    }

    /// Run the pipeline until the source is exhausted (file mode) or the
    /// token fires (either mode), then drain every stage.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let started = Instant::now();
        info!(
            index_path = %self.index_path.display(),
            pcap_paths = self.pcap_paths.len(),
            "starting capture"
        );

        // Reader: the only stage without an input queue. File mode also
        // hands back a one-shot fired when the whole source has been read.
        let (read_rx, finished) = match &self.source {
            CaptureSource::Interface { device, promiscuous } => {
                let rx =
                    reader::spawn_interface_reader(token.clone(), device.clone(), *promiscuous)?;
                (rx, None)
            }
            CaptureSource::Files(files) => {
                let (rx, finished) = reader::spawn_file_reader(token.clone(), files.clone());
                (rx, Some(finished))
            }
        };

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        let (sched_handle, sched_rxs) =
            scheduler::spawn_scheduler(read_rx, self.pcap_paths.clone(), self.rotate_interval);
        handles.push(sched_handle);

        let mut writer_rxs = Vec::with_capacity(sched_rxs.len());
        for sched_rx in sched_rxs {
            let (writer_handle, writer_rx) = writer::spawn_writer(sched_rx, self.snap_len);
            handles.push(writer_handle);
            writer_rxs.push(writer_rx);
        }

        let (mux_handle, mux_rx) = mux::spawn_mux(writer_rxs);
        handles.push(mux_handle);

        let (extractor_handle, extractor_rx) = extractor::spawn_extractor(mux_rx);
        handles.push(extractor_handle);

        let (indexer_handle, indexer_rx) =
            indexer::spawn_indexer(extractor_rx, self.index_path.clone());
        handles.push(indexer_handle);

        handles.push(index_writer::spawn_index_writer(indexer_rx, self.index_path.clone()));

        match finished {
            Some(finished) => {
                tokio::select! {
                    _ = token.cancelled() => debug!("capture cancelled"),
                    _ = finished => debug!("file read completed"),
                }
            }
            None => token.cancelled().await,
        }

        // Completion barrier: every stage drains its input, flushes, then
        // closes its output before its handle resolves.
        for handle in handles {
            let _ = handle.await;
        }

        info!(duration = ?started.elapsed(), "finished capture");
        Ok(())
    }
}
