//! Pcap writer stage: one instance per configured capture directory.
//!
//! Serializes assigned packets into the current physical file, annotates each
//! packet with its record offset and logical base name, and emits rotation
//! and close notifications downstream. File I/O blocks this worker only, so
//! the stage runs on the blocking pool.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::message::{FileClosed, Message};
use crate::constants::{pcap_file_name, CHANNEL_CAPACITY};
use crate::pcap::{PcapFileWriter, LINKTYPE_ETHERNET};

struct ActiveFile {
    writer: PcapFileWriter,
    base: String,
    pcap_idx: u8,
}

/// Spawn one writer stage.
///
/// Every message received is forwarded downstream after its own handling, so
/// later stages see `NewFile`, annotated `Packet`s and `FileClosed` in the
/// writer's order. A file-create or header-write failure terminates this
/// writer only; the rest of the pipeline keeps running.
pub fn spawn_writer(
    mut rx: mpsc::Receiver<Message>,
    snap_len: u32,
) -> (JoinHandle<()>, mpsc::Receiver<Message>) {
    let (tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::task::spawn_blocking(move || {
        info!(component = "pcap-writer", "started");
        let mut current: Option<ActiveFile> = None;

        while let Some(mut msg) = rx.blocking_recv() {
            match &mut msg {
                Message::NewFile(new_file) => {
                    if let Some(active) = current.take() {
                        close_file(&tx, active, true);
                    }

                    let path = new_file
                        .base_dir
                        .join(pcap_file_name(&new_file.base, new_file.pcap_idx));
                    match PcapFileWriter::create(&path, snap_len, LINKTYPE_ETHERNET) {
                        Ok(writer) => {
                            current = Some(ActiveFile {
                                writer,
                                base: new_file.base.clone(),
                                pcap_idx: new_file.pcap_idx,
                            });
                        }
                        Err(e) => {
                            // Unrecoverable for this writer.
                            error!(component = "pcap-writer", file = %path.display(), error = %e, "error opening file");
                            return;
                        }
                    }
                }

                Message::Packet(record) => match &mut current {
                    Some(active) => {
                        record.base = Some(active.base.clone());
                        record.offset = Some(active.writer.offset() as u32);
                        if let Err(e) = active.writer.write_record(
                            record.timestamp,
                            record.original_length,
                            &record.data,
                        ) {
                            warn!(
                                component = "pcap-writer",
                                file = %active.writer.path().display(),
                                error = %e,
                                "error writing packet to file, packet dropped"
                            );
                        }
                    }
                    None => {
                        warn!(component = "pcap-writer", "packet received before first file, packet dropped");
                    }
                },

                _ => {}
            }

            if tx.blocking_send(msg).is_err() {
                info!(component = "pcap-writer", "output gone, completed");
                return;
            }
        }

        // Input closed: close the current file. The indexer flushes the
        // still-open logical file on its own input close, so no FileClosed
        // is emitted here.
        if let Some(active) = current.take() {
            close_file(&tx, active, false);
        }
        info!(component = "pcap-writer", "completed");
    });

    (handle, out_rx)
}

fn close_file(tx: &mpsc::Sender<Message>, active: ActiveFile, notify: bool) {
    let path = active.writer.path().to_path_buf();
    if let Err(e) = active.writer.close() {
        warn!(component = "pcap-writer", file = %path.display(), error = %e, "error closing file");
    }
    if notify {
        debug!(component = "pcap-writer", file_base = %active.base, "sending file closed message");
        let closed = Message::FileClosed(FileClosed {
            base: active.base,
            pcap_idx: active.pcap_idx,
        });
        let _ = tx.blocking_send(closed);
    }
}
