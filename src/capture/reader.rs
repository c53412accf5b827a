//! Packet sources: live interface and offline capture files.
//!
//! Both readers run on dedicated OS threads because capture handles block.
//! They are the only stages with no input queue; cancellation reaches them
//! through the token, and a full output queue never starves the cancellation
//! check.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use chrono::DateTime;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::message::{Message, PacketRecord};
use crate::constants::{CHANNEL_CAPACITY, READ_TIMEOUT, SNAP_LEN};
use crate::error::SourceError;
use crate::pcap::PcapFileReader;

/// Enqueue `msg`, yielding to the cancellation token while the queue is full.
/// Returns false when the pipeline is gone or cancellation fired.
fn send_or_cancelled(
    tx: &mpsc::Sender<Message>,
    token: &CancellationToken,
    mut msg: Message,
) -> bool {
    loop {
        match tx.try_send(msg) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Full(back)) => {
                if token.is_cancelled() {
                    return false;
                }
                msg = back;
                thread::sleep(Duration::from_millis(1));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
        }
    }
}

/// Open `device` for live capture and start the reader thread.
///
/// Fails fatally if the interface cannot be opened. The 30-second read
/// timeout makes the loop observe cancellation even on a quiet wire.
pub fn spawn_interface_reader(
    token: CancellationToken,
    device: String,
    promiscuous: bool,
) -> Result<mpsc::Receiver<Message>, SourceError> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let mut capture = pcap::Capture::from_device(device.as_str())
        .and_then(|c| {
            c.snaplen(SNAP_LEN as i32)
                .promisc(promiscuous)
                .timeout(READ_TIMEOUT.as_millis() as i32)
                .open()
        })
        .map_err(|source| SourceError::OpenInterface {
            device: device.clone(),
            source,
        })?;

    thread::spawn(move || {
        info!(component = "interface-reader", interface = %device, snapshot_length = SNAP_LEN, promiscuous, "started");

        loop {
            if token.is_cancelled() {
                break;
            }
            match capture.next_packet() {
                Ok(frame) => {
                    let timestamp = DateTime::from_timestamp(
                        frame.header.ts.tv_sec as i64,
                        (frame.header.ts.tv_usec as u32).wrapping_mul(1000),
                    )
                    .unwrap_or_default();
                    let record = PacketRecord::new(
                        timestamp,
                        frame.header.len,
                        Bytes::copy_from_slice(frame.data),
                    );
                    if !send_or_cancelled(&tx, &token, Message::Packet(Box::new(record))) {
                        break;
                    }
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => {
                    error!(component = "interface-reader", interface = %device, error = %e, "capture read failed");
                    break;
                }
            }
        }

        info!(component = "interface-reader", interface = %device, "completed");
    });

    Ok(rx)
}

/// Start the offline reader thread over an ordered list of capture files.
///
/// A file that cannot be opened or parsed is logged and skipped; it does not
/// fail the pipeline. The returned one-shot fires after the output closes.
pub fn spawn_file_reader(
    token: CancellationToken,
    files: Vec<PathBuf>,
) -> (mpsc::Receiver<Message>, oneshot::Receiver<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (finished_tx, finished_rx) = oneshot::channel();

    thread::spawn(move || {
        info!(component = "file-reader", files = files.len(), "started");
        let mut count: u64 = 0;

        'files: for file in &files {
            debug!(component = "file-reader", file = %file.display(), "starting reading file");
            let reader = match PcapFileReader::open(file) {
                Ok(reader) => reader,
                Err(e) => {
                    error!(component = "file-reader", file = %file.display(), error = %e, "unable to open pcap file for reading");
                    continue;
                }
            };

            for packet in reader {
                if token.is_cancelled() {
                    break 'files;
                }
                let raw = match packet {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(component = "file-reader", file = %file.display(), error = %e, "stopping file on parse error");
                        break;
                    }
                };
                let record = PacketRecord::new(raw.timestamp, raw.original_length, raw.data);
                if !send_or_cancelled(&tx, &token, Message::Packet(Box::new(record))) {
                    break 'files;
                }
                count += 1;
            }
            debug!(component = "file-reader", file = %file.display(), "finished reading file");
        }

        info!(component = "file-reader", total_packets = count, "completed");
        drop(tx);
        let _ = finished_tx.send(());
    });

    (rx, finished_rx)
}
