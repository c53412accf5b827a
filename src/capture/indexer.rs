//! Indexer stage: one in-memory index per open logical file.
//!
//! Tracks how many writers hold each logical file open; when the last one
//! closes it, the finished MemIndex is handed downstream for persistence.
//! On input close every still-open index is written out directly, so a
//! terminal shutdown never loses an index.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::message::{Message, MemoryIndex, PacketRecord};
use crate::constants::CHANNEL_CAPACITY;
use crate::index::{write_index_store, Key, MemIndex, ValueElement};

struct OpenIndex {
    index: MemIndex,
    open_writers: usize,
}

/// Spawn the indexer stage. `index_path` is only used for the terminal flush
/// of indices whose writers never all reported closure.
pub fn spawn_indexer(
    mut rx: mpsc::Receiver<Message>,
    index_path: PathBuf,
) -> (JoinHandle<()>, mpsc::Receiver<Message>) {
    let (tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::task::spawn_blocking(move || {
        info!(component = "indexer", "started");
        let mut open: HashMap<String, OpenIndex> = HashMap::new();

        while let Some(msg) = rx.blocking_recv() {
            match msg {
                Message::NewFile(new_file) => {
                    let entry = open.entry(new_file.base.clone()).or_insert_with(|| {
                        debug!(component = "indexer", file_base = %new_file.base, "initialized new memory index");
                        OpenIndex {
                            index: MemIndex::new(),
                            open_writers: 0,
                        }
                    });
                    entry.open_writers += 1;
                    debug!(
                        component = "indexer",
                        file_base = %new_file.base,
                        open_writers = entry.open_writers,
                        "memory index"
                    );
                }

                Message::FileClosed(closed) => {
                    let Some(entry) = open.get_mut(&closed.base) else {
                        warn!(component = "indexer", file_base = %closed.base, "close for unknown index");
                        continue;
                    };
                    entry.open_writers -= 1;
                    debug!(
                        component = "indexer",
                        file_base = %closed.base,
                        open_writers = entry.open_writers,
                        "received close file msg"
                    );
                    if entry.open_writers == 0 {
                        debug!(component = "indexer", file_base = %closed.base, "flushing memory index");
                        let finished = open.remove(&closed.base).expect("entry present");
                        let flush = Message::MemoryIndex(MemoryIndex {
                            base: closed.base,
                            index: finished.index,
                        });
                        if tx.blocking_send(flush).is_err() {
                            break;
                        }
                    }
                }

                Message::Packet(record) => index_packet(&mut open, &record),

                Message::MemoryIndex(_) => {}
            }
        }

        // Input closed: write whatever is still open straight to disk,
        // bypassing the flush channel.
        debug!(component = "indexer", remaining = open.len(), "starting flushing indices");
        for (base, entry) in open.drain() {
            if let Err(e) = write_index_store(&index_path, &base, &entry.index) {
                error!(component = "indexer", file_base = %base, error = %e, "error flushing index file");
            }
        }
        info!(component = "indexer", "completed");
    });

    (handle, out_rx)
}

fn index_packet(open: &mut HashMap<String, OpenIndex>, record: &PacketRecord) {
    let (Some(base), Some(offset)) = (&record.base, record.offset) else {
        warn!(component = "indexer", "packet without file annotations, not indexed");
        return;
    };
    let Some(entry) = open.get_mut(base) else {
        warn!(component = "indexer", file_base = %base, "packet for unknown index, not indexed");
        return;
    };
    let Some(meta) = &record.meta else {
        return;
    };

    let elem = ValueElement::new(record.pcap_idx, offset);
    let index = &mut entry.index;

    // MAC addresses are collected but not indexed during capture; MAC keys
    // only serve lookups against stores produced elsewhere.
    if let Some(proto) = meta.proto {
        index.put(Key::proto(proto), elem);
    }
    if let Some(ip) = meta.src_ip {
        index.put(ip_key(ip), elem);
    }
    if let Some(ip) = meta.dst_ip {
        index.put(ip_key(ip), elem);
    }
    if let Some(port) = meta.src_port {
        index.put(Key::port(port), elem);
    }
    if let Some(port) = meta.dst_port {
        index.put(Key::port(port), elem);
    }
}

fn ip_key(ip: IpAddr) -> Key {
    match ip {
        IpAddr::V4(v4) => Key::ipv4(v4),
        IpAddr::V6(v6) => Key::ipv6(v6),
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use bytes::Bytes;
    use chrono::Utc;

    use super::*;
    use crate::capture::message::{FileClosed, NewFile, PacketRecord};
    use crate::packet;

    fn packet_msg(base: &str, pcap_idx: u8, offset: u32) -> Message {
        let data = packet::test_utils::udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 53, 55000, 8);
        let mut record = PacketRecord::new(Utc::now(), data.len() as u32, Bytes::from(data));
        record.pcap_idx = pcap_idx;
        record.offset = Some(offset);
        record.base = Some(base.to_string());
        record.meta = Some(packet::extract(&record.data));
        Message::Packet(Box::new(record))
    }

    fn new_file(base: &str, pcap_idx: u8) -> Message {
        Message::NewFile(NewFile {
            base_dir: PathBuf::from("."),
            base: base.to_string(),
            pcap_idx,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flushes_only_after_every_writer_closed() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(16);
        let (handle, mut out) = spawn_indexer(rx, dir.path().to_path_buf());

        let base = "2020_01_01-00_00_00";
        tx.send(new_file(base, 0)).await.unwrap();
        tx.send(new_file(base, 1)).await.unwrap();
        tx.send(packet_msg(base, 0, 24)).await.unwrap();
        tx.send(packet_msg(base, 1, 24)).await.unwrap();
        tx.send(Message::FileClosed(FileClosed { base: base.into(), pcap_idx: 0 }))
            .await
            .unwrap();

        // One of two writers is still open: nothing may be flushed yet.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(out.try_recv().is_err());

        tx.send(Message::FileClosed(FileClosed { base: base.into(), pcap_idx: 1 }))
            .await
            .unwrap();
        let msg = out.recv().await.expect("flush after last close");
        let Message::MemoryIndex(flush) = msg else { panic!("expected memory index") };
        assert_eq!(flush.base, base);

        let value = flush.index.get(&Key::ipv4(Ipv4Addr::new(10, 0, 0, 1))).unwrap();
        assert_eq!(value.len(), 2);
        // MAC addresses are not indexed during capture.
        assert_eq!(
            flush.index.get(&Key::mac([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])),
            None
        );

        drop(tx);
        while out.recv().await.is_some() {}
        handle.await.unwrap();
    }
}
