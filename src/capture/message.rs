//! Typed messages flowing between capture pipeline stages.
//!
//! Every hop carries the same envelope. Stages annotate packet records in
//! place as they pass through: the scheduler fills `pcap_idx`, the writer
//! fills `offset` and `base`, the extractor fills `meta`.

use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::index::MemIndex;
use crate::packet::PacketMeta;

/// Inter-stage message envelope.
#[derive(Debug)]
pub enum Message {
    /// A captured frame, annotated as it moves downstream.
    Packet(Box<PacketRecord>),
    /// Instruct a writer to rotate to a new physical file.
    NewFile(NewFile),
    /// A writer closed one physical file of a logical file.
    FileClosed(FileClosed),
    /// A fully-closed logical file's index, ready to persist.
    MemoryIndex(MemoryIndex),
}

/// One captured frame plus its pipeline annotations.
#[derive(Debug)]
pub struct PacketRecord {
    pub timestamp: DateTime<Utc>,
    /// Bytes actually captured (`data.len()`).
    pub captured_length: u32,
    /// Length of the frame on the wire.
    pub original_length: u32,
    pub data: Bytes,

    /// Which writer/directory the scheduler routed this packet to.
    pub pcap_idx: u8,
    /// Byte offset of the record header, filled by the writer.
    pub offset: Option<u32>,
    /// Base name of the logical file the packet landed in.
    pub base: Option<String>,
    /// Parsed attribute tuple, filled by the extractor.
    pub meta: Option<PacketMeta>,
}

impl PacketRecord {
    pub fn new(timestamp: DateTime<Utc>, original_length: u32, data: Bytes) -> Self {
        PacketRecord {
            timestamp,
            captured_length: data.len() as u32,
            original_length,
            data,
            pcap_idx: 0,
            offset: None,
            base: None,
            meta: None,
        }
    }

    /// On-disk size of this packet once written: record header plus data.
    pub fn file_size(&self) -> u64 {
        crate::pcap::RECORD_HEADER_SIZE as u64 + self.captured_length as u64
    }
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub base_dir: PathBuf,
    pub base: String,
    pub pcap_idx: u8,
}

#[derive(Debug, Clone)]
pub struct FileClosed {
    pub base: String,
    pub pcap_idx: u8,
}

#[derive(Debug)]
pub struct MemoryIndex {
    pub base: String,
    pub index: MemIndex,
}
