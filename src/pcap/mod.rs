//! Legacy pcap file format handling.
//!
//! This module owns the 24-byte file header and 16-byte record header
//! encoding (little-endian, microsecond timestamps), the offset-tracking
//! writer used by the capture pipeline and the readers used by offline
//! ingest and the query path.

mod reader;
mod writer;

pub use reader::{read_record_at, PcapFileReader, RawPacket};
pub use writer::PcapFileWriter;

use chrono::{DateTime, Utc};

/// Size of the pcap file header.
pub const FILE_HEADER_SIZE: usize = 24;

/// Size of a per-record header.
pub const RECORD_HEADER_SIZE: usize = 16;

/// Legacy pcap magic, microsecond timestamps.
pub const MAGIC_MICROS: u32 = 0xa1b2_c3d4;

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u32 = 1;

/// Encode a pcap file header (version 2.4, zero offset and sigfigs).
pub fn encode_file_header(snap_len: u32, link_type: u32) -> [u8; FILE_HEADER_SIZE] {
    let mut b = [0u8; FILE_HEADER_SIZE];
    b[0..4].copy_from_slice(&MAGIC_MICROS.to_le_bytes());
    b[4..6].copy_from_slice(&2u16.to_le_bytes()); // major
    b[6..8].copy_from_slice(&4u16.to_le_bytes()); // minor
    // thiszone and sigfigs stay zero
    b[16..20].copy_from_slice(&snap_len.to_le_bytes());
    b[20..24].copy_from_slice(&link_type.to_le_bytes());
    b
}

/// A decoded pcap record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub incl_len: u32,
    pub orig_len: u32,
}

impl RecordHeader {
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut b = [0u8; RECORD_HEADER_SIZE];
        b[0..4].copy_from_slice(&self.ts_sec.to_le_bytes());
        b[4..8].copy_from_slice(&self.ts_usec.to_le_bytes());
        b[8..12].copy_from_slice(&self.incl_len.to_le_bytes());
        b[12..16].copy_from_slice(&self.orig_len.to_le_bytes());
        b
    }

    pub fn decode(b: &[u8; RECORD_HEADER_SIZE]) -> Self {
        RecordHeader {
            ts_sec: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ts_usec: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            incl_len: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            orig_len: u32::from_le_bytes([b[12], b[13], b[14], b[15]]),
        }
    }

    /// Record timestamp: epoch + seconds + microseconds.
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.ts_sec as i64, self.ts_usec.wrapping_mul(1000))
            .unwrap_or_default()
    }
}

/// Split a timestamp into the (seconds, microseconds) pair stored in a
/// record header.
pub fn split_timestamp(ts: DateTime<Utc>) -> (u32, u32) {
    (ts.timestamp() as u32, ts.timestamp_subsec_micros())
}
