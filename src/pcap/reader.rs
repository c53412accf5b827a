//! Capture file readers.
//!
//! [`PcapFileReader`] iterates a legacy pcap file front to back and backs
//! offline ingest; [`read_record_at`] is the positional single-record read
//! used by the query path.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError as ParserError};

use super::{RecordHeader, RECORD_HEADER_SIZE};
use crate::error::PcapError;

/// Buffer size for the incremental pcap parser.
const BUFFER_SIZE: usize = 65536;

/// One packet read from a capture file.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub timestamp: DateTime<Utc>,
    pub captured_length: u32,
    pub original_length: u32,
    pub data: Bytes,
}

/// Sequential reader for legacy pcap files.
pub struct PcapFileReader {
    reader: LegacyPcapReader<BufReader<File>>,
    link_type: u32,
}

impl PcapFileReader {
    /// Open a legacy pcap file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PcapError> {
        let file = File::open(path.as_ref())?;
        let reader = LegacyPcapReader::new(BUFFER_SIZE, BufReader::new(file)).map_err(|e| {
            PcapError::InvalidFormat {
                reason: format!("failed to parse pcap header: {e}"),
            }
        })?;
        Ok(PcapFileReader {
            reader,
            link_type: super::LINKTYPE_ETHERNET,
        })
    }

    /// Link type declared in the file header (1 = Ethernet).
    pub fn link_type(&self) -> u32 {
        self.link_type
    }

    /// Read the next packet. Returns `Ok(None)` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, PcapError> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => match block {
                    PcapBlockOwned::Legacy(packet) => {
                        let timestamp = DateTime::from_timestamp(
                            packet.ts_sec as i64,
                            packet.ts_usec.wrapping_mul(1000),
                        )
                        .unwrap_or_default();
                        let raw = RawPacket {
                            timestamp,
                            captured_length: packet.caplen,
                            original_length: packet.origlen,
                            data: Bytes::copy_from_slice(packet.data),
                        };
                        self.reader.consume(offset);
                        return Ok(Some(raw));
                    }
                    PcapBlockOwned::LegacyHeader(header) => {
                        self.link_type = header.network.0 as u32;
                        self.reader.consume(offset);
                        continue;
                    }
                    _ => {
                        self.reader.consume(offset);
                        continue;
                    }
                },
                Err(ParserError::Eof) => return Ok(None),
                Err(ParserError::Incomplete(_)) => {
                    self.reader.refill().map_err(|e| PcapError::InvalidFormat {
                        reason: format!("pcap refill error: {e}"),
                    })?;
                    continue;
                }
                Err(e) => {
                    return Err(PcapError::InvalidFormat {
                        reason: format!("pcap parse error: {e}"),
                    })
                }
            }
        }
    }
}

impl Iterator for PcapFileReader {
    type Item = Result<RawPacket, PcapError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

/// Read the record whose header starts at `offset`: the decoded header and
/// the `incl_len` data bytes that follow it.
pub fn read_record_at(file: &mut File, offset: u64) -> std::io::Result<(RecordHeader, Vec<u8>)> {
    let mut header_bytes = [0u8; RECORD_HEADER_SIZE];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut header_bytes)?;
    let header = RecordHeader::decode(&header_bytes);

    let mut data = vec![0u8; header.incl_len as usize];
    file.read_exact(&mut data)?;
    Ok((header, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcap::PcapFileWriter;
    use chrono::TimeZone;

    #[test]
    fn write_then_iterate_and_read_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t_0.pcap");
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 5).unwrap();

        let mut writer = PcapFileWriter::create(&path, 8192, crate::pcap::LINKTYPE_ETHERNET).unwrap();
        assert_eq!(writer.offset(), 24);
        writer.write_record(ts, 100, &[0xaa; 60]).unwrap();
        let second = writer.offset();
        assert_eq!(second, 24 + 16 + 60);
        writer.write_record(ts, 60, &[0xbb; 60]).unwrap();
        writer.close().unwrap();

        let mut reader = PcapFileReader::open(&path).unwrap();
        let p1 = reader.next_packet().unwrap().unwrap();
        assert_eq!(p1.captured_length, 60);
        assert_eq!(p1.original_length, 100);
        assert_eq!(p1.timestamp, ts);
        let p2 = reader.next_packet().unwrap().unwrap();
        assert_eq!(p2.data[0], 0xbb);
        assert!(reader.next_packet().unwrap().is_none());

        let mut file = File::open(&path).unwrap();
        let (header, data) = read_record_at(&mut file, second).unwrap();
        assert_eq!(header.incl_len, 60);
        assert_eq!(header.orig_len, 60);
        assert_eq!(data, vec![0xbb; 60]);
    }

    #[test]
    fn open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pcap");
        std::fs::write(&path, b"not a pcap file at all............").unwrap();
        assert!(PcapFileReader::open(&path).is_err());
    }
}
