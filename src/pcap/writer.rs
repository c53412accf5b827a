//! Offset-tracking pcap file writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{encode_file_header, split_timestamp, RecordHeader, FILE_HEADER_SIZE, RECORD_HEADER_SIZE};

/// Writer for one physical capture file.
///
/// Tracks the byte position of the next record so the capture pipeline can
/// index packets by offset without seeking. The buffered output is flushed on
/// [`close`](PcapFileWriter::close).
pub struct PcapFileWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    offset: u64,
}

impl PcapFileWriter {
    /// Create (truncating) the file at `path` and write the pcap file header.
    pub fn create(path: impl AsRef<Path>, snap_len: u32, link_type: u32) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&encode_file_header(snap_len, link_type))?;
        Ok(PcapFileWriter {
            writer,
            path,
            offset: FILE_HEADER_SIZE as u64,
        })
    }

    /// Byte position where the next record header will land.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. `orig_len` is the wire length; the captured length
    /// is the length of `data`.
    pub fn write_record(
        &mut self,
        timestamp: DateTime<Utc>,
        orig_len: u32,
        data: &[u8],
    ) -> std::io::Result<()> {
        let (ts_sec, ts_usec) = split_timestamp(timestamp);
        let header = RecordHeader {
            ts_sec,
            ts_usec,
            incl_len: data.len() as u32,
            orig_len,
        };
        self.writer.write_all(&header.encode())?;
        self.writer.write_all(data)?;
        self.offset += (RECORD_HEADER_SIZE + data.len()) as u64;
        Ok(())
    }

    /// Flush buffered records and close the file.
    pub fn close(mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
