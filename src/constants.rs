//! Shared constants for capture files, index stores and the RPC surface.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Snapshot length: the number of bytes of each frame that is actually
/// captured and stored.
pub const SNAP_LEN: u32 = 8192;

/// chrono format of the timestamp used for pcap and index base names.
/// Pcap files add a numeric directory suffix (e.g. `_0`) before the
/// extension.
pub const FILE_TIME_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

/// Default namespace for storing and querying indices.
pub const DEFAULT_LABEL: &str = "pcap";

/// Capture file extension.
pub const PCAP_SUFFIX: &str = "pcap";

/// Index store directory extension.
pub const INDEX_SUFFIX: &str = "idx";

/// Rotation bound: a new logical file is started once this much wall-clock
/// time has elapsed since the previous rotation.
pub const MAX_PCAP_FILE_TIME: Duration = Duration::from_secs(60);

/// Read timeout on a live capture handle. Expiry is not an error; it is the
/// periodic chance to observe cancellation.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of every inter-stage queue in the capture pipeline.
pub const CHANNEL_CAPACITY: usize = 8192;

/// Maximum RPC message size in either direction.
pub const RPC_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Default port of the query RPC server.
pub const DEFAULT_RPC_PORT: u16 = 7123;

/// Base file name for the logical capture file started at `t`.
pub fn file_base_name(t: DateTime<Utc>) -> String {
    t.format(FILE_TIME_FORMAT).to_string()
}

/// Physical pcap file name for one directory of a logical file.
pub fn pcap_file_name(base: &str, pcap_idx: u8) -> String {
    format!("{base}_{pcap_idx}.{PCAP_SUFFIX}")
}

/// On-disk index store name for a logical file.
pub fn index_dir_name(base: &str) -> String {
    format!("{base}.{INDEX_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn base_name_is_utc_second_resolution() {
        let t = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(file_base_name(t), "2021_03_04-05_06_07");
        assert_eq!(pcap_file_name(&file_base_name(t), 1), "2021_03_04-05_06_07_1.pcap");
        assert_eq!(index_dir_name(&file_base_name(t)), "2021_03_04-05_06_07.idx");
    }
}
