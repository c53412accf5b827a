//! The query engine.
//!
//! Answers point lookups against the on-disk indices: resolve the time
//! window to candidate index stores, fetch the key from each, then read the
//! referenced pcap records and stream either decoded packet summaries or a
//! reconstructed capture file.
//!
//! The engine is synchronous; the RPC layer runs it on the blocking pool and
//! bridges the sink callbacks onto response streams.

pub mod client;

use std::fs::{self, File};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, warn};

use crate::constants::{pcap_file_name, DEFAULT_LABEL, FILE_TIME_FORMAT, INDEX_SUFFIX, SNAP_LEN};
use crate::error::QueryError;
use crate::index::{IndexStore, Key};
use crate::packet::{self, parse_mac, proto_number};
use crate::pcap::{encode_file_header, read_record_at, RecordHeader, LINKTYPE_ETHERNET};

/// The indexed attribute a query key is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Ip,
    Port,
    Mac,
    Protocol,
}

/// One point-lookup request.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub label: String,
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub kind: QueryKind,
    pub query: String,
    pub show_all: bool,
    pub encode: bool,
}

/// A validated request: the candidate stores and the lookup key.
#[derive(Debug)]
pub struct QueryPlan {
    label: String,
    indices: Vec<String>,
    key: Key,
}

impl QueryPlan {
    pub fn indices(&self) -> &[String] {
        &self.indices
    }
}

/// One matching packet, decoded for the text stream.
#[derive(Debug, Clone)]
pub struct PacketSummary {
    pub timestamp: DateTime<Utc>,
    pub length: i64,
    pub src_mac: String,
    pub dst_mac: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub proto: String,
    pub ipv6: bool,
    pub text: String,
}

/// Build the lookup key from the query type and argument.
pub fn build_key(kind: QueryKind, arg: &str) -> Result<Key, QueryError> {
    match kind {
        QueryKind::Ip => match arg.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => Ok(Key::ipv4(ip)),
            Ok(IpAddr::V6(ip)) => Ok(Key::ipv6(ip)),
            Err(_) => Err(QueryError::BadIp(arg.to_string())),
        },
        QueryKind::Port => arg
            .parse::<u16>()
            .map(Key::port)
            .map_err(|_| QueryError::BadPort(arg.to_string())),
        QueryKind::Mac => parse_mac(arg)
            .map(Key::mac)
            .ok_or_else(|| QueryError::BadMac(arg.to_string())),
        QueryKind::Protocol => proto_number(arg)
            .map(Key::proto)
            .ok_or_else(|| QueryError::UnknownProtocol(arg.to_string())),
    }
}

/// Query engine over one index base path and its capture directories.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    index_base: PathBuf,
    pcap_paths: Vec<PathBuf>,
}

impl QueryEngine {
    pub fn new(index_base: PathBuf, pcap_paths: Vec<PathBuf>) -> Self {
        QueryEngine {
            index_base,
            pcap_paths,
        }
    }

    /// Validate the request: resolve the candidate index stores for the time
    /// window and build the lookup key.
    pub fn plan(&self, req: &QueryRequest) -> Result<QueryPlan, QueryError> {
        let label = if req.label.is_empty() {
            DEFAULT_LABEL.to_string()
        } else {
            req.label.clone()
        };

        let end = chrono::Duration::from_std(req.duration)
            .ok()
            .and_then(|d| req.start.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let indices = self.resolve_indices(&label, req.start, end)?;
        let key = build_key(req.kind, &req.query)?;

        info!(
            component = "query-engine",
            label = %label,
            start = %req.start,
            end = %end,
            indices = indices.len(),
            query = %req.query,
            "executing index query"
        );

        Ok(QueryPlan {
            label,
            indices,
            key,
        })
    }

    /// Index directories under the label whose base time lies strictly
    /// between `start` and `end`, ascending by name (equivalently by time).
    fn resolve_indices(
        &self,
        label: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, QueryError> {
        let index_dir = self.index_base.join(label);
        let entries = fs::read_dir(&index_dir).map_err(|e| QueryError::Label {
            path: index_dir.clone(),
            reason: e.to_string(),
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| QueryError::Label {
                path: index_dir.clone(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = name.strip_suffix(&format!(".{INDEX_SUFFIX}")) else {
                continue;
            };
            let Ok(t) = NaiveDateTime::parse_from_str(stem, FILE_TIME_FORMAT) else {
                warn!(component = "query-engine", directory = %name, "skipping index directory with unparseable time");
                continue;
            };
            let t = t.and_utc();
            if t > start && t < end {
                names.push(name);
            }
        }
        names.sort();

        if names.is_empty() {
            return Err(QueryError::NoIndices {
                start: start.format(FILE_TIME_FORMAT).to_string(),
                end: end.format(FILE_TIME_FORMAT).to_string(),
            });
        }
        Ok(names)
    }

    /// Stream decoded packet summaries for every hit, in value order.
    pub fn stream_summaries(
        &self,
        req: &QueryRequest,
        plan: &QueryPlan,
        sink: &mut dyn FnMut(PacketSummary) -> Result<(), QueryError>,
    ) -> Result<(), QueryError> {
        self.for_each_hit(plan, &mut |header, data| {
            sink(summarize(header, &data, req.show_all, req.encode))
        })
    }

    /// Stream a reconstructed pcap file: the file header first, then one
    /// chunk per matching record.
    pub fn stream_pcap(
        &self,
        plan: &QueryPlan,
        sink: &mut dyn FnMut(Vec<u8>) -> Result<(), QueryError>,
    ) -> Result<(), QueryError> {
        sink(encode_file_header(SNAP_LEN, LINKTYPE_ETHERNET).to_vec())?;
        self.for_each_hit(plan, &mut |header, data| {
            let mut chunk = Vec::with_capacity(data.len() + 16);
            chunk.extend_from_slice(&header.encode());
            chunk.extend_from_slice(&data);
            sink(chunk)
        })
    }

    /// Walk every (pcap_idx, offset) location the key resolves to, index
    /// store by index store. A missing key yields no rows and is not an
    /// error.
    fn for_each_hit(
        &self,
        plan: &QueryPlan,
        f: &mut dyn FnMut(RecordHeader, Vec<u8>) -> Result<(), QueryError>,
    ) -> Result<(), QueryError> {
        for index_name in &plan.indices {
            let store_path = self.index_base.join(&plan.label).join(index_name);
            info!(component = "query-engine", store = %store_path.display(), "opening index store");

            let store = IndexStore::open(&store_path).map_err(|source| QueryError::Index {
                path: store_path.clone(),
                source,
            })?;
            let Some(value) = store.get(&plan.key).map_err(|source| QueryError::Index {
                path: store_path.clone(),
                source,
            })?
            else {
                continue;
            };

            let base = index_name
                .strip_suffix(&format!(".{INDEX_SUFFIX}"))
                .unwrap_or(index_name);

            for elem in &value {
                let dir = self
                    .pcap_paths
                    .get(elem.pcap_idx as usize)
                    .ok_or(QueryError::PcapIdx(elem.pcap_idx))?;
                let path = dir.join(pcap_file_name(base, elem.pcap_idx));

                let mut file = File::open(&path).map_err(|e| QueryError::PcapRead {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                let (header, data) =
                    read_record_at(&mut file, elem.offset as u64).map_err(|e| {
                        QueryError::PcapRead {
                            path: path.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                f(header, data)?;
            }
        }
        Ok(())
    }
}

/// Decode one record into the text-stream response shape.
fn summarize(header: RecordHeader, data: &[u8], show_all: bool, encode: bool) -> PacketSummary {
    let meta = packet::extract(data);

    let text = if show_all {
        if encode {
            BASE64.encode(packet::dump(&meta, data))
        } else {
            packet::render(&meta, data)
        }
    } else {
        String::new()
    };

    PacketSummary {
        timestamp: header.timestamp(),
        length: header.incl_len as i64,
        src_mac: meta.src_mac.map(|m| packet::format_mac(&m)).unwrap_or_default(),
        dst_mac: meta.dst_mac.map(|m| packet::format_mac(&m)).unwrap_or_default(),
        src_ip: meta.src_ip.map(|ip| ip.to_string()).unwrap_or_default(),
        dst_ip: meta.dst_ip.map(|ip| ip.to_string()).unwrap_or_default(),
        src_port: meta.src_port.unwrap_or_default(),
        dst_port: meta.dst_port.unwrap_or_default(),
        proto: meta.proto_name().to_string(),
        ipv6: meta.ip_version == Some(6),
        text,
    }
}
