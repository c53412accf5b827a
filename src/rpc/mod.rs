//! RPC wire types and conversions.
//!
//! The protobuf-generated types live in [`v1`]; this module maps them to and
//! from the query engine's native types and translates query errors into
//! response statuses.

pub mod server;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tonic::Status;

use crate::error::QueryError;
use crate::query::{PacketSummary, QueryKind, QueryRequest};

#[allow(clippy::all)]
pub mod v1 {
    tonic::include_proto!("pcapvault.v1");
}

impl From<v1::QueryType> for QueryKind {
    fn from(t: v1::QueryType) -> Self {
        match t {
            v1::QueryType::Ip => QueryKind::Ip,
            v1::QueryType::Port => QueryKind::Port,
            v1::QueryType::Mac => QueryKind::Mac,
            v1::QueryType::Protocol => QueryKind::Protocol,
        }
    }
}

impl From<QueryKind> for v1::QueryType {
    fn from(k: QueryKind) -> Self {
        match k {
            QueryKind::Ip => v1::QueryType::Ip,
            QueryKind::Port => v1::QueryType::Port,
            QueryKind::Mac => v1::QueryType::Mac,
            QueryKind::Protocol => v1::QueryType::Protocol,
        }
    }
}

pub fn timestamp_to_proto(ts: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

pub fn timestamp_from_proto(ts: &prost_types::Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32).unwrap_or_default()
}

pub fn duration_to_proto(d: Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: d.as_secs() as i64,
        nanos: d.subsec_nanos() as i32,
    }
}

pub fn duration_from_proto(d: &prost_types::Duration) -> Duration {
    if d.seconds < 0 {
        return Duration::ZERO;
    }
    Duration::new(d.seconds as u64, d.nanos.max(0) as u32)
}

/// Decode a wire request into the engine's native form.
pub fn request_from_proto(req: &v1::QueryReq) -> Result<QueryRequest, Status> {
    let query_type = v1::QueryType::try_from(req.query_type)
        .map_err(|_| Status::invalid_argument(format!("unknown query type {}", req.query_type)))?;

    Ok(QueryRequest {
        label: req.label.clone(),
        start: req
            .start_time
            .as_ref()
            .map(timestamp_from_proto)
            .unwrap_or_default(),
        duration: req
            .duration
            .as_ref()
            .map(duration_from_proto)
            .unwrap_or_default(),
        kind: query_type.into(),
        query: req.query.clone(),
        show_all: req.show_all,
        encode: req.encode,
    })
}

pub fn summary_to_proto(s: PacketSummary) -> v1::QueryResp {
    v1::QueryResp {
        timestamp: Some(timestamp_to_proto(s.timestamp)),
        length: s.length,
        src_mac: s.src_mac,
        dst_mac: s.dst_mac,
        src_ip: s.src_ip,
        dst_ip: s.dst_ip,
        src_port: s.src_port as u32,
        src_port_str: s.src_port.to_string(),
        dst_port: s.dst_port as u32,
        dst_port_str: s.dst_port.to_string(),
        proto: s.proto,
        ipv6: s.ipv6,
        text: s.text,
    }
}

/// Map a query failure onto the RPC status it surfaces as.
pub fn status_from_query_error(e: QueryError) -> Status {
    match e {
        QueryError::BadIp(_)
        | QueryError::BadPort(_)
        | QueryError::BadMac(_)
        | QueryError::UnknownProtocol(_) => Status::invalid_argument(e.to_string()),
        QueryError::NoIndices { .. } | QueryError::Label { .. } => Status::not_found(e.to_string()),
        other => Status::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trip() {
        let ts = DateTime::from_timestamp(1_600_000_000, 123_456_789).unwrap();
        assert_eq!(timestamp_from_proto(&timestamp_to_proto(ts)), ts);
    }

    #[test]
    fn negative_duration_clamps_to_zero() {
        let d = prost_types::Duration { seconds: -5, nanos: 0 };
        assert_eq!(duration_from_proto(&d), Duration::ZERO);
    }

    #[test]
    fn request_decodes_defaults() {
        let req = v1::QueryReq {
            query_type: v1::QueryType::Port as i32,
            query: "53".into(),
            ..Default::default()
        };
        let decoded = request_from_proto(&req).unwrap();
        assert_eq!(decoded.kind, QueryKind::Port);
        assert_eq!(decoded.duration, Duration::ZERO);
        assert!(decoded.label.is_empty());
    }
}
