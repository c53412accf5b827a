//! Error types for pcapvault.
//!
//! Each worker in the capture pipeline handles its own I/O errors and decides
//! locally whether to continue or terminate, so most of these types surface at
//! component boundaries only: configuration parsing, source opening, index
//! store I/O and the query path.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type wrapping all component errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad CLI arguments, missing certificate files, unparseable dates.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Capture source could not be opened.
    #[error("capture source error: {0}")]
    Source(#[from] SourceError),

    /// Index store open/write failure.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Query failure, surfaced over the RPC as a descriptive string.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error reading or writing a capture file.
    #[error("pcap error: {0}")]
    Pcap(#[from] PcapError),

    /// RPC transport failure (dial, TLS, listen).
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// RPC call failed; carries the server's descriptive status.
    #[error("rpc error: {0}")]
    Rpc(#[from] tonic::Status),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to capture file reading and writing.
#[derive(Error, Debug)]
pub enum PcapError {
    /// Invalid or unsupported pcap format
    #[error("invalid pcap format: {reason}")]
    InvalidFormat { reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from CLI arguments and credential files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to parse start date '{input}' using format {format}: {reason}")]
    BadStartDate {
        input: String,
        format: &'static str,
        reason: String,
    },

    #[error("tls {kind} file '{path}' does not exist")]
    MissingCredential { kind: &'static str, path: PathBuf },

    #[error("invalid server address: {0}")]
    BadServerAddr(String),
}

/// Errors from opening capture sources.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Fatal: the live interface could not be opened.
    #[error("unable to open interface {device}: {source}")]
    OpenInterface {
        device: String,
        #[source]
        source: pcap::Error,
    },
}

/// Errors from the index data model and the on-disk store.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index store error: {0}")]
    Store(#[from] sled::Error),

    #[error("unknown record type tag {0:#04x}")]
    UnknownTag(u8),

    #[error("key data length {got} does not match tag {tag:#04x} (expected {expected})")]
    KeyLength { tag: u8, got: usize, expected: usize },

    #[error("value blob length {0} is not a multiple of the element size")]
    ValueLength(usize),

    #[error("truncated key: missing record type tag")]
    EmptyKey,
}

/// Errors on the query path. These fail the query.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unable to read index directory {path}, perhaps label is not set correctly: {reason}")]
    Label { path: PathBuf, reason: String },

    #[error("no indices within the time range {start} - {end}")]
    NoIndices { start: String, end: String },

    #[error("error parsing ip '{0}'")]
    BadIp(String),

    #[error("error parsing port '{0}'")]
    BadPort(String),

    #[error("error parsing MAC '{0}'")]
    BadMac(String),

    #[error("query protocol '{0}' is not supported")]
    UnknownProtocol(String),

    #[error("error querying index {path}: {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: IndexError,
    },

    #[error("pcap directory index {0} is out of range")]
    PcapIdx(u8),

    #[error("error reading packet from file {path}: {reason}")]
    PcapRead { path: PathBuf, reason: String },

    /// The response stream consumer went away; not a query fault.
    #[error("response stream closed")]
    StreamClosed,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
