//! pcapvault - network packet archiver and indexed query engine.
//!
//! Ingests packets from a live interface or offline capture files, persists
//! the raw bytes into rotating pcap files across one or more storage
//! directories, builds a per-file attribute index (MAC, IP, port, protocol →
//! packet locations) in an embedded key-value store, and serves point-lookup
//! queries that stream either decoded packet summaries or a reconstructed
//! capture file over gRPC.
//!
//! # Architecture
//!
//! ```text
//! capture:  Reader → Scheduler → (Writer per directory) → Mux
//!                  → Extractor → Indexer → IndexWriter
//! query:    time window → candidate stores → key lookup
//!                  → positional pcap reads → response stream
//! ```
//!
//! The capture pipeline is a chain of workers joined by bounded queues;
//! back-pressure propagates hop by hop and shutdown drains front to back.
//! Each logical capture file (one base timestamp, one physical pcap file per
//! directory) owns exactly one index store, written once when the file is
//! fully closed.
//!
//! # Example
//!
//! ```no_run
//! use pcapvault::capture::{CaptureServer, CaptureSource};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = CaptureServer::new(
//!         CaptureSource::Files(vec!["capture.pcap".into()]),
//!         "index/pcap".into(),
//!         vec!["archive".into()],
//!     );
//!     server.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod cli;
pub mod constants;
pub mod error;
pub mod index;
pub mod info;
pub mod packet;
pub mod pcap;
pub mod query;
pub mod rpc;

pub use error::{Error, Result};
