//! Command-line argument definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::constants::{DEFAULT_LABEL, DEFAULT_RPC_PORT};
use crate::query::QueryKind;

/// Archive network packets and answer indexed point queries.
#[derive(Parser, Debug)]
#[command(name = "pcapvault")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture packets from a live interface or offline files
    Capture(CaptureArgs),
    /// Serve the query RPC over the archive
    Serve(ServeArgs),
    /// Run a point query against a running server
    Query(QueryArgs),
    /// Show statistics for the on-disk index stores
    Info(InfoArgs),
}

#[derive(clap::Args, Debug)]
pub struct CaptureArgs {
    /// Offline pcap file to ingest; repeatable, processed in order
    #[arg(long = "file", value_name = "FILE", conflicts_with = "interface")]
    pub files: Vec<PathBuf>,

    /// Network interface to capture from
    #[arg(long, value_name = "DEVICE", required_unless_present = "files")]
    pub interface: Option<String>,

    /// Put the interface in promiscuous mode
    #[arg(long)]
    pub promiscuous: bool,

    /// Namespace the produced indices are stored under
    #[arg(long, default_value = DEFAULT_LABEL)]
    pub label: String,

    /// Base directory for index stores
    #[arg(long = "index-path", value_name = "DIR", default_value = "index")]
    pub index_path: PathBuf,

    /// Capture file directory; repeatable, one writer per directory
    #[arg(long = "pcap-path", value_name = "DIR", default_value = ".")]
    pub pcap_paths: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// RPC listen port
    #[arg(long, default_value_t = DEFAULT_RPC_PORT)]
    pub port: u16,

    /// TLS certificate (PEM)
    #[arg(long, value_name = "FILE")]
    pub cert: PathBuf,

    /// TLS private key (PEM)
    #[arg(long, value_name = "FILE")]
    pub key: PathBuf,

    /// Base directory for index stores
    #[arg(long = "index-path", value_name = "DIR", default_value = "index")]
    pub index_path: PathBuf,

    /// Capture file directory; repeatable, in capture order
    #[arg(long = "pcap-path", value_name = "DIR", default_value = ".")]
    pub pcap_paths: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// Server address as host:port
    #[arg(long, default_value = "localhost:7123")]
    pub server: String,

    /// Namespace to query
    #[arg(long, default_value = DEFAULT_LABEL)]
    pub label: String,

    /// Start of the time window: YYYY-MM-DD or RFC 3339
    #[arg(long)]
    pub start: String,

    /// Width of the time window (e.g. 90m, 24h)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Attribute to look up
    #[arg(long = "query-type", value_enum)]
    pub query_type: QueryTypeArg,

    /// The attribute value: IP, port, MAC or protocol name
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Stream a reconstructed pcap file to stdout
    #[arg(long)]
    pub binary: bool,

    /// Include the full packet rendering in each response
    #[arg(long = "show-all")]
    pub show_all: bool,

    /// CA bundle to verify the server against
    #[arg(long = "ca-path", value_name = "FILE")]
    pub ca_path: Option<PathBuf>,

    /// Expected TLS server name, when it differs from the address
    #[arg(long = "server-name")]
    pub server_name: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// Base directory for index stores
    #[arg(long = "index-path", value_name = "DIR", default_value = "index")]
    pub index_path: PathBuf,

    /// Enumerate the unique decoded keys across all stores
    #[arg(long)]
    pub keys: bool,
}

/// CLI spelling of the query attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryTypeArg {
    Ip,
    Port,
    Mac,
    Protocol,
}

impl From<QueryTypeArg> for QueryKind {
    fn from(t: QueryTypeArg) -> Self {
        match t {
            QueryTypeArg::Ip => QueryKind::Ip,
            QueryTypeArg::Port => QueryKind::Port,
            QueryTypeArg::Mac => QueryKind::Mac,
            QueryTypeArg::Protocol => QueryKind::Protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_requires_a_source() {
        assert!(Args::try_parse_from(["pcapvault", "capture"]).is_err());
        assert!(Args::try_parse_from(["pcapvault", "capture", "--interface", "eth0"]).is_ok());
        assert!(Args::try_parse_from(["pcapvault", "capture", "--file", "a.pcap", "--file", "b.pcap"]).is_ok());
        assert!(Args::try_parse_from([
            "pcapvault", "capture", "--interface", "eth0", "--file", "a.pcap"
        ])
        .is_err());
    }

    #[test]
    fn query_parses_duration_and_type() {
        let args = Args::try_parse_from([
            "pcapvault",
            "query",
            "--start",
            "2020-01-01",
            "--duration",
            "90m",
            "--query-type",
            "ip",
            "10.0.0.1",
        ])
        .unwrap();
        let Command::Query(q) = args.command else { panic!("expected query") };
        assert_eq!(q.duration, Duration::from_secs(90 * 60));
        assert_eq!(q.query_type, QueryTypeArg::Ip);
        assert_eq!(q.query, "10.0.0.1");
        assert_eq!(q.label, "pcap");
        assert_eq!(q.server, "localhost:7123");
    }
}
