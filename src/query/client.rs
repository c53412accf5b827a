//! RPC client used by the `query` subcommand.
//!
//! Dials the query server over TLS, runs one streaming call and renders the
//! responses: one formatted line per packet in text mode, raw pcap bytes on
//! stdout in binary mode.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tonic::transport::{Certificate, Channel, ClientTlsConfig};
use tracing::info;

use crate::constants::RPC_MAX_MESSAGE_SIZE;
use crate::error::{ConfigError, Error, Result};
use crate::rpc::v1::packet_service_client::PacketServiceClient;
use crate::rpc::v1::{QueryReq, QueryResp};

/// Date-only start time format.
pub const SHORT_QUERY_TIME_FORMAT: &str = "%Y-%m-%d";

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const QUERY_DEADLINE: Duration = Duration::from_secs(90);

/// Parse a query start time: date-only inputs use the short format, anything
/// longer must be full RFC 3339.
pub fn parse_start_time(input: &str) -> std::result::Result<DateTime<Utc>, ConfigError> {
    if input.len() > 10 {
        DateTime::parse_from_rfc3339(input)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| ConfigError::BadStartDate {
                input: input.to_string(),
                format: "RFC 3339",
                reason: e.to_string(),
            })
    } else {
        NaiveDate::parse_from_str(input, SHORT_QUERY_TIME_FORMAT)
            .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
            .map_err(|e| ConfigError::BadStartDate {
                input: input.to_string(),
                format: SHORT_QUERY_TIME_FORMAT,
                reason: e.to_string(),
            })
    }
}

/// Connection settings for the query server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the server.
    pub server_addr: String,
    /// CA bundle to verify the server against; system roots when absent.
    pub ca_path: Option<PathBuf>,
    /// Override of the expected TLS server name.
    pub server_name: Option<String>,
}

/// A connected query client.
pub struct QueryClient {
    client: PacketServiceClient<Channel>,
}

impl QueryClient {
    /// Dial the server. TLS is always on.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let mut tls = match &config.ca_path {
            Some(path) => {
                let pem = std::fs::read(path)?;
                ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem))
            }
            None => ClientTlsConfig::new().with_native_roots(),
        };
        if let Some(name) = &config.server_name {
            tls = tls.domain_name(name.clone());
        }

        info!(
            server_address = %config.server_addr,
            ca_file = ?config.ca_path,
            server_name_override = ?config.server_name,
            timeout = ?DIAL_TIMEOUT,
            "opening client connection"
        );

        let channel = Channel::from_shared(format!("https://{}", config.server_addr))
            .map_err(|e| Error::Config(ConfigError::BadServerAddr(e.to_string())))?
            .tls_config(tls)?
            .connect_timeout(DIAL_TIMEOUT)
            .timeout(QUERY_DEADLINE)
            .connect()
            .await?;

        let client = PacketServiceClient::new(channel)
            .max_decoding_message_size(RPC_MAX_MESSAGE_SIZE)
            .max_encoding_message_size(RPC_MAX_MESSAGE_SIZE);

        Ok(QueryClient { client })
    }

    /// Run the query and render every response to `out`.
    pub async fn execute(&mut self, req: QueryReq, out: &mut (dyn Write + Send)) -> Result<()> {
        let show_all = req.show_all;
        if req.binary_output {
            let mut stream = self.client.query_binary_stream(req).await?.into_inner();
            while let Some(resp) = stream.message().await? {
                out.write_all(&resp.binary)?;
            }
        } else {
            let mut stream = self.client.query_stream(req).await?.into_inner();
            while let Some(resp) = stream.message().await? {
                write_response(&resp, show_all, out)?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

fn write_response(resp: &QueryResp, show_all: bool, out: &mut (dyn Write + Send)) -> std::io::Result<()> {
    if show_all {
        return writeln!(out, "{}", resp.text);
    }
    let ts = resp
        .timestamp
        .as_ref()
        .map(crate::rpc::timestamp_from_proto)
        .unwrap_or_default();
    writeln!(
        out,
        "{} IP {:>12}:{:<3} > {:>12}:{:<3} {}, len {}",
        ts.format("%Y-%m-%d %H:%M:%S%.6f"),
        resp.src_ip,
        resp.src_port,
        resp.dst_ip,
        resp.dst_port,
        resp.proto,
        resp.length
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_short_and_long_start_times() {
        assert_eq!(
            parse_start_time("2020-01-01").unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_start_time("2020-01-01T06:30:00Z").unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 1, 6, 30, 0).unwrap()
        );
        assert_eq!(
            parse_start_time("2020-01-01T06:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 1, 4, 30, 0).unwrap()
        );
        assert!(parse_start_time("01/02/2020").is_err());
        assert!(parse_start_time("2020-01-01 06:30:00").is_err());
    }
}
