//! The query RPC server.
//!
//! A thin tonic front over [`QueryEngine`]: request validation happens on the
//! handler task so planning errors surface as proper statuses, then the
//! blocking engine runs on the blocking pool pushing responses through a
//! bounded channel onto the stream.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status};
use tracing::{error, info};

use super::v1::packet_service_server::{PacketService, PacketServiceServer};
use super::v1::{QueryBinaryResp, QueryReq, QueryResp};
use super::{request_from_proto, status_from_query_error, summary_to_proto};
use crate::constants::RPC_MAX_MESSAGE_SIZE;
use crate::error::{ConfigError, Error, QueryError, Result};
use crate::query::QueryEngine;

/// Capacity of the channel bridging the blocking engine onto each stream.
const STREAM_BUFFER: usize = 64;

/// The query service endpoint: TLS-terminated gRPC on one port.
pub struct QueryServer {
    port: u16,
    cert: PathBuf,
    key: PathBuf,
    engine: Arc<QueryEngine>,
}

impl QueryServer {
    pub fn new(
        port: u16,
        cert: PathBuf,
        key: PathBuf,
        index_path: PathBuf,
        pcap_paths: Vec<PathBuf>,
    ) -> Self {
        QueryServer {
            port,
            cert,
            key,
            engine: Arc::new(QueryEngine::new(index_path, pcap_paths)),
        }
    }

    /// Serve until the token fires.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        for (kind, path) in [("cert", &self.cert), ("key", &self.key)] {
            if !path.exists() {
                return Err(Error::Config(ConfigError::MissingCredential {
                    kind,
                    path: path.clone(),
                }));
            }
        }

        let cert = tokio::fs::read(&self.cert).await?;
        let key = tokio::fs::read(&self.key).await?;
        let identity = Identity::from_pem(cert, key);

        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let service = PacketQueryService {
            engine: self.engine.clone(),
        };

        info!(
            grpc_addr = %addr,
            cert_file = %self.cert.display(),
            key_file = %self.key.display(),
            "starting grpc query server"
        );

        Server::builder()
            .tls_config(ServerTlsConfig::new().identity(identity))?
            .add_service(
                PacketServiceServer::new(service)
                    .max_decoding_message_size(RPC_MAX_MESSAGE_SIZE)
                    .max_encoding_message_size(RPC_MAX_MESSAGE_SIZE),
            )
            .serve_with_shutdown(addr, token.cancelled())
            .await?;

        info!(grpc_addr = %addr, "query server stopped");
        Ok(())
    }
}

struct PacketQueryService {
    engine: Arc<QueryEngine>,
}

#[tonic::async_trait]
impl PacketService for PacketQueryService {
    type QueryStreamStream = ReceiverStream<std::result::Result<QueryResp, Status>>;
    type QueryBinaryStreamStream = ReceiverStream<std::result::Result<QueryBinaryResp, Status>>;

    async fn query_stream(
        &self,
        request: Request<QueryReq>,
    ) -> std::result::Result<Response<Self::QueryStreamStream>, Status> {
        let req = request_from_proto(request.get_ref())?;
        let engine = self.engine.clone();
        let plan = engine.plan(&req).map_err(status_from_query_error)?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::task::spawn_blocking(move || {
            let result = engine.stream_summaries(&req, &plan, &mut |summary| {
                tx.blocking_send(Ok(summary_to_proto(summary)))
                    .map_err(|_| QueryError::StreamClosed)
            });
            forward_error(&tx, result);
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn query_binary_stream(
        &self,
        request: Request<QueryReq>,
    ) -> std::result::Result<Response<Self::QueryBinaryStreamStream>, Status> {
        let req = request_from_proto(request.get_ref())?;
        let engine = self.engine.clone();
        let plan = engine.plan(&req).map_err(status_from_query_error)?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::task::spawn_blocking(move || {
            let result = engine.stream_pcap(&plan, &mut |chunk| {
                tx.blocking_send(Ok(QueryBinaryResp { binary: chunk }))
                    .map_err(|_| QueryError::StreamClosed)
            });
            forward_error(&tx, result);
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Push a terminal query failure onto the stream. A closed stream means the
/// client went away; that is not worth reporting.
fn forward_error<T>(
    tx: &mpsc::Sender<std::result::Result<T, Status>>,
    result: std::result::Result<(), QueryError>,
) {
    match result {
        Ok(()) | Err(QueryError::StreamClosed) => {}
        Err(e) => {
            error!(component = "query-server", error = %e, "query failed mid-stream");
            let _ = tx.blocking_send(Err(status_from_query_error(e)));
        }
    }
}
