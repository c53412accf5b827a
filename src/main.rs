//! pcapvault CLI entry point.

use std::io;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pcapvault::capture::{CaptureServer, CaptureSource};
use pcapvault::cli::{Args, CaptureArgs, Command, QueryArgs, ServeArgs};
use pcapvault::query::client::{parse_start_time, ClientConfig, QueryClient};
use pcapvault::rpc::server::QueryServer;
use pcapvault::rpc::{duration_to_proto, timestamp_to_proto, v1};
use pcapvault::{info, query};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    match args.command {
        Command::Capture(capture_args) => run_capture(capture_args).await,
        Command::Serve(serve_args) => run_serve(serve_args).await,
        Command::Query(query_args) => run_query(query_args).await,
        Command::Info(info_args) => Ok(info::run(&info_args.index_path, info_args.keys)?),
    }
}

/// Hand out a token that fires on ctrl-c.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });
    token
}

async fn run_capture(args: CaptureArgs) -> Result<()> {
    let source = match args.interface {
        Some(device) => CaptureSource::Interface {
            device,
            promiscuous: args.promiscuous,
        },
        None => CaptureSource::Files(args.files),
    };

    // Indices for this capture live under <index-path>/<label>/.
    let index_path = args.index_path.join(&args.label);
    let server = CaptureServer::new(source, index_path, args.pcap_paths);
    server.run(shutdown_token()).await?;
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let server = QueryServer::new(
        args.port,
        args.cert,
        args.key,
        args.index_path,
        args.pcap_paths,
    );
    server.run(shutdown_token()).await?;
    Ok(())
}

async fn run_query(args: QueryArgs) -> Result<()> {
    let start = parse_start_time(&args.start)?;
    let kind: query::QueryKind = args.query_type.into();

    let req = v1::QueryReq {
        label: args.label,
        show_all: args.show_all,
        start_time: Some(timestamp_to_proto(start)),
        duration: Some(duration_to_proto(args.duration)),
        query_type: v1::QueryType::from(kind) as i32,
        query: args.query,
        binary_output: args.binary,
        encode: false,
    };

    let mut client = QueryClient::connect(ClientConfig {
        server_addr: args.server,
        ca_path: args.ca_path,
        server_name: args.server_name,
    })
    .await?;

    let mut stdout = io::stdout();
    client.execute(req, &mut stdout).await?;
    Ok(())
}
