//! End-to-end scenarios: capture an offline file, then query the archive.
//!
//! Each test builds a small input capture with hand-crafted frames, runs the
//! full pipeline into temporary directories and queries the result through
//! the engine the RPC server wraps.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use pcapvault::capture::{CaptureServer, CaptureSource};
use pcapvault::error::QueryError;
use pcapvault::packet::test_utils::{icmp_frame, tcp_frame, udp_frame};
use pcapvault::pcap::{PcapFileReader, PcapFileWriter, FILE_HEADER_SIZE, LINKTYPE_ETHERNET};
use pcapvault::query::{PacketSummary, QueryEngine, QueryKind, QueryRequest};

const SNAP_LEN: u32 = 8192;

struct Archive {
    _root: tempfile::TempDir,
    index_base: PathBuf,
    pcap_dirs: Vec<PathBuf>,
}

/// Three-packet input from the capture seeds: UDP, TCP, ICMP.
fn seed_frames() -> Vec<(DateTime<Utc>, u32, Vec<u8>)> {
    let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 5).unwrap();
    vec![
        // UDP 10.0.0.1:53 → 10.0.0.2:55000, 100 wire bytes
        (t0, 100, udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 53, 55000, 58)),
        // TCP 10.0.0.1:443 → 10.0.0.3:40000, 200 wire bytes
        (
            t0 + chrono::Duration::seconds(1),
            200,
            tcp_frame([10, 0, 0, 1], [10, 0, 0, 3], 443, 40000),
        ),
        // ICMP 10.0.0.2 → 10.0.0.1, 74 wire bytes
        (
            t0 + chrono::Duration::seconds(2),
            74,
            icmp_frame([10, 0, 0, 2], [10, 0, 0, 1]),
        ),
    ]
}

fn write_input(path: &Path) {
    let mut writer = PcapFileWriter::create(path, SNAP_LEN, LINKTYPE_ETHERNET).unwrap();
    for (ts, orig_len, data) in seed_frames() {
        writer.write_record(ts, orig_len, &data).unwrap();
    }
    writer.close().unwrap();
}

/// Run the pipeline over the seed input into `dirs` capture directories.
async fn capture_seed(dirs: usize, rotate_interval: Duration) -> Archive {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("input.pcap");
    write_input(&input);

    let index_base = root.path().join("index");
    let pcap_dirs: Vec<PathBuf> = (0..dirs)
        .map(|i| {
            let dir = root.path().join(format!("pcap{i}"));
            std::fs::create_dir_all(&dir).unwrap();
            dir
        })
        .collect();

    let server = CaptureServer::new(
        CaptureSource::Files(vec![input]),
        index_base.join("pcap"),
        pcap_dirs.clone(),
    )
    .with_rotate_interval(rotate_interval);
    server.run(CancellationToken::new()).await.unwrap();

    Archive {
        _root: root,
        index_base,
        pcap_dirs,
    }
}

fn query(engine: &QueryEngine, kind: QueryKind, arg: &str) -> Result<Vec<PacketSummary>, QueryError> {
    let req = QueryRequest {
        label: "pcap".into(),
        start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        duration: Duration::from_secs(3600),
        kind,
        query: arg.into(),
        show_all: false,
        encode: false,
    };
    let plan = engine.plan(&req)?;
    let mut out = Vec::new();
    engine.stream_summaries(&req, &plan, &mut |s| {
        out.push(s);
        Ok(())
    })?;
    Ok(out)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_directory_capture_and_point_queries() {
    let archive = capture_seed(1, Duration::from_secs(60)).await;

    // Exactly one logical file, so exactly one index store.
    let stores: Vec<_> = std::fs::read_dir(archive.index_base.join("pcap"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(stores, vec!["2020_01_01-00_00_05.idx"]);

    let engine = QueryEngine::new(archive.index_base.clone(), archive.pcap_dirs.clone());

    // ip 10.0.0.1 → all three packets, in capture order.
    let hits = query(&engine, QueryKind::Ip, "10.0.0.1").unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].proto, "UDP");
    assert_eq!(hits[0].src_port, 53);
    assert_eq!(hits[0].dst_port, 55000);
    assert_eq!(hits[1].proto, "TCP");
    assert_eq!(hits[2].proto, "ICMP");
    assert!(hits.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    // The reported length is the captured length from the record header.
    assert_eq!(hits[0].length, 100);
    assert_eq!(hits[0].src_ip, "10.0.0.1");
    assert_eq!(hits[0].dst_ip, "10.0.0.2");
    assert!(!hits[0].ipv6);

    // port 55000 → only the UDP packet.
    let hits = query(&engine, QueryKind::Port, "55000").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].proto, "UDP");

    // protocol tcp → only the TCP packet, protocol icmp → only the ICMP one.
    let hits = query(&engine, QueryKind::Protocol, "tcp").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].dst_port, 40000);
    let hits = query(&engine, QueryKind::Protocol, "icmp").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].src_ip, "10.0.0.2");

    // A key that was never written yields no rows and no error.
    let hits = query(&engine, QueryKind::Ip, "192.0.2.99").unwrap();
    assert!(hits.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_directories_split_but_stay_queryable() {
    let archive = capture_seed(2, Duration::from_secs(60)).await;

    // Every directory holds one physical file of the logical file, each with
    // a valid pcap file header.
    let mut total = 0;
    for (i, dir) in archive.pcap_dirs.iter().enumerate() {
        let path = dir.join(format!("2020_01_01-00_00_05_{i}.pcap"));
        let reader = PcapFileReader::open(&path).unwrap();
        let packets: Vec<_> = reader.map(|p| p.unwrap()).collect();
        assert!(!packets.is_empty(), "writer {i} received no packets");
        total += packets.len();
    }
    assert_eq!(total, 3);

    // Every packet is reachable through the index regardless of which
    // directory it landed in.
    let engine = QueryEngine::new(archive.index_base.clone(), archive.pcap_dirs.clone());
    let hits = query(&engine, QueryKind::Ip, "10.0.0.1").unwrap();
    assert_eq!(hits.len(), 3);

    let ports: Vec<u16> = {
        let mut p: Vec<_> = hits.iter().map(|h| h.src_port).collect();
        p.sort_unstable();
        p
    };
    assert_eq!(ports, vec![0, 53, 443]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rotation_produces_one_store_per_logical_file() {
    // A zero rotation interval forces a new logical file for every packet.
    let archive = capture_seed(1, Duration::ZERO).await;

    let mut stores: Vec<_> = std::fs::read_dir(archive.index_base.join("pcap"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    stores.sort();
    assert_eq!(
        stores,
        vec![
            "2020_01_01-00_00_05.idx",
            "2020_01_01-00_00_06.idx",
            "2020_01_01-00_00_07.idx",
        ]
    );

    // The query walks the stores in time order, so results come back in
    // capture order even across logical files.
    let engine = QueryEngine::new(archive.index_base.clone(), archive.pcap_dirs.clone());
    let hits = query(&engine, QueryKind::Ip, "10.0.0.1").unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(
        hits.iter().map(|h| h.proto.as_str()).collect::<Vec<_>>(),
        vec!["UDP", "TCP", "ICMP"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_outside_time_range_fails() {
    let archive = capture_seed(1, Duration::from_secs(60)).await;
    let engine = QueryEngine::new(archive.index_base.clone(), archive.pcap_dirs.clone());

    let req = QueryRequest {
        label: "pcap".into(),
        start: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        duration: Duration::from_secs(3600),
        kind: QueryKind::Ip,
        query: "10.0.0.1".into(),
        show_all: false,
        encode: false,
    };
    let err = engine.plan(&req).unwrap_err();
    assert!(err.to_string().contains("no indices within the time range"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn binary_stream_reassembles_a_valid_pcap_file() {
    let archive = capture_seed(1, Duration::from_secs(60)).await;
    let engine = QueryEngine::new(archive.index_base.clone(), archive.pcap_dirs.clone());

    let req = QueryRequest {
        label: "pcap".into(),
        start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        duration: Duration::from_secs(3600),
        kind: QueryKind::Ip,
        query: "10.0.0.1".into(),
        show_all: false,
        encode: false,
    };
    let plan = engine.plan(&req).unwrap();

    let mut chunks: Vec<Vec<u8>> = Vec::new();
    engine
        .stream_pcap(&plan, &mut |chunk| {
            chunks.push(chunk);
            Ok(())
        })
        .unwrap();

    // First message carries only the pcap file header; one record per hit.
    assert_eq!(chunks.len(), 1 + 3);
    assert_eq!(chunks[0].len(), FILE_HEADER_SIZE);

    let out = archive._root.path().join("reassembled.pcap");
    std::fs::write(&out, chunks.concat()).unwrap();

    let reader = PcapFileReader::open(&out).unwrap();
    let packets: Vec<_> = reader.map(|p| p.unwrap()).collect();
    assert_eq!(packets.len(), 3);

    let seeds = seed_frames();
    for (packet, (ts, orig_len, data)) in packets.iter().zip(&seeds) {
        assert_eq!(&packet.timestamp, ts);
        assert_eq!(packet.original_length, *orig_len);
        assert_eq!(packet.data.as_ref(), data.as_slice());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn show_all_renders_text() {
    let archive = capture_seed(1, Duration::from_secs(60)).await;
    let engine = QueryEngine::new(archive.index_base.clone(), archive.pcap_dirs.clone());

    let req = QueryRequest {
        label: "pcap".into(),
        start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        duration: Duration::from_secs(3600),
        kind: QueryKind::Port,
        query: "55000".into(),
        show_all: true,
        encode: false,
    };
    let plan = engine.plan(&req).unwrap();
    let mut out = Vec::new();
    engine
        .stream_summaries(&req, &plan, &mut |s| {
            out.push(s);
            Ok(())
        })
        .unwrap();
    assert_eq!(out.len(), 1);
    assert!(out[0].text.contains("UDP: 53 > 55000"));
}
