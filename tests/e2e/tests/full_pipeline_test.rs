//! Full end-to-end pipeline test
//!
//! Validates the complete monitor flow: a producer streams a randomized
//! payload through a live relay, the destination receives it byte for byte,
//! and the audit log accounts for every forwarded chunk.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use tapline_e2e_tests::{parse_audit_lines, random_payload, stream_payload, MockTarget};
use tapline_relays::{
    AuditLogConfig, ChunkAuditLog, Endpoint, MonitorConfig, MonitorRelay, RelayStatsHandle,
    TargetId, AUDIT_HEADER,
};
use tempfile::TempDir;
use tokio::task::JoinHandle;

const PAYLOAD_LEN: usize = 1024 * 1024;

struct RunningMonitor {
    addr: SocketAddr,
    log_path: PathBuf,
    audit: ChunkAuditLog,
    stats: RelayStatsHandle,
    task: JoinHandle<()>,
    _dir: TempDir,
}

/// Bind a monitor for identity 1 against `destination` and start serving.
async fn start_monitor(destination: SocketAddr) -> Result<RunningMonitor> {
    let dir = TempDir::new()?;
    let log_path = dir.path().join("target_1_chunks.csv");
    let config = MonitorConfig {
        listen_port: 0,
        targets: vec![Endpoint {
            host: "127.0.0.1".to_string(),
            port: destination.port(),
        }],
        audit_logs: vec![AuditLogConfig {
            file: log_path.clone(),
        }],
    };

    let relay = MonitorRelay::bind(&config, TargetId::One).await?;
    let addr = relay.local_addr();
    let audit = relay.audit_log();
    let stats = relay.stats();
    let task = tokio::spawn(async move {
        let _ = relay.run().await;
    });

    Ok(RunningMonitor {
        addr,
        log_path,
        audit,
        stats,
        task,
        _dir: dir,
    })
}

#[tokio::test]
async fn test_full_pipeline_delivery_and_audit() -> Result<()> {
    // 1. Start the destination and a monitor pointed at it
    let target = MockTarget::start().await?;
    let monitor = start_monitor(target.addr()).await?;

    // 2. Stream a randomized payload in randomly sized blocks
    let payload = random_payload(PAYLOAD_LEN);
    stream_payload(monitor.addr, &payload, 512, 32_768).await?;

    // 3. The destination must receive the payload byte for byte
    let delivered = target.collected(Duration::from_secs(10)).await?;
    assert_eq!(delivered.len(), payload.len());
    assert_eq!(delivered, payload, "forwarded payload was corrupted");

    // 4. Wait for the audit writer to catch up with the copier
    let deadline = Instant::now() + Duration::from_secs(10);
    let (stats, audit) = loop {
        let stats = monitor.stats.snapshot();
        let audit = monitor.audit.stats();
        if stats.bytes_forwarded == PAYLOAD_LEN as u64
            && stats.chunks_forwarded > 0
            && audit.records_written == stats.chunks_forwarded
        {
            break (stats, audit);
        }
        anyhow::ensure!(
            Instant::now() < deadline,
            "pipeline did not settle: {:?} / {:?}",
            stats,
            audit
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(audit.records_dropped, 0);

    // 5. The audit log accounts for every forwarded chunk exactly once
    let log = tokio::fs::read_to_string(&monitor.log_path).await?;
    let records = parse_audit_lines(&log)?;
    assert_eq!(records.len() as u64, stats.chunks_forwarded);

    let mut audited_bytes = 0u64;
    for (i, (label, sequence, bytes)) in records.iter().enumerate() {
        assert_eq!(label, "target_1");
        assert_eq!(*sequence, (i + 1) as u64, "sequence numbers must be contiguous");
        audited_bytes += bytes;
    }
    assert_eq!(audited_bytes, PAYLOAD_LEN as u64);

    monitor.task.abort();
    Ok(())
}

#[tokio::test]
async fn test_relay_restart_resets_audit_log() -> Result<()> {
    let target = MockTarget::start().await?;
    let dir = TempDir::new()?;
    let log_path = dir.path().join("target_1_chunks.csv");
    let config = MonitorConfig {
        listen_port: 0,
        targets: vec![Endpoint {
            host: "127.0.0.1".to_string(),
            port: target.addr().port(),
        }],
        audit_logs: vec![AuditLogConfig {
            file: log_path.clone(),
        }],
    };

    // 1. First run records at least one chunk
    let relay = MonitorRelay::bind(&config, TargetId::One).await?;
    let addr = relay.local_addr();
    let audit = relay.audit_log();
    let task = tokio::spawn(async move {
        let _ = relay.run().await;
    });

    let payload = b"restart marker";
    stream_payload(addr, payload, payload.len(), payload.len()).await?;
    let deadline = Instant::now() + Duration::from_secs(5);
    while audit.stats().records_written == 0 {
        anyhow::ensure!(Instant::now() < deadline, "no audit record was written");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    task.abort();
    drop(audit);

    let first = tokio::fs::read_to_string(&log_path).await?;
    assert!(
        first.lines().count() >= 2,
        "first run left no records: {}",
        first
    );

    // 2. A fresh bind must wipe the log back to the header
    let relay = MonitorRelay::bind(&config, TargetId::One).await?;
    drop(relay);

    let second = tokio::fs::read_to_string(&log_path).await?;
    assert_eq!(second, format!("{}\n", AUDIT_HEADER));
    Ok(())
}
