//! Monitor relay: accept loop, pair lifecycle, and process-wide stats.
//!
//! The relay binds the configured listen port and serves each inbound
//! connection with a dedicated outbound connection to this identity's
//! destination (a connection pair). Pair failures never take down the
//! listener: a refused destination or a mid-stream error closes that pair
//! only.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::audit::ChunkAuditLog;
use crate::config::MonitorConfig;
use crate::copier::ChunkCopier;
use crate::types::{Endpoint, TargetId};
use crate::{RelayError, RelayResult};

/// Interval between periodic activity log lines.
const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct RelayStatsInner {
    pairs_active: AtomicU64,
    pairs_total: AtomicU64,
    chunks_forwarded: AtomicU64,
    bytes_forwarded: AtomicU64,
    flow_suspensions: AtomicU64,
}

/// Point-in-time snapshot of relay activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub pairs_active: u64,
    pub pairs_total: u64,
    pub chunks_forwarded: u64,
    pub bytes_forwarded: u64,
    pub flow_suspensions: u64,
}

/// Cloneable handle to the relay counters; stays valid after `run` consumes
/// the relay.
#[derive(Debug, Clone, Default)]
pub struct RelayStatsHandle {
    inner: Arc<RelayStatsInner>,
}

impl RelayStatsHandle {
    pub(crate) fn note_chunk(&self, bytes: u64) {
        self.inner.chunks_forwarded.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_forwarded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn note_suspension(&self) {
        self.inner.flow_suspensions.fetch_add(1, Ordering::Relaxed);
    }

    fn note_pair_opened(&self) {
        self.inner.pairs_total.fetch_add(1, Ordering::Relaxed);
        self.inner.pairs_active.fetch_add(1, Ordering::Relaxed);
    }

    fn note_pair_closed(&self) {
        self.inner.pairs_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            pairs_active: self.inner.pairs_active.load(Ordering::Relaxed),
            pairs_total: self.inner.pairs_total.load(Ordering::Relaxed),
            chunks_forwarded: self.inner.chunks_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.inner.bytes_forwarded.load(Ordering::Relaxed),
            flow_suspensions: self.inner.flow_suspensions.load(Ordering::Relaxed),
        }
    }
}

/// One registered connection pair.
#[derive(Debug, Clone)]
pub struct PairInfo {
    pub peer: SocketAddr,
    pub opened_at: Instant,
}

/// The monitor relay for one identity.
#[derive(Debug)]
pub struct MonitorRelay {
    target: TargetId,
    destination: Endpoint,
    listener: TcpListener,
    local_addr: SocketAddr,
    audit: ChunkAuditLog,
    stats: RelayStatsHandle,
    pairs: Arc<DashMap<u64, PairInfo>>,
}

impl MonitorRelay {
    /// Resolve this identity's destination and audit log, reset the log, and
    /// bind the listen socket.
    ///
    /// The audit log is ready before the listener exists, so no chunk can
    /// ever precede the header.
    pub async fn bind(config: &MonitorConfig, target: TargetId) -> RelayResult<Self> {
        config.validate()?;
        let destination = config.destination_for(target)?.clone();
        let log_path = config.log_path_for(target)?;
        let audit = ChunkAuditLog::create(log_path, target).await?;

        let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Listen { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RelayError::Listen { addr, source })?;

        info!(
            "Monitor {} relaying {} -> {} (audit log {})",
            target,
            local_addr,
            destination,
            log_path.display()
        );

        Ok(Self {
            target,
            destination,
            listener,
            local_addr,
            audit,
            stats: RelayStatsHandle::default(),
            pairs: Arc::new(DashMap::new()),
        })
    }

    /// Address the listener actually bound (relevant with listen_port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Identity this relay runs as.
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Handle to the shared audit log.
    pub fn audit_log(&self) -> ChunkAuditLog {
        self.audit.clone()
    }

    /// Handle to the relay counters.
    pub fn stats(&self) -> RelayStatsHandle {
        self.stats.clone()
    }

    /// Accept inbound connections forever, one spawned task per pair.
    pub async fn run(self) -> RelayResult<()> {
        let MonitorRelay {
            target,
            destination,
            listener,
            local_addr: _,
            audit,
            stats,
            pairs,
        } = self;

        tokio::spawn(stats_task(stats.clone(), audit.clone(), Arc::clone(&pairs)));
        info!("🚀 Monitor {} accepting connections", target);

        let mut next_pair_id: u64 = 0;
        loop {
            match listener.accept().await {
                Ok((inbound, peer)) => {
                    next_pair_id += 1;
                    let pair_id = next_pair_id;
                    info!("📡 Pair {}: client connected from {}", pair_id, peer);

                    let destination = destination.clone();
                    let audit = audit.clone();
                    let stats = stats.clone();
                    let pairs = Arc::clone(&pairs);
                    tokio::spawn(async move {
                        handle_pair(pair_id, inbound, peer, destination, audit, stats, pairs).await;
                    });
                }
                Err(err) => {
                    error!("Failed to accept inbound connection: {}", err);
                }
            }
        }
    }
}

/// Serve one connection pair to completion and unregister it.
async fn handle_pair(
    pair_id: u64,
    inbound: TcpStream,
    peer: SocketAddr,
    destination: Endpoint,
    audit: ChunkAuditLog,
    stats: RelayStatsHandle,
    pairs: Arc<DashMap<u64, PairInfo>>,
) {
    pairs.insert(
        pair_id,
        PairInfo {
            peer,
            opened_at: Instant::now(),
        },
    );
    stats.note_pair_opened();

    match TcpStream::connect((destination.host.as_str(), destination.port)).await {
        Ok(outbound) => {
            info!("Pair {}: connected to destination {}", pair_id, destination);
            let copier = ChunkCopier::new(pair_id, inbound, outbound, audit, stats.clone());
            match copier.run().await {
                Ok(summary) => {
                    info!(
                        "🔌 Pair {} finished: {} ({} chunks, {} bytes, {} suspensions)",
                        pair_id, summary.cause, summary.chunks, summary.bytes, summary.suspensions
                    );
                }
                Err(err) => {
                    error!("Pair {} failed: {}", pair_id, err);
                }
            }
        }
        Err(err) => {
            // Pair-local failure: the inbound socket drops here and the
            // listener keeps serving.
            error!(
                "Pair {}: failed to connect to destination {}: {}",
                pair_id, destination, err
            );
        }
    }

    if let Some((_, info)) = pairs.remove(&pair_id) {
        debug!(
            "Pair {} from {} served for {:?}",
            pair_id,
            info.peer,
            info.opened_at.elapsed()
        );
    }
    stats.note_pair_closed();
}

/// Periodic activity line while the relay has served at least one pair.
async fn stats_task(
    stats: RelayStatsHandle,
    audit: ChunkAuditLog,
    pairs: Arc<DashMap<u64, PairInfo>>,
) {
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        let relay = stats.snapshot();
        if relay.pairs_total == 0 {
            continue;
        }
        let log = audit.stats();
        info!(
            "📊 Monitor {}: {} active pairs ({} total), {} chunks / {} bytes forwarded, {} suspensions, {} audit records ({} dropped, {} write errors)",
            audit.target(),
            pairs.len(),
            relay.pairs_total,
            relay.chunks_forwarded,
            relay.bytes_forwarded,
            relay.flow_suspensions,
            log.records_written,
            log.records_dropped,
            log.write_errors
        );
    }
}
