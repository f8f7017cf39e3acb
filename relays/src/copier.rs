//! Per-pair chunk forwarding.
//!
//! One `ChunkCopier` owns both sockets of a connection pair and moves bytes
//! one chunk at a time: read a block from the inbound side, hand it to the
//! destination, record it in the audit log, repeat. Outbound write readiness
//! drives the flow-control machine; while the destination cannot absorb more
//! bytes no inbound read is issued, so backpressure propagates to the
//! producer with only one block in flight.

use std::io;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::audit::ChunkAuditLog;
use crate::flow::FlowControl;
use crate::relay::RelayStatsHandle;

/// Size of the per-pair read buffer; also the largest chunk one read can
/// produce.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Why a connection pair finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// The producer closed the inbound connection; the stream is complete.
    InboundEof,
    /// The destination closed its side; the pair shuts down.
    OutboundEof,
}

impl std::fmt::Display for CloseCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseCause::InboundEof => write!(f, "inbound closed"),
            CloseCause::OutboundEof => write!(f, "destination closed"),
        }
    }
}

/// Totals for one finished pair.
#[derive(Debug, Clone, Copy)]
pub struct CopySummary {
    pub chunks: u64,
    pub bytes: u64,
    pub suspensions: u64,
    pub cause: CloseCause,
}

/// Moves chunks from the inbound socket to the outbound socket for one
/// connection pair.
pub struct ChunkCopier {
    pair_id: u64,
    inbound: TcpStream,
    outbound: TcpStream,
    audit: ChunkAuditLog,
    stats: RelayStatsHandle,
    flow: FlowControl,
    chunks: u64,
    bytes: u64,
}

impl ChunkCopier {
    pub fn new(
        pair_id: u64,
        inbound: TcpStream,
        outbound: TcpStream,
        audit: ChunkAuditLog,
        stats: RelayStatsHandle,
    ) -> Self {
        Self {
            pair_id,
            inbound,
            outbound,
            audit,
            stats,
            flow: FlowControl::new(),
            chunks: 0,
            bytes: 0,
        }
    }

    /// Relay until either side ends or an I/O error terminates the pair.
    ///
    /// Both sockets are dropped (closed) when this returns, whichever side
    /// finished first.
    pub async fn run(mut self) -> io::Result<CopySummary> {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

        loop {
            buf.clear();
            tokio::select! {
                read = self.inbound.read_buf(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(self.summary(CloseCause::InboundEof));
                    }
                    self.forward_block(&buf[..n]).await?;
                    self.audit.record(n);
                    self.chunks += 1;
                    self.bytes += n as u64;
                    self.stats.note_chunk(n as u64);
                    debug!("Pair {}: forwarded {} byte chunk", self.pair_id, n);
                }
                eof = watch_reverse(&self.outbound, self.pair_id) => {
                    eof?;
                    return Ok(self.summary(CloseCause::OutboundEof));
                }
            }
        }
    }

    /// Hand one block to the destination, suspending while it cannot absorb
    /// more. Empty blocks are a no-op: nothing is forwarded or logged.
    async fn forward_block(&mut self, block: &[u8]) -> io::Result<()> {
        if block.is_empty() {
            return Ok(());
        }

        let mut written = 0;
        while written < block.len() {
            match self.outbound.try_write(&block[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "destination accepted no bytes",
                    ));
                }
                Ok(n) => {
                    written += n;
                    if self.flow.is_suspended() {
                        self.flow.resume();
                        debug!(
                            "Pair {}: destination drained, resuming inbound reads",
                            self.pair_id
                        );
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if self.flow.suspend() {
                        self.stats.note_suspension();
                        debug!(
                            "Pair {}: destination saturated, suspending inbound reads",
                            self.pair_id
                        );
                    }
                    self.outbound.writable().await?;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn summary(&self, cause: CloseCause) -> CopySummary {
        CopySummary {
            chunks: self.chunks,
            bytes: self.bytes,
            suspensions: self.flow.suspensions(),
            cause,
        }
    }
}

/// Watch the destination's read side. Returns when it reaches end of stream;
/// bytes the destination sends back are discarded, the monitor never relays
/// the reverse direction.
async fn watch_reverse(outbound: &TcpStream, pair_id: u64) -> io::Result<()> {
    let mut scratch = [0u8; 1024];
    loop {
        outbound.readable().await?;
        match outbound.try_read(&mut scratch) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                debug!(
                    "Pair {}: discarding {} bytes sent back by destination",
                    pair_id, n
                );
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) => return Err(err),
        }
    }
}
