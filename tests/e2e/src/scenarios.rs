//! Building blocks for end-to-end relay scenarios

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tapline_relays::AUDIT_HEADER;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Destination that accepts a single connection and collects every byte
/// the relay forwards to it.
pub struct MockTarget {
    addr: SocketAddr,
    collected: JoinHandle<std::io::Result<Vec<u8>>>,
}

impl MockTarget {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let collected = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await?;
            let mut data = Vec::new();
            sock.read_to_end(&mut data).await?;
            Ok(data)
        });
        Ok(Self { addr, collected })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the forwarded stream to end and return everything received.
    pub async fn collected(self, deadline: Duration) -> Result<Vec<u8>> {
        let joined = timeout(deadline, self.collected)
            .await
            .context("mock target did not finish receiving")?;
        let data = joined.context("mock target task panicked")??;
        Ok(data)
    }
}

/// Connect to `addr` and stream `payload` in randomly sized blocks, then
/// shut the write side down. Returns the number of blocks written.
pub async fn stream_payload(
    addr: SocketAddr,
    payload: &[u8],
    min_block: usize,
    max_block: usize,
) -> Result<usize> {
    let mut stream = TcpStream::connect(addr).await?;
    let mut offset = 0;
    let mut blocks = 0;
    while offset < payload.len() {
        let size = fastrand::usize(min_block..=max_block).min(payload.len() - offset);
        stream.write_all(&payload[offset..offset + size]).await?;
        offset += size;
        blocks += 1;
    }
    stream.shutdown().await?;
    Ok(blocks)
}

/// Random bytes for payloads that make corruption detectable.
pub fn random_payload(len: usize) -> Vec<u8> {
    (0..len).map(|_| fastrand::u8(..)).collect()
}

/// Parse an audit log into `(label, sequence, bytes)` records, checking the
/// header line on the way.
pub fn parse_audit_lines(contents: &str) -> Result<Vec<(String, u64, u64)>> {
    let mut lines = contents.lines();
    let header = lines.next().context("audit log is empty")?;
    anyhow::ensure!(
        header == AUDIT_HEADER,
        "unexpected audit header: {}",
        header
    );

    let mut records = Vec::new();
    for line in lines {
        let mut fields = line.splitn(3, ',');
        let label = fields
            .next()
            .with_context(|| format!("missing label in {}", line))?
            .trim_matches('"')
            .to_string();
        let sequence = fields
            .next()
            .with_context(|| format!("missing sequence in {}", line))?
            .parse()?;
        let bytes = fields
            .next()
            .with_context(|| format!("missing byte count in {}", line))?
            .parse()?;
        records.push((label, sequence, bytes));
    }
    Ok(records)
}
