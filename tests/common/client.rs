//! Test IRC client: line-oriented, with predicate waits.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// A test IRC client over plaintext TCP.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

const WAIT: Duration = Duration::from_secs(10);

impl TestClient {
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send one raw line (CRLF appended).
    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next line, without the trailing CRLF.
    pub async fn next_line(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        let n = timeout(WAIT, self.reader.read_line(&mut line)).await??;
        if n == 0 {
            anyhow::bail!("connection closed");
        }
        // Answer server keepalive pings transparently.
        if line.starts_with("PING") {
            let token = line.trim_end().split(' ').nth(1).unwrap_or("x").to_string();
            self.send(&format!("PONG {}", token.trim_start_matches(':')))
                .await?;
            return Box::pin(self.next_line()).await;
        }
        Ok(line.trim_end().to_string())
    }

    /// Read lines until one satisfies the predicate; returns it.
    pub async fn wait_for(&mut self, what: &str, pred: impl Fn(&str) -> bool) -> anyhow::Result<String> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("timed out waiting for {}", what);
            }
            let line = self.next_line().await?;
            if pred(&line) {
                return Ok(line);
            }
        }
    }

    /// Wait for a numeric reply by code.
    pub async fn wait_for_numeric(&mut self, code: &str) -> anyhow::Result<String> {
        let needle = format!(" {} ", code);
        self.wait_for(&format!("numeric {}", code), |line| line.contains(&needle))
            .await
    }

    /// Register with NICK/USER and wait for the welcome burst.
    pub async fn register(&mut self, nick: &str) -> anyhow::Result<()> {
        self.send(&format!("NICK {}", nick)).await?;
        self.send(&format!("USER {} 0 * :{}", nick, nick)).await?;
        self.wait_for_numeric("001").await?;
        self.wait_for_numeric("376").await?;
        Ok(())
    }
}
