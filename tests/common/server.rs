//! Test server management.
//!
//! Spawns corvusd processes with a minimal configuration on an
//! ephemeral port.

#![allow(dead_code)]

use std::net::TcpListener as StdTcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::sleep;

/// A running corvusd under test.
pub struct TestServer {
    child: Child,
    port: u16,
    data_dir: tempfile::TempDir,
}

impl TestServer {
    /// Spawn a server on an ephemeral port and wait for it to listen.
    pub async fn spawn() -> anyhow::Result<Self> {
        let port = free_port()?;
        let data_dir = tempfile::tempdir()?;

        let config_path = data_dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "test.server"
network = "TestNet"
sid = "00T"
description = "Test IRC Server"

[listen]
addr = "127.0.0.1:{port}"

[database]
path = "{db}"

[timeouts]
registration = 30

[security]
cloak_secret = "TestSecret-Integration-2026!"
enable_flood_protection = false

[motd]
lines = ["Test Server"]
"#,
            port = port,
            db = data_dir.path().join("test.db").display(),
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_corvusd"))
            .arg("-c")
            .arg(&config_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let server = Self {
            child,
            port,
            data_dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..100 {
            if TcpStream::connect(self.address()).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server did not start listening on {}", self.address())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// An OS-assigned free port. Racy by nature; good enough for tests.
fn free_port() -> anyhow::Result<u16> {
    let listener = StdTcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
