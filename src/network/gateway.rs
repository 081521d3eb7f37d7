//! Listener setup: plaintext and TLS accept loops.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::config::{ListenConfig, TlsConfig};
use crate::handlers::Registry;
use crate::network::{conn, tls};
use crate::state::Network;

/// Owns the client listeners.
pub struct Gateway {
    plaintext: Option<TcpListener>,
    tls: Option<(TcpListener, TlsAcceptor)>,
    network: Arc<Network>,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Bind the configured listeners.
    pub async fn bind(
        listen: ListenConfig,
        tls_config: Option<TlsConfig>,
        network: Arc<Network>,
        registry: Arc<Registry>,
    ) -> anyhow::Result<Self> {
        let plaintext = if network.require_tls {
            info!("Plaintext listener disabled (require_tls)");
            None
        } else {
            let listener = TcpListener::bind(listen.addr).await?;
            info!(addr = %listen.addr, "Client listener started");
            Some(listener)
        };

        let tls = match (listen.tls_port, tls_config) {
            (Some(port), Some(config)) => {
                let acceptor = tls::build_acceptor(&config)?;
                let addr = SocketAddr::new(listen.addr.ip(), port);
                let listener = TcpListener::bind(addr).await?;
                info!(addr = %addr, "TLS client listener started");
                Some((listener, acceptor))
            }
            _ => None,
        };

        if plaintext.is_none() && tls.is_none() {
            anyhow::bail!("no client listeners configured");
        }

        Ok(Self {
            plaintext,
            tls,
            network,
            registry,
        })
    }

    /// Run the accept loops until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut tasks = Vec::new();

        if let Some(listener) = self.plaintext {
            let network = self.network.clone();
            let registry = self.registry.clone();
            tasks.push(tokio::spawn(async move {
                accept_plaintext(listener, network, registry).await;
            }));
        }

        if let Some((listener, acceptor)) = self.tls {
            let network = self.network.clone();
            let registry = self.registry.clone();
            tasks.push(tokio::spawn(async move {
                accept_tls(listener, acceptor, network, registry).await;
            }));
        }

        let mut shutdown_rx = self.network.shutdown.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("Gateway shutting down");
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

async fn accept_plaintext(listener: TcpListener, network: Arc<Network>, registry: Arc<Registry>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        if !conn::admission_check(&network, &addr) {
            continue;
        }
        let _ = stream.set_nodelay(true);
        let network = network.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            conn::run(network, registry, stream, addr, false, None).await;
        });
    }
}

async fn accept_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    network: Arc<Network>,
    registry: Arc<Registry>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "TLS accept failed");
                continue;
            }
        };
        if !conn::admission_check(&network, &addr) {
            continue;
        }
        let _ = stream.set_nodelay(true);
        let acceptor = acceptor.clone();
        let network = network.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(tls_stream) => tls_stream,
                Err(e) => {
                    warn!(addr = %addr, error = %e, "TLS handshake failed");
                    return;
                }
            };
            let certfp = tls_stream
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|certs| certs.first())
                .map(tls::certificate_fingerprint);

            conn::run(network, registry, tls_stream, addr, true, certfp).await;
        });
    }
}
