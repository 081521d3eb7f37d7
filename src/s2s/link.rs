//! Link sessions: outbound connects, the inbound listener, handshake,
//! and the per-link run loop.

use std::sync::Arc;

use corvus_proto::{Frame, IrcCodec, Message, Prefix};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{error, info, warn};

use crate::config::LinkBlock;
use crate::error::LinkError;
use crate::s2s::{burst, handlers};
use crate::state::Network;

/// What the peer told us during the handshake.
struct PeerIdentity {
    sid: String,
    name: String,
    description: String,
    password: String,
}

/// Start an outbound link attempt in the background.
pub fn connect_to_peer(network: Arc<Network>, block: LinkBlock) {
    tokio::spawn(async move {
        let address = format!("{}:{}", block.address, block.port);
        info!(server = %block.name, address = %address, "Connecting to peer");

        let stream = match TcpStream::connect(&address).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(server = %block.name, error = %e, "Outbound link failed");
                return;
            }
        };

        let mut framed = Framed::new(stream, IrcCodec::new());
        if let Err(e) = send_handshake(&network, &mut framed, &block.send_password).await {
            warn!(server = %block.name, error = %e, "Handshake send failed");
            return;
        }
        match read_handshake(&mut framed).await {
            Ok(peer) => {
                if let Err(e) = finalize_link(network, framed, peer, &block).await {
                    warn!(server = %block.name, error = %e, "Link terminated");
                }
            }
            Err(e) => warn!(server = %block.name, error = %e, "Handshake failed"),
        }
    });
}

/// Start the inbound S2S listener.
pub fn start_inbound_listener(network: Arc<Network>, addr: std::net::SocketAddr) {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(addr = %addr, error = %e, "Failed to bind S2S listener");
                return;
            }
        };
        info!(addr = %addr, "S2S listener started");

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "S2S accept failed");
                    continue;
                }
            };
            info!(peer = %peer_addr, "Inbound S2S connection");

            let network = network.clone();
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, IrcCodec::new());
                let peer = match read_handshake(&mut framed).await {
                    Ok(peer) => peer,
                    Err(e) => {
                        warn!(peer = %peer_addr, error = %e, "Inbound handshake failed");
                        return;
                    }
                };

                // The peer must match a configured link block.
                let Some(block) = network
                    .links
                    .link_blocks
                    .iter()
                    .find(|b| b.name.eq_ignore_ascii_case(&peer.name))
                    .cloned()
                else {
                    warn!(server = %peer.name, "No link block for inbound server");
                    let _ = framed
                        .send(Message::error("Closing Link: no link block"))
                        .await;
                    return;
                };
                if peer.password != block.recv_password {
                    warn!(server = %peer.name, "Bad link password");
                    let _ = framed
                        .send(Message::error("Closing Link: bad password"))
                        .await;
                    return;
                }

                if let Err(e) = send_handshake(&network, &mut framed, &block.send_password).await {
                    warn!(server = %peer.name, error = %e, "Handshake send failed");
                    return;
                }
                if let Err(e) = finalize_link(network, framed, peer, &block).await {
                    warn!(error = %e, "Link terminated");
                }
            });
        }
    });
}

/// Our half of the handshake: PASS, CAPAB, SERVER.
async fn send_handshake(
    network: &Arc<Network>,
    framed: &mut Framed<TcpStream, IrcCodec>,
    password: &str,
) -> Result<(), LinkError> {
    framed
        .send(Message::new(
            "PASS",
            vec![
                password.to_string(),
                "TS".to_string(),
                "6".to_string(),
                network.info.sid.clone(),
            ],
        ))
        .await?;
    framed
        .send(Message::new(
            "CAPAB",
            vec!["QS ENCAP TB EX IE".to_string()],
        ))
        .await?;
    let description = network.hot_config.read().description.clone();
    framed
        .send(Message::new(
            "SERVER",
            vec![network.info.name.clone(), "1".to_string(), description],
        ))
        .await?;
    Ok(())
}

/// Read the peer's PASS/CAPAB/SERVER trio.
async fn read_handshake(
    framed: &mut Framed<TcpStream, IrcCodec>,
) -> Result<PeerIdentity, LinkError> {
    let mut password = None;
    let mut sid = None;
    let mut name = None;
    let mut description = String::new();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(30);
    while name.is_none() {
        let frame = tokio::time::timeout_at(deadline, framed.next())
            .await
            .map_err(|_| LinkError::Handshake("handshake timeout".to_string()))?
            .ok_or(LinkError::Closed)??;

        let msg = match frame {
            Frame::Message(msg) => msg,
            Frame::Invalid { line, .. } => {
                return Err(LinkError::Protocol(format!("unparseable frame: {line:?}")));
            }
        };

        match msg.command.as_str() {
            // PASS <password> TS 6 :<sid>
            "PASS" => {
                password = Some(msg.arg_or_empty(0).to_string());
                sid = msg.arg(3).map(|s| s.to_string());
            }
            "CAPAB" => {}
            // SERVER <name> <hop> :<description>
            "SERVER" => {
                name = Some(msg.arg_or_empty(0).to_string());
                description = msg.arg_or_empty(2).to_string();
            }
            "ERROR" => {
                return Err(LinkError::Handshake(format!(
                    "peer refused: {}",
                    msg.arg_or_empty(0)
                )));
            }
            other => {
                return Err(LinkError::Protocol(format!(
                    "unexpected {} during handshake",
                    other
                )));
            }
        }
    }

    let sid = sid.ok_or_else(|| LinkError::Handshake("peer sent no SID".to_string()))?;
    if sid.len() != 3 {
        return Err(LinkError::Handshake(format!("bad SID {:?}", sid)));
    }
    Ok(PeerIdentity {
        sid,
        name: name.unwrap_or_default(),
        description,
        password: password.unwrap_or_default(),
    })
}

/// Register the peer, burst, and enter the run loop.
async fn finalize_link(
    network: Arc<Network>,
    framed: Framed<TcpStream, IrcCodec>,
    peer: PeerIdentity,
    block: &LinkBlock,
) -> Result<(), LinkError> {
    if let Some(jupe) = network.bans.is_juped(&peer.name) {
        let mut framed = framed;
        let _ = framed
            .send(Message::error(format!("Closing Link: juped ({})", jupe.reason)))
            .await;
        return Err(LinkError::Handshake(format!("{} is juped", peer.name)));
    }
    if network.links.is_linked(&peer.name) {
        let mut framed = framed;
        let _ = framed
            .send(Message::error("Closing Link: already linked"))
            .await;
        return Err(LinkError::Handshake(format!("{} already linked", peer.name)));
    }

    // For outbound links the peer must be who we dialed.
    if !peer.name.eq_ignore_ascii_case(&block.name) {
        return Err(LinkError::Handshake(format!(
            "expected {}, got {}",
            block.name, peer.name
        )));
    }

    let (tx, mut rx) = mpsc::channel::<Message>(512);
    network
        .links
        .register_peer(&peer.sid, &peer.name, &peer.description, tx.clone());
    network.stats.server_linked();
    info!(server = %peer.name, sid = %peer.sid, "Server linked");

    // Tell the rest of the network about the new server.
    let sid_intro = Message::new(
        "SID",
        vec![
            peer.name.clone(),
            "2".to_string(),
            peer.sid.clone(),
            peer.description.clone(),
        ],
    )
    .with_prefix(Prefix::ServerName(network.info.sid.clone()));
    network.links.broadcast(&sid_intro, Some(&peer.sid)).await;

    burst::send_burst(&network, &tx).await;

    let (mut sink, mut stream) = framed.split();
    let sid = peer.sid.clone();
    let reason: String;

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Frame::Message(msg))) => {
                        if let Err(e) = handlers::dispatch(&network, &sid, &msg).await {
                            reason = format!("Protocol error: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Frame::Invalid { line, .. })) => {
                        reason = format!("Unparseable frame: {:?}", line);
                        break;
                    }
                    Some(Err(e)) => {
                        reason = format!("Read error: {}", e);
                        break;
                    }
                    None => {
                        reason = "Connection closed".to_string();
                        break;
                    }
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => sink.send(msg).await?,
                    None => {
                        reason = "Link shut down".to_string();
                        break;
                    }
                }
            }
        }
    }

    warn!(server = %peer.name, reason = %reason, "Delinking");
    handlers::perform_squit(&network, &sid, &reason).await;
    let squit = Message::new("SQUIT", vec![sid.clone(), reason])
        .with_prefix(Prefix::ServerName(network.info.sid.clone()));
    network.links.broadcast(&squit, Some(&sid)).await;
    Ok(())
}
