//! Per-connection tasks.
//!
//! Each accepted socket gets one read task (this function) and one write
//! task draining the connection's outbound queue. Frame handling for a
//! connection is serialized here; shared state is reached through the
//! `Network` with its own locking.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use corvus_proto::{Frame, IrcCodec, Message};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::error::HandlerError;
use crate::handlers::{Context, Registry};
use crate::security::flood::TokenBucket;
use crate::state::{Handshake, Network};

/// Drive one client connection from accept to teardown.
pub async fn run<S>(
    network: Arc<Network>,
    registry: Arc<Registry>,
    stream: S,
    addr: SocketAddr,
    is_tls: bool,
    certfp: Option<String>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let uid = network.users.uid_gen.next();
    network.stats.connection_opened();
    info!(uid = %uid, addr = %addr, tls = is_tls, "Client connected");

    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, IrcCodec::new());
    let mut writer = FramedWrite::new(write_half, IrcCodec::new());

    let (tx, mut rx) = mpsc::channel::<Message>(network.limits.max_send_queue);

    // Write task: the only place this socket is written.
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if writer.send(msg).await.is_err() {
                break;
            }
        }
        let _ = writer.flush().await;
    });

    let mut handshake = Handshake::new(is_tls, certfp, addr.ip());
    let mut shutdown_rx = network.shutdown.subscribe();

    let mut command_bucket = TokenBucket::new(
        network.security.commands_per_second,
        network.security.commands_per_second * 2.0,
    );
    let mut message_bucket = TokenBucket::new(
        network.security.messages_per_second,
        network.security.messages_per_second * 2.0,
    );

    let registration_deadline =
        Instant::now() + Duration::from_secs(network.timeouts.registration);
    let ping_interval = Duration::from_secs(network.timeouts.ping_interval);
    let ping_timeout = Duration::from_secs(network.timeouts.ping_timeout);
    let mut last_frame = Instant::now();
    let mut last_ping = Instant::now();
    // Tick well under every deadline so each is enforced promptly.
    let mut keepalive = tokio::time::interval(Duration::from_secs(5));
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut quit_reason: String = "Connection closed".to_string();
    let mut broadcast_quit = true;

    loop {
        tokio::select! {
            frame = reader.next() => {
                match frame {
                    Some(Ok(Frame::Message(msg))) => {
                        last_frame = Instant::now();

                        if network.security.enable_flood_protection {
                            let flooding = !command_bucket.check()
                                || (matches!(msg.command.as_str(), "PRIVMSG" | "NOTICE" | "TAGMSG")
                                    && !message_bucket.check());
                            if flooding {
                                let _ = tx.send(Message::error("Closing Link: Excess Flood")).await;
                                quit_reason = "Excess Flood".to_string();
                                break;
                            }
                        }

                        // SANICK and services can rename us out from under
                        // the handshake mirror; resync before dispatch.
                        if handshake.is_registered() {
                            if let Some(user) = network.users.get(&uid) {
                                let current = user.read().await.nick.clone();
                                if handshake.nick.as_deref() != Some(current.as_str()) {
                                    handshake.nick = Some(current);
                                }
                            } else {
                                // KILLed while frames were in flight.
                                broadcast_quit = false;
                                break;
                            }
                        }

                        let mut ctx = Context {
                            uid: &uid,
                            network: &network,
                            sender: &tx,
                            handshake: &mut handshake,
                        };
                        match registry.dispatch(&mut ctx, &msg).await {
                            Ok(()) => {}
                            Err(HandlerError::Quit(reason)) => {
                                quit_reason = reason.unwrap_or_else(|| "Client Quit".to_string());
                                let _ = tx
                                    .send(Message::error(format!("Closing Link: {}", quit_reason)))
                                    .await;
                                break;
                            }
                            Err(e) if e.is_fatal() => {
                                quit_reason = e.to_string();
                                broadcast_quit = false;
                                break;
                            }
                            Err(e) => {
                                if let Some(reply) = e.to_irc_reply(
                                    &network.info.name,
                                    handshake.nick_or_star(),
                                    &msg.command,
                                ) {
                                    let _ = tx.send(reply).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Frame::Invalid { line, error })) => {
                        debug!(uid = %uid, line = %line, error = %error, "Invalid frame");
                        if reader.decoder().consecutive_bad_frames()
                            > network.security.max_bad_frames
                        {
                            let _ = tx
                                .send(Message::error("Closing Link: Too many malformed frames"))
                                .await;
                            quit_reason = "Malformed frames".to_string();
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(uid = %uid, error = %e, "Read error");
                        quit_reason = "Read error".to_string();
                        break;
                    }
                    None => {
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if !handshake.is_registered() {
                    // Registration grace window.
                    if Instant::now() > registration_deadline {
                        let _ = tx
                            .send(Message::error("Closing Link: Registration timeout"))
                            .await;
                        quit_reason = "Registration timeout".to_string();
                        break;
                    }
                    continue;
                }
                if last_frame.elapsed() > ping_timeout {
                    let _ = tx.send(Message::error("Closing Link: Ping timeout")).await;
                    quit_reason = "Ping timeout".to_string();
                    break;
                }
                if last_frame.elapsed() >= ping_interval && last_ping.elapsed() >= ping_interval {
                    let _ = tx
                        .send(Message::ping(network.info.name.clone()))
                        .await;
                    last_ping = Instant::now();
                }
            }
            _ = shutdown_rx.recv() => {
                let _ = tx.send(Message::error("Closing Link: Server shutting down")).await;
                quit_reason = "Server shutting down".to_string();
                break;
            }
        }
    }

    // Give the writer a moment to flush the farewell, then drop the queue.
    tokio::time::sleep(Duration::from_millis(50)).await;

    if handshake.is_registered() && network.users.get(&uid).is_some() {
        if broadcast_quit {
            network.disconnect_user(&uid, &quit_reason).await;
        } else {
            network.disconnect_user(&uid, "Connection closed").await;
        }
    } else {
        network.stats.connection_abandoned();
        if let Some(nick) = &handshake.nick {
            network.users.release_nick(nick, &uid);
        }
        network.broker.unregister(&uid);
    }

    drop(tx);
    let _ = writer_task.await;
    info!(uid = %uid, reason = %quit_reason, "Client disconnected");
}

/// Guard the listener against over-limit and throttled sources before a
/// task is even spawned. Returns false when the connection was refused.
pub fn admission_check(network: &Arc<Network>, addr: &SocketAddr) -> bool {
    if network.security.enable_flood_protection && !network.throttle.allow(addr.ip()) {
        warn!(addr = %addr, "Connection throttled");
        return false;
    }
    let snap = network.stats.snapshot();
    if snap.local_users + snap.unregistered >= network.limits.max_connections {
        warn!(addr = %addr, "Connection limit reached");
        return false;
    }
    true
}
