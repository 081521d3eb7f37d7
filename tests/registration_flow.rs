//! Registration and capability negotiation flows.

mod common;

use common::{TestClient, TestServer};

#[tokio::test]
async fn plain_registration_emits_welcome_burst() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = TestClient::connect(&server.address()).await?;

    client.send("NICK alice").await?;
    client.send("USER alice 0 * :Alice").await?;

    let welcome = client.wait_for_numeric("001").await?;
    assert!(welcome.contains("Welcome to TestNet"));
    assert!(welcome.contains("alice"));

    client.wait_for_numeric("002").await?;
    client.wait_for_numeric("003").await?;
    client.wait_for_numeric("004").await?;
    client.wait_for_numeric("005").await?;
    // LUSERS then MOTD.
    client.wait_for_numeric("251").await?;
    client.wait_for_numeric("375").await?;
    let motd = client.wait_for_numeric("372").await?;
    assert!(motd.contains("Test Server"));
    client.wait_for_numeric("376").await?;
    Ok(())
}

#[tokio::test]
async fn cap_negotiation_gates_registration() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = TestClient::connect(&server.address()).await?;

    client.send("CAP LS 302").await?;
    let ls = client
        .wait_for("CAP LS", |line| line.contains("CAP") && line.contains("LS"))
        .await?;
    assert!(ls.contains("server-time"));
    assert!(ls.contains("sasl=PLAIN,EXTERNAL"));

    client.send("NICK bob").await?;
    client.send("USER bob 0 * :Bob").await?;

    client.send("CAP REQ :server-time sasl").await?;
    let ack = client
        .wait_for("CAP ACK", |line| line.contains("ACK"))
        .await?;
    assert!(ack.contains("server-time"));
    assert!(ack.contains("sasl"));

    // Unknown capability NAKs the whole request.
    client.send("CAP REQ :server-time bogus-cap").await?;
    client.wait_for("CAP NAK", |line| line.contains("NAK")).await?;

    // Welcome only arrives after END.
    client.send("CAP END").await?;
    client.wait_for_numeric("001").await?;
    Ok(())
}

#[tokio::test]
async fn nickname_collision_rejected() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut first = TestClient::connect(&server.address()).await?;
    first.register("carol").await?;

    let mut second = TestClient::connect(&server.address()).await?;
    second.send("NICK carol").await?;
    let err = second.wait_for_numeric("433").await?;
    assert!(err.contains("carol"));

    // A different nick succeeds.
    second.send("NICK carola").await?;
    second.send("USER carola 0 * :Carola").await?;
    second.wait_for_numeric("001").await?;
    Ok(())
}

#[tokio::test]
async fn commands_require_registration() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = TestClient::connect(&server.address()).await?;

    client.send("JOIN #test").await?;
    client.wait_for_numeric("451").await?;

    client.send("WHOIS someone").await?;
    client.wait_for_numeric("451").await?;
    Ok(())
}

#[tokio::test]
async fn erroneous_nickname_rejected() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = TestClient::connect(&server.address()).await?;

    client.send("NICK 1badnick").await?;
    client.wait_for_numeric("432").await?;
    Ok(())
}

#[tokio::test]
async fn unknown_command_gets_421() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = TestClient::connect(&server.address()).await?;
    client.register("dave").await?;

    client.send("FROBNICATE now").await?;
    let err = client.wait_for_numeric("421").await?;
    assert!(err.contains("FROBNICATE"));
    Ok(())
}
