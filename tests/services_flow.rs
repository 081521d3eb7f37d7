//! Services flows: NickServ and MemoServ end to end.

mod common;

use common::{TestClient, TestServer};

#[tokio::test]
async fn nickserv_register_and_identify() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;

    alice.send("PRIVMSG NickServ :REGISTER sekrit5").await?;
    alice
        .wait_for("registered", |l| {
            l.starts_with(":NickServ") && l.contains("registered")
        })
        .await?;

    // Wrong password refused, right one accepted.
    alice.send("PRIVMSG NickServ :IDENTIFY wrongpass").await?;
    alice
        .wait_for("bad password", |l| l.contains("Invalid password"))
        .await?;
    alice.send("PRIVMSG NickServ :IDENTIFY sekrit5").await?;
    alice
        .wait_for("identified", |l| l.contains("now identified"))
        .await?;
    Ok(())
}

#[tokio::test]
async fn memoserv_round_trip() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    // Both parties need registered accounts.
    let mut bob = TestClient::connect(&server.address()).await?;
    bob.register("bob").await?;
    bob.send("PRIVMSG NickServ :REGISTER bobpass").await?;
    bob.wait_for("bob registered", |l| l.contains("registered"))
        .await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("PRIVMSG NickServ :REGISTER alicepass").await?;
    alice
        .wait_for("alice registered", |l| l.contains("registered"))
        .await?;

    alice.send("PRIVMSG MemoServ :SEND bob Hello").await?;
    alice
        .wait_for("memo sent", |l| l.contains("Memo sent to bob"))
        .await?;

    // Bob lists, reads, and the NEW flag clears.
    bob.send("PRIVMSG MemoServ :LIST").await?;
    let listing = bob
        .wait_for("memo list", |l| l.contains("from alice"))
        .await?;
    assert!(listing.contains("[NEW]"));

    bob.send("PRIVMSG MemoServ :READ 1").await?;
    bob.wait_for("memo body", |l| l.ends_with(":  Hello")).await?;

    bob.send("PRIVMSG MemoServ :LIST").await?;
    let listing = bob
        .wait_for("memo list again", |l| l.contains("from alice"))
        .await?;
    assert!(!listing.contains("[NEW]"));
    Ok(())
}

#[tokio::test]
async fn memoserv_requires_registered_recipient() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("PRIVMSG NickServ :REGISTER alicepass").await?;
    alice
        .wait_for("alice registered", |l| l.contains("registered"))
        .await?;

    alice.send("PRIVMSG MemoServ :SEND ghost Hello").await?;
    alice
        .wait_for("not registered", |l| l.contains("not registered"))
        .await?;
    Ok(())
}

#[tokio::test]
async fn operserv_refuses_non_operators() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("PRIVMSG OperServ :STATS").await?;
    alice
        .wait_for("denied", |l| l.contains("Access denied"))
        .await?;
    Ok(())
}
