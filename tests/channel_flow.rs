//! Channel join, mode, and messaging flows.

mod common;

use common::{TestClient, TestServer};

#[tokio::test]
async fn join_broadcasts_and_names() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("JOIN #rust").await?;
    alice
        .wait_for("own JOIN", |l| l.starts_with(":alice") && l.contains("JOIN"))
        .await?;
    // Creator gets ops: NAMES shows @alice.
    let names = alice.wait_for_numeric("353").await?;
    assert!(names.contains("@alice"));
    alice.wait_for_numeric("366").await?;

    let mut bob = TestClient::connect(&server.address()).await?;
    bob.register("bob").await?;
    bob.send("JOIN #rust").await?;
    bob.wait_for_numeric("366").await?;

    // Alice sees bob arrive.
    alice
        .wait_for("bob's JOIN", |l| l.starts_with(":bob") && l.contains("JOIN"))
        .await?;
    Ok(())
}

#[tokio::test]
async fn privmsg_reaches_members_not_sender() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("JOIN #chat").await?;
    alice.wait_for_numeric("366").await?;

    let mut bob = TestClient::connect(&server.address()).await?;
    bob.register("bob").await?;
    bob.send("JOIN #chat").await?;
    bob.wait_for_numeric("366").await?;
    alice
        .wait_for("bob join", |l| l.starts_with(":bob") && l.contains("JOIN"))
        .await?;

    alice.send("PRIVMSG #chat :hello there").await?;
    let msg = bob
        .wait_for("privmsg", |l| l.contains("PRIVMSG #chat"))
        .await?;
    assert!(msg.starts_with(":alice"));
    assert!(msg.ends_with(":hello there"));
    Ok(())
}

#[tokio::test]
async fn channel_key_enforced() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("JOIN #ops").await?;
    alice.wait_for_numeric("366").await?;
    alice.send("MODE #ops +k hunter2").await?;
    alice
        .wait_for("key mode", |l| l.contains("MODE #ops +k"))
        .await?;

    let mut bob = TestClient::connect(&server.address()).await?;
    bob.register("bob").await?;

    bob.send("JOIN #ops").await?;
    bob.wait_for_numeric("475").await?;
    bob.send("JOIN #ops wrong").await?;
    bob.wait_for_numeric("475").await?;
    bob.send("JOIN #ops hunter2").await?;
    bob.wait_for_numeric("366").await?;
    Ok(())
}

#[tokio::test]
async fn moderated_channel_needs_voice() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut op = TestClient::connect(&server.address()).await?;
    op.register("oprah").await?;
    op.send("JOIN #room").await?;
    op.wait_for_numeric("366").await?;
    op.send("MODE #room +m").await?;
    op.wait_for("moderated", |l| l.contains("MODE #room +m")).await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("JOIN #room").await?;
    alice.wait_for_numeric("366").await?;

    alice.send("PRIVMSG #room :hi").await?;
    alice.wait_for_numeric("404").await?;

    op.send("MODE #room +v alice").await?;
    alice
        .wait_for("voice", |l| l.contains("+v") && l.contains("alice"))
        .await?;

    alice.send("PRIVMSG #room :hi again").await?;
    let msg = op
        .wait_for("voiced privmsg", |l| l.contains("PRIVMSG #room"))
        .await?;
    assert!(msg.ends_with(":hi again"));
    Ok(())
}

#[tokio::test]
async fn ban_blocks_join_until_exception() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut op = TestClient::connect(&server.address()).await?;
    op.register("oprah").await?;
    op.send("JOIN #guarded").await?;
    op.wait_for_numeric("366").await?;
    op.send("MODE #guarded +b eve!*@*").await?;
    op.wait_for("ban set", |l| l.contains("+b")).await?;

    let mut eve = TestClient::connect(&server.address()).await?;
    eve.register("eve").await?;
    eve.send("JOIN #guarded").await?;
    eve.wait_for_numeric("474").await?;

    // A matching exception lets the ban target in.
    op.send("MODE #guarded +e eve!*@*").await?;
    op.wait_for("exception set", |l| l.contains("+e")).await?;
    eve.send("JOIN #guarded").await?;
    eve.wait_for_numeric("366").await?;
    Ok(())
}

#[tokio::test]
async fn topic_round_trip() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("JOIN #docs").await?;
    alice.wait_for_numeric("366").await?;

    alice.send("TOPIC #docs :read the manual").await?;
    alice
        .wait_for("topic set", |l| l.contains("TOPIC #docs"))
        .await?;

    // A later joiner sees 332/333.
    let mut bob = TestClient::connect(&server.address()).await?;
    bob.register("bob").await?;
    bob.send("JOIN #docs").await?;
    let topic = bob.wait_for_numeric("332").await?;
    assert!(topic.ends_with(":read the manual"));
    bob.wait_for_numeric("333").await?;
    Ok(())
}

#[tokio::test]
async fn part_then_empty_channel_disappears() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;

    let mut alice = TestClient::connect(&server.address()).await?;
    alice.register("alice").await?;
    alice.send("JOIN #brief").await?;
    alice.wait_for_numeric("366").await?;
    alice.send("PART #brief :bye").await?;
    alice
        .wait_for("part echo", |l| l.contains("PART #brief"))
        .await?;

    // LIST no longer shows it.
    alice.send("LIST").await?;
    let mut saw_channel = false;
    loop {
        let line = alice.next_line().await?;
        if line.contains(" 323 ") {
            break;
        }
        if line.contains("#brief") {
            saw_channel = true;
        }
    }
    assert!(!saw_channel, "#brief should have been destroyed");
    Ok(())
}
