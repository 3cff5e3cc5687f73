//! End-to-end fetches against a scripted session server on loopback.

use std::time::Duration;

use jamfarm_client::{CachedFetcher, ClientOptions, StatusCache, StatusClient, StatusFetcher};
use jamfarm_core::{ServerAddress, StatusErrorKind, StatusSnapshot, UserEntry};
use jamfarm_protocol::auth::{CLIENT_CAPABILITIES, CLIENT_VERSION};
use jamfarm_protocol::{Credential, Message, MessageType, encode_message, read_message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const CHALLENGE: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

/// What the mock server does after sending its first message.
#[derive(Clone)]
enum Script {
    /// Read the login, send these frames, then close.
    AfterLogin(Vec<Message>),
    /// Send these frames instead of a challenge, then close.
    Raw(Vec<u8>),
}

fn challenge() -> Message {
    let mut body = CHALLENGE.to_vec();
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&0x0002_0000u32.to_le_bytes());
    body.extend_from_slice(b"Play nice.\0");
    Message::new(MessageType::AuthChallenge, body)
}

fn config(bpm: u16, bpi: u16) -> Message {
    let mut body = bpm.to_le_bytes().to_vec();
    body.extend_from_slice(&bpi.to_le_bytes());
    Message::new(MessageType::ConfigChangeNotify, body)
}

fn userinfo(records: &[(&str, &str)]) -> Message {
    let mut body = Vec::new();
    for (user, channel) in records {
        body.extend_from_slice(&[1, 0, 0, 0, 0, 0]);
        body.extend_from_slice(user.as_bytes());
        body.push(0);
        body.extend_from_slice(channel.as_bytes());
        body.push(0);
    }
    Message::new(MessageType::UserInfoChangeNotify, body)
}

fn topic(text: &str) -> Message {
    Message::new(MessageType::ChatMessage, format!("TOPIC\0-\0{}", text).into_bytes())
}

async fn write_frame(socket: &mut TcpStream, message: &Message) {
    socket
        .write_all(&encode_message(message).unwrap())
        .await
        .unwrap();
}

/// Serves `script` to every connection; returns the logins received.
async fn spawn_server(script: Script) -> (ServerAddress, JoinHandle<Vec<Message>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let mut logins = Vec::new();
        while let Ok(Ok((mut socket, _))) =
            tokio::time::timeout(Duration::from_millis(500), listener.accept()).await
        {
            match &script {
                Script::AfterLogin(frames) => {
                    write_frame(&mut socket, &challenge()).await;
                    if let Ok(Some(login)) = read_message(&mut socket, None).await {
                        logins.push(login);
                    }
                    for frame in frames {
                        write_frame(&mut socket, frame).await;
                    }
                }
                Script::Raw(bytes) => socket.write_all(bytes).await.unwrap(),
            }
            let _ = socket.shutdown().await;
            // Drain until the client closes its side.
            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
        }
        logins
    });

    (ServerAddress::new("127.0.0.1", port), handle)
}

fn client() -> StatusClient {
    StatusClient::new(ClientOptions::default().with_connect_timeout(Duration::from_secs(2)))
}

#[tokio::test]
async fn full_session_yields_snapshot() {
    let (addr, server) = spawn_server(Script::AfterLogin(vec![
        config(120, 16),
        userinfo(&[("alice", "guitar L"), ("alice", "guitar R")]),
        topic("Welcome"),
    ]))
    .await;

    let snapshot = client()
        .fetch_status(&addr, &Credential::new("status", "status"))
        .await
        .unwrap();

    let expected = StatusSnapshot::new()
        .with_topic("Welcome")
        .with_tempo(120, 16)
        .with_user(
            UserEntry::new("alice")
                .with_channel("guitar L")
                .with_channel("guitar R"),
        );
    assert_eq!(snapshot, expected);

    let logins = server.await.unwrap();
    assert_eq!(logins.len(), 1);
    let body = logins[0].body();
    assert_eq!(logins[0].message_type(), MessageType::AuthUser);
    assert_eq!(
        &body[..20],
        &[
            0x18, 0x3f, 0x3b, 0x25, 0xb5, 0xaf, 0xa7, 0xcd, 0xc3, 0x2e, 0x72, 0x08, 0x81, 0xcf,
            0x4d, 0x4b, 0x96, 0x00, 0x97, 0xc5
        ]
    );
    assert_eq!(&body[20..27], b"status\0");
    assert_eq!(&body[27..31], &CLIENT_CAPABILITIES.to_le_bytes());
    assert_eq!(&body[31..35], &CLIENT_VERSION.to_le_bytes());
}

#[tokio::test]
async fn server_closing_early_leaves_fields_absent() {
    let (addr, server) = spawn_server(Script::AfterLogin(vec![])).await;

    let snapshot = client()
        .fetch_status(&addr, &Credential::new("status", "status"))
        .await
        .unwrap();

    assert_eq!(snapshot, StatusSnapshot::new());
    server.await.unwrap();
}

#[tokio::test]
async fn rejection_discards_partial_status() {
    let (addr, server) = spawn_server(Script::AfterLogin(vec![
        Message::new(MessageType::AuthReply, b"\0bad password\0".to_vec()),
        config(120, 16),
    ]))
    .await;

    let err = client()
        .fetch_status(&addr, &Credential::new("status", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, StatusErrorKind::AuthRejected);
    assert_eq!(err.detail, "bad password");
    server.await.unwrap();
}

#[tokio::test]
async fn short_challenge_is_invalid() {
    let bad = encode_message(&Message::new(MessageType::AuthChallenge, vec![0u8; 12])).unwrap();
    let (addr, server) = spawn_server(Script::Raw(bad)).await;

    let err = client()
        .fetch_status(&addr, &Credential::new("status", "status"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, StatusErrorKind::AuthChallengeInvalid);
    server.await.unwrap();
}

#[tokio::test]
async fn anonymous_login_is_prefixed() {
    let (addr, server) = spawn_server(Script::AfterLogin(vec![config(95, 8)])).await;

    let snapshot = client()
        .fetch_status(&addr, &Credential::anonymous("guest"))
        .await
        .unwrap();
    assert_eq!(snapshot.beats_per_minute, Some(95));

    let logins = server.await.unwrap();
    let body = logins[0].body();
    assert_eq!(&body[20..36], b"anonymous:guest\0");
}

#[tokio::test]
async fn cached_fetcher_avoids_second_connection() {
    let (addr, server) = spawn_server(Script::AfterLogin(vec![topic("cached")])).await;

    let fetcher = CachedFetcher::new(client(), StatusCache::new(Duration::from_secs(60)));
    let cred = Credential::new("status", "status");

    let first = fetcher.fetch(&addr, &cred).await.unwrap();
    let second = fetcher.fetch(&addr, &cred).await.unwrap();
    assert_eq!(first, second);

    let logins = server.await.unwrap();
    assert_eq!(logins.len(), 1);
}
