//! End-to-end relay tests over real WebSocket connections.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use confab_protocol::{ClientFrame, ServerFrame};

use common::spawn_server;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr) -> WsStream {
    let (socket, _response) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
}

async fn send(socket: &mut WsStream, frame: &ClientFrame) {
    let json = serde_json::to_string(frame).unwrap();
    socket.send(Message::Text(json.into())).await.unwrap();
}

async fn recv_text(socket: &mut WsStream) -> String {
    loop {
        let message = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        match message {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

async fn recv(socket: &mut WsStream) -> ServerFrame {
    serde_json::from_str(&recv_text(socket).await).unwrap()
}

async fn recv_raw(socket: &mut WsStream) -> serde_json::Value {
    serde_json::from_str(&recv_text(socket).await).unwrap()
}

/// Asserts that no frame arrives within a short window.
async fn assert_silent(socket: &mut WsStream) {
    let result = timeout(Duration::from_millis(200), socket.next()).await;
    assert!(result.is_err(), "expected silence, got {result:?}");
}

/// Join a conversation and consume the acknowledgement.
async fn join(socket: &mut WsStream, conversation_id: &str) {
    send(
        socket,
        &ClientFrame::Join {
            conversation_id: conversation_id.to_string(),
        },
    )
    .await;

    match recv(socket).await {
        ServerFrame::JoinAck { data } => {
            assert_eq!(data.conversation_id, conversation_id);
            assert_eq!(data.status, "joined");
        }
        other => panic!("expected join_ack, got {other:?}"),
    }
}

fn message_frame(content: &str, conversation_id: &str) -> ClientFrame {
    ClientFrame::Message {
        content: content.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: "user-alice".to_string(),
        sender_name: "Alice".to_string(),
        is_owner: false,
    }
}

/// Polls until `cond` holds; panics after two seconds.
async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_join_is_acknowledged_point_to_point() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    let mut bob = connect(server.addr).await;

    join(&mut alice, "conv-1").await;

    // The ack goes to the joining connection only.
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_rejoining_delivers_messages_once() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    let mut bob = connect(server.addr).await;

    join(&mut alice, "conv-1").await;
    join(&mut bob, "conv-1").await;
    // Joining the same room again is acked but does not add a second
    // membership.
    join(&mut bob, "conv-1").await;
    assert_eq!(server.state.rooms.members_of("conv-1").len(), 2);

    send(&mut alice, &message_frame("once only", "conv-1")).await;
    match recv(&mut bob).await {
        ServerFrame::NewMessage { content, .. } => assert_eq!(content, "once only"),
        other => panic!("expected new_message, got {other:?}"),
    }
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_message_reaches_all_room_members() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    let mut bob = connect(server.addr).await;

    join(&mut alice, "conv-1").await;
    join(&mut bob, "conv-1").await;

    send(
        &mut alice,
        &ClientFrame::Message {
            content: "hello everyone".to_string(),
            conversation_id: "conv-1".to_string(),
            sender_id: "user-alice".to_string(),
            sender_name: "Alice".to_string(),
            is_owner: true,
        },
    )
    .await;

    // Every member receives the frame, the sender included.
    for socket in [&mut alice, &mut bob] {
        match recv(socket).await {
            ServerFrame::NewMessage {
                content,
                conversation_id,
                sender_id,
                sender_name,
                is_owner,
                data,
            } => {
                assert_eq!(content, "hello everyone");
                assert_eq!(conversation_id, "conv-1");
                assert_eq!(sender_id, "user-alice");
                assert_eq!(sender_name, "Alice");
                assert!(is_owner);
                assert!(data.id.is_some());
                assert_eq!(data.sender.id, "user-alice");
                assert_eq!(data.sender.name, "Alice");
            }
            other => panic!("expected new_message, got {other:?}"),
        }
    }
}

/// The JSON on the wire, not just the Rust types, is the contract: tags are
/// snake_case, fields camelCase, and the ack carries its envelope verbatim.
#[tokio::test]
async fn test_raw_json_wire_shapes() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    let mut bob = connect(server.addr).await;

    alice
        .send(Message::Text(
            r#"{"type":"join","conversationId":"conv-1"}"#.into(),
        ))
        .await
        .unwrap();
    let ack = recv_raw(&mut alice).await;
    assert_eq!(
        ack,
        serde_json::json!({
            "type": "join_ack",
            "data": {"conversationId": "conv-1", "status": "joined"}
        })
    );

    join(&mut bob, "conv-1").await;

    alice
        .send(Message::Text(
            r#"{"type":"message","content":"hi","conversationId":"conv-1","senderId":"user-alice","senderName":"Alice","isOwner":true}"#.into(),
        ))
        .await
        .unwrap();

    for socket in [&mut alice, &mut bob] {
        let frame = recv_raw(socket).await;
        assert_eq!(frame["type"], "new_message");
        assert_eq!(frame["content"], "hi");
        assert_eq!(frame["conversationId"], "conv-1");
        assert_eq!(frame["senderId"], "user-alice");
        assert_eq!(frame["senderName"], "Alice");
        assert_eq!(frame["isOwner"], true);
        assert!(frame["data"]["id"].is_string());
        assert!(frame["data"]["createdAt"].is_string());
        assert_eq!(frame["data"]["sender"]["id"], "user-alice");
        assert_eq!(frame["data"]["sender"]["name"], "Alice");
    }
}

#[tokio::test]
async fn test_message_is_persisted() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    join(&mut alice, "conv-1").await;

    send(&mut alice, &message_frame("write me down", "conv-1")).await;
    let frame = recv(&mut alice).await;
    let ServerFrame::NewMessage { data, .. } = frame else {
        panic!("expected new_message, got {frame:?}");
    };

    let stored = server.store.find_by_conversation("conv-1").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "write me down");
    assert_eq!(data.id.as_deref(), Some(stored[0].id.as_str()));
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    let mut bob = connect(server.addr).await;

    join(&mut alice, "conv-1").await;
    join(&mut bob, "conv-2").await;

    send(&mut alice, &message_frame("only for conv-1", "conv-1")).await;

    match recv(&mut alice).await {
        ServerFrame::NewMessage { content, .. } => assert_eq!(content, "only for conv-1"),
        other => panic!("expected new_message, got {other:?}"),
    }
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_leave_stops_delivery() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    let mut bob = connect(server.addr).await;

    join(&mut alice, "conv-1").await;
    join(&mut bob, "conv-1").await;

    send(
        &mut bob,
        &ClientFrame::Leave {
            conversation_id: "conv-1".to_string(),
        },
    )
    .await;

    // Bob's next frame is processed after his leave: sending into a room
    // does not require membership, so Alice still receives this while Bob
    // no longer gets his own message echoed back.
    send(
        &mut bob,
        &ClientFrame::Message {
            content: "parting words".to_string(),
            conversation_id: "conv-1".to_string(),
            sender_id: "user-bob".to_string(),
            sender_name: "Bert".to_string(),
            is_owner: false,
        },
    )
    .await;

    match recv(&mut alice).await {
        ServerFrame::NewMessage {
            content,
            sender_name,
            ..
        } => {
            assert_eq!(content, "parting words");
            assert_eq!(sender_name, "Bert");
        }
        other => panic!("expected new_message, got {other:?}"),
    }
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_disconnect_purges_membership() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    let mut bob = connect(server.addr).await;

    join(&mut alice, "conv-1").await;
    join(&mut bob, "conv-1").await;
    assert_eq!(server.state.registry.count(), 2);
    assert_eq!(server.state.rooms.members_of("conv-1").len(), 2);

    // Bob's transport dies without a leave or a close handshake.
    drop(bob);
    wait_for(|| server.state.registry.count() == 1).await;
    assert_eq!(server.state.rooms.members_of("conv-1").len(), 1);

    // The room still delivers to the remaining member.
    send(&mut alice, &message_frame("anyone there?", "conv-1")).await;
    match recv(&mut alice).await {
        ServerFrame::NewMessage { content, .. } => assert_eq!(content, "anyone there?"),
        other => panic!("expected new_message, got {other:?}"),
    }

    // Once the last member goes, the room itself is erased.
    alice.close(None).await.unwrap();
    wait_for(|| server.state.registry.count() == 0).await;
    assert_eq!(server.state.rooms.room_count(), 0);
}

#[tokio::test]
async fn test_malformed_frames_do_not_kill_the_connection() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;

    alice
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();
    alice
        .send(Message::Text(
            r#"{"type":"subscribe","conversationId":"conv-1"}"#.into(),
        ))
        .await
        .unwrap();
    // Server-to-client tags are not valid input either.
    alice
        .send(Message::Text(
            r#"{"type":"join_ack","data":{"conversationId":"conv-1","status":"joined"}}"#.into(),
        ))
        .await
        .unwrap();
    alice
        .send(Message::Text(r#"{"type":"new_message","content":"x"}"#.into()))
        .await
        .unwrap();
    alice
        .send(Message::Text(r#"{"type":null}"#.into()))
        .await
        .unwrap();
    alice.send(Message::Text("42".into())).await.unwrap();
    // Valid shape, blank room id: dropped silently.
    send(
        &mut alice,
        &ClientFrame::Join {
            conversation_id: String::new(),
        },
    )
    .await;
    alice
        .send(Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .unwrap();

    // The connection is still usable afterwards.
    join(&mut alice, "conv-1").await;
    assert_eq!(server.state.rooms.members_of("conv-1").len(), 1);
}

#[tokio::test]
async fn test_messages_arrive_in_submission_order() {
    let server = spawn_server().await;
    let mut alice = connect(server.addr).await;
    let mut bob = connect(server.addr).await;

    join(&mut alice, "conv-1").await;
    join(&mut bob, "conv-1").await;

    for content in ["one", "two", "three"] {
        send(&mut alice, &message_frame(content, "conv-1")).await;
    }

    for socket in [&mut alice, &mut bob] {
        for expected in ["one", "two", "three"] {
            match recv(socket).await {
                ServerFrame::NewMessage { content, .. } => assert_eq!(content, expected),
                other => panic!("expected new_message, got {other:?}"),
            }
        }
    }
}
