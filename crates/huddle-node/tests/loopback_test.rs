//! Two nodes over real TCP on loopback.

use std::time::Duration;

use huddle_node::{Node, NodeCommand, NodeConfig, NodeEvent, NodeHandle, SystemEnv, TcpDirectory};
use huddle_proto::{PeerId, Role};
use tokio::{task::JoinHandle, time::timeout};

const STEP: Duration = Duration::from_secs(5);

fn start() -> (NodeHandle, JoinHandle<Result<(), huddle_node::NodeError>>) {
    let directory = TcpDirectory::parse("127.0.0.1:0").unwrap();
    let (node, handle) = Node::new(directory, SystemEnv::new(), NodeConfig::default());
    (handle, tokio::spawn(node.run()))
}

async fn wait_for(handle: &mut NodeHandle, mut matches: impl FnMut(&NodeEvent) -> bool) -> NodeEvent {
    timeout(STEP, async {
        loop {
            let event = handle.next_event().await.expect("node stopped");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn identifier(handle: &mut NodeHandle) -> PeerId {
    match wait_for(handle, |e| matches!(e, NodeEvent::Identifier(_))).await {
        NodeEvent::Identifier(id) => id,
        other => unreachable!("{other:?}"),
    }
}

#[tokio::test]
async fn host_and_client_chat_over_loopback() {
    let (mut host, host_task) = start();
    let (mut client, client_task) = start();

    let host_id = identifier(&mut host).await;
    let client_id = identifier(&mut client).await;
    assert!(host_id.as_str().starts_with("127.0.0.1:"));
    assert_ne!(host_id, client_id);

    host.send(NodeCommand::CreateRoom).await.unwrap();
    client.send(NodeCommand::JoinRoom { code: host_id.clone() }).await.unwrap();

    let roster = wait_for(&mut client, |e| matches!(e, NodeEvent::RosterChanged(r) if r.len() == 2)).await;
    if let NodeEvent::RosterChanged(roster) = roster {
        assert_eq!(roster[0].identifier, host_id);
        assert_eq!(roster[0].role, Role::Host);
        assert_eq!(roster[1].identifier, client_id);
    }

    client.send(NodeCommand::SendChat { text: "hello host".into() }).await.unwrap();
    let received = wait_for(&mut host, |e| matches!(e, NodeEvent::Chat { .. })).await;
    assert_eq!(received, NodeEvent::Chat { sender: client_id.clone(), text: "hello host".into() });

    host.send(NodeCommand::SendChat { text: "hello client".into() }).await.unwrap();
    let received =
        wait_for(&mut client, |e| matches!(e, NodeEvent::Chat { sender, .. } if *sender == host_id))
            .await;
    assert_eq!(received, NodeEvent::Chat { sender: host_id.clone(), text: "hello client".into() });

    client.send(NodeCommand::LeaveRoom).await.unwrap();
    wait_for(&mut host, |e| matches!(e, NodeEvent::RosterChanged(r) if r.len() == 1)).await;

    host.send(NodeCommand::Shutdown).await.unwrap();
    client.send(NodeCommand::Shutdown).await.unwrap();
    assert!(host_task.await.unwrap().is_ok());
    assert!(client_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn joining_a_closed_port_fails_back_to_lobby() {
    let (mut client, client_task) = start();
    identifier(&mut client).await;

    // Bind then drop, so nothing listens on the port.
    let vacant = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    client.send(NodeCommand::JoinRoom { code: PeerId::new(vacant.to_string()) }).await.unwrap();

    wait_for(&mut client, |e| {
        matches!(e, NodeEvent::StateChanged(huddle_core::SessionState::Joining { .. }))
    })
    .await;
    wait_for(&mut client, |e| *e == NodeEvent::StateChanged(huddle_core::SessionState::Lobby)).await;

    client.send(NodeCommand::Shutdown).await.unwrap();
    assert!(client_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn slow_reader_sees_dropped_event_count() {
    let directory = TcpDirectory::parse("127.0.0.1:0").unwrap();
    let config = NodeConfig { event_buffer: 1, ..NodeConfig::default() };
    let (node, mut handle) = Node::new(directory, SystemEnv::new(), config);
    let task = tokio::spawn(node.run());

    // Start-up alone emits more than one event.
    timeout(STEP, async {
        while handle.dropped_events() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no events were dropped");

    let first = handle.next_event().await;
    assert!(matches!(first, Some(NodeEvent::StateChanged(_))), "got {first:?}");

    handle.send(NodeCommand::Shutdown).await.unwrap();
    assert!(task.await.unwrap().is_ok());
}
