//! End-to-end tests: real nodes on turmoil's simulated network.
//!
//! Each turmoil host runs a complete `Node` (driver, link tasks, directory)
//! over `SimDirectory`. Time is virtual, so grace windows and backoff cost
//! nothing.

use std::{error::Error, time::Duration};

use huddle_core::{LogLevel, RoomConfig, SessionState};
use huddle_harness::{SimDirectory, SimEnv};
use huddle_node::{Node, NodeCommand, NodeConfig, NodeEvent, NodeHandle};
use huddle_proto::PeerId;

const PORT: u16 = 7400;

fn host_code() -> PeerId {
    PeerId::new(format!("host:{PORT}"))
}

fn start(name: &str, seed: u64, room: RoomConfig) -> NodeHandle {
    let config = NodeConfig { room, ..NodeConfig::default() };
    let (node, handle) = Node::new(SimDirectory::new(name, PORT), SimEnv::with_seed(seed), config);
    tokio::spawn(node.run());
    handle
}

/// Skip events until one matches.
async fn wait_for(
    handle: &mut NodeHandle,
    mut matches: impl FnMut(&NodeEvent) -> bool,
) -> Result<NodeEvent, Box<dyn Error>> {
    while let Some(event) = handle.next_event().await {
        if matches(&event) {
            return Ok(event);
        }
    }
    Err("node stopped".into())
}

/// Give the host time to register before anyone dials it.
async fn host_listening() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

fn roster_len(event: &NodeEvent, len: usize) -> bool {
    matches!(event, NodeEvent::RosterChanged(roster) if roster.len() == len)
}

fn is_identifier(event: &NodeEvent) -> bool {
    matches!(event, NodeEvent::Identifier(_))
}

/// Host that opens a room, greets once `greet_at` participants are in,
/// then keeps serving.
fn spawn_host(sim: &mut turmoil::Sim<'_>, room: RoomConfig, greet_at: usize) {
    sim.host("host", move || {
        let room = room.clone();
        async move {
            let mut handle = start("host", 1, room);
            wait_for(&mut handle, is_identifier).await?;
            handle.send(NodeCommand::CreateRoom).await?;
            wait_for(&mut handle, |e| roster_len(e, greet_at)).await?;
            handle.send(NodeCommand::SendChat { text: "welcome".into() }).await?;

            while handle.next_event().await.is_some() {}
            Ok(())
        }
    });
}

#[test]
fn room_chat_over_simulated_network() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();
    spawn_host(&mut sim, RoomConfig::default(), 3);

    sim.client("alice", async {
        host_listening().await;
        let mut handle = start("alice", 2, RoomConfig::default());
        wait_for(&mut handle, is_identifier).await?;
        handle.send(NodeCommand::JoinRoom { code: host_code() }).await?;

        let joined = wait_for(&mut handle, |e| roster_len(e, 3)).await?;
        if let NodeEvent::RosterChanged(roster) = joined {
            assert_eq!(roster[0].identifier, host_code());
        }
        handle.send(NodeCommand::SendChat { text: "hi from alice".into() }).await?;

        let greeting = wait_for(&mut handle, |e| {
            matches!(e, NodeEvent::Chat { sender, .. } if *sender == host_code())
        })
        .await?;
        assert_eq!(greeting, NodeEvent::Chat { sender: host_code(), text: "welcome".into() });
        Ok(())
    });

    sim.client("bob", async {
        host_listening().await;
        let mut handle = start("bob", 3, RoomConfig::default());
        wait_for(&mut handle, is_identifier).await?;
        handle.send(NodeCommand::JoinRoom { code: host_code() }).await?;

        let mut chats = Vec::new();
        while chats.len() < 2 {
            if let NodeEvent::Chat { sender, text } =
                wait_for(&mut handle, |e| matches!(e, NodeEvent::Chat { .. })).await?
            {
                chats.push((sender.into_string(), text));
            }
        }
        chats.sort();
        assert_eq!(
            chats,
            vec![
                ("alice:7400".to_string(), "hi from alice".to_string()),
                ("host:7400".to_string(), "welcome".to_string()),
            ]
        );
        Ok(())
    });

    sim.run().expect("room chat should complete");
}

#[test]
fn full_room_turns_late_joiner_away() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();
    let room = RoomConfig { max_participants: 2, ..RoomConfig::default() };
    spawn_host(&mut sim, room, 2);

    sim.client("first", async {
        host_listening().await;
        let mut handle = start("first", 2, RoomConfig::default());
        wait_for(&mut handle, is_identifier).await?;
        handle.send(NodeCommand::JoinRoom { code: host_code() }).await?;
        wait_for(&mut handle, |e| matches!(e, NodeEvent::Chat { .. })).await?;

        // Stay in the room until the late joiner has been turned away.
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    });

    sim.client("late", async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let mut handle = start("late", 3, RoomConfig::default());
        wait_for(&mut handle, is_identifier).await?;
        handle.send(NodeCommand::JoinRoom { code: host_code() }).await?;

        wait_for(&mut handle, |e| {
            matches!(e, NodeEvent::Log { level: LogLevel::Warn, message }
                if message.contains("room full"))
        })
        .await?;
        wait_for(&mut handle, |e| *e == NodeEvent::StateChanged(SessionState::Lobby)).await?;
        Ok(())
    });

    sim.run().expect("late joiner should be rejected");
}

#[test]
fn host_leaving_closes_the_room() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();

    sim.host("host", || async {
        let mut handle = start("host", 1, RoomConfig::default());
        wait_for(&mut handle, is_identifier).await?;
        handle.send(NodeCommand::CreateRoom).await?;
        wait_for(&mut handle, |e| roster_len(e, 2)).await?;
        handle.send(NodeCommand::LeaveRoom).await?;

        while handle.next_event().await.is_some() {}
        Ok(())
    });

    sim.client("guest", async {
        host_listening().await;
        let mut handle = start("guest", 2, RoomConfig::default());
        wait_for(&mut handle, is_identifier).await?;
        handle.send(NodeCommand::JoinRoom { code: host_code() }).await?;
        wait_for(&mut handle, |e| {
            matches!(e, NodeEvent::StateChanged(SessionState::Joined { .. }))
        })
        .await?;

        // The roster empties before the state returns to the lobby.
        wait_for(&mut handle, |e| roster_len(e, 0)).await?;
        wait_for(&mut handle, |e| *e == NodeEvent::StateChanged(SessionState::Lobby)).await?;
        Ok(())
    });

    sim.run().expect("guest should return to the lobby");
}

#[test]
fn joining_an_idle_peer_fails_back_to_lobby() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();

    // Registered with the directory but not hosting anything.
    sim.host("host", || async {
        let mut handle = start("host", 1, RoomConfig::default());
        while handle.next_event().await.is_some() {}
        Ok(())
    });

    sim.client("guest", async {
        host_listening().await;
        let mut handle = start("guest", 2, RoomConfig::default());
        wait_for(&mut handle, is_identifier).await?;
        handle.send(NodeCommand::JoinRoom { code: host_code() }).await?;

        wait_for(&mut handle, |e| {
            matches!(e, NodeEvent::StateChanged(SessionState::Joining { .. }))
        })
        .await?;
        wait_for(&mut handle, |e| *e == NodeEvent::StateChanged(SessionState::Lobby)).await?;
        handle.send(NodeCommand::CreateRoom).await?;
        wait_for(&mut handle, |e| *e == NodeEvent::StateChanged(SessionState::Hosting)).await?;
        Ok(())
    });

    sim.run().expect("guest should recover from the failed join");
}
