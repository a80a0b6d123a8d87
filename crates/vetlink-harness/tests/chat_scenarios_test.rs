//! End-to-end chat scenarios against the in-memory backend.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use vetlink_app::Command;
use vetlink_client::{ConnectionState, UserError};
use vetlink_harness::{SIM_USER, SimBackend, Simulation};

const ROOM: u64 = 3;

async fn in_room(backend: SimBackend) -> Simulation {
    let mut sim = Simulation::new(backend);
    sim.start().await.unwrap();
    sim.enter_room(ROOM).await.unwrap();
    sim
}

#[tokio::test]
async fn backfill_loads_whole_history_once() {
    let mut backend = SimBackend::new(1).with_page_size(10);
    backend.seed_room(ROOM, 25);
    let mut sim = in_room(backend).await;

    let frame = sim.frame().unwrap();
    assert_eq!(frame.chat_state, ConnectionState::Connected);
    assert_eq!(frame.message_ids(), (16..=25).collect::<Vec<_>>());
    assert!(frame.has_older);

    sim.command(Command::LoadMore).await.unwrap();
    sim.command(Command::LoadMore).await.unwrap();

    let frame = sim.frame().unwrap();
    assert_eq!(frame.message_ids(), (1..=25).collect::<Vec<_>>());
    assert!(!frame.has_older);
    assert_eq!(sim.backend().stats().history_requests, 3);

    sim.command(Command::LoadMore).await.unwrap();
    assert_eq!(sim.backend().stats().history_requests, 3, "nothing older to fetch");
}

#[tokio::test]
async fn published_message_echoed_once() {
    let mut backend = SimBackend::new(1);
    backend.seed_room(ROOM, 2);
    let mut sim = in_room(backend).await;
    assert!(sim.backend().is_subscribed(ROOM));

    sim.command(Command::Send("hello".to_string())).await.unwrap();

    assert_eq!(sim.backend().stats().published, 1);
    let frame = sim.frame().unwrap();
    assert_eq!(frame.message_ids(), vec![1, 2, 3]);
    let last = sim.session().chat_session().messages().last().cloned().unwrap();
    assert_eq!(last.sender_id, SIM_USER);
    assert_eq!(last.content, "hello");
}

#[tokio::test]
async fn blank_sends_never_published() {
    let mut sim = in_room(SimBackend::new(1)).await;

    sim.command(Command::Send(String::new())).await.unwrap();
    sim.command(Command::Send("   ".to_string())).await.unwrap();

    assert_eq!(sim.backend().stats().published, 0);
    assert!(sim.backend().room(ROOM).is_empty());
    assert!(sim.session().status().is_none());
}

#[tokio::test]
async fn other_participants_appear_live() {
    let mut sim = in_room(SimBackend::new(1)).await;

    sim.backend().post_message(ROOM, 2, "the vet will see you now");
    sim.backend().post_message(ROOM + 1, 2, "wrong room");
    sim.settle().await.unwrap();

    assert_eq!(sim.frame().unwrap().message_ids(), vec![1]);
}

#[tokio::test]
async fn reconnect_backs_off_then_resets() {
    let mut backend = SimBackend::new(1);
    backend.set_socket_down(true);
    let mut sim = in_room(backend).await;
    assert_eq!(sim.backend().stats().socket_opens, 1);
    assert_eq!(sim.frame().unwrap().chat_state, ConnectionState::Reconnecting);

    let mut opens = 1;
    for delay in [1, 2, 4, 8] {
        sim.advance(Duration::from_millis(delay * 1000 - 1)).await.unwrap();
        assert_eq!(sim.backend().stats().socket_opens, opens, "retry before {delay}s elapsed");

        sim.advance(Duration::from_millis(1)).await.unwrap();
        opens += 1;
        assert_eq!(sim.backend().stats().socket_opens, opens);
    }

    sim.backend().set_socket_down(false);
    sim.advance(Duration::from_secs(16)).await.unwrap();
    assert_eq!(sim.frame().unwrap().chat_state, ConnectionState::Connected);
    assert!(sim.backend().is_subscribed(ROOM));

    sim.backend().drop_socket("server restart");
    sim.settle().await.unwrap();
    sim.advance(Duration::from_secs(1)).await.unwrap();
    assert_eq!(sim.frame().unwrap().chat_state, ConnectionState::Connected, "delay reset to 1s");
}

#[tokio::test]
async fn reconnect_resubscribes_and_catches_up() {
    let mut backend = SimBackend::new(1);
    backend.seed_room(ROOM, 5);
    let mut sim = in_room(backend).await;
    let first = sim.backend().socket_generation().unwrap();

    sim.backend().drop_socket("network change");
    sim.settle().await.unwrap();
    assert_eq!(sim.frame().unwrap().chat_state, ConnectionState::Reconnecting);

    sim.backend().post_message(ROOM, 2, "sent while you were away");
    sim.advance(Duration::from_secs(1)).await.unwrap();

    assert_ne!(sim.backend().socket_generation(), Some(first));
    assert!(sim.backend().is_subscribed(ROOM));
    assert_eq!(sim.frame().unwrap().message_ids(), (1..=6).collect::<Vec<_>>());
}

#[tokio::test]
async fn room_change_shows_only_new_room() {
    let mut backend = SimBackend::new(1);
    backend.seed_room(ROOM, 4);
    backend.seed_room(ROOM + 1, 3);
    let mut sim = in_room(backend).await;

    sim.enter_room(ROOM + 1).await.unwrap();

    let frame = sim.frame().unwrap();
    assert_eq!(frame.room_id, Some(ROOM + 1));
    assert_eq!(frame.message_ids(), vec![5, 6, 7]);
    assert!(sim.backend().is_subscribed(ROOM + 1));
    assert!(!sim.backend().is_subscribed(ROOM));
}

#[tokio::test]
async fn leaving_room_closes_socket() {
    let mut sim = in_room(SimBackend::new(1)).await;

    sim.command(Command::LeaveRoom).await.unwrap();

    let frame = sim.frame().unwrap();
    assert_eq!(frame.room_id, None);
    assert!(frame.messages.is_empty());
    assert_eq!(sim.backend().socket_generation(), None);
}

#[tokio::test]
async fn failed_room_read_mark_reverts() {
    let mut backend = SimBackend::new(1);
    backend.seed_room(ROOM, 3);
    let mut sim = in_room(backend).await;

    sim.backend().fail_read_marks(1);
    sim.command(Command::MarkRoomRead).await.unwrap();

    assert!(sim.session().chat_session().messages().iter().all(|m| !m.is_read));
    assert!(matches!(sim.session().status(), Some(UserError::ReadMarkFailed { .. })));

    sim.command(Command::MarkRoomRead).await.unwrap();
    assert!(sim.session().chat_session().messages().iter().all(|m| m.is_read));
    assert!(sim.backend().room(ROOM).iter().all(|m| m.is_read));
}

#[tokio::test]
async fn history_outage_surfaces_error() {
    let mut backend = SimBackend::new(1);
    backend.set_rest_down(true);
    let sim = in_room(backend).await;

    assert!(matches!(sim.session().status(), Some(UserError::HistoryUnavailable { .. })));
    assert_eq!(sim.frame().unwrap().chat_state, ConnectionState::Connected);
}
