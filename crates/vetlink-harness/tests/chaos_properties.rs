//! Seeded chaos runs.
//!
//! Random user actions and backend events run against a backend that fails
//! at random. Every rendered frame is checked against the standard
//! invariants; once the faults stop, the client must recover on its own.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use proptest::prelude::*;
use vetlink_app::Command;
use vetlink_client::ConnectionState;
use vetlink_harness::{FaultConfig, SIM_USER, SimBackend, Simulation};
use vetlink_proto::NotificationKind;

#[derive(Debug, Clone)]
enum Step {
    User(Command),
    Post { room_id: u64 },
    Push(NotificationKind),
    DuplicatePush { id: u64 },
    DropSocket,
    DropStream,
    Advance(Duration),
}

fn kind_strategy() -> impl Strategy<Value = NotificationKind> {
    prop_oneof![
        Just(NotificationKind::Notice),
        Just(NotificationKind::Reservation),
        Just(NotificationKind::Vaccination),
    ]
}

fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        3 => (1u64..=3).prop_map(Command::EnterRoom),
        1 => Just(Command::LeaveRoom),
        3 => "[ a-z]{0,12}".prop_map(Command::Send),
        3 => Just(Command::LoadMore),
        1 => Just(Command::MarkRoomRead),
        1 => (1u64..=20).prop_map(Command::MarkNotificationRead),
        1 => Just(Command::MarkAllNotificationsRead),
    ]
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => command_strategy().prop_map(Step::User),
        3 => (1u64..=3).prop_map(|room_id| Step::Post { room_id }),
        2 => kind_strategy().prop_map(Step::Push),
        1 => (1u64..=5).prop_map(|id| Step::DuplicatePush { id }),
        1 => Just(Step::DropSocket),
        1 => Just(Step::DropStream),
        3 => (1u64..=20_000).prop_map(|ms| Step::Advance(Duration::from_millis(ms))),
    ]
}

async fn run(seed: u64, steps: Vec<Step>) -> Simulation {
    let faults = FaultConfig {
        socket_open_failure: 0.3,
        stream_open_failure: 0.1,
        fetch_failure: 0.2,
    };
    let mut backend = SimBackend::new(seed).with_page_size(5).with_faults(faults);
    for room_id in 1..=3 {
        backend.seed_room(room_id, 12);
    }

    let mut sim = Simulation::new(backend);
    sim.start().await.unwrap();

    for step in steps {
        match step {
            Step::User(command) => sim.command(command).await.unwrap(),
            Step::Post { room_id } => {
                sim.backend().post_message(room_id, 2, "ping");
                sim.settle().await.unwrap();
            },
            Step::Push(kind) => {
                sim.backend().push_notification(SIM_USER, kind);
                sim.settle().await.unwrap();
            },
            Step::DuplicatePush { id } => {
                sim.backend().push_raw(&format!("event: notice\ndata: {{\"id\":{id}}}\n\n"));
                sim.settle().await.unwrap();
            },
            Step::DropSocket => {
                sim.backend().drop_socket("chaos");
                sim.settle().await.unwrap();
            },
            Step::DropStream => {
                sim.backend().drop_stream("chaos");
                sim.settle().await.unwrap();
            },
            Step::Advance(duration) => sim.advance(duration).await.unwrap(),
        }
    }

    sim.backend().set_faults(FaultConfig::default());
    for _ in 0..3 {
        sim.advance(Duration::from_secs(31)).await.unwrap();
    }
    sim
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Invariants hold on every frame and an open room always reconnects
    /// once the backend is healthy.
    #[test]
    fn chat_recovers_from_chaos(
        seed in any::<u64>(),
        steps in prop::collection::vec(step_strategy(), 0..40),
    ) {
        let sim = block_on(run(seed, steps));
        let frame = sim.frame().unwrap();

        if let Some(room_id) = frame.room_id {
            prop_assert_eq!(frame.chat_state, ConnectionState::Connected);
            prop_assert!(sim.backend().is_subscribed(room_id));
        }
    }

    /// The same seed and steps replay to the same frames.
    #[test]
    fn runs_are_reproducible(
        seed in any::<u64>(),
        steps in prop::collection::vec(step_strategy(), 0..20),
    ) {
        let first = block_on(run(seed, steps.clone()));
        let second = block_on(run(seed, steps));

        prop_assert_eq!(first.driver().frames(), second.driver().frames());
        prop_assert_eq!(first.backend().stats(), second.backend().stats());
    }
}
