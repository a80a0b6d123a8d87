//! End-to-end notification scenarios against the in-memory backend.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use vetlink_app::{AppNotification, Command, Delivery};
use vetlink_client::{ConnectionState, UserError};
use vetlink_harness::{SIM_USER, SimBackend, Simulation};
use vetlink_proto::NotificationKind;

async fn started(backend: SimBackend) -> Simulation {
    let mut sim = Simulation::new(backend);
    sim.start().await.unwrap();
    sim
}

fn events(sim: &mut Simulation) -> Vec<AppNotification> {
    sim.bus()
        .drain()
        .into_iter()
        .filter_map(|delivery| match delivery {
            Delivery::Event(event) => Some(event),
            Delivery::Missed(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn connect_frame_sets_unread_count() {
    let mut backend = SimBackend::new(1);
    backend.add_notification(SIM_USER, NotificationKind::Notice, false);
    backend.set_reported_unread(SIM_USER, 7);
    let sim = started(backend).await;

    let frame = sim.frame().unwrap();
    assert_eq!(frame.notification_state, ConnectionState::Connected);
    assert_eq!(frame.unread_count, 7);
    assert_eq!(frame.notification_count, 1);
}

#[tokio::test]
async fn read_mark_decrements_once() {
    let mut backend = SimBackend::new(1);
    let target = backend.add_notification(SIM_USER, NotificationKind::Reservation, false);
    backend.add_notification(SIM_USER, NotificationKind::Notice, false);
    backend.add_notification(SIM_USER, NotificationKind::Vaccination, false);
    let mut sim = started(backend).await;
    assert_eq!(sim.frame().unwrap().unread_count, 3);

    sim.command(Command::MarkNotificationRead(target)).await.unwrap();
    assert_eq!(sim.frame().unwrap().unread_count, 2);

    sim.command(Command::MarkNotificationRead(target)).await.unwrap();
    assert_eq!(sim.frame().unwrap().unread_count, 2);
    assert_eq!(sim.backend().stats().notification_read_marks, 1);
}

#[tokio::test]
async fn failed_read_mark_reverts() {
    let mut backend = SimBackend::new(1);
    let target = backend.add_notification(SIM_USER, NotificationKind::Notice, false);
    backend.fail_read_marks(1);
    let mut sim = started(backend).await;

    sim.command(Command::MarkNotificationRead(target)).await.unwrap();

    assert_eq!(sim.frame().unwrap().unread_count, 1);
    assert!(!sim.session().notification_stream().notifications()[0].is_read);
    assert!(matches!(sim.session().status(), Some(UserError::ReadMarkFailed { .. })));
}

#[tokio::test]
async fn mark_all_read_patches_every_unread() {
    let mut backend = SimBackend::new(1);
    for kind in [NotificationKind::Notice, NotificationKind::Reservation] {
        backend.add_notification(SIM_USER, kind, false);
    }
    backend.add_notification(SIM_USER, NotificationKind::Vaccination, true);
    let mut sim = started(backend).await;

    sim.command(Command::MarkAllNotificationsRead).await.unwrap();

    assert_eq!(sim.frame().unwrap().unread_count, 0);
    assert_eq!(sim.backend().stats().notification_read_marks, 2);
    assert!(sim.backend().notifications(SIM_USER).iter().all(|n| n.is_read));
}

#[tokio::test]
async fn push_raises_typed_event_and_refreshes() {
    let mut sim = started(SimBackend::new(1)).await;
    let lists_before = sim.backend().stats().list_requests;
    events(&mut sim);

    sim.backend().push_notification(SIM_USER, NotificationKind::Vaccination);
    sim.settle().await.unwrap();

    let frame = sim.frame().unwrap();
    assert_eq!(frame.unread_count, 1);
    assert_eq!(frame.notification_count, 1);
    assert_eq!(sim.backend().stats().list_requests, lists_before + 1);

    let events = events(&mut sim);
    assert!(events.iter().any(|e| matches!(e, AppNotification::VaccinationChanged(_))));
    assert!(events.contains(&AppNotification::UnreadCountChanged(1)));
    assert!(events.contains(&AppNotification::NotificationsChanged));
}

#[tokio::test]
async fn duplicate_push_applied_once_until_retention_expires() {
    let mut sim = started(SimBackend::new(1)).await;
    let push = "event: notice\ndata: {\"id\":77,\"isRead\":false}\n\n";

    sim.backend().push_raw(push);
    sim.settle().await.unwrap();
    sim.advance(Duration::from_secs(2)).await.unwrap();
    sim.backend().push_raw(push);
    sim.settle().await.unwrap();
    assert_eq!(sim.frame().unwrap().unread_count, 1);

    sim.advance(Duration::from_secs(11)).await.unwrap();
    sim.backend().push_raw(push);
    sim.settle().await.unwrap();
    assert_eq!(sim.frame().unwrap().unread_count, 2);
}

#[tokio::test]
async fn notice_refresh_does_not_count() {
    let mut sim = started(SimBackend::new(1)).await;
    events(&mut sim);

    sim.backend().push_raw("event: notice-refresh\ndata: {}\n\n");
    sim.settle().await.unwrap();

    assert_eq!(sim.frame().unwrap().unread_count, 0);
    assert!(events(&mut sim).contains(&AppNotification::NoticeRefresh));
}

#[tokio::test]
async fn unknown_and_malformed_events_ignored() {
    let mut sim = started(SimBackend::new(1)).await;
    let lists_before = sim.backend().stats().list_requests;

    sim.backend().push_raw("event: surgery\ndata: {\"id\":5}\n\n");
    sim.backend().push_raw("data: <html>502 Bad Gateway</html>\n\n");
    sim.settle().await.unwrap();

    assert_eq!(sim.frame().unwrap().unread_count, 0);
    assert_eq!(sim.backend().stats().list_requests, lists_before);
}

#[tokio::test]
async fn stream_gives_up_after_five_retries() {
    let mut sim = started(SimBackend::new(1)).await;
    sim.backend().set_stream_down(true);
    sim.backend().drop_stream("proxy timeout");
    sim.settle().await.unwrap();

    for delay in [1, 2, 4, 8, 16] {
        sim.advance(Duration::from_secs(delay)).await.unwrap();
    }
    assert_eq!(sim.backend().stats().stream_opens, 6);
    assert_eq!(sim.frame().unwrap().notification_state, ConnectionState::Disconnected);
    assert!(matches!(
        sim.session().status(),
        Some(UserError::NotificationsUnavailable { attempts: 5 })
    ));

    sim.backend().set_stream_down(false);
    sim.advance(Duration::from_secs(60)).await.unwrap();
    assert_eq!(sim.backend().stats().stream_opens, 6, "no retries once exhausted");
}

#[tokio::test]
async fn server_retry_hint_lengthens_wait() {
    let mut sim = started(SimBackend::new(1)).await;
    sim.backend().push_raw("retry: 5000\n\n");
    sim.backend().drop_stream("closed");
    sim.settle().await.unwrap();

    sim.advance(Duration::from_secs(1)).await.unwrap();
    assert_eq!(sim.backend().stats().stream_opens, 1);

    sim.advance(Duration::from_secs(4)).await.unwrap();
    assert_eq!(sim.backend().stats().stream_opens, 2);
    assert_eq!(sim.frame().unwrap().notification_state, ConnectionState::Connected);
}

#[tokio::test]
async fn logout_releases_everything() {
    let mut backend = SimBackend::new(1);
    backend.seed_room(3, 2);
    let mut sim = started(backend).await;
    sim.enter_room(3).await.unwrap();

    sim.shutdown().await;

    assert!(sim.driver().is_stopped());
    assert_eq!(sim.backend().socket_generation(), None);
    assert_eq!(sim.backend().stream_generation(), None);
}
