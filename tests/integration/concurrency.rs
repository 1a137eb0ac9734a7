//! Single-flight cycles, per-key alert ordering and racing scans

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures::future::join_all;
use lifeguard::{
    alerts::{AlertAction, Observation},
    lifecycle::{LifecycleEntity, Milestone},
    monitors::CycleOutcome,
    settings::SettingsUpdate,
};
use pretty_assertions::assert_eq;

use crate::helpers::{Harness, LOCAL, fast_settings};

#[tokio::test(start_paused = true)]
async fn test_overlapping_cycles_are_skipped_not_queued() {
    let h = Harness::new(fast_settings()).await;
    h.fetcher.respond(LOCAL, 200);
    h.fetcher.set_delay(Duration::from_millis(500));

    let outcomes = join_all((0..5).map(|_| h.monitor.run_cycle())).await;

    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, CycleOutcome::Completed { .. }))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| **o == CycleOutcome::Skipped)
        .count();
    assert_eq!(completed, 1);
    assert_eq!(skipped, 4);

    let counters = h.monitor.status().counters;
    assert_eq!(counters.completed, 1);
    assert_eq!(counters.skipped_in_flight, 4);
    assert!(!h.monitor.status().in_flight);
}

#[tokio::test]
async fn test_same_key_evaluations_are_sequential() {
    let h = Harness::new(SettingsUpdate::default()).await;

    let actions = join_all(
        (0..10).map(|_| h.alerts.observe(Observation::new("web_server", true, "down"))),
    )
    .await;

    let fired = actions
        .into_iter()
        .map(Result::unwrap)
        .filter(|a| *a == AlertAction::Fired)
        .count();
    assert_eq!(fired, 1);
    assert_eq!(
        h.alerts
            .state("web_server")
            .await
            .unwrap()
            .consecutive_failures,
        10
    );
}

#[tokio::test]
async fn test_racing_scans_send_each_milestone_once() {
    let h = Harness::new(SettingsUpdate::default()).await;
    h.scheduler
        .register(
            LifecycleEntity::new("sub-1", "Acme", Utc::now() + TimeDelta::days(3))
                .with_recipient("owner@acme.test"),
        )
        .await
        .unwrap();

    let now = Utc::now();
    let summaries = join_all((0..4).map(|_| h.scheduler.scan_at(now))).await;

    let notices: usize = summaries
        .into_iter()
        .map(|s| s.unwrap().notices_for(Milestone::SevenDayWarning))
        .sum();
    assert_eq!(notices, 1);
    assert_eq!(h.admin.sent().len(), 1);
    assert_eq!(h.mail.sent().len(), 1);
}

#[tokio::test]
async fn test_renewal_during_scan_wins() {
    let h = Harness::new(SettingsUpdate::default()).await;
    let entity = LifecycleEntity::new("sub-2", "Beta", Utc::now() - TimeDelta::hours(1));
    h.scheduler.register(entity.clone()).await.unwrap();

    // the scan works on the pre-renewal snapshot
    h.scheduler
        .renew("sub-2", Utc::now() + TimeDelta::days(30))
        .await
        .unwrap();
    let summary = h.scheduler.scan_entities(vec![entity], Utc::now()).await;

    assert_eq!(summary.stale, vec!["sub-2".to_string()]);
    assert!(summary.notices.is_empty());
    let stored = h.storage.entities.get_entity("sub-2").await.unwrap().unwrap();
    assert!(stored.expired_notice_sent_at.is_none());
}
