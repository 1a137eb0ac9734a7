//! Degraded environments: broken channels, unreadable settings, slow probes

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use lifeguard::{
    monitors::{
        CycleOutcome, HealthStatus,
        system::{PROBE_RUNTIME_KEY, WEB_SERVER_KEY},
    },
    settings::{SettingsError, SettingsUpdate},
    storage::memory::MemoryBackend,
};
use pretty_assertions::assert_eq;

use crate::helpers::{FlakySettings, Harness, LOCAL, fast_settings};

#[tokio::test]
async fn test_failing_channel_does_not_stop_alerting() {
    let h = Harness::new(SettingsUpdate {
        consecutive_failures_threshold: Some(1),
        ..fast_settings()
    })
    .await;
    h.admin.set_failing(true);

    h.monitor.run_cycle().await;

    let state = h.alerts.state(WEB_SERVER_KEY).await.unwrap();
    assert!(state.firing);
    let dispatch = state.last_dispatch.unwrap();
    assert_eq!(dispatch.failed.len(), 1);
    assert_eq!(dispatch.failed[0].channel, "admin-chat");
    assert!(dispatch.delivered.is_empty());

    // the next cycle still runs and evaluates normally
    h.admin.set_failing(false);
    h.fetcher.respond(LOCAL, 200);
    assert_eq!(
        h.monitor.run_cycle().await,
        CycleOutcome::Completed {
            status: HealthStatus::Healthy
        }
    );
    assert!(!h.alerts.state(WEB_SERVER_KEY).await.unwrap().firing);
}

#[tokio::test]
async fn test_unreadable_settings_fail_open() {
    let flaky = FlakySettings::new(Arc::new(MemoryBackend::new()));
    let h = Harness::with_settings_backend(
        flaky.clone(),
        SettingsUpdate {
            cooldown_secs: Some(0),
            consecutive_failures_threshold: Some(2),
            ..Default::default()
        },
    )
    .await;
    h.fetcher.respond(LOCAL, 200);

    flaky.broken.store(true, Ordering::SeqCst);
    let outcome = h.monitor.run_cycle().await;

    assert_matches!(outcome, CycleOutcome::Completed { .. });
    let status = h.monitor.status();
    assert!(status.settings_error.unwrap().contains("database locked"));
    // last known good snapshot stays in effect
    assert_eq!(h.settings.current().consecutive_failures_threshold, 2);

    flaky.broken.store(false, Ordering::SeqCst);
    h.monitor.run_cycle().await;
    assert!(h.monitor.status().settings_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_runtime_budget_exceeded_alerts_immediately() {
    let h = Harness::new(SettingsUpdate {
        max_runtime_secs: Some(Some(3)),
        ..fast_settings()
    })
    .await;
    h.fetcher.set_delay(Duration::from_secs(2));
    h.fetcher.respond(LOCAL, 200);

    let outcome = h.monitor.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::TimedOut { budget_secs: 3 });
    assert!(
        h.admin
            .subjects()
            .contains(&format!("{PROBE_RUNTIME_KEY} failing"))
    );
    // no report for an aborted probe, the web server key is untouched
    assert!(h.monitor.status().last_report.is_none());
    assert!(h.alerts.state(WEB_SERVER_KEY).await.is_none());

    // a second timeout inside the dedup window is suppressed
    h.monitor.run_cycle().await;
    let fired = h
        .admin
        .subjects()
        .into_iter()
        .filter(|s| s.starts_with(PROBE_RUNTIME_KEY))
        .count();
    assert_eq!(fired, 1);
    assert_eq!(h.monitor.status().counters.timed_out, 2);
}

#[tokio::test]
async fn test_invalid_update_is_rejected_and_nothing_changes() {
    let h = Harness::new(SettingsUpdate::default()).await;
    let before = h.settings.persisted().await.unwrap();

    let result = h
        .settings
        .update(SettingsUpdate {
            cpu_threshold_percent: Some(150.0),
            ..Default::default()
        })
        .await;

    assert_matches!(result, Err(SettingsError::Invalid(_)));
    assert_eq!(h.settings.persisted().await.unwrap(), before);
}

#[tokio::test]
async fn test_removing_runtime_limit() {
    let h = Harness::new(SettingsUpdate {
        max_runtime_secs: Some(None),
        ..Default::default()
    })
    .await;

    assert_eq!(h.settings.current().max_runtime(), None);
}
