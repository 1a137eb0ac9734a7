//! Full monitoring cycles: probe, evaluate, alert, publish

use assert_matches::assert_matches;
use lifeguard::{
    monitors::{
        CycleOutcome, HealthStatus,
        probe::TargetKind,
        system::{PROBE_RUNTIME_KEY, WEB_SERVER_KEY},
    },
    notify::Severity,
    settings::SettingsUpdate,
};
use pretty_assertions::assert_eq;

use crate::helpers::{Harness, INTERNAL, LOCAL, PUBLIC, fast_settings};

#[tokio::test]
async fn test_fallback_to_localhost_reports_healthy() {
    let h = Harness::new(SettingsUpdate::default()).await;
    h.fetcher.respond(PUBLIC, 504);
    h.fetcher.respond(LOCAL, 200);
    let mut events = h.monitor.subscribe();

    let outcome = h.monitor.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            status: HealthStatus::Healthy
        }
    );
    assert_eq!(h.fetcher.calls(), vec![INTERNAL, PUBLIC, LOCAL]);

    let report = h.monitor.status().last_report.unwrap();
    assert_eq!(report.attempts.len(), 3);
    assert_eq!(
        report.attempts[1].error.as_deref(),
        Some("unexpected status 504")
    );
    assert_eq!(
        report.successful_target.unwrap().kind,
        TargetKind::Localhost
    );
    assert!(report.process.is_none());

    let event = events.recv().await.unwrap();
    assert_eq!(event.report.status, HealthStatus::Healthy);

    let history = h.storage.history.query_latest_reports(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].successful_target.as_deref(), Some(LOCAL));
}

#[tokio::test]
async fn test_first_success_stops_probing() {
    let h = Harness::new(SettingsUpdate::default()).await;
    h.fetcher.respond(INTERNAL, 200);
    h.fetcher.respond(LOCAL, 200);

    h.monitor.run_cycle().await;

    assert_eq!(h.fetcher.calls(), vec![INTERNAL]);
}

#[tokio::test]
async fn test_sustained_outage_fires_once_then_recovers() {
    let h = Harness::new(fast_settings()).await;

    let mut statuses = Vec::new();
    for _ in 0..4 {
        statuses.push(h.monitor.run_cycle().await);
    }
    assert!(statuses.iter().all(|s| matches!(
        s,
        CycleOutcome::Completed {
            status: HealthStatus::Failed
        }
    )));

    let fired: Vec<_> = h
        .admin
        .sent()
        .into_iter()
        .filter(|n| n.subject == format!("{WEB_SERVER_KEY} failing"))
        .collect();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].severity, Severity::Critical);

    let state = h.alerts.state(WEB_SERVER_KEY).await.unwrap();
    assert_eq!(state.consecutive_failures, 4);
    assert!(state.firing);

    h.fetcher.respond(LOCAL, 200);
    h.monitor.run_cycle().await;

    let state = h.alerts.state(WEB_SERVER_KEY).await.unwrap();
    assert!(!state.firing);
    assert!(state.recovered);
    assert!(
        h.admin
            .subjects()
            .contains(&format!("{WEB_SERVER_KEY} recovered"))
    );
}

#[tokio::test]
async fn test_degraded_needs_process_and_port() {
    let h = Harness::new(fast_settings()).await;

    h.liveness.set(true, true);
    assert_eq!(
        h.monitor.run_cycle().await,
        CycleOutcome::Completed {
            status: HealthStatus::Degraded
        }
    );
    let report = h.monitor.status().last_report.unwrap();
    assert_eq!(report.process.unwrap().pid, Some(4242));
    assert!(report.port.unwrap().open);

    h.liveness.set(true, false);
    assert_eq!(
        h.monitor.run_cycle().await,
        CycleOutcome::Completed {
            status: HealthStatus::Failed
        }
    );

    // degraded counts as failing for the alert key
    let state = h.alerts.state(WEB_SERVER_KEY).await.unwrap();
    assert_eq!(state.consecutive_failures, 2);
}

#[tokio::test]
async fn test_resource_thresholds_feed_their_keys() {
    let h = Harness::new(SettingsUpdate {
        consecutive_failures_threshold: Some(1),
        cpu_threshold_percent: Some(80.0),
        ..fast_settings()
    })
    .await;
    h.fetcher.respond(LOCAL, 200);
    h.sampler.set(85.0, 20.0, None);

    h.monitor.run_cycle().await;

    assert!(h.admin.subjects().contains(&"cpu failing".to_string()));
    assert!(h.alerts.state("memory").await.is_some_and(|s| !s.firing));
    // no disk reading, no disk evaluation
    assert!(h.alerts.state("disk").await.is_none());
    assert!(
        h.alerts
            .state(PROBE_RUNTIME_KEY)
            .await
            .is_some_and(|s| !s.firing)
    );

    let status = h.monitor.status();
    assert_matches!(status.last_readings, Some(r) if r.cpu_percent == 85.0);
}

#[tokio::test]
async fn test_active_alerts_listed_in_key_order() {
    let h = Harness::new(SettingsUpdate {
        consecutive_failures_threshold: Some(1),
        memory_threshold_percent: Some(10.0),
        ..fast_settings()
    })
    .await;

    h.monitor.run_cycle().await;

    let keys: Vec<_> = h
        .alerts
        .active_alerts()
        .await
        .into_iter()
        .map(|s| s.key)
        .collect();
    assert_eq!(keys, vec!["memory", WEB_SERVER_KEY]);
}
