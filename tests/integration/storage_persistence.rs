//! State that must survive a hub restart (SQLite backend)

use chrono::{TimeDelta, Utc};
use lifeguard::{
    lifecycle::{LifecycleEntity, LifecycleStatus, Milestone},
    monitors::HealthStatus,
    settings::SettingsUpdate,
    storage::{Storage, sqlite::SqliteBackend},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::{Harness, LOCAL, fast_settings};

async fn open(path: &std::path::Path) -> Storage {
    Storage::from_backend(SqliteBackend::new(path).await.unwrap())
}

#[tokio::test]
async fn test_settings_survive_restart() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("hub.db");

    let saved = {
        let h = Harness::with_storage(
            open(&db).await,
            SettingsUpdate {
                check_interval_secs: Some(15),
                max_runtime_secs: Some(None),
                ..Default::default()
            },
        )
        .await;
        let saved = h.settings.persisted().await.unwrap();
        h.storage.backend.close().await.unwrap();
        saved
    };

    let h = Harness::with_storage(open(&db).await, SettingsUpdate::default()).await;
    let current = h.settings.current();

    assert_eq!(current.check_interval_secs, 15);
    assert_eq!(current.max_runtime_secs, None);
    // the empty update still bumps the version once
    assert_eq!(current.version, saved.version + 1);
}

#[tokio::test]
async fn test_sent_milestones_survive_restart() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("hub.db");

    {
        let h = Harness::with_storage(open(&db).await, SettingsUpdate::default()).await;
        h.scheduler
            .register(LifecycleEntity::new(
                "sub-1",
                "Acme",
                Utc::now() + TimeDelta::hours(20),
            ))
            .await
            .unwrap();
        let summary = h.scheduler.scan().await.unwrap();
        assert_eq!(summary.notices_for(Milestone::SevenDayWarning), 1);
        assert_eq!(summary.notices_for(Milestone::DayWarning), 1);
        h.storage.backend.close().await.unwrap();
    }

    let h = Harness::with_storage(open(&db).await, SettingsUpdate::default()).await;
    let summary = h.scheduler.scan().await.unwrap();

    assert!(summary.notices.is_empty());
    assert!(h.admin.sent().is_empty());
    let stored = h.storage.entities.get_entity("sub-1").await.unwrap().unwrap();
    assert_eq!(stored.status, LifecycleStatus::Expiring);
    assert!(stored.warning_24h_sent_at.is_some());
}

#[tokio::test]
async fn test_health_history_is_recorded_and_pruned() {
    let dir = tempdir().unwrap();
    let h = Harness::with_storage(open(&dir.path().join("hub.db")).await, fast_settings()).await;
    h.fetcher.respond(LOCAL, 200);

    h.monitor.run_cycle().await;
    h.monitor.run_cycle().await;

    let reports = h.storage.history.query_latest_reports(10).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.status == HealthStatus::Healthy));
    assert!(reports[0].checked_at >= reports[1].checked_at);
    assert_eq!(reports[0].report.attempts.len(), 3);

    let deleted = h
        .storage
        .history
        .cleanup_old_reports(Utc::now() + TimeDelta::seconds(1))
        .await
        .unwrap();
    assert_eq!(deleted, 2);
}
