//! Lifecycle scans, milestones and renewals through the public API

use assert_matches::assert_matches;
use chrono::{TimeDelta, Utc};
use lifeguard::{
    lifecycle::{LifecycleEntity, LifecycleError, LifecycleStatus, Milestone},
    notify::Audience,
    settings::SettingsUpdate,
};
use pretty_assertions::assert_eq;

use crate::helpers::Harness;

async fn register(h: &Harness, id: &str, expires_in: TimeDelta, recipient: Option<&str>) {
    let mut entity = LifecycleEntity::new(id, format!("Client {id}"), Utc::now() + expires_in);
    if let Some(recipient) = recipient {
        entity = entity.with_recipient(recipient);
    }
    h.scheduler.register(entity).await.unwrap();
}

#[tokio::test]
async fn test_three_days_left_warns_once() {
    let h = Harness::new(SettingsUpdate::default()).await;
    register(&h, "sub-1", TimeDelta::days(3), Some("owner@client.test")).await;
    let now = Utc::now();

    let first = h.scheduler.scan_at(now).await.unwrap();

    assert_eq!(first.transitions.len(), 1);
    assert_eq!(first.transitions[0].to, LifecycleStatus::Expiring);
    assert_eq!(first.notices_for(Milestone::SevenDayWarning), 1);
    assert_eq!(first.notices.len(), 1);
    assert_eq!(h.admin.sent().len(), 1);

    let mail = h.mail.sent();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].audience, Audience::EndUser);
    assert_eq!(mail[0].recipient.as_deref(), Some("owner@client.test"));

    let second = h
        .scheduler
        .scan_at(now + TimeDelta::minutes(1))
        .await
        .unwrap();
    assert!(second.notices.is_empty());
    assert!(second.transitions.is_empty());
    assert_eq!(h.admin.sent().len(), 1);
}

#[tokio::test]
async fn test_without_recipient_only_admin_is_told() {
    let h = Harness::new(SettingsUpdate::default()).await;
    register(&h, "sub-2", TimeDelta::days(5), None).await;

    let summary = h.scheduler.scan().await.unwrap();

    let dispatch = &summary.notices[0].dispatch;
    assert_eq!(dispatch.delivered, vec!["admin-chat".to_string()]);
    assert!(h.mail.sent().is_empty());
}

#[tokio::test]
async fn test_expired_entity_gets_only_post_expiry_notice() {
    let h = Harness::new(SettingsUpdate::default()).await;
    register(&h, "sub-3", -TimeDelta::hours(2), None).await;

    let summary = h.scheduler.scan().await.unwrap();

    assert_eq!(summary.notices_for(Milestone::PostExpiry), 1);
    assert_eq!(summary.notices.len(), 1);
    let stored = h.storage.entities.get_entity("sub-3").await.unwrap().unwrap();
    assert_eq!(stored.status, LifecycleStatus::Archived);

    // archived entities are no longer due
    assert!(h.scheduler.scan().await.unwrap().notices.is_empty());
}

#[tokio::test]
async fn test_renewal_rearms_milestones() {
    let h = Harness::new(SettingsUpdate::default()).await;
    register(&h, "sub-4", -TimeDelta::days(1), None).await;
    h.scheduler.scan().await.unwrap();

    let renewed = h
        .scheduler
        .renew("sub-4", Utc::now() + TimeDelta::days(3))
        .await
        .unwrap();

    assert_eq!(renewed.status, LifecycleStatus::Active);
    assert!(renewed.warning_7d_sent_at.is_none());
    assert!(renewed.warning_24h_sent_at.is_none());
    assert!(renewed.expired_notice_sent_at.is_none());

    let summary = h.scheduler.scan().await.unwrap();
    assert_eq!(summary.notices_for(Milestone::SevenDayWarning), 1);
}

#[tokio::test]
async fn test_renewal_rejects_bad_input() {
    let h = Harness::new(SettingsUpdate::default()).await;
    register(&h, "sub-5", TimeDelta::days(30), None).await;

    assert_matches!(
        h.scheduler.renew("sub-5", Utc::now() - TimeDelta::days(1)).await,
        Err(LifecycleError::ExpiryNotInFuture { .. })
    );
    assert_matches!(
        h.scheduler.renew("nope", Utc::now() + TimeDelta::days(1)).await,
        Err(LifecycleError::NotFound(id)) if id == "nope"
    );
}

#[tokio::test]
async fn test_summary_counts_and_due_soon() {
    let h = Harness::new(SettingsUpdate::default()).await;
    register(&h, "far", TimeDelta::days(60), None).await;
    register(&h, "soon", TimeDelta::days(8), None).await;
    register(&h, "expiring", TimeDelta::days(2), None).await;
    register(&h, "gone", -TimeDelta::days(2), None).await;
    h.scheduler.scan().await.unwrap();

    let summary = h
        .scheduler
        .summary(Utc::now(), TimeDelta::days(3))
        .await
        .unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.active, 2);
    assert_eq!(summary.expiring, 1);
    assert_eq!(summary.archived, 1);

    let due: Vec<_> = summary.due_soon.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(due, vec!["soon", "expiring"]);
}
