//! LifecycleScheduler - status transitions and one-time milestone notices
//!
//! A scan handles each entity in two steps:
//!
//! 1. persist the status implied by the remaining time (monotonic), right
//!    away and regardless of notifications
//! 2. for every due milestone, claim its "sent" timestamp through a
//!    compare-and-set write and notify only if the claim succeeded
//!
//! Both writes are conditional on the expiry the scan observed, so a scan
//! racing with a renewal turns into a no-op instead of undoing it.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::entity::{EXPIRING_WINDOW, LifecycleEntity, LifecycleStatus, Milestone};
use crate::alerts::AlertManager;
use crate::notify::{DispatchReport, Notification, Severity};
use crate::storage::{EntityStore, StorageError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("entity storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("unknown entity '{0}'")]
    NotFound(String),

    #[error("renewal of '{id}' rejected: new expiry {expires_at} is not in the future")]
    ExpiryNotInFuture {
        id: String,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub entity_id: String,
    pub from: LifecycleStatus,
    pub to: LifecycleStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneNotice {
    pub entity_id: String,
    pub milestone: Milestone,
    pub dispatch: DispatchReport,
}

/// What one scan did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scanned: usize,
    pub transitions: Vec<StatusTransition>,
    pub notices: Vec<MilestoneNotice>,

    /// Entities whose record changed under the scan (renewed, removed)
    pub stale: Vec<String>,

    /// Per-entity storage errors; other entities are still processed
    pub errors: Vec<String>,
}

impl ScanSummary {
    pub fn notices_for(&self, milestone: Milestone) -> usize {
        self.notices
            .iter()
            .filter(|n| n.milestone == milestone)
            .count()
    }

    pub fn failed_deliveries(&self) -> usize {
        self.notices.iter().map(|n| n.dispatch.failed.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueEntity {
    pub id: String,
    pub label: String,
    pub status: LifecycleStatus,
    pub expires_at: DateTime<Utc>,

    /// Status the entity moves to at its next threshold
    pub next_status: LifecycleStatus,
    pub transition_at: DateTime<Utc>,
}

/// Counts per status plus the entities about to change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleSummary {
    pub total: usize,
    pub active: usize,
    pub expiring: usize,
    pub archived: usize,
    pub due_soon: Vec<DueEntity>,
}

pub struct LifecycleScheduler {
    entities: Arc<dyn EntityStore>,
    alerts: Arc<AlertManager>,
}

impl LifecycleScheduler {
    pub fn new(entities: Arc<dyn EntityStore>, alerts: Arc<AlertManager>) -> Self {
        Self { entities, alerts }
    }

    pub async fn scan(&self) -> Result<ScanSummary, LifecycleError> {
        self.scan_at(Utc::now()).await
    }

    /// Scan everything the store reports as due, as of `now`
    #[instrument(skip(self))]
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<ScanSummary, LifecycleError> {
        let entities = self.entities.list_due_for_check().await?;
        let summary = self.scan_entities(entities, now).await;

        info!(
            "lifecycle scan: {} scanned, {} transition(s), {} notice(s), {} error(s)",
            summary.scanned,
            summary.transitions.len(),
            summary.notices.len(),
            summary.errors.len()
        );

        Ok(summary)
    }

    /// Scan an explicit collection of entities
    pub async fn scan_entities(
        &self,
        entities: Vec<LifecycleEntity>,
        now: DateTime<Utc>,
    ) -> ScanSummary {
        let mut summary = ScanSummary::default();

        for entity in entities {
            summary.scanned += 1;
            if let Err(e) = self.process(entity.clone(), now, &mut summary).await {
                warn!("lifecycle check of '{}' failed: {e}", entity.id);
                summary.errors.push(format!("{}: {e}", entity.id));
            }
        }

        summary
    }

    #[instrument(skip_all, fields(entity = %entity.id))]
    async fn process(
        &self,
        mut entity: LifecycleEntity,
        now: DateTime<Utc>,
        summary: &mut ScanSummary,
    ) -> Result<(), StorageError> {
        let next = entity.next_status(now);

        if next != entity.status {
            let written = self
                .entities
                .update_status(&entity.id, entity.expires_at, next, now)
                .await?;

            if !written {
                debug!("'{}' changed during scan, skipping", entity.id);
                summary.stale.push(entity.id.clone());
                return Ok(());
            }

            info!("'{}' moved from {} to {next}", entity.id, entity.status);
            summary.transitions.push(StatusTransition {
                entity_id: entity.id.clone(),
                from: entity.status,
                to: next,
            });
            entity.status = next;
        }

        for milestone in entity.pending_milestones(now) {
            let claimed = self
                .entities
                .claim_milestone(&entity.id, entity.expires_at, milestone, now)
                .await?;

            if !claimed {
                debug!("{milestone} for '{}' already claimed", entity.id);
                continue;
            }
            entity.mark_sent(milestone, now);

            info!("sending {milestone} notice for '{}'", entity.id);
            let dispatch = self.send_notice(&entity, milestone, now).await;
            summary.notices.push(MilestoneNotice {
                entity_id: entity.id.clone(),
                milestone,
                dispatch,
            });
        }

        Ok(())
    }

    async fn send_notice(
        &self,
        entity: &LifecycleEntity,
        milestone: Milestone,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let (severity, subject, body) = notice_text(entity, milestone, now);

        let mut report = self
            .alerts
            .notify(Notification::admin(severity, subject.clone(), body.clone()))
            .await;

        if let Some(recipient) = &entity.recipient {
            report.extend(
                self.alerts
                    .notify(Notification::end_user(
                        recipient.clone(),
                        severity,
                        subject,
                        body,
                    ))
                    .await,
            );
        }

        report
    }

    /// Insert or replace an entity as received from the owning system
    #[instrument(skip_all, fields(entity = %entity.id))]
    pub async fn register(&self, entity: LifecycleEntity) -> Result<LifecycleEntity, LifecycleError> {
        self.entities.upsert_entity(&entity).await?;
        info!("'{}' registered, expires {}", entity.id, entity.expires_at);
        Ok(entity)
    }

    pub async fn renew(
        &self,
        id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<LifecycleEntity, LifecycleError> {
        self.renew_at(id, new_expiry, Utc::now()).await
    }

    /// External renewal: status back to active, every milestone re-armed
    #[instrument(skip(self))]
    pub async fn renew_at(
        &self,
        id: &str,
        new_expiry: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<LifecycleEntity, LifecycleError> {
        if new_expiry <= now {
            return Err(LifecycleError::ExpiryNotInFuture {
                id: id.to_string(),
                expires_at: new_expiry,
            });
        }

        let renewed = self
            .entities
            .renew_entity(id, new_expiry, now)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;

        info!("'{id}' renewed until {new_expiry}");
        Ok(renewed)
    }

    /// Counts per status and entities crossing a threshold within `horizon`
    pub async fn summary(
        &self,
        now: DateTime<Utc>,
        horizon: TimeDelta,
    ) -> Result<LifecycleSummary, LifecycleError> {
        let entities = self.entities.list_entities().await?;
        let mut summary = LifecycleSummary {
            total: entities.len(),
            ..Default::default()
        };

        for entity in entities {
            match entity.status {
                LifecycleStatus::Active => summary.active += 1,
                LifecycleStatus::Expiring => summary.expiring += 1,
                LifecycleStatus::Archived => summary.archived += 1,
            }

            let next = match entity.status {
                LifecycleStatus::Active => Some((
                    LifecycleStatus::Expiring,
                    entity
                        .expires_at
                        .checked_sub_signed(EXPIRING_WINDOW)
                        .unwrap_or(DateTime::<Utc>::MIN_UTC),
                )),
                LifecycleStatus::Expiring => Some((LifecycleStatus::Archived, entity.expires_at)),
                LifecycleStatus::Archived => None,
            };

            let Some((next_status, transition_at)) = next else {
                continue;
            };

            if transition_at - now <= horizon {
                summary.due_soon.push(DueEntity {
                    id: entity.id,
                    label: entity.label,
                    status: entity.status,
                    expires_at: entity.expires_at,
                    next_status,
                    transition_at,
                });
            }
        }

        summary.due_soon.sort_by_key(|due| due.transition_at);
        Ok(summary)
    }
}

fn notice_text(
    entity: &LifecycleEntity,
    milestone: Milestone,
    now: DateTime<Utc>,
) -> (Severity, String, String) {
    let expires = entity.expires_at.format("%Y-%m-%d %H:%M UTC");
    match milestone {
        Milestone::SevenDayWarning => (
            Severity::Warning,
            format!("{} expires in {} day(s)", entity.label, entity.remaining(now).num_days()),
            format!("{} ({}) expires on {expires}.", entity.label, entity.id),
        ),
        Milestone::DayWarning => (
            Severity::Warning,
            format!("{} expires within 24 hours", entity.label),
            format!(
                "{} ({}) expires on {expires}. Renew now to keep it active.",
                entity.label, entity.id
            ),
        ),
        Milestone::PostExpiry => (
            Severity::Critical,
            format!("{} has expired", entity.label),
            format!(
                "{} ({}) expired on {expires} and has been archived.",
                entity.label, entity.id
            ),
        ),
    }
}
