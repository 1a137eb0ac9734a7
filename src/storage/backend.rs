//! Storage capability traits
//!
//! The core consumes persistence through three narrow capabilities, one per
//! collaborator it talks to:
//!
//! - [`SettingsBackend`]: the persisted `MonitoringSettings` record
//! - [`EntityStore`]: time-bounded lifecycle entities
//! - [`ReportHistory`]: compact history of health reports
//!
//! plus [`StorageBackend`] for maintenance (health, stats, shutdown).
//! Concrete backends implement all four; [`Storage`](super::Storage) bundles
//! them behind shared trait objects.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::HealthReportRow;
use crate::lifecycle::{LifecycleEntity, LifecycleStatus, Milestone};
use crate::settings::MonitoringSettings;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct BackendHealth {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Persisted monitoring settings (single current version)
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Load the persisted settings record, `None` if never written
    async fn load_settings(&self) -> StorageResult<Option<MonitoringSettings>>;

    /// Replace the persisted settings record
    async fn save_settings(&self, settings: &MonitoringSettings) -> StorageResult<()>;
}

/// Lifecycle entity persistence
///
/// Writes issued by the scheduler are conditional on the entity's
/// `expires_at` as observed when the scan loaded it. A renewal changes the
/// expiry, which turns every in-flight write of an older scan into a no-op.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert or replace an entity (owned by the business layer)
    async fn upsert_entity(&self, entity: &LifecycleEntity) -> StorageResult<()>;

    /// Fetch a single entity
    async fn get_entity(&self, id: &str) -> StorageResult<Option<LifecycleEntity>>;

    /// All entities, ordered by expiry
    async fn list_entities(&self) -> StorageResult<Vec<LifecycleEntity>>;

    /// Entities the scheduler still has work for
    ///
    /// Everything that is not archived, plus archived entities whose
    /// post-expiry notice has not been sent yet.
    async fn list_due_for_check(&self) -> StorageResult<Vec<LifecycleEntity>>;

    /// Persist a status transition
    ///
    /// Returns `false` when the entity is gone, its expiry no longer
    /// matches `expected_expiry`, or its stored status is already further
    /// along than `status`.
    async fn update_status(
        &self,
        id: &str,
        expected_expiry: DateTime<Utc>,
        status: LifecycleStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Atomically set a milestone's "sent" timestamp if it is still unset
    ///
    /// Returns `true` only for the caller that actually set it.
    async fn claim_milestone(
        &self,
        id: &str,
        expected_expiry: DateTime<Utc>,
        milestone: Milestone,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Apply a renewal: new expiry, status back to active, milestones cleared
    async fn renew_entity(
        &self,
        id: &str,
        new_expiry: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<LifecycleEntity>>;
}

/// History of completed monitoring cycles
#[async_trait]
pub trait ReportHistory: Send + Sync {
    /// Append one report
    async fn insert_report(&self, row: HealthReportRow) -> StorageResult<()>;

    /// Most recent reports, newest first
    async fn query_latest_reports(&self, limit: usize) -> StorageResult<Vec<HealthReportRow>>;

    /// Delete reports older than `before`, returning how many were removed
    ///
    /// Used for retention policy enforcement.
    async fn cleanup_old_reports(&self, before: DateTime<Utc>) -> StorageResult<usize>;
}

/// Backend maintenance operations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<BackendHealth>;

    /// Human-readable stats about the backend
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
