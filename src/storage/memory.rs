//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Deployments that do not care about restarts
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited history**: Only the most recent reports are kept

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{BackendHealth, EntityStore, ReportHistory, SettingsBackend, StorageBackend};
use super::error::StorageResult;
use super::schema::HealthReportRow;
use crate::lifecycle::{LifecycleEntity, LifecycleStatus, Milestone};
use crate::settings::MonitoringSettings;

/// Maximum health reports kept in memory
const MAX_REPORTS: usize = 1000;

#[derive(Default)]
struct State {
    settings: Option<MonitoringSettings>,
    entities: BTreeMap<String, LifecycleEntity>,
    reports: VecDeque<HealthReportRow>,
}

/// In-memory storage backend
///
/// Every operation takes the single lock once, so conditional writes are
/// atomic with respect to each other.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsBackend for MemoryBackend {
    async fn load_settings(&self) -> StorageResult<Option<MonitoringSettings>> {
        Ok(self.state.read().await.settings.clone())
    }

    async fn save_settings(&self, settings: &MonitoringSettings) -> StorageResult<()> {
        self.state.write().await.settings = Some(settings.clone());
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryBackend {
    async fn upsert_entity(&self, entity: &LifecycleEntity) -> StorageResult<()> {
        self.state
            .write()
            .await
            .entities
            .insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn get_entity(&self, id: &str) -> StorageResult<Option<LifecycleEntity>> {
        Ok(self.state.read().await.entities.get(id).cloned())
    }

    async fn list_entities(&self) -> StorageResult<Vec<LifecycleEntity>> {
        let mut entities: Vec<_> = self.state.read().await.entities.values().cloned().collect();
        entities.sort_by_key(|e| e.expires_at);
        Ok(entities)
    }

    async fn list_due_for_check(&self) -> StorageResult<Vec<LifecycleEntity>> {
        let mut entities: Vec<_> = self
            .state
            .read()
            .await
            .entities
            .values()
            .filter(|e| e.needs_check())
            .cloned()
            .collect();
        entities.sort_by_key(|e| e.expires_at);
        Ok(entities)
    }

    async fn update_status(
        &self,
        id: &str,
        expected_expiry: DateTime<Utc>,
        status: LifecycleStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        let Some(entity) = state.entities.get_mut(id) else {
            return Ok(false);
        };
        if entity.expires_at != expected_expiry || entity.status > status {
            return Ok(false);
        }

        entity.status = status;
        entity.updated_at = at;
        Ok(true)
    }

    async fn claim_milestone(
        &self,
        id: &str,
        expected_expiry: DateTime<Utc>,
        milestone: Milestone,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        match state.entities.get_mut(id) {
            Some(entity) if entity.expires_at == expected_expiry => {
                Ok(entity.mark_sent(milestone, at))
            }
            _ => Ok(false),
        }
    }

    async fn renew_entity(
        &self,
        id: &str,
        new_expiry: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<LifecycleEntity>> {
        let mut state = self.state.write().await;
        Ok(state.entities.get_mut(id).map(|entity| {
            entity.renew(new_expiry, at);
            entity.clone()
        }))
    }
}

#[async_trait]
impl ReportHistory for MemoryBackend {
    async fn insert_report(&self, row: HealthReportRow) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.reports.push_back(row);
        while state.reports.len() > MAX_REPORTS {
            state.reports.pop_front();
        }
        Ok(())
    }

    async fn query_latest_reports(&self, limit: usize) -> StorageResult<Vec<HealthReportRow>> {
        let state = self.state.read().await;
        Ok(state.reports.iter().rev().take(limit).cloned().collect())
    }

    async fn cleanup_old_reports(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let count_before = state.reports.len();
        state.reports.retain(|r| r.checked_at >= before);
        let deleted = count_before - state.reports.len();
        debug!("in-memory cleanup removed {} reports", deleted);
        Ok(deleted)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn health_check(&self) -> StorageResult<BackendHealth> {
        let state = self.state.read().await;
        let mut metadata = HashMap::new();
        metadata.insert("backend".to_string(), "memory".to_string());
        metadata.insert("entities".to_string(), state.entities.len().to_string());
        metadata.insert("reports".to_string(), state.reports.len().to_string());

        Ok(BackendHealth {
            healthy: true,
            message: "In-memory backend operational".to_string(),
            metadata,
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let state = self.state.read().await;
        Ok(format!(
            "In-memory: {} entities, {} reports (max {})",
            state.entities.len(),
            state.reports.len(),
            MAX_REPORTS
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
