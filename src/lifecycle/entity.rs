//! Time-bounded entities and their three-state status

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Remaining time at or below which an entity counts as expiring
pub const EXPIRING_WINDOW: TimeDelta = TimeDelta::days(7);

/// Remaining time at or below which the 24-hour warning is due
pub const FINAL_WARNING_WINDOW: TimeDelta = TimeDelta::hours(24);

/// Lifecycle status, ordered: `Active < Expiring < Archived`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Active,
    Expiring,
    Archived,
}

impl LifecycleStatus {
    /// Status implied by the time left until expiry
    pub fn from_remaining(remaining: TimeDelta) -> Self {
        if remaining < TimeDelta::zero() {
            LifecycleStatus::Archived
        } else if remaining <= EXPIRING_WINDOW {
            LifecycleStatus::Expiring
        } else {
            LifecycleStatus::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Expiring => "expiring",
            LifecycleStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LifecycleStatus::Active),
            "expiring" => Ok(LifecycleStatus::Expiring),
            "archived" => Ok(LifecycleStatus::Archived),
            other => Err(format!("unknown lifecycle status '{other}'")),
        }
    }
}

/// One-time notifications tied to a threshold crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Seven days or less remain
    SevenDayWarning,
    /// Twenty-four hours or less remain
    DayWarning,
    /// The entity expired and was archived
    PostExpiry,
}

impl Milestone {
    /// Evaluation order within one scan
    pub const ALL: [Milestone; 3] = [
        Milestone::SevenDayWarning,
        Milestone::DayWarning,
        Milestone::PostExpiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::SevenDayWarning => "warning_7d",
            Milestone::DayWarning => "warning_24h",
            Milestone::PostExpiry => "post_expiry",
        }
    }

    /// Whether the milestone's condition holds for the given remaining time
    pub fn is_due(&self, remaining: TimeDelta) -> bool {
        let not_expired = remaining >= TimeDelta::zero();
        match self {
            Milestone::SevenDayWarning => not_expired && remaining <= EXPIRING_WINDOW,
            Milestone::DayWarning => not_expired && remaining <= FINAL_WARNING_WINDOW,
            Milestone::PostExpiry => !not_expired,
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource with an expiry, e.g. a client subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEntity {
    pub id: String,

    /// Human-readable name used in notifications
    pub label: String,

    /// End-user address for milestone notices, if known
    pub recipient: Option<String>,

    pub expires_at: DateTime<Utc>,
    pub status: LifecycleStatus,

    pub warning_7d_sent_at: Option<DateTime<Utc>>,
    pub warning_24h_sent_at: Option<DateTime<Utc>>,
    pub expired_notice_sent_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl LifecycleEntity {
    pub fn new(id: impl Into<String>, label: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            recipient: None,
            expires_at,
            status: LifecycleStatus::Active,
            warning_7d_sent_at: None,
            warning_24h_sent_at: None,
            expired_notice_sent_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        self.expires_at - now
    }

    /// Next status given the clock, never moving backwards
    pub fn next_status(&self, now: DateTime<Utc>) -> LifecycleStatus {
        self.status.max(LifecycleStatus::from_remaining(self.remaining(now)))
    }

    pub fn sent_at(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        match milestone {
            Milestone::SevenDayWarning => self.warning_7d_sent_at,
            Milestone::DayWarning => self.warning_24h_sent_at,
            Milestone::PostExpiry => self.expired_notice_sent_at,
        }
    }

    /// Record a milestone as sent; a timestamp is only ever set once
    pub fn mark_sent(&mut self, milestone: Milestone, at: DateTime<Utc>) -> bool {
        let slot = match milestone {
            Milestone::SevenDayWarning => &mut self.warning_7d_sent_at,
            Milestone::DayWarning => &mut self.warning_24h_sent_at,
            Milestone::PostExpiry => &mut self.expired_notice_sent_at,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(at);
        self.updated_at = at;
        true
    }

    /// Milestones whose condition holds and which were not sent yet
    pub fn pending_milestones(&self, now: DateTime<Utc>) -> Vec<Milestone> {
        let remaining = self.remaining(now);
        Milestone::ALL
            .into_iter()
            .filter(|m| self.sent_at(*m).is_none() && m.is_due(remaining))
            .collect()
    }

    /// External renewal: new expiry, status reset, all milestones re-armed
    pub fn renew(&mut self, new_expiry: DateTime<Utc>, at: DateTime<Utc>) {
        self.expires_at = new_expiry;
        self.status = LifecycleStatus::Active;
        self.warning_7d_sent_at = None;
        self.warning_24h_sent_at = None;
        self.expired_notice_sent_at = None;
        self.updated_at = at;
    }

    /// Whether the scheduler still has work for this entity
    pub fn needs_check(&self) -> bool {
        self.status != LifecycleStatus::Archived || self.expired_notice_sent_at.is_none()
    }
}
