//! Time-bounded entities, their status and milestone notifications

mod entity;
mod scheduler;

pub use entity::{
    EXPIRING_WINDOW, FINAL_WARNING_WINDOW, LifecycleEntity, LifecycleStatus, Milestone,
};
pub use scheduler::{
    DueEntity, LifecycleError, LifecycleScheduler, LifecycleSummary, MilestoneNotice,
    ScanSummary, StatusTransition,
};
