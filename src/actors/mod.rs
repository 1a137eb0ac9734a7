//! Long-running loops of the hub
//!
//! Each actor runs as an independent tokio task, controlled through a
//! cloneable handle.
//!
//! ```text
//!              ┌──────────────┐
//!              │  Hub (main)  │
//!              └──────┬───────┘
//!          spawns     │
//!        ┌────────────┴─────────────┐
//!        ▼                          ▼
//! ┌──────────────┐          ┌────────────────┐
//! │ MonitorActor │          │ LifecycleActor │
//! └──────┬───────┘          └───────┬────────┘
//!        │ SystemMonitor            │ LifecycleScheduler
//!        └──────────┬───────────────┘
//!                   ▼
//!             AlertManager ──▶ Notifier ──▶ channels
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control messages
//! 2. **Events**: health reports are broadcast for fan-out
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod lifecycle;
pub mod messages;
pub mod monitor;

pub use lifecycle::LifecycleHandle;
pub use monitor::{MonitorHandle, RetentionPolicy};
