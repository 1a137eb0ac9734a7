//! Storage backends for settings, lifecycle entities and health history
//!
//! ## Design
//!
//! - **Capability traits**: the core only sees the narrow trait it needs
//!   ([`SettingsBackend`], [`EntityStore`], [`ReportHistory`])
//! - **Async**: all operations are async for compatibility with the Tokio loops
//! - **Conditional writes**: entity writes are guarded by the expiry the
//!   writer observed, milestone claims are compare-and-set
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database, survives restarts
//! - **In-Memory**: no persistence, for tests or throwaway deployments
//!
//! ## Usage
//!
//! ```no_run
//! use lifeguard::storage::{Storage, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Storage::from_backend(SqliteBackend::new("./lifeguard.db").await?);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{BackendHealth, EntityStore, ReportHistory, SettingsBackend, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::HealthReportRow;

/// All storage capabilities, sharing one underlying backend
#[derive(Clone)]
pub struct Storage {
    pub settings: Arc<dyn SettingsBackend>,
    pub entities: Arc<dyn EntityStore>,
    pub history: Arc<dyn ReportHistory>,
    pub backend: Arc<dyn StorageBackend>,
}

impl Storage {
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: SettingsBackend + EntityStore + ReportHistory + StorageBackend + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            settings: backend.clone(),
            entities: backend.clone(),
            history: backend.clone(),
            backend,
        }
    }

    /// In-memory storage, nothing survives the process
    pub fn in_memory() -> Self {
        Self::from_backend(memory::MemoryBackend::new())
    }
}
