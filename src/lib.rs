pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod lifecycle;
pub mod monitors;
pub mod notify;
pub mod settings;
pub mod storage;
pub mod util;
