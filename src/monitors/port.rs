//! Port-liveness check

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::trace;

#[async_trait]
pub trait PortChecker: Send + Sync {
    async fn is_port_open(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Open-and-close TCP connect
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPortChecker;

#[async_trait]
impl PortChecker for TcpPortChecker {
    async fn is_port_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                trace!("{host}:{port} refused: {e}");
                false
            }
            Err(_) => {
                trace!("{host}:{port} connect timed out");
                false
            }
        }
    }
}
