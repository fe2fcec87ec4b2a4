//! Statistics polling

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::peer::{PeerConnection, SessionObserver};

/// Periodic `get_stats` poll; stops when dropped
pub struct StatsPoll {
    handle: JoinHandle<()>,
}

impl StatsPoll {
    pub fn start(
        peer: Arc<dyn PeerConnection>,
        observer: Arc<dyn SessionObserver>,
        period: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                match peer.get_stats().await {
                    Ok(stats) => observer.on_stats(&stats),
                    Err(e) => debug!("Stats poll failed: {}", e),
                }
            }
        });
        Self { handle }
    }
}

impl Drop for StatsPoll {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
