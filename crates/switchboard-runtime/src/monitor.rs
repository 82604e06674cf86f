//! Background task that rescans the plugin directory.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::manager::{PluginManager, WeakPluginManager};

/// Fixed-delay scan loop.
///
/// Scans run on the blocking pool, one at a time: the delay starts when a
/// scan finishes, so runs never overlap. The first scan starts immediately.
pub struct PluginMonitor {
    token: CancellationToken,
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl PluginMonitor {
    pub(crate) fn spawn(handle: &Handle, manager: &PluginManager, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let wake = Arc::new(Notify::new());
        let task = run(manager.downgrade(), interval, token.clone(), wake.clone());
        Self {
            token,
            wake,
            handle: handle.spawn(task),
        }
    }

    /// Starts the next scan now instead of waiting out the delay.
    pub fn run_now(&self) {
        self.wake.notify_one();
    }

    /// Stops the loop after the scan in progress, if any.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.handle.is_finished()
    }
}

async fn run(
    manager: WeakPluginManager,
    interval: Duration,
    token: CancellationToken,
    wake: Arc<Notify>,
) {
    debug!(interval_ms = interval.as_millis() as u64, "Plugin monitor running");
    loop {
        if token.is_cancelled() {
            break;
        }
        let Some(current) = manager.upgrade() else {
            break;
        };

        match tokio::task::spawn_blocking(move || current.scan()).await {
            Ok(summary) => trace!(?summary, "Plugin monitor pass complete"),
            Err(e) => error!(error = %e, "Plugin scan task panicked"),
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = wake.notified() => trace!("Plugin scan requested"),
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Plugin monitor stopped");
}
