use crate::types::{StatusUpdate, SystemStatus};
use arbitros_integration::time::now_ms;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The §9 "single SystemStatus owner task": the only writer of [`SystemStatus`]. Every other
/// component sends [`StatusUpdate`] messages rather than touching shared state directly, so
/// there is exactly one place health and run-state get reconciled into a coherent view.
pub struct SystemStatusOwner {
    current: Arc<RwLock<Arc<SystemStatus>>>,
    degraded: RwLock<HashMap<String, String>>,
}

#[derive(Clone)]
pub struct SystemStatusHandle {
    current: Arc<RwLock<Arc<SystemStatus>>>,
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl SystemStatusHandle {
    pub fn current(&self) -> Arc<SystemStatus> {
        self.current.read().clone()
    }

    /// Sends an update to the owner task. Never blocks; the channel is unbounded because
    /// status updates are low-frequency administrative events, not hot-path traffic.
    pub fn send(&self, update: StatusUpdate) {
        let _ = self.tx.send(update);
    }
}

impl SystemStatusOwner {
    /// Spawns the owner task and returns a cloneable handle for every other component to read
    /// the current status and submit updates.
    pub fn spawn(cancel: CancellationToken) -> (SystemStatusHandle, tokio::task::JoinHandle<()>) {
        let current = Arc::new(RwLock::new(Arc::new(SystemStatus::default())));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let owner = SystemStatusOwner { current: current.clone(), degraded: RwLock::new(HashMap::new()) };
        let handle = SystemStatusHandle { current, tx };

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    update = rx.recv() => {
                        match update {
                            Some(update) => owner.apply(update),
                            None => return,
                        }
                    }
                }
            }
        });

        (handle, task)
    }

    fn apply(&self, update: StatusUpdate) {
        let mut next = (**self.current.read()).clone();
        match update {
            StatusUpdate::SetAutoTrading(enabled) => next.auto_trading_enabled = enabled,
            StatusUpdate::SetEvolutionEnabled(enabled) => next.evolution_enabled = enabled,
            StatusUpdate::SetQuantitativeRunning(running) => next.quantitative_running = running,
            StatusUpdate::SetGeneration(generation) => next.current_generation = generation,
            StatusUpdate::SetStrategyCounts { total, running } => {
                next.total_strategies = total;
                next.running_strategies = running;
            }
            StatusUpdate::SetHealth { component, reason } => {
                let mut degraded = self.degraded.write();
                match reason {
                    Some(reason) => {
                        degraded.insert(component.clone(), reason);
                    }
                    None => {
                        degraded.remove(&component);
                    }
                }
                next.health = health_summary(&degraded);
            }
        }
        next.last_update = now_ms();
        *self.current.write() = Arc::new(next);
    }
}

fn health_summary(degraded: &HashMap<String, String>) -> String {
    if degraded.is_empty() {
        return "ok".to_string();
    }
    let mut parts: Vec<String> = degraded.iter().map(|(component, reason)| format!("{component} {reason}")).collect();
    parts.sort();
    format!("degraded: {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn toggling_auto_trading_is_visible_to_every_handle() {
        let cancel = CancellationToken::new();
        let (handle, task) = SystemStatusOwner::spawn(cancel.clone());
        assert!(!handle.current().auto_trading_enabled);

        handle.send(StatusUpdate::SetAutoTrading(true));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(handle.current().auto_trading_enabled);

        cancel.cancel();
        let _ = task.await;
    }

    #[tokio::test]
    async fn health_reflects_the_most_recent_degradation_per_component() {
        let cancel = CancellationToken::new();
        let (handle, task) = SystemStatusOwner::spawn(cancel.clone());

        handle.send(StatusUpdate::SetHealth { component: "binance".to_string(), reason: Some("auth_failed".to_string()) });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(handle.current().health.contains("binance"));

        handle.send(StatusUpdate::SetHealth { component: "binance".to_string(), reason: None });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(handle.current().health, "ok");

        cancel.cancel();
        let _ = task.await;
    }
}
