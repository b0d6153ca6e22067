use arbitros_instrument::ExchangeId;
use arbitros_integration::{Priority, RateLimiter};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::time::Instant;

/// Idle threshold after which a pooled connection is eligible for reaping (§4.1).
pub const IDLE_REAP_AFTER: Duration = Duration::from_secs(5 * 60);

/// Tracks per-exchange rate limiters and connection last-use times so the pool can reap
/// sockets that have sat idle for longer than [`IDLE_REAP_AFTER`]. Reaping here only means
/// forgetting the last-use bookkeeping for a connection slot; concrete clients decide what
/// "closing a socket" means for their own transport.
pub struct ExchangePool {
    limiters: HashMap<ExchangeId, RateLimiter>,
    last_used: Arc<Mutex<HashMap<ExchangeId, Instant>>>,
}

impl ExchangePool {
    pub fn new(rate_limits: impl IntoIterator<Item = (ExchangeId, usize)>) -> Self {
        let limiters = rate_limits
            .into_iter()
            .map(|(id, per_sec)| (id, RateLimiter::new(per_sec.max(1), Duration::from_secs(1))))
            .collect();

        Self {
            limiters,
            last_used: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquire a pacing permit for `exchange` before issuing a request, and mark it as
    /// recently used so the reaper leaves its connection alone.
    pub async fn acquire(&self, exchange: ExchangeId, priority: Priority) {
        if let Some(limiter) = self.limiters.get(&exchange) {
            limiter.acquire(priority).await;
        }
        self.last_used.lock().insert(exchange, Instant::now());
    }

    /// Returns the exchanges whose connections have been idle past [`IDLE_REAP_AFTER`].
    pub fn idle_exchanges(&self) -> Vec<ExchangeId> {
        let now = Instant::now();
        self.last_used
            .lock()
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > IDLE_REAP_AFTER)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Spawn a background task that periodically clears idle-connection bookkeeping,
    /// mirroring §4.1's "EA pool closes sockets that have been unused for > 5 min".
    pub fn spawn_idle_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                for exchange in pool.idle_exchanges() {
                    tracing::debug!(?exchange, "reaping idle exchange connection");
                    pool.last_used.lock().remove(&exchange);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn freshly_acquired_exchange_is_not_idle() {
        let pool = ExchangePool::new([(ExchangeId::Binance, 10)]);
        pool.acquire(ExchangeId::Binance, Priority::Normal).await;
        assert!(pool.idle_exchanges().is_empty());
    }
}
