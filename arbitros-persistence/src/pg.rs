use crate::{
    channel::WriteChannel,
    error::PersistenceError,
    records::{BalanceHistoryRecord, OperationLogRecord, OperationRecord, StrategyRecord, TradingSignalRecord},
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default bound on the hot-path write queue (§4.12).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Owns the Postgres pool and the bounded write channel, and drives the writer task that
/// drains it. `queue` is the handle every hot-path component clones to enqueue writes.
pub struct PersistenceLayer {
    pool: PgPool,
    queue: WriteChannel,
}

impl PersistenceLayer {
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(dsn)
            .await
            .map_err(|e| PersistenceError::unavailable(format!("connect failed: {e}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| PersistenceError::unavailable(format!("migration failed: {e}")))?;

        Ok(Self {
            pool,
            queue: WriteChannel::new(DEFAULT_CHANNEL_CAPACITY),
        })
    }

    pub fn queue(&self) -> WriteChannel {
        self.queue.clone()
    }

    /// Spawn the dedicated writer task that drains `queue` and applies each record in its own
    /// short transaction, continuing past individual failures (they are logged, not
    /// propagated — a failed write must never stall the hot path that produced it).
    pub fn spawn_writer(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let pool = self.pool.clone();
        let queue = self.queue.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        for record in queue.drain() {
                            if let Err(err) = apply(&pool, &record).await {
                                tracing::warn!(%err, "final flush write failed");
                            }
                        }
                        return;
                    }
                    batch = queue.recv_batch() => {
                        for record in batch {
                            if let Err(err) = apply(&pool, &record).await {
                                tracing::warn!(%err, "persistence write failed");
                            }
                        }
                    }
                }
            }
        })
    }

    pub async fn list_strategies(&self, tier: Option<&str>, limit: i64) -> Result<Vec<StrategyRecord>, PersistenceError> {
        let rows = match tier {
            Some(tier) => sqlx::query_as::<_, StrategyRecord>(
                "SELECT * FROM strategies WHERE tier = $1 ORDER BY final_score DESC LIMIT $2",
            )
            .bind(tier)
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as::<_, StrategyRecord>(
                "SELECT * FROM strategies ORDER BY final_score DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
        };
        rows.map_err(|e| PersistenceError::unavailable(e.to_string()))
    }

    pub async fn get_strategy(&self, id: &str) -> Result<Option<StrategyRecord>, PersistenceError> {
        sqlx::query_as::<_, StrategyRecord>("SELECT * FROM strategies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::unavailable(e.to_string()))
    }

    pub async fn get_signals(&self, limit: i64) -> Result<Vec<TradingSignalRecord>, PersistenceError> {
        sqlx::query_as::<_, TradingSignalRecord>(
            "SELECT * FROM trading_signals ORDER BY generated_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::unavailable(e.to_string()))
    }

    pub async fn get_logs(&self, category: Option<&str>, limit: i64) -> Result<Vec<OperationLogRecord>, PersistenceError> {
        let rows = match category {
            Some(category) => sqlx::query_as::<_, OperationLogRecord>(
                "SELECT category, message, at FROM operation_logs WHERE category = $1 ORDER BY at DESC LIMIT $2",
            )
            .bind(category)
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as::<_, OperationLogRecord>(
                "SELECT category, message, at FROM operation_logs ORDER BY at DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await,
        };
        rows.map_err(|e| PersistenceError::unavailable(e.to_string()))
    }

    pub async fn get_account_info(&self) -> Result<Vec<BalanceHistoryRecord>, PersistenceError> {
        sqlx::query_as::<_, BalanceHistoryRecord>(
            "SELECT DISTINCT ON (exchange_id, asset) exchange_id, asset, total, available, locked, observed_at
             FROM balance_history ORDER BY exchange_id, asset, observed_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::unavailable(e.to_string()))
    }
}

async fn apply(pool: &PgPool, record: &OperationRecord) -> Result<(), sqlx::Error> {
    match record {
        OperationRecord::Strategy(r) => {
            sqlx::query(
                "INSERT INTO strategies (id, name, strategy_type, symbol, tier, enabled, parent_ids,
                 generation, cycle, creation_method, last_param_change_at, validation_trades_since_change,
                 final_score, rolling_win_rate, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
                 ON CONFLICT (id) DO UPDATE SET tier = EXCLUDED.tier, enabled = EXCLUDED.enabled,
                 last_param_change_at = EXCLUDED.last_param_change_at,
                 validation_trades_since_change = EXCLUDED.validation_trades_since_change,
                 final_score = EXCLUDED.final_score, rolling_win_rate = EXCLUDED.rolling_win_rate",
            )
            .bind(&r.id).bind(&r.name).bind(&r.strategy_type).bind(&r.symbol).bind(&r.tier)
            .bind(r.enabled).bind(&r.parent_ids).bind(r.generation).bind(r.cycle)
            .bind(&r.creation_method).bind(r.last_param_change_at).bind(r.validation_trades_since_change)
            .bind(r.final_score).bind(r.rolling_win_rate).bind(r.created_at)
            .execute(pool).await?;
        }
        OperationRecord::StrategyParameter(r) => {
            sqlx::query(
                "INSERT INTO strategy_parameters (strategy_id, name, value, min_value, max_value, step, value_type)
                 VALUES ($1,$2,$3,$4,$5,$6,$7)
                 ON CONFLICT (strategy_id, name) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(&r.strategy_id).bind(&r.name).bind(r.value).bind(r.min_value)
            .bind(r.max_value).bind(r.step).bind(&r.value_type)
            .execute(pool).await?;
        }
        OperationRecord::TradingSignal(r) => {
            sqlx::query(
                "INSERT INTO trading_signals (id, strategy_id, symbol, side, price, quantity, confidence,
                 generated_at, executed, trade_type, cycle_id, realized_pnl)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
            )
            .bind(&r.id).bind(&r.strategy_id).bind(&r.symbol).bind(&r.side).bind(r.price)
            .bind(r.quantity).bind(r.confidence).bind(r.generated_at).bind(r.executed)
            .bind(&r.trade_type).bind(&r.cycle_id).bind(r.realized_pnl)
            .execute(pool).await?;
        }
        OperationRecord::TradeCycle(r) => {
            sqlx::query(
                "INSERT INTO trade_cycles (cycle_id, strategy_id, open_signal_id, close_signal_id,
                 open_time, close_time, buy_price, sell_price, quantity, pnl, holding_minutes, status)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
                 ON CONFLICT (cycle_id) DO UPDATE SET close_signal_id = EXCLUDED.close_signal_id,
                 close_time = EXCLUDED.close_time, sell_price = EXCLUDED.sell_price,
                 pnl = EXCLUDED.pnl, holding_minutes = EXCLUDED.holding_minutes, status = EXCLUDED.status",
            )
            .bind(&r.cycle_id).bind(&r.strategy_id).bind(&r.open_signal_id).bind(&r.close_signal_id)
            .bind(r.open_time).bind(r.close_time).bind(r.buy_price).bind(r.sell_price)
            .bind(r.quantity).bind(r.pnl).bind(r.holding_minutes).bind(&r.status)
            .execute(pool).await?;
        }
        OperationRecord::Simulation(r) => {
            sqlx::query(
                "INSERT INTO simulation_history (strategy_id, run_at, days_simulated, trade_count, win_rate,
                 total_return, sharpe, max_drawdown, score, parameters_snapshot)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
            )
            .bind(&r.strategy_id).bind(r.run_at).bind(r.days_simulated).bind(r.trade_count)
            .bind(r.win_rate).bind(r.total_return).bind(r.sharpe).bind(r.max_drawdown)
            .bind(r.score).bind(&r.parameters_snapshot)
            .execute(pool).await?;
        }
        OperationRecord::EvolutionHistory(r) => {
            sqlx::query(
                "INSERT INTO evolution_history (strategy_id, generation, cycle, action, score_before,
                 score_after, old_params, new_params, parameter_diff, reason, at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
            )
            .bind(&r.strategy_id).bind(r.generation).bind(r.cycle).bind(&r.action)
            .bind(r.score_before).bind(r.score_after).bind(&r.old_params).bind(&r.new_params)
            .bind(&r.parameter_diff).bind(&r.reason).bind(r.at)
            .execute(pool).await?;
        }
        OperationRecord::OptimizationLog { strategy_id, message, at } => {
            sqlx::query(
                "INSERT INTO optimization_logs (strategy_id, message, at) VALUES ($1,$2,$3)",
            )
            .bind(strategy_id).bind(message).bind(at)
            .execute(pool).await?;
        }
        OperationRecord::ArbitrageTask(r) => {
            sqlx::query(
                "INSERT INTO arbitrage_tasks (id, class, opportunity_snapshot, reserved_capital, state,
                 step_log, outcome, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
                 ON CONFLICT (id) DO UPDATE SET state = EXCLUDED.state, step_log = EXCLUDED.step_log,
                 outcome = EXCLUDED.outcome",
            )
            .bind(&r.id).bind(&r.class).bind(&r.opportunity_snapshot).bind(r.reserved_capital)
            .bind(&r.state).bind(&r.step_log).bind(&r.outcome).bind(r.created_at)
            .execute(pool).await?;
        }
        OperationRecord::Transfer(r) => {
            sqlx::query(
                "INSERT INTO transfers (id, task_id, from_exchange, to_exchange, asset, amount, fee,
                 initiated_at, observed_status, last_checked_at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
                 ON CONFLICT (id) DO UPDATE SET observed_status = EXCLUDED.observed_status,
                 last_checked_at = EXCLUDED.last_checked_at",
            )
            .bind(&r.id).bind(&r.task_id).bind(&r.from_exchange).bind(&r.to_exchange)
            .bind(&r.asset).bind(r.amount).bind(r.fee).bind(r.initiated_at)
            .bind(&r.observed_status).bind(r.last_checked_at)
            .execute(pool).await?;
        }
        OperationRecord::BalanceHistory(r) => {
            sqlx::query(
                "INSERT INTO balance_history (exchange_id, asset, total, available, locked, observed_at)
                 VALUES ($1,$2,$3,$4,$5,$6)",
            )
            .bind(&r.exchange_id).bind(&r.asset).bind(r.total).bind(r.available)
            .bind(r.locked).bind(r.observed_at)
            .execute(pool).await?;
        }
        OperationRecord::OperationLog(r) => {
            sqlx::query("INSERT INTO operation_logs (category, message, at) VALUES ($1,$2,$3)")
                .bind(&r.category).bind(&r.message).bind(r.at)
                .execute(pool).await?;
        }
        OperationRecord::SystemStatus(r) => {
            sqlx::query(
                "INSERT INTO system_status (id, quantitative_running, auto_trading_enabled, total_strategies,
                 running_strategies, current_generation, evolution_enabled, health, last_update)
                 VALUES (TRUE,$1,$2,$3,$4,$5,$6,$7,$8)
                 ON CONFLICT (id) DO UPDATE SET quantitative_running = EXCLUDED.quantitative_running,
                 auto_trading_enabled = EXCLUDED.auto_trading_enabled, total_strategies = EXCLUDED.total_strategies,
                 running_strategies = EXCLUDED.running_strategies, current_generation = EXCLUDED.current_generation,
                 evolution_enabled = EXCLUDED.evolution_enabled, health = EXCLUDED.health,
                 last_update = EXCLUDED.last_update",
            )
            .bind(r.quantitative_running).bind(r.auto_trading_enabled).bind(r.total_strategies)
            .bind(r.running_strategies).bind(r.current_generation).bind(r.evolution_enabled)
            .bind(&r.health).bind(r.last_update)
            .execute(pool).await?;
        }
    }
    Ok(())
}
