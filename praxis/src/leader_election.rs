//! Single-leader election over a PostgreSQL advisory lock.
//!
//! Only the leader runs the expiry sweep, so several replicas can share a database without
//! double-sending notifications. Advisory locks belong to a session: the leader keeps the
//! connection that took the lock for as long as it leads.

use sqlx::{PgPool, Postgres, pool::PoolConnection};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Advisory lock key for the background-services leader.
pub const LEADER_LOCK_ID: i64 = 0x7072_6178_6973; // "praxis"

#[instrument(skip(pool, is_leader, shutdown))]
pub async fn leader_election_task(pool: PgPool, is_leader: Arc<AtomicBool>, lock_id: i64, check_interval: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(check_interval);
    let mut leader_conn: Option<PoolConnection<Postgres>> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                if let Some(mut conn) = leader_conn.take() {
                    if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)").bind(lock_id).execute(&mut *conn).await {
                        warn!("Failed to release leader lock on shutdown: {}", e);
                    }
                    info!("Released leadership");
                }
                is_leader.store(false, Ordering::Relaxed);
                return;
            }
        }

        match leader_conn.as_mut() {
            None => match try_acquire(&pool, lock_id).await {
                Ok(Some(conn)) => {
                    info!("Gained leadership");
                    leader_conn = Some(conn);
                    is_leader.store(true, Ordering::Relaxed);
                }
                Ok(None) => debug!("Following - will retry"),
                Err(e) => error!("Failed to check leader lock: {}", e),
            },
            Some(conn) => {
                // A dead session drops the advisory lock with it
                let ping = sqlx::query("SELECT 1").execute(&mut **conn).await;
                match ping {
                    Ok(_) => debug!("Leadership renewed (connection alive)"),
                    Err(e) => {
                        warn!("Lost leadership (connection died): {}", e);
                        leader_conn = None;
                        is_leader.store(false, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

async fn try_acquire(pool: &PgPool, lock_id: i64) -> Result<Option<PoolConnection<Postgres>>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let acquired = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
        .bind(lock_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(acquired.then_some(conn))
}
