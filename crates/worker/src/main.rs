//! CodeScribe Background Worker
//!
//! Handles scheduled jobs including:
//! - Trial expiry sweep (every 15 minutes) - backstop for lazy expiry
//! - Trial conversion sweep (hourly) - active trial + paid billed tier
//! - Verification token cleanup (daily at 3:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)

use std::time::Duration;

use codescribe_shared::create_pool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting CodeScribe Worker");

    // Create database pool
    #[allow(clippy::expect_used)] // Startup config; fail fast when absent
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = create_pool(&database_url).await?;
    info!("Database pool created");

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Trial expiry sweep (every 15 minutes)
    // Expiry is normally detected lazily on read; this sweep catches trials
    // of users who never came back. The guarded UPDATE makes replays no-ops.
    let expiry_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let pool = expiry_pool.clone();
            Box::pin(async move {
                info!("Running trial expiry sweep");

                let result = sqlx::query(
                    r#"
                    UPDATE trials
                    SET status = 'expired',
                        updated_at = NOW()
                    WHERE status = 'active'
                      AND ends_at <= NOW()
                    "#,
                )
                .execute(&pool)
                .await;

                match result {
                    Ok(r) => info!(expired = r.rows_affected(), "Trial expiry sweep complete"),
                    Err(e) => error!(error = %e, "Trial expiry sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Trial expiry sweep (every 15 minutes)");

    // Job 2: Trial conversion sweep (hourly)
    // A user whose billed tier became paid while a trial was running has
    // converted; recorded for analytics only.
    let conversion_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 5 * * * *", move |_uuid, _l| {
            let pool = conversion_pool.clone();
            Box::pin(async move {
                info!("Running trial conversion sweep");

                let result = sqlx::query(
                    r#"
                    UPDATE trials t
                    SET status = 'converted',
                        updated_at = NOW()
                    FROM users u
                    WHERE t.user_id = u.id
                      AND t.status = 'active'
                      AND t.ends_at > NOW()
                      AND u.tier <> 'free'
                    "#,
                )
                .execute(&pool)
                .await;

                match result {
                    Ok(r) => info!(
                        converted = r.rows_affected(),
                        "Trial conversion sweep complete"
                    ),
                    Err(e) => error!(error = %e, "Trial conversion sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Trial conversion sweep (hourly)");

    // Job 3: Clean up stale verification tokens (daily at 3:00 AM UTC)
    let cleanup_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let pool = cleanup_pool.clone();
            Box::pin(async move {
                info!("Running verification token cleanup");

                let result = sqlx::query(
                    "DELETE FROM verification_tokens WHERE expires_at < NOW() - INTERVAL '7 days'",
                )
                .execute(&pool)
                .await;

                match result {
                    Ok(r) => info!(deleted = r.rows_affected(), "Token cleanup complete"),
                    Err(e) => error!(error = %e, "Token cleanup failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Verification token cleanup (daily at 3:00 AM UTC)");

    // Job 4: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("CodeScribe Worker started successfully with 4 scheduled jobs");

    // Jobs run in background tasks; park the main task
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
