use rocket::fairing::{Fairing, Info, Kind};
use rocket::tokio;
use rocket::{Orbit, Rocket};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::models::cv::CvVerification;
use crate::rate_limit::RateLimiter;

pub struct BackgroundTasks;

#[rocket::async_trait]
impl Fairing for BackgroundTasks {
    fn info(&self) -> Info {
        Info {
            name: "Background Tasks",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let (pool, interval) = match (rocket.state::<DbPool>(), rocket.state::<AppConfig>()) {
            (Some(pool), Some(config)) => (pool.clone(), config.task_cleanup_minutes),
            _ => {
                log::error!("[task] Database pool or config missing; background tasks not started");
                return;
            }
        };

        // Expired / redeemed CV verification cleanup
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(interval * 60)).await;
                let p = pool.clone();
                let result = tokio::task::spawn_blocking(move || {
                    CvVerification::cleanup(&p, chrono::Utc::now())
                })
                .await;
                match result {
                    Ok(Ok(count)) => {
                        if count > 0 {
                            log::info!("[task] Cleaned up {} CV verification links", count);
                        }
                    }
                    Ok(Err(e)) => log::error!("[task] CV verification cleanup failed: {}", e),
                    Err(e) => log::error!("[task] CV verification cleanup panicked: {}", e),
                }
            }
        });

        // Rate limiter pruning
        if let Some(limiter) = rocket.state::<Arc<RateLimiter>>() {
            let limiter = Arc::clone(limiter);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(15 * 60)).await;
                    limiter.cleanup(Duration::from_secs(60 * 60));
                }
            });
        }

        log::info!("[task] Background tasks started (cleanup every {} min)", interval);
    }
}
