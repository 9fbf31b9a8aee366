#[macro_use]
extern crate rocket;

use std::sync::Arc;

use chrono::Duration;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::fs::FileServer;
use rocket::http::Header;
use rocket::response::content::RawHtml;
use rocket::response::Redirect;
use rocket::{Build, Rocket};
use sha2::{Digest, Sha256};

mod analytics;
mod boot;
mod config;
mod db;
mod email;
mod models;
mod rate_limit;
mod routes;
mod security;
mod tasks;

#[cfg(test)]
mod tests;

use config::AppConfig;
use db::DbPool;
use email::{Mailer, SmtpMailer};
use rate_limit::RateLimiter;
use security::token::TokenSigner;

pub struct NoCacheAnalytics;

#[rocket::async_trait]
impl Fairing for NoCacheAnalytics {
    fn info(&self) -> Info {
        Info { name: "No-Cache Analytics Pages", kind: Kind::Response }
    }

    async fn on_response<'r>(&self, req: &'r rocket::Request<'_>, res: &mut rocket::Response<'r>) {
        let path = req.uri().path();
        if path.starts_with("/analytics") || path.starts_with("/api/notifications") {
            res.set_header(Header::new("Cache-Control", "no-store, no-cache, must-revalidate, max-age=0"));
            res.set_header(Header::new("Pragma", "no-cache"));
        }
    }
}

#[catch(401)]
fn unauthorized() -> Redirect {
    Redirect::to("/login")
}

#[catch(403)]
fn forbidden() -> Redirect {
    Redirect::to("/")
}

#[catch(404)]
fn not_found() -> RawHtml<String> {
    RawHtml("<html><body style='font-family:sans-serif;text-align:center;padding:80px'><h1>404</h1><p>Page not found.</p><a href='/'>← Home</a></body></html>".to_string())
}

#[catch(500)]
fn server_error() -> RawHtml<String> {
    RawHtml("<html><body style='font-family:sans-serif;text-align:center;padding:80px'><h1>500</h1><p>Internal server error.</p><a href='/'>← Home</a></body></html>".to_string())
}

/// Rocket's own settings, with the cookie key derived from SECRET_KEY.
fn rocket_figment(config: &AppConfig) -> rocket::figment::Figment {
    let key: String = Sha256::digest(config.secret_key.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    rocket::Config::figment().merge(("secret_key", key))
}

/// Assemble the application around an already-migrated pool.
pub fn build_rocket(config: AppConfig, pool: DbPool, mailer: Arc<dyn Mailer>) -> Rocket<Build> {
    let signer = TokenSigner::new(&config.secret_key, Duration::minutes(config.cv_link_minutes));

    rocket::custom(rocket_figment(&config))
        .manage(pool)
        .manage(signer)
        .manage(mailer)
        .manage(Arc::new(RateLimiter::new()))
        .manage(config)
        .attach(analytics::AnalyticsFairing)
        .attach(NoCacheAnalytics)
        .attach(tasks::BackgroundTasks)
        .mount("/", routes::routes())
        .register("/", catchers![unauthorized, forbidden, not_found, server_error])
}

#[launch]
fn rocket() -> _ {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = AppConfig::load().expect("Failed to load configuration");

    // Boot check: create directories, validate config
    boot::run(&config);

    let pool = db::init_pool(&config.database_url).expect("Failed to initialize database pool");
    db::run_migrations(&pool).expect("Failed to run database migrations");
    db::seed_admin(&pool, config.admin.as_ref()).expect("Failed to seed admin user");

    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(config.mail.clone()));

    log::info!("Serving {} (CV links valid for {} min)", config.site_url, config.cv_link_minutes);

    build_rocket(config, pool, mailer).mount("/static", FileServer::from("website/static"))
}
