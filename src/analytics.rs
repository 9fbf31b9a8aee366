use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Method;
use rocket::{Data, Request};

use crate::db::DbPool;
use crate::models::notification::Notification;
use crate::models::visitor::VisitorStat;
use crate::security::auth::ClientIp;

/// Records a visitor stat for every public page request and raises the
/// view-milestone notification. Static files, JSON APIs and the analytics
/// dashboard itself are not counted.
pub struct AnalyticsFairing;

fn is_tracked(path: &str) -> bool {
    !(path.starts_with("/static")
        || path.starts_with("/api")
        || path.starts_with("/analytics")
        || path == "/favicon.ico")
}

#[rocket::async_trait]
impl Fairing for AnalyticsFairing {
    fn info(&self) -> Info {
        Info {
            name: "Visitor Stats",
            kind: Kind::Request,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut Data<'_>) {
        if request.method() != Method::Get {
            return;
        }
        let path = request.uri().path().to_string();
        if !is_tracked(&path) {
            return;
        }

        let pool = match request.rocket().state::<DbPool>() {
            Some(p) => p,
            None => return,
        };
        let ip = ClientIp::from_request_headers(request);

        match VisitorStat::record_visit(pool, &ip, &path, None) {
            Ok(total) if VisitorStat::is_milestone(total) => {
                log::info!("Site reached {} views", total);
                if let Err(e) = Notification::view_milestone(pool, total) {
                    log::warn!("Failed to record {}-view milestone: {}", total, e);
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("Failed to record visit to {}: {}", path, e),
        }
    }
}
