use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::json_error;
use crate::db::DbPool;
use crate::models::notification::Notification;
use crate::security::auth::{AdminUser, AuthenticatedUser};

const FEED_LIMIT: i64 = 5;
const HISTORY_LIMIT: i64 = 50;

/// Newest notifications, with registered usernames hidden from everyone but admins.
fn feed(pool: &DbPool, limit: i64, viewer: &Option<AuthenticatedUser>) -> Vec<Notification> {
    let mut items = Notification::recent(pool, limit);
    let admin = viewer.as_ref().map(|v| v.user.is_admin()).unwrap_or(false);
    if !admin {
        items.iter_mut().for_each(Notification::anonymise);
    }
    items
}

#[get("/api/notifications")]
pub fn recent(pool: &State<DbPool>, viewer: Option<AuthenticatedUser>) -> Json<Vec<Notification>> {
    Json(feed(pool, FEED_LIMIT, &viewer))
}

#[get("/notifications-history")]
pub fn history(pool: &State<DbPool>, viewer: Option<AuthenticatedUser>) -> Json<Value> {
    Json(json!({ "notifications": feed(pool, HISTORY_LIMIT, &viewer) }))
}

#[post("/api/notifications/<id>/read")]
pub fn mark_read(
    _admin: AdminUser,
    pool: &State<DbPool>,
    id: i64,
) -> Result<Json<Value>, (Status, Json<Value>)> {
    match Notification::mark_read(pool, id) {
        Ok(true) => Ok(Json(json!({ "success": true }))),
        Ok(false) => Err(json_error(Status::NotFound, "Notification not found")),
        Err(e) => {
            log::error!("Failed to mark notification {} read: {}", id, e);
            Err(json_error(Status::InternalServerError, "Update failed"))
        }
    }
}

pub fn routes() -> Vec<rocket::Route> {
    routes![recent, history, mark_read]
}
