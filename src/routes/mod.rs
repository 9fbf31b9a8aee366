use rocket::http::Status;
use rocket::serde::json::Json;
use serde_json::{json, Value};

pub mod analytics;
pub mod auth;
pub mod blog;
pub mod cv;
pub mod likes;
pub mod notifications;
pub mod public;

/// `{success: false, error}` with the given status.
pub fn json_error(status: Status, error: &str) -> (Status, Json<Value>) {
    (status, Json(json!({ "success": false, "error": error })))
}

pub fn routes() -> Vec<rocket::Route> {
    let mut all = public::routes();
    all.extend(auth::routes());
    all.extend(blog::routes());
    all.extend(likes::routes());
    all.extend(cv::routes());
    all.extend(analytics::routes());
    all.extend(notifications::routes());
    all
}
