use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::json_error;
use crate::db::DbPool;
use crate::models::cv::CvDownload;
use crate::models::like::BlogLike;
use crate::models::post::Post;
use crate::models::user::User;
use crate::models::visitor::VisitorStat;
use crate::security::auth::{AdminUser, AuthenticatedUser};
use crate::security::mask_email;

type JsonResult = Result<Json<Value>, (Status, Json<Value>)>;

fn is_admin(viewer: &Option<AuthenticatedUser>) -> bool {
    viewer.as_ref().map(|v| v.user.is_admin()).unwrap_or(false)
}

#[get("/analytics")]
pub fn dashboard(_admin: AdminUser, pool: &State<DbPool>) -> Json<Value> {
    let visitors = VisitorStat::analytics(pool);
    let cv = CvDownload::analytics(pool);
    Json(json!({
        "posts": Post::list(pool, None).len(),
        "total_likes": BlogLike::total_count(pool),
        "total_views": visitors.as_ref().map(|v| v.total_views).unwrap_or(0),
        "unique_visitors": visitors.as_ref().map(|v| v.unique_visitors).unwrap_or(0),
        "cv_downloads": cv.as_ref().map(|c| c.total).unwrap_or(0),
        "users": User::count(pool),
    }))
}

#[get("/analytics/blog-analytics")]
pub fn blog_analytics(pool: &State<DbPool>) -> Json<Value> {
    Json(json!({
        "analytics": Post::analytics(pool),
        "total_likes_count": BlogLike::total_count(pool),
    }))
}

#[get("/analytics/cv-analytics")]
pub fn cv_analytics(pool: &State<DbPool>, viewer: Option<AuthenticatedUser>) -> JsonResult {
    let mut analytics = CvDownload::analytics(pool)
        .ok_or_else(|| json_error(Status::ServiceUnavailable, "Analytics unavailable"))?;

    if !is_admin(&viewer) {
        for item in analytics.recent.iter_mut() {
            item.email = item.email.as_deref().map(mask_email);
            if item.username.is_some() {
                item.username = Some("Anonymous".to_string());
            }
        }
    }
    Ok(Json(json!({ "analytics": analytics })))
}

#[get("/analytics/visitor-analytics")]
pub fn visitor_analytics(pool: &State<DbPool>) -> JsonResult {
    let analytics = VisitorStat::analytics(pool)
        .ok_or_else(|| json_error(Status::ServiceUnavailable, "Analytics unavailable"))?;
    Ok(Json(json!({ "analytics": analytics })))
}

#[get("/analytics/user-analytics")]
pub fn user_analytics(_admin: AdminUser, pool: &State<DbPool>) -> Json<Value> {
    Json(json!({ "analytics": User::analytics(pool) }))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        dashboard,
        blog_analytics,
        cv_analytics,
        visitor_analytics,
        user_analytics,
    ]
}
