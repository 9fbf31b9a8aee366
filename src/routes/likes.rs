use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_error;
use crate::db::DbPool;
use crate::models::comment::{Comment, ANONYMOUS_NAME};
use crate::models::like::{BlogLike, CommentLike, Liker};
use crate::models::notification::{Actor, Notification};
use crate::models::post::Post;
use crate::security::auth::{AuthenticatedUser, ClientIp};

type JsonResult = Result<Json<Value>, (Status, Json<Value>)>;

fn like_count(count: i64) -> Json<Value> {
    Json(json!({"success": true, "like_count": count}))
}

// ── Post likes ─────────────────────────────────────────

/// Like as the signed-in user, or anonymously by IP when signed out.
#[post("/post/like/<id>")]
pub fn like_post(
    pool: &State<DbPool>,
    viewer: Option<AuthenticatedUser>,
    client_ip: ClientIp,
    id: i64,
) -> JsonResult {
    let post = Post::find_by_id(pool, id).ok_or_else(|| json_error(Status::NotFound, "Post not found"))?;

    let (liker, actor) = match viewer.as_ref() {
        Some(v) => (
            Liker::User {
                id: v.user.id,
                username: &v.user.username,
            },
            Actor::user(v.user.id, &v.user.username),
        ),
        None => (
            Liker::Anonymous {
                username: ANONYMOUS_NAME,
                anonymous_id: None,
                ip_address: &client_ip.0,
            },
            Actor::anonymous(None),
        ),
    };

    match BlogLike::create(pool, post.id, &liker) {
        Ok(true) => {
            if let Err(e) = Notification::post_like(pool, actor, &post.title) {
                log::warn!("Like notification for post {} failed: {}", post.id, e);
            }
            Ok(like_count(BlogLike::count_for_post(pool, post.id)))
        }
        Ok(false) => Err(json_error(Status::BadRequest, "Already liked")),
        Err(e) => {
            log::error!("Failed to like post {}: {}", post.id, e);
            Err(json_error(Status::InternalServerError, "Could not save like"))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnonymousLike {
    pub username: Option<String>,
    pub anonymous_id: Option<String>,
}

#[post("/post/anonymous_like/<id>", data = "<body>")]
pub fn anonymous_like_post(
    pool: &State<DbPool>,
    client_ip: ClientIp,
    id: i64,
    body: Option<Json<AnonymousLike>>,
) -> JsonResult {
    let post = Post::find_by_id(pool, id).ok_or_else(|| json_error(Status::NotFound, "Post not found"))?;
    let body = body.map(|b| b.into_inner()).unwrap_or_default();

    let username = body
        .username
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(ANONYMOUS_NAME);
    let liker = Liker::Anonymous {
        username,
        anonymous_id: body.anonymous_id.as_deref(),
        ip_address: &client_ip.0,
    };

    match BlogLike::create(pool, post.id, &liker) {
        Ok(true) => {
            if let Err(e) = Notification::post_like(pool, Actor::anonymous(Some(username)), &post.title) {
                log::warn!("Like notification for post {} failed: {}", post.id, e);
            }
            Ok(like_count(BlogLike::count_for_post(pool, post.id)))
        }
        Ok(false) => Err(json_error(Status::BadRequest, "Already liked")),
        Err(e) => {
            log::error!("Failed to store anonymous like on post {}: {}", post.id, e);
            Err(json_error(Status::InternalServerError, "Could not save like"))
        }
    }
}

#[post("/post/unlike/<id>")]
pub fn unlike_post(user: AuthenticatedUser, pool: &State<DbPool>, id: i64) -> JsonResult {
    match BlogLike::delete(pool, id, user.user.id) {
        Ok(true) => Ok(like_count(BlogLike::count_for_post(pool, id))),
        Ok(false) => Err(json_error(Status::NotFound, "Like not found")),
        Err(e) => {
            log::error!("Failed to unlike post {}: {}", id, e);
            Err(json_error(Status::InternalServerError, "Could not remove like"))
        }
    }
}

// ── Comment likes ──────────────────────────────────────

#[post("/comment/like/<id>")]
pub fn like_comment(user: AuthenticatedUser, pool: &State<DbPool>, id: i64) -> JsonResult {
    if Comment::find_by_id(pool, id).is_none() {
        return Err(json_error(Status::BadRequest, "Already liked or comment not found"));
    }
    match CommentLike::create(pool, id, user.user.id) {
        Ok(true) => {
            if let Some(title) = Comment::post_title(pool, id) {
                if let Err(e) = Notification::comment_like(pool, Actor::user(user.user.id, &user.user.username), &title) {
                    log::warn!("Like notification for comment {} failed: {}", id, e);
                }
            }
            Ok(like_count(CommentLike::count_for_comment(pool, id)))
        }
        Ok(false) => Err(json_error(Status::BadRequest, "Already liked or comment not found")),
        Err(e) => {
            log::error!("Failed to like comment {}: {}", id, e);
            Err(json_error(Status::InternalServerError, "Could not save like"))
        }
    }
}

#[post("/comment/unlike/<id>")]
pub fn unlike_comment(user: AuthenticatedUser, pool: &State<DbPool>, id: i64) -> JsonResult {
    match CommentLike::delete(pool, id, user.user.id) {
        Ok(true) => Ok(like_count(CommentLike::count_for_comment(pool, id))),
        Ok(false) => Err(json_error(Status::NotFound, "Like not found")),
        Err(e) => {
            log::error!("Failed to unlike comment {}: {}", id, e);
            Err(json_error(Status::InternalServerError, "Could not remove like"))
        }
    }
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        like_post,
        anonymous_like_post,
        unlike_post,
        like_comment,
        unlike_comment,
    ]
}
