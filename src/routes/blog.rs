use std::sync::Arc;

use rocket::form::Form;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use super::json_error;
use crate::db::DbPool;
use crate::models::comment::{Comment, CommentAuthor, CommentForm, ANONYMOUS_NAME};
use crate::models::notification::{Actor, Notification};
use crate::models::post::{Post, PostForm};
use crate::rate_limit::{self, RateLimiter};
use crate::security::auth::{AdminUser, AuthenticatedUser, ClientIp};

// ── Posts (admin) ──────────────────────────────────────

#[post("/add", data = "<form>")]
pub fn add_post(admin: AdminUser, pool: &State<DbPool>, form: Form<PostForm>) -> Redirect {
    if !form.is_complete() {
        return Redirect::to("/blog");
    }
    match Post::create(pool, &form, Some(admin.user.id)) {
        Ok(id) => log::info!("{} published post {}", admin.user.username, id),
        Err(e) => log::error!("Failed to create post: {}", e),
    }
    Redirect::to("/blog")
}

#[post("/update/<id>", data = "<form>")]
pub fn update_post(_admin: AdminUser, pool: &State<DbPool>, id: i64, form: Form<PostForm>) -> Redirect {
    if !form.is_complete() {
        return Redirect::to("/blog");
    }
    if let Err(e) = Post::update(pool, id, &form) {
        log::warn!("Failed to update post {}: {}", id, e);
    }
    Redirect::to("/blog")
}

#[get("/delete/<id>")]
pub fn delete_post(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Redirect {
    if let Err(e) = Post::delete(pool, id) {
        log::warn!("Failed to delete post {}: {}", id, e);
    }
    Redirect::to("/blog")
}

// ── Comments ───────────────────────────────────────────

fn post_anchor(post_id: i64) -> Redirect {
    Redirect::to(format!("/blog#post-{}", post_id))
}

#[post("/comment", data = "<form>")]
pub fn add_comment(user: AuthenticatedUser, pool: &State<DbPool>, form: Form<CommentForm>) -> Redirect {
    let post = match Post::find_by_id(pool, form.post_id) {
        Some(p) => p,
        None => return Redirect::to("/blog"),
    };
    if form.content.trim().is_empty() {
        return Redirect::to("/blog");
    }
    match Comment::create(pool, post.id, &form.content, CommentAuthor::User(user.user.id)) {
        Ok(_) => {
            if let Err(e) = Notification::comment(pool, Actor::user(user.user.id, &user.user.username), &post.title) {
                log::warn!("Comment notification for post {} failed: {}", post.id, e);
            }
        }
        Err(e) => log::warn!("Failed to add comment to post {}: {}", post.id, e),
    }
    post_anchor(post.id)
}

#[post("/anonymous_comment", data = "<form>")]
pub fn add_anonymous_comment(
    pool: &State<DbPool>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    form: Form<CommentForm>,
) -> Result<Redirect, (Status, Json<Value>)> {
    let post = match Post::find_by_id(pool, form.post_id) {
        Some(p) => p,
        None => return Ok(Redirect::to("/blog")),
    };
    if form.content.trim().is_empty() {
        return Ok(Redirect::to("/blog"));
    }

    let rate_key = format!("comment:{}", client_ip.0);
    if !limiter.check_and_record(&rate_key, rate_limit::ANONYMOUS_COMMENTS) {
        return Err(json_error(
            Status::TooManyRequests,
            "Too many comments. Please wait before posting again.",
        ));
    }

    let author_name = form
        .author_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(ANONYMOUS_NAME);
    match Comment::create(pool, post.id, &form.content, CommentAuthor::Anonymous(author_name)) {
        Ok(_) => {
            if let Err(e) = Notification::comment(pool, Actor::anonymous(Some(author_name)), &post.title) {
                log::warn!("Comment notification for post {} failed: {}", post.id, e);
            }
        }
        Err(e) => log::warn!("Failed to add anonymous comment to post {}: {}", post.id, e),
    }
    Ok(post_anchor(post.id))
}

#[get("/delete/comment/<id>")]
pub fn delete_comment(_admin: AdminUser, pool: &State<DbPool>, id: i64) -> Redirect {
    if let Err(e) = Comment::delete(pool, id) {
        log::warn!("Failed to delete comment {}: {}", id, e);
    }
    Redirect::to("/blog")
}

#[post("/comment/author-like/<id>")]
pub fn toggle_author_like(
    _admin: AdminUser,
    pool: &State<DbPool>,
    id: i64,
) -> Result<Json<Value>, (Status, Json<Value>)> {
    if Comment::find_by_id(pool, id).is_none() {
        return Err(json_error(Status::NotFound, "Comment not found"));
    }
    match Comment::toggle_author_like(pool, id) {
        Ok(liked) => Ok(Json(json!({"success": true, "liked_by_author": liked}))),
        Err(e) => {
            log::error!("Failed to toggle author like on comment {}: {}", id, e);
            Err(json_error(Status::InternalServerError, "Update failed"))
        }
    }
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        add_post,
        update_post,
        delete_post,
        add_comment,
        add_anonymous_comment,
        delete_comment,
        toggle_author_like,
    ]
}
