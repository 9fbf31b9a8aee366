use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{Either, State};
use serde::Serialize;
use serde_json::{json, Value};

use crate::db::DbPool;
use crate::models::comment::Comment;
use crate::models::like::BlogLike;
use crate::models::post::Post;
use crate::security::auth::AuthenticatedUser;

/// A post as shown on the home and blog pages.
#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
    pub like_count: i64,
    pub user_has_liked: bool,
}

impl PostView {
    fn build(pool: &DbPool, post: Post, viewer: Option<&AuthenticatedUser>) -> Self {
        let user_has_liked = viewer
            .map(|v| BlogLike::has_user_liked(pool, post.id, v.user.id))
            .unwrap_or(false);
        PostView {
            comments: Comment::for_post(pool, post.id),
            like_count: BlogLike::count_for_post(pool, post.id),
            user_has_liked,
            post,
        }
    }
}

fn viewer_json(viewer: Option<&AuthenticatedUser>) -> Value {
    match viewer {
        Some(v) => json!({
            "id": v.user.id,
            "username": v.user.username,
            "role": v.user.role,
        }),
        None => Value::Null,
    }
}

#[get("/")]
pub fn home(pool: &State<DbPool>, viewer: Option<AuthenticatedUser>) -> Json<Value> {
    let latest: Vec<PostView> = Post::latest(pool, 2)
        .into_iter()
        .map(|p| PostView::build(pool, p, viewer.as_ref()))
        .collect();
    Json(json!({
        "latest_posts": latest,
        "user": viewer_json(viewer.as_ref()),
    }))
}

#[get("/blog?<month>&<post_id>")]
pub fn blog(
    pool: &State<DbPool>,
    viewer: Option<AuthenticatedUser>,
    month: Option<String>,
    post_id: Option<i64>,
) -> Json<Value> {
    let month = month.filter(|m| !m.trim().is_empty());
    let posts: Vec<PostView> = Post::list(pool, month.as_deref())
        .into_iter()
        .map(|p| PostView::build(pool, p, viewer.as_ref()))
        .collect();

    if let Some(id) = post_id {
        if let Err(e) = Post::increment_view_count(pool, id) {
            log::warn!("Failed to count view of post {}: {}", id, e);
        }
    }

    Json(json!({
        "posts": posts,
        "available_months": Post::available_months(pool),
        "filter_month": month,
        "user": viewer_json(viewer.as_ref()),
    }))
}

#[get("/blog/post/<id>")]
pub fn view_post(
    pool: &State<DbPool>,
    viewer: Option<AuthenticatedUser>,
    id: i64,
) -> Either<Json<Value>, Redirect> {
    let post = match Post::find_by_id(pool, id) {
        Some(p) => p,
        None => return Either::Right(Redirect::to("/blog")),
    };
    if let Err(e) = Post::increment_view_count(pool, id) {
        log::warn!("Failed to count view of post {}: {}", id, e);
    }
    // Reload so the response carries the updated count.
    let post = Post::find_by_id(pool, id).unwrap_or(post);
    let view = PostView::build(pool, post, viewer.as_ref());
    Either::Left(Json(json!({
        "posts": [view],
        "single_post": true,
        "user": viewer_json(viewer.as_ref()),
    })))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![home, blog, view_post]
}
