use rusqlite::params;

use crate::db::DbPool;

/// Who is liking a post.
#[derive(Debug, Clone)]
pub enum Liker<'a> {
    User { id: i64, username: &'a str },
    /// Anonymous visitors get one like per post: a repeat of either the
    /// client-held id or the IP address is ignored.
    Anonymous {
        username: &'a str,
        anonymous_id: Option<&'a str>,
        ip_address: &'a str,
    },
}

pub struct BlogLike;

impl BlogLike {
    /// Record a like. Returns Ok(false) when this liker has already liked the post;
    /// the unique indexes on `blog_likes` decide, so concurrent calls can't double count.
    pub fn create(pool: &DbPool, post_id: i64, liker: &Liker<'_>) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let inserted = match liker {
            Liker::User { id, username } => conn.execute(
                "INSERT OR IGNORE INTO blog_likes (post_id, user_id, username, is_anonymous)
                 VALUES (?1, ?2, ?3, 0)",
                params![post_id, id, username],
            ),
            Liker::Anonymous {
                username,
                anonymous_id,
                ip_address,
            } => {
                let anonymous_id = anonymous_id.map(str::trim).filter(|s| !s.is_empty());
                match anonymous_id {
                    Some(anon) => conn.execute(
                        "INSERT OR IGNORE INTO blog_likes (post_id, username, is_anonymous, anonymous_id, ip_address)
                         VALUES (?1, ?2, 1, ?3, ?4)",
                        params![post_id, username, anon, ip_address],
                    ),
                    None => conn.execute(
                        "INSERT OR IGNORE INTO blog_likes (post_id, username, is_anonymous, ip_address)
                         VALUES (?1, ?2, 1, ?3)",
                        params![post_id, username, ip_address],
                    ),
                }
            }
        }
        .map_err(|e| e.to_string())?;
        Ok(inserted == 1)
    }

    /// Remove a registered user's like. Returns false when there was none.
    pub fn delete(pool: &DbPool, post_id: i64, user_id: i64) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let removed = conn
            .execute(
                "DELETE FROM blog_likes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, user_id],
            )
            .map_err(|e| e.to_string())?;
        Ok(removed > 0)
    }

    pub fn has_user_liked(pool: &DbPool, post_id: i64, user_id: i64) -> bool {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return false,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM blog_likes WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|c| c > 0)
        .unwrap_or(false)
    }

    pub fn count_for_post(pool: &DbPool, post_id: i64) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM blog_likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn total_count(pool: &DbPool) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row("SELECT COUNT(*) FROM blog_likes", [], |row| row.get(0))
            .unwrap_or(0)
    }
}

pub struct CommentLike;

impl CommentLike {
    /// Returns Ok(false) if the user already liked this comment.
    pub fn create(pool: &DbPool, comment_id: i64, user_id: i64) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO comment_likes (comment_id, user_id) VALUES (?1, ?2)",
                params![comment_id, user_id],
            )
            .map_err(|e| e.to_string())?;
        Ok(inserted == 1)
    }

    pub fn delete(pool: &DbPool, comment_id: i64, user_id: i64) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let removed = conn
            .execute(
                "DELETE FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
                params![comment_id, user_id],
            )
            .map_err(|e| e.to_string())?;
        Ok(removed > 0)
    }

    pub fn has_user_liked(pool: &DbPool, comment_id: i64, user_id: i64) -> bool {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return false,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
            params![comment_id, user_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|c| c > 0)
        .unwrap_or(false)
    }

    pub fn count_for_comment(pool: &DbPool, comment_id: i64) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
            params![comment_id],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }
}
