use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

pub const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: Option<i64>,
    /// Registered author's username, resolved by join.
    pub username: Option<String>,
    pub author_name: Option<String>,
    pub content: String,
    pub is_anonymous: bool,
    pub liked_by_author: bool,
    pub like_count: i64,
    pub created_at: NaiveDateTime,
}

/// Who wrote a comment: a signed-in account or a visitor-supplied name.
#[derive(Debug, Clone)]
pub enum CommentAuthor<'a> {
    User(i64),
    Anonymous(&'a str),
}

#[derive(Debug, Deserialize, FromForm)]
pub struct CommentForm {
    pub post_id: i64,
    pub content: String,
    pub author_name: Option<String>,
}

impl Comment {
    const SELECT: &'static str = "SELECT c.*, u.username,
            (SELECT COUNT(*) FROM comment_likes WHERE comment_id = c.id) AS like_count
         FROM comments c
         LEFT JOIN users u ON c.user_id = u.id";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Comment {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            author_name: row.get("author_name")?,
            content: row.get("content")?,
            is_anonymous: row.get("is_anonymous")?,
            liked_by_author: row.get("liked_by_author")?,
            like_count: row.get("like_count")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Name shown next to the comment.
    pub fn display_name(&self) -> &str {
        if self.is_anonymous {
            self.author_name.as_deref().unwrap_or(ANONYMOUS_NAME)
        } else {
            self.username.as_deref().unwrap_or(ANONYMOUS_NAME)
        }
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            &format!("{} WHERE c.id = ?1", Self::SELECT),
            params![id],
            Self::from_row,
        )
        .ok()
    }

    pub fn for_post(pool: &DbPool, post_id: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(&format!(
            "{} WHERE c.post_id = ?1 ORDER BY c.created_at DESC, c.id DESC",
            Self::SELECT
        )) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![post_id], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn create(
        pool: &DbPool,
        post_id: i64,
        content: &str,
        author: CommentAuthor<'_>,
    ) -> Result<i64, String> {
        let content = content.trim();
        if content.is_empty() {
            return Err("Comment is empty".to_string());
        }

        let conn = pool.get().map_err(|e| e.to_string())?;
        match author {
            CommentAuthor::User(user_id) => conn.execute(
                "INSERT INTO comments (post_id, user_id, content, is_anonymous) VALUES (?1, ?2, ?3, 0)",
                params![post_id, user_id, content],
            ),
            CommentAuthor::Anonymous(name) => {
                let name = name.trim();
                let name = if name.is_empty() { ANONYMOUS_NAME } else { name };
                conn.execute(
                    "INSERT INTO comments (post_id, author_name, content, is_anonymous) VALUES (?1, ?2, ?3, 1)",
                    params![post_id, name, content],
                )
            }
        }
        .map_err(|e| e.to_string())?;

        Ok(conn.last_insert_rowid())
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM comments WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Flip the "liked by author" badge in one statement; returns the new value.
    pub fn toggle_author_like(pool: &DbPool, id: i64) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.query_row(
            "UPDATE comments SET liked_by_author = 1 - liked_by_author WHERE id = ?1
             RETURNING liked_by_author",
            params![id],
            |row| row.get::<_, bool>(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => format!("Comment {} not found", id),
            other => other.to_string(),
        })
    }

    /// Title of the post a comment belongs to, for notification text.
    pub fn post_title(pool: &DbPool, comment_id: i64) -> Option<String> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT p.title FROM comments c JOIN posts p ON c.post_id = p.id WHERE c.id = ?1",
            params![comment_id],
            |row| row.get(0),
        )
        .ok()
    }
}
