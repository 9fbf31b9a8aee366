use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub user_id: Option<i64>,
    pub view_count: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, FromForm)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    /// Optional publication date for backdated posts.
    pub created_at: Option<String>,
}

impl PostForm {
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.content.trim().is_empty()
    }

    pub fn backdate(&self) -> Option<NaiveDateTime> {
        let raw = self.created_at.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
            .ok()
            .or_else(|| {
                chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(12, 0, 0))
            })
    }
}

/// A month that has at least one post, e.g. `2024-03` / `March 2024`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ArchiveMonth {
    pub month_year: String,
    pub month_name: String,
}

#[derive(Debug, Serialize)]
pub struct PostAnalytics {
    pub id: i64,
    pub title: String,
    pub view_count: i64,
    pub comment_count: i64,
    pub total_likes: i64,
    pub anonymous_likes: i64,
    pub registered_likes: i64,
    pub last_like_date: Option<String>,
    pub last_comment_date: Option<String>,
    pub created_at: NaiveDateTime,
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// `2024-03` -> `March 2024`; anything unparseable becomes `Unknown`.
pub fn month_display_name(month_year: &str) -> String {
    let mut parts = month_year.splitn(2, '-');
    let year = parts.next().unwrap_or_default();
    let month = parts
        .next()
        .and_then(|m| m.parse::<usize>().ok())
        .filter(|m| (1..=12).contains(m));
    match month {
        Some(m) if year.len() == 4 => format!("{} {}", MONTH_NAMES[m - 1], year),
        _ => "Unknown".to_string(),
    }
}

impl Post {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Post {
            id: row.get("id")?,
            title: row.get("title")?,
            content: row.get("content")?,
            user_id: row.get("user_id")?,
            view_count: row.get("view_count")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row("SELECT * FROM posts WHERE id = ?1", params![id], Self::from_row)
            .ok()
    }

    /// All posts, newest first, optionally restricted to one `YYYY-MM` month.
    pub fn list(pool: &DbPool, month: Option<&str>) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };

        let (sql, params_vec): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) = match month {
            Some(m) => (
                "SELECT * FROM posts WHERE strftime('%Y-%m', created_at) = ?1 ORDER BY created_at DESC, id DESC",
                vec![Box::new(m.to_string())],
            ),
            None => ("SELECT * FROM posts ORDER BY created_at DESC, id DESC", vec![]),
        };

        let mut stmt = match conn.prepare(sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        stmt.query_map(params_refs.as_slice(), Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn latest(pool: &DbPool, limit: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare("SELECT * FROM posts ORDER BY created_at DESC, id DESC LIMIT ?1") {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![limit], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn available_months(pool: &DbPool) -> Vec<ArchiveMonth> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT DISTINCT strftime('%Y-%m', created_at) AS month_year
             FROM posts
             WHERE created_at IS NOT NULL
             ORDER BY month_year DESC",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], |row| row.get::<_, String>(0))
            .map(|rows| {
                rows.filter_map(|r| r.ok())
                    .map(|month_year| ArchiveMonth {
                        month_name: month_display_name(&month_year),
                        month_year,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert a post. A parseable `created_at` on the form backdates it.
    pub fn create(pool: &DbPool, form: &PostForm, user_id: Option<i64>) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        match form.backdate() {
            Some(created_at) => conn.execute(
                "INSERT INTO posts (title, content, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    form.title.trim(),
                    form.content,
                    user_id,
                    created_at.format("%Y-%m-%d %H:%M:%S").to_string()
                ],
            ),
            None => conn.execute(
                "INSERT INTO posts (title, content, user_id) VALUES (?1, ?2, ?3)",
                params![form.title.trim(), form.content, user_id],
            ),
        }
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update(pool: &DbPool, id: i64, form: &PostForm) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let changed = conn
            .execute(
                "UPDATE posts SET title = ?1, content = ?2 WHERE id = ?3",
                params![form.title.trim(), form.content, id],
            )
            .map_err(|e| e.to_string())?;
        if changed == 0 {
            return Err(format!("Post {} not found", id));
        }
        Ok(())
    }

    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM posts WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn increment_view_count(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE posts SET view_count = view_count + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn analytics(pool: &DbPool) -> Vec<PostAnalytics> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT
                p.id,
                p.title,
                p.view_count,
                (SELECT COUNT(*) FROM comments WHERE post_id = p.id) AS comment_count,
                (SELECT COUNT(*) FROM blog_likes WHERE post_id = p.id) AS total_likes,
                (SELECT COUNT(*) FROM blog_likes WHERE post_id = p.id AND is_anonymous = 1) AS anonymous_likes,
                (SELECT COUNT(*) FROM blog_likes WHERE post_id = p.id AND is_anonymous = 0) AS registered_likes,
                (SELECT MAX(created_at) FROM blog_likes WHERE post_id = p.id) AS last_like_date,
                (SELECT MAX(created_at) FROM comments WHERE post_id = p.id) AS last_comment_date,
                p.created_at
             FROM posts p
             ORDER BY p.created_at DESC, p.id DESC",
        ) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Post analytics query failed: {}", e);
                return vec![];
            }
        };
        stmt.query_map([], |row| {
            Ok(PostAnalytics {
                id: row.get("id")?,
                title: row.get("title")?,
                view_count: row.get("view_count")?,
                comment_count: row.get("comment_count")?,
                total_likes: row.get("total_likes")?,
                anonymous_likes: row.get("anonymous_likes")?,
                registered_likes: row.get("registered_likes")?,
                last_like_date: row.get("last_like_date")?,
                last_comment_date: row.get("last_comment_date")?,
                created_at: row.get("created_at")?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }
}
