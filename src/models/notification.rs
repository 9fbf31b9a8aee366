use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use crate::db::DbPool;
use crate::models::comment::ANONYMOUS_NAME;

pub const TYPE_COMMENT: &str = "comment";
pub const TYPE_LIKE_POST: &str = "like_post";
pub const TYPE_LIKE_COMMENT: &str = "like_comment";
pub const TYPE_CV_DOWNLOAD: &str = "cv_download";
pub const TYPE_VIEW_MILESTONE: &str = "view_milestone";
pub const TYPE_NEW_USER: &str = "new_user";

const MASKED_USER: &str = "Anonymous User";

#[derive(Debug, Serialize, Clone)]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub is_anonymous: bool,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
    pub relative_time: String,
}

/// Actor behind an event; anonymous actors are shown as "Anonymous".
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub user_id: Option<i64>,
    pub username: Option<&'a str>,
    pub is_anonymous: bool,
}

impl<'a> Actor<'a> {
    pub fn user(user_id: i64, username: &'a str) -> Self {
        Actor {
            user_id: Some(user_id),
            username: Some(username),
            is_anonymous: false,
        }
    }

    pub fn anonymous(username: Option<&'a str>) -> Self {
        Actor {
            user_id: None,
            username,
            is_anonymous: true,
        }
    }

    fn display(&self) -> &str {
        if self.is_anonymous {
            ANONYMOUS_NAME
        } else {
            self.username.unwrap_or(ANONYMOUS_NAME)
        }
    }
}

/// Human-readable age: "just now", "5 minutes ago", "1 hour ago", "3 days ago".
pub fn relative_time(created_at: NaiveDateTime, now: NaiveDateTime) -> String {
    let secs = (now - created_at).num_seconds().max(0);
    let (n, unit) = if secs >= 86_400 {
        (secs / 86_400, "day")
    } else if secs >= 3_600 {
        (secs / 3_600, "hour")
    } else if secs >= 60 {
        (secs / 60, "minute")
    } else {
        return "just now".to_string();
    };
    format!("{} {}{} ago", n, unit, if n > 1 { "s" } else { "" })
}

impl Notification {
    fn from_row(row: &Row, now: NaiveDateTime) -> rusqlite::Result<Self> {
        let created_at: NaiveDateTime = row.get("created_at")?;
        Ok(Notification {
            id: row.get("id")?,
            kind: row.get("type")?,
            message: row.get("message")?,
            user_id: row.get("user_id")?,
            username: row.get("username")?,
            is_anonymous: row.get("is_anonymous")?,
            is_read: row.get("is_read")?,
            relative_time: relative_time(created_at, now),
            created_at,
        })
    }

    /// Hide who did what from non-admin viewers.
    pub fn anonymise(&mut self) {
        if self.is_anonymous {
            return;
        }
        if let Some(name) = self.username.as_deref().filter(|n| !n.is_empty()) {
            self.message = self.message.replace(name, MASKED_USER);
        }
        self.username = Some(ANONYMOUS_NAME.to_string());
        self.user_id = None;
    }

    pub fn create(pool: &DbPool, kind: &str, message: &str, actor: Actor<'_>) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO notifications (type, message, user_id, username, is_anonymous, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![kind, message, actor.user_id, actor.username, actor.is_anonymous],
        )
        .map_err(|e| {
            log::warn!("Failed to store {} notification: {}", kind, e);
            e.to_string()
        })?;
        Ok(conn.last_insert_rowid())
    }

    pub fn comment(pool: &DbPool, actor: Actor<'_>, post_title: &str) -> Result<i64, String> {
        let message = format!("{} posted a comment on '{}'!", actor.display(), post_title);
        Self::create(pool, TYPE_COMMENT, &message, actor)
    }

    pub fn post_like(pool: &DbPool, actor: Actor<'_>, post_title: &str) -> Result<i64, String> {
        let message = format!("{} liked your post '{}'!", actor.display(), post_title);
        Self::create(pool, TYPE_LIKE_POST, &message, actor)
    }

    pub fn comment_like(pool: &DbPool, actor: Actor<'_>, post_title: &str) -> Result<i64, String> {
        let message = format!("{} liked a comment on '{}'!", actor.display(), post_title);
        Self::create(pool, TYPE_LIKE_COMMENT, &message, actor)
    }

    pub fn cv_download(pool: &DbPool, actor: Actor<'_>, reason: &str) -> Result<i64, String> {
        let message = format!("{} downloaded your CV for {}!", actor.display(), reason);
        Self::create(pool, TYPE_CV_DOWNLOAD, &message, actor)
    }

    pub fn view_milestone(pool: &DbPool, count: i64) -> Result<i64, String> {
        let message = format!("Your website got viewed {} times!", count);
        Self::create(pool, TYPE_VIEW_MILESTONE, &message, Actor::anonymous(None))
    }

    pub fn new_user(pool: &DbPool, user_id: i64, username: &str) -> Result<i64, String> {
        let message = format!("{} is now a registered user!", username);
        Self::create(pool, TYPE_NEW_USER, &message, Actor::user(user_id, username))
    }

    pub fn recent(pool: &DbPool, limit: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn
            .prepare("SELECT * FROM notifications ORDER BY created_at DESC, id DESC LIMIT ?1")
        {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        let now = Utc::now().naive_utc();
        stmt.query_map(params![limit], |row| Self::from_row(row, now))
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    /// Returns false when the notification doesn't exist.
    pub fn mark_read(pool: &DbPool, id: i64) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let changed = conn
            .execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(changed > 0)
    }
}
