use chrono::NaiveDateTime;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUBSCRIBER: &str = "subscriber";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String, // admin, subscriber
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct RoleCount {
    pub role: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UserAnalytics {
    pub total_users: i64,
    pub by_role: Vec<RoleCount>,
    pub all_users: Vec<User>,
}

impl User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            role: row.get("role")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    // ── Lookups ──

    pub fn get_by_id(pool: &DbPool, id: i64) -> Option<User> {
        let conn = pool.get().ok()?;
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], Self::from_row)
            .ok()
    }

    pub fn get_by_email(pool: &DbPool, email: &str) -> Option<User> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            Self::from_row,
        )
        .ok()
    }

    pub fn exists_with_username(pool: &DbPool, username: &str) -> bool {
        Self::count_where(pool, "username", username) > 0
    }

    pub fn exists_with_email(pool: &DbPool, email: &str) -> bool {
        Self::count_where(pool, "email", email) > 0
    }

    fn count_where(pool: &DbPool, column: &str, value: &str) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            &format!("SELECT COUNT(*) FROM users WHERE {} = ?1", column),
            params![value],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn count(pool: &DbPool) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap_or(0)
    }

    // ── Mutations ──

    /// Insert a user. The very first account is promoted to admin.
    pub fn create(
        pool: &DbPool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64, String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| e.to_string())?;

        let existing: i64 = tx
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(|e| e.to_string())?;
        let role = if existing == 0 { ROLE_ADMIN } else { ROLE_SUBSCRIBER };

        tx.execute(
            "INSERT INTO users (username, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
            params![username, email, password_hash, role],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                "Username or email already registered".to_string()
            }
            other => other.to_string(),
        })?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(|e| e.to_string())?;
        Ok(id)
    }

    /// Check credentials; returns the user on a bcrypt match.
    pub fn authenticate(pool: &DbPool, email: &str, password: &str) -> Option<User> {
        let user = Self::get_by_email(pool, email)?;
        if crate::security::auth::verify_password(password, &user.password_hash) {
            Some(user)
        } else {
            None
        }
    }

    // ── Analytics ──

    pub fn analytics(pool: &DbPool) -> UserAnalytics {
        let empty = UserAnalytics {
            total_users: 0,
            by_role: vec![],
            all_users: vec![],
        };
        let conn = match pool.get() {
            Ok(c) => c,
            Err(e) => {
                log::error!("User analytics unavailable: {}", e);
                return empty;
            }
        };

        let total_users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap_or(0);

        let by_role: Vec<RoleCount> = conn
            .prepare("SELECT role, COUNT(*) AS count FROM users GROUP BY role ORDER BY count DESC")
            .and_then(|mut stmt| {
                stmt.query_map([], |row| {
                    Ok(RoleCount {
                        role: row.get(0)?,
                        count: row.get(1)?,
                    })
                })
                .map(|rows| rows.filter_map(|r| r.ok()).collect())
            })
            .unwrap_or_default();

        let all_users: Vec<User> = conn
            .prepare("SELECT * FROM users ORDER BY created_at DESC, id DESC")
            .and_then(|mut stmt| {
                stmt.query_map([], Self::from_row)
                    .map(|rows| rows.filter_map(|r| r.ok()).collect())
            })
            .unwrap_or_default();

        UserAnalytics {
            total_users,
            by_role,
            all_users,
        }
    }
}
