use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use crate::db::DbPool;

const SQL_TIME: &str = "%Y-%m-%d %H:%M:%S";

/// One completed CV download.
#[derive(Debug, Clone)]
pub struct NewCvDownload<'a> {
    pub reason: &'a str,
    pub user_id: Option<i64>,
    pub email: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub is_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct RecentDownload {
    pub id: i64,
    pub reason: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub is_anonymous: bool,
    pub is_verified: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct CvAnalytics {
    pub total: i64,
    pub by_reason: Vec<ReasonCount>,
    pub registered: i64,
    pub anonymous: i64,
    pub verified: i64,
    pub recent: Vec<RecentDownload>,
}

pub struct CvDownload;

impl CvDownload {
    pub fn create(pool: &DbPool, download: &NewCvDownload<'_>) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO cv_downloads (user_id, email, reason, is_anonymous, is_verified, ip_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                download.user_id,
                download.email,
                download.reason,
                download.user_id.is_none(),
                download.is_verified,
                download.ip_address
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn analytics(pool: &DbPool) -> Option<CvAnalytics> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(e) => {
                log::error!("CV analytics unavailable: {}", e);
                return None;
            }
        };

        let (total, registered, anonymous, verified): (i64, i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN is_anonymous = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_anonymous = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_verified = 1 THEN 1 ELSE 0 END), 0)
                 FROM cv_downloads",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok()?;

        let by_reason: Vec<ReasonCount> = conn
            .prepare(
                "SELECT reason, COUNT(*) AS count FROM cv_downloads
                 GROUP BY reason ORDER BY count DESC, reason",
            )
            .and_then(|mut stmt| {
                stmt.query_map([], |row| {
                    Ok(ReasonCount {
                        reason: row.get(0)?,
                        count: row.get(1)?,
                    })
                })
                .map(|rows| rows.filter_map(|r| r.ok()).collect())
            })
            .unwrap_or_default();

        let recent: Vec<RecentDownload> = conn
            .prepare(
                "SELECT cv.id, cv.reason, cv.email, u.username, cv.is_anonymous,
                        cv.is_verified, cv.created_at
                 FROM cv_downloads cv
                 LEFT JOIN users u ON cv.user_id = u.id
                 ORDER BY cv.created_at DESC, cv.id DESC
                 LIMIT 10",
            )
            .and_then(|mut stmt| {
                stmt.query_map([], |row| {
                    Ok(RecentDownload {
                        id: row.get(0)?,
                        reason: row.get(1)?,
                        email: row.get(2)?,
                        username: row.get(3)?,
                        is_anonymous: row.get(4)?,
                        is_verified: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })
                .map(|rows| rows.filter_map(|r| r.ok()).collect())
            })
            .unwrap_or_default();

        Some(CvAnalytics {
            total,
            by_reason,
            registered,
            anonymous,
            verified,
            recent,
        })
    }
}

/// A pending or redeemed email verification for a CV download.
#[derive(Debug, Clone, Serialize)]
pub struct CvVerification {
    pub id: i64,
    pub email: String,
    pub reason: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub is_used: bool,
    pub expires_at: NaiveDateTime,
    pub created_at: Option<NaiveDateTime>,
}

impl CvVerification {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CvVerification {
            id: row.get("id")?,
            email: row.get("email")?,
            reason: row.get("reason")?,
            token: row.get("token")?,
            is_used: row.get("is_used")?,
            expires_at: row.get("expires_at")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > Utc.from_utc_datetime(&self.expires_at).timestamp()
    }

    pub fn create(
        pool: &DbPool,
        email: &str,
        reason: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO cv_verifications (email, reason, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![email, reason, token, expires_at.format(SQL_TIME).to_string()],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_token(pool: &DbPool, token: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM cv_verifications WHERE token = ?1",
            params![token],
            Self::from_row,
        )
        .ok()
    }

    /// Claim the token. Only one caller can ever get `Ok(true)` for a given token:
    /// the flag flips inside a single conditional UPDATE.
    pub fn mark_used(pool: &DbPool, token: &str) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let claimed = conn
            .execute(
                "UPDATE cv_verifications SET is_used = 1 WHERE token = ?1 AND is_used = 0",
                params![token],
            )
            .map_err(|e| e.to_string())?;
        Ok(claimed == 1)
    }

    /// Drop records that were redeemed or have expired before `now`.
    pub fn cleanup(pool: &DbPool, now: DateTime<Utc>) -> Result<usize, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "DELETE FROM cv_verifications WHERE is_used = 1 OR expires_at < ?1",
            params![now.format(SQL_TIME).to_string()],
        )
        .map_err(|e| e.to_string())
    }
}
