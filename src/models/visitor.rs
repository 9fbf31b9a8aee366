use rusqlite::{params, TransactionBehavior};
use serde::Serialize;

use crate::db::DbPool;

/// Every this many page views the admin gets a milestone notification.
pub const VIEW_MILESTONE: i64 = 100;

#[derive(Debug, Serialize)]
pub struct PageCount {
    pub page_visited: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct VisitorAnalytics {
    pub total_views: i64,
    pub unique_visitors: i64,
    pub popular_pages: Vec<PageCount>,
    pub views_by_day: Vec<DailyCount>,
}

pub struct VisitorStat;

impl VisitorStat {
    /// Record one page view and return the total number of views including it.
    ///
    /// Insert and count share an immediate transaction, so each total is
    /// observed by exactly one request and a milestone can't be skipped or
    /// reported twice under concurrency.
    pub fn record_visit(
        pool: &DbPool,
        ip_address: &str,
        page_visited: &str,
        country: Option<&str>,
    ) -> Result<i64, String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| e.to_string())?;

        let seen_before: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM visitor_stats WHERE ip_address = ?1",
                params![ip_address],
                |row| row.get(0),
            )
            .map_err(|e| e.to_string())?;

        tx.execute(
            "INSERT INTO visitor_stats (ip_address, country, page_visited, is_unique)
             VALUES (?1, ?2, ?3, ?4)",
            params![ip_address, country, page_visited, seen_before == 0],
        )
        .map_err(|e| e.to_string())?;

        let total: i64 = tx
            .query_row("SELECT COUNT(*) FROM visitor_stats", [], |row| row.get(0))
            .map_err(|e| e.to_string())?;

        tx.commit().map_err(|e| e.to_string())?;
        Ok(total)
    }

    pub fn is_milestone(total_views: i64) -> bool {
        total_views > 0 && total_views % VIEW_MILESTONE == 0
    }

    pub fn analytics(pool: &DbPool) -> Option<VisitorAnalytics> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(e) => {
                log::error!("Visitor analytics unavailable: {}", e);
                return None;
            }
        };

        let total_views: i64 = conn
            .query_row("SELECT COUNT(*) FROM visitor_stats", [], |row| row.get(0))
            .ok()?;
        let unique_visitors: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT ip_address) FROM visitor_stats",
                [],
                |row| row.get(0),
            )
            .ok()?;

        let popular_pages: Vec<PageCount> = conn
            .prepare(
                "SELECT page_visited, COUNT(*) AS count FROM visitor_stats
                 GROUP BY page_visited ORDER BY count DESC, page_visited LIMIT 10",
            )
            .and_then(|mut stmt| {
                stmt.query_map([], |row| {
                    Ok(PageCount {
                        page_visited: row.get(0)?,
                        count: row.get(1)?,
                    })
                })
                .map(|rows| rows.filter_map(|r| r.ok()).collect())
            })
            .unwrap_or_default();

        let views_by_day: Vec<DailyCount> = conn
            .prepare(
                "SELECT date(created_at) AS day, COUNT(*) AS count FROM visitor_stats
                 WHERE created_at >= date('now', '-7 days')
                 GROUP BY day ORDER BY day",
            )
            .and_then(|mut stmt| {
                stmt.query_map([], |row| {
                    Ok(DailyCount {
                        date: row.get(0)?,
                        count: row.get(1)?,
                    })
                })
                .map(|rows| rows.filter_map(|r| r.ok()).collect())
            })
            .unwrap_or_default();

        Some(VisitorAnalytics {
            total_views,
            unique_visitors,
            popular_pages,
            views_by_day,
        })
    }
}
