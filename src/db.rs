use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::config::AdminSeed;
use crate::security::auth;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Where the relational store lives, as selected by `DATABASE_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    File(String),
    Memory,
}

impl DbTarget {
    /// Accepts `sqlite://<path>`, `sqlite:<path>`, `sqlite::memory:` or a bare path.
    /// Server databases are not supported by this build.
    pub fn parse(url: &str) -> Result<Self, String> {
        let url = url.trim();
        if url.is_empty() {
            return Err("DATABASE_URL is empty".to_string());
        }
        if url == "sqlite::memory:" || url == ":memory:" {
            return Ok(DbTarget::Memory);
        }
        if let Some(path) = url.strip_prefix("sqlite://") {
            return Ok(DbTarget::File(path.to_string()));
        }
        if let Some(path) = url.strip_prefix("sqlite:") {
            return Ok(DbTarget::File(path.to_string()));
        }
        if url.contains("://") {
            let scheme = url.split("://").next().unwrap_or_default();
            return Err(format!(
                "Unsupported database scheme '{}': only SQLite is available",
                scheme
            ));
        }
        Ok(DbTarget::File(url.to_string()))
    }
}

pub fn init_pool(database_url: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    let (manager, max_size) = match DbTarget::parse(database_url)? {
        DbTarget::File(path) => (SqliteConnectionManager::file(path), 10),
        // Every pooled connection to a plain in-memory db would get its own database.
        DbTarget::Memory => (SqliteConnectionManager::memory(), 1),
    };
    let manager = manager.with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder().max_size(max_size).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        -- Accounts
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'subscriber',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Blog posts
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            user_id INTEGER,
            view_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at);

        -- Comments (registered or anonymous)
        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY,
            post_id INTEGER NOT NULL,
            user_id INTEGER,
            author_name TEXT,
            content TEXT NOT NULL,
            is_anonymous INTEGER NOT NULL DEFAULT 0,
            liked_by_author INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);

        -- Post likes
        CREATE TABLE IF NOT EXISTS blog_likes (
            id INTEGER PRIMARY KEY,
            post_id INTEGER NOT NULL,
            user_id INTEGER,
            username TEXT,
            is_anonymous INTEGER NOT NULL DEFAULT 1,
            anonymous_id TEXT,
            ip_address TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_blog_likes_user
            ON blog_likes(post_id, user_id) WHERE user_id IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS uq_blog_likes_anon_id
            ON blog_likes(post_id, anonymous_id)
            WHERE anonymous_id IS NOT NULL AND anonymous_id <> '';
        CREATE UNIQUE INDEX IF NOT EXISTS uq_blog_likes_anon_ip
            ON blog_likes(post_id, ip_address)
            WHERE is_anonymous = 1 AND ip_address IS NOT NULL;

        -- Comment likes
        CREATE TABLE IF NOT EXISTS comment_likes (
            id INTEGER PRIMARY KEY,
            comment_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(comment_id, user_id),
            FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        -- Page views
        CREATE TABLE IF NOT EXISTS visitor_stats (
            id INTEGER PRIMARY KEY,
            ip_address TEXT NOT NULL,
            country TEXT,
            page_visited TEXT NOT NULL,
            is_unique INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_visitor_ip ON visitor_stats(ip_address);
        CREATE INDEX IF NOT EXISTS idx_visitor_date ON visitor_stats(created_at);

        -- CV downloads
        CREATE TABLE IF NOT EXISTS cv_downloads (
            id INTEGER PRIMARY KEY,
            user_id INTEGER,
            email TEXT,
            reason TEXT NOT NULL,
            is_anonymous INTEGER NOT NULL DEFAULT 1,
            is_verified INTEGER NOT NULL DEFAULT 0,
            ip_address TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
        );

        -- CV verification links
        CREATE TABLE IF NOT EXISTS cv_verifications (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL,
            reason TEXT NOT NULL,
            token TEXT NOT NULL UNIQUE,
            is_used INTEGER NOT NULL DEFAULT 0,
            expires_at DATETIME NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        -- Admin feed
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY,
            type TEXT NOT NULL,
            message TEXT NOT NULL,
            user_id INTEGER,
            username TEXT,
            is_anonymous INTEGER NOT NULL DEFAULT 1,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_date ON notifications(created_at);
        ",
    )?;

    Ok(())
}

/// Create the configured admin account when no user exists yet.
/// Returns true when an account was inserted.
pub fn seed_admin(pool: &DbPool, seed: Option<&AdminSeed>) -> Result<bool, Box<dyn std::error::Error>> {
    let conn = pool.get()?;
    let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    if user_count > 0 {
        return Ok(false);
    }

    let seed = match seed {
        Some(s) => s,
        None => {
            log::warn!("No users yet and ADMIN_USERNAME/ADMIN_EMAIL/ADMIN_PASSWORD not set; the first registration becomes admin");
            return Ok(false);
        }
    };

    let hash = auth::hash_password(&seed.password)?;
    conn.execute(
        "INSERT INTO users (username, email, password_hash, role) VALUES (?1, ?2, ?3, 'admin')",
        params![seed.username, seed.email, hash],
    )?;
    log::info!("Created admin user {}", seed.username);
    Ok(true)
}
