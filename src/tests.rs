#![cfg(test)]

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::Value;

use crate::config::AppConfig;
use crate::db::{self, run_migrations, DbPool, DbTarget};
use crate::email::Mailer;
use crate::models::comment::{Comment, CommentAuthor};
use crate::models::cv::{CvDownload, CvVerification, NewCvDownload};
use crate::models::like::{BlogLike, CommentLike, Liker};
use crate::models::notification::{self, relative_time, Actor, Notification};
use crate::models::post::{month_display_name, Post, PostForm};
use crate::models::user::User;
use crate::models::visitor::VisitorStat;
use crate::rate_limit::{Limit, RateLimiter};
use crate::routes::auth::{validate_registration, RegisterForm};
use crate::security::cv_link::{self, CvLinkError};
use crate::security::token::{Claims, TokenError, TokenSigner};
use crate::security::{auth, mask_email};

/// Atomic counter for unique shared-cache DB names so parallel tests don't collide.
static TEST_DB_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Fresh in-memory SQLite pool with migrations applied. Uses a named
/// shared-cache database so every pooled connection sees the same data.
fn test_pool() -> DbPool {
    let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let uri = format!("file:folio_testdb_{}?mode=memory&cache=shared", id);
    let manager = SqliteConnectionManager::file(uri)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .expect("Failed to create test pool");
    run_migrations(&pool).expect("Failed to run migrations");
    pool
}

/// On-disk database for tests that need real cross-connection locking.
struct TempDb {
    path: std::path::PathBuf,
    pool: DbPool,
}

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("folio_test_{}.db", uuid::Uuid::new_v4()));
        let pool = db::init_pool(path.to_str().unwrap()).expect("Failed to open temp db");
        run_migrations(&pool).expect("Failed to run migrations");
        TempDb { path, pool }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

fn fast_hash(password: &str) -> String {
    bcrypt::hash(password, 4).unwrap()
}

fn make_user(pool: &DbPool, username: &str) -> User {
    let id = User::create(pool, username, &format!("{}@test.com", username), &fast_hash("secret1")).unwrap();
    User::get_by_id(pool, id).unwrap()
}

fn make_post(pool: &DbPool, title: &str) -> Post {
    let form = PostForm {
        title: title.to_string(),
        content: format!("Body of {}", title),
        created_at: None,
    };
    let id = Post::create(pool, &form, None).unwrap();
    Post::find_by_id(pool, id).unwrap()
}

fn signer() -> TokenSigner {
    TokenSigner::new("test-secret", Duration::minutes(5))
}

fn notifications_of(pool: &DbPool, kind: &str) -> Vec<Notification> {
    Notification::recent(pool, 1000)
        .into_iter()
        .filter(|n| n.kind == kind)
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Config & database target
// ═══════════════════════════════════════════════════════════

#[test]
fn db_target_accepts_sqlite_forms() {
    assert_eq!(
        DbTarget::parse("sqlite://website/db/folio.db").unwrap(),
        DbTarget::File("website/db/folio.db".to_string())
    );
    assert_eq!(DbTarget::parse("sqlite:blog.db").unwrap(), DbTarget::File("blog.db".to_string()));
    assert_eq!(DbTarget::parse("sqlite::memory:").unwrap(), DbTarget::Memory);
    assert_eq!(DbTarget::parse("blog.db").unwrap(), DbTarget::File("blog.db".to_string()));
}

#[test]
fn db_target_rejects_server_databases() {
    let err = DbTarget::parse("postgres://user:pw@localhost/blog").unwrap_err();
    assert!(err.contains("postgres"));
    assert!(DbTarget::parse("   ").is_err());
}

#[test]
fn config_defaults() {
    let cfg = AppConfig::default();
    assert_eq!(cfg.cv_link_minutes, 5);
    assert!(cfg.uses_dev_secret());
    assert!(cfg.admin.is_none());
    assert!(!cfg.mail_configured());
    assert_eq!(cfg.mail.port, 587);
}

#[test]
fn config_admin_seed_needs_all_fields() {
    let partial = AppConfig::figment()
        .merge(("admin_username", "boss"))
        .merge(("admin_email", "boss@test.com"));
    assert!(AppConfig::from_figment(&partial).unwrap().admin.is_none());

    let full = partial.merge(("admin_password", "hunter22"));
    let admin = AppConfig::from_figment(&full).unwrap().admin.unwrap();
    assert_eq!(admin.username, "boss");
}

#[test]
fn config_sender_falls_back_to_username() {
    let fig = AppConfig::figment()
        .merge(("mail_username", "me@gmail.com"))
        .merge(("mail_default_sender", ""));
    let cfg = AppConfig::from_figment(&fig).unwrap();
    assert_eq!(cfg.mail.default_sender, "me@gmail.com");
    assert!(cfg.mail_configured());
}

#[test]
fn seed_admin_only_on_empty_table() {
    let pool = test_pool();
    let seed = crate::config::AdminSeed {
        username: "owner".to_string(),
        email: "owner@test.com".to_string(),
        password: "secret1".to_string(),
    };
    assert!(db::seed_admin(&pool, Some(&seed)).unwrap());
    assert!(!db::seed_admin(&pool, Some(&seed)).unwrap());
    let owner = User::get_by_email(&pool, "owner@test.com").unwrap();
    assert!(owner.is_admin());
    assert!(User::authenticate(&pool, "owner@test.com", "secret1").is_some());
}

// ═══════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════

#[test]
fn first_user_is_admin_then_subscribers() {
    let pool = test_pool();
    let first = make_user(&pool, "alice");
    let second = make_user(&pool, "bob");
    assert!(first.is_admin());
    assert_eq!(second.role, "subscriber");
    assert_eq!(User::count(&pool), 2);
}

#[test]
fn duplicate_user_rejected() {
    let pool = test_pool();
    make_user(&pool, "alice");
    let err = User::create(&pool, "alice", "other@test.com", &fast_hash("x")).unwrap_err();
    assert_eq!(err, "Username or email already registered");
    assert!(User::exists_with_username(&pool, "alice"));
    assert!(User::exists_with_email(&pool, "alice@test.com"));
}

#[test]
fn authenticate_checks_password() {
    let pool = test_pool();
    make_user(&pool, "alice");
    assert!(User::authenticate(&pool, "alice@test.com", "secret1").is_some());
    assert!(User::authenticate(&pool, "alice@test.com", "wrong").is_none());
    assert!(User::authenticate(&pool, "nobody@test.com", "secret1").is_none());
}

#[test]
fn password_hash_roundtrip() {
    let hash = auth::hash_password("correct horse").unwrap();
    assert!(auth::verify_password("correct horse", &hash));
    assert!(!auth::verify_password("battery staple", &hash));
    assert!(!auth::verify_password("anything", "not-a-hash"));
}

#[test]
fn registration_validation_messages() {
    let pool = test_pool();
    let form = RegisterForm {
        username: "al".to_string(),
        email: "".to_string(),
        password: "123".to_string(),
    };
    let errors = validate_registration(&pool, &form);
    assert_eq!(errors.get("username"), Some(&"Username must be at least 3 characters"));
    assert_eq!(errors.get("email"), Some(&"Email is required"));
    assert_eq!(errors.get("password"), Some(&"Password must be at least 6 characters"));

    make_user(&pool, "alice");
    let taken = RegisterForm {
        username: "alice".to_string(),
        email: "alice@test.com".to_string(),
        password: "secret1".to_string(),
    };
    let errors = validate_registration(&pool, &taken);
    assert_eq!(errors.get("username"), Some(&"Username already taken"));
    assert_eq!(errors.get("email"), Some(&"Email already registered"));
}

#[test]
fn user_analytics_groups_roles() {
    let pool = test_pool();
    make_user(&pool, "alice");
    make_user(&pool, "bob");
    make_user(&pool, "carol");
    let a = User::analytics(&pool);
    assert_eq!(a.total_users, 3);
    assert_eq!(a.all_users.len(), 3);
    let subs = a.by_role.iter().find(|r| r.role == "subscriber").unwrap();
    assert_eq!(subs.count, 2);
}

// ═══════════════════════════════════════════════════════════
// Posts
// ═══════════════════════════════════════════════════════════

#[test]
fn post_crud() {
    let pool = test_pool();
    let post = make_post(&pool, "Hello");
    assert_eq!(post.view_count, 0);

    let form = PostForm {
        title: "Hello again".to_string(),
        content: "Edited".to_string(),
        created_at: None,
    };
    Post::update(&pool, post.id, &form).unwrap();
    assert_eq!(Post::find_by_id(&pool, post.id).unwrap().title, "Hello again");
    assert!(Post::update(&pool, 9999, &form).is_err());

    Post::increment_view_count(&pool, post.id).unwrap();
    Post::increment_view_count(&pool, post.id).unwrap();
    assert_eq!(Post::find_by_id(&pool, post.id).unwrap().view_count, 2);

    Post::delete(&pool, post.id).unwrap();
    assert!(Post::find_by_id(&pool, post.id).is_none());
}

#[test]
fn post_form_completeness() {
    let form = PostForm {
        title: "  ".to_string(),
        content: "x".to_string(),
        created_at: None,
    };
    assert!(!form.is_complete());
}

#[test]
fn post_backdate_and_month_filter() {
    let pool = test_pool();
    let old = PostForm {
        title: "Old".to_string(),
        content: "From the archive".to_string(),
        created_at: Some("2023-03-14".to_string()),
    };
    Post::create(&pool, &old, None).unwrap();
    let older = PostForm {
        title: "Older".to_string(),
        content: "Even older".to_string(),
        created_at: Some("2022-11-02 08:30:00".to_string()),
    };
    Post::create(&pool, &older, None).unwrap();
    make_post(&pool, "Fresh");

    let march = Post::list(&pool, Some("2023-03"));
    assert_eq!(march.len(), 1);
    assert_eq!(march[0].title, "Old");
    assert_eq!(Post::list(&pool, None).len(), 3);

    let months = Post::available_months(&pool);
    assert_eq!(months.len(), 3);
    assert!(months.iter().any(|m| m.month_year == "2022-11" && m.month_name == "November 2022"));
    // newest month first
    assert!(months[0].month_year > months[1].month_year);

    let latest = Post::latest(&pool, 2);
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].title, "Fresh");
}

#[test]
fn month_names() {
    assert_eq!(month_display_name("2024-03"), "March 2024");
    assert_eq!(month_display_name("2024-12"), "December 2024");
    assert_eq!(month_display_name("2024-13"), "Unknown");
    assert_eq!(month_display_name("garbage"), "Unknown");
}

#[test]
fn post_analytics_counts() {
    let pool = test_pool();
    let alice = make_user(&pool, "alice");
    let post = make_post(&pool, "Stats");
    Comment::create(&pool, post.id, "Nice", CommentAuthor::User(alice.id)).unwrap();
    BlogLike::create(&pool, post.id, &Liker::User { id: alice.id, username: "alice" }).unwrap();
    BlogLike::create(
        &pool,
        post.id,
        &Liker::Anonymous { username: "Anonymous", anonymous_id: None, ip_address: "10.0.0.1" },
    )
    .unwrap();

    let stats = Post::analytics(&pool);
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].comment_count, 1);
    assert_eq!(stats[0].total_likes, 2);
    assert_eq!(stats[0].anonymous_likes, 1);
    assert_eq!(stats[0].registered_likes, 1);
    assert!(stats[0].last_like_date.is_some());
    assert_eq!(BlogLike::total_count(&pool), 2);
}

// ═══════════════════════════════════════════════════════════
// Comments
// ═══════════════════════════════════════════════════════════

#[test]
fn comments_registered_and_anonymous() {
    let pool = test_pool();
    let alice = make_user(&pool, "alice");
    let post = make_post(&pool, "Talk");

    Comment::create(&pool, post.id, "Hi from alice", CommentAuthor::User(alice.id)).unwrap();
    Comment::create(&pool, post.id, "Hi from a stranger", CommentAuthor::Anonymous("  ")).unwrap();
    assert!(Comment::create(&pool, post.id, "   ", CommentAuthor::User(alice.id)).is_err());

    let comments = Comment::for_post(&pool, post.id);
    assert_eq!(comments.len(), 2);
    let anon = comments.iter().find(|c| c.is_anonymous).unwrap();
    assert_eq!(anon.display_name(), "Anonymous");
    let mine = comments.iter().find(|c| !c.is_anonymous).unwrap();
    assert_eq!(mine.display_name(), "alice");
    assert_eq!(Comment::post_title(&pool, mine.id).as_deref(), Some("Talk"));
}

#[test]
fn author_like_toggles() {
    let pool = test_pool();
    let post = make_post(&pool, "Toggle");
    let id = Comment::create(&pool, post.id, "Great", CommentAuthor::Anonymous("Sam")).unwrap();
    assert!(Comment::toggle_author_like(&pool, id).unwrap());
    assert!(Comment::find_by_id(&pool, id).unwrap().liked_by_author);
    assert!(!Comment::toggle_author_like(&pool, id).unwrap());
    assert!(Comment::toggle_author_like(&pool, 4242).is_err());
}

#[test]
fn deleting_post_cascades_to_comments_and_likes() {
    let pool = test_pool();
    let alice = make_user(&pool, "alice");
    let post = make_post(&pool, "Doomed");
    let cid = Comment::create(&pool, post.id, "bye", CommentAuthor::User(alice.id)).unwrap();
    CommentLike::create(&pool, cid, alice.id).unwrap();
    BlogLike::create(&pool, post.id, &Liker::User { id: alice.id, username: "alice" }).unwrap();

    Post::delete(&pool, post.id).unwrap();
    assert!(Comment::find_by_id(&pool, cid).is_none());
    assert_eq!(BlogLike::count_for_post(&pool, post.id), 0);
    assert_eq!(CommentLike::count_for_comment(&pool, cid), 0);
}

// ═══════════════════════════════════════════════════════════
// Likes
// ═══════════════════════════════════════════════════════════

#[test]
fn user_like_is_deduplicated() {
    let pool = test_pool();
    let alice = make_user(&pool, "alice");
    let post = make_post(&pool, "Likeable");
    let liker = Liker::User { id: alice.id, username: "alice" };

    assert!(BlogLike::create(&pool, post.id, &liker).unwrap());
    assert!(!BlogLike::create(&pool, post.id, &liker).unwrap());
    assert_eq!(BlogLike::count_for_post(&pool, post.id), 1);
    assert!(BlogLike::has_user_liked(&pool, post.id, alice.id));

    assert!(BlogLike::delete(&pool, post.id, alice.id).unwrap());
    assert!(!BlogLike::delete(&pool, post.id, alice.id).unwrap());
    assert_eq!(BlogLike::count_for_post(&pool, post.id), 0);
    assert!(!BlogLike::has_user_liked(&pool, post.id, alice.id));
}

#[test]
fn anonymous_likes_dedup_by_id_and_ip() {
    let pool = test_pool();
    let post = make_post(&pool, "Popular");

    let by_id = Liker::Anonymous { username: "Anonymous", anonymous_id: Some("anon-123"), ip_address: "1.1.1.1" };
    assert!(BlogLike::create(&pool, post.id, &by_id).unwrap());
    assert!(!BlogLike::create(&pool, post.id, &by_id).unwrap());

    let by_ip = Liker::Anonymous { username: "Anonymous", anonymous_id: None, ip_address: "2.2.2.2" };
    assert!(BlogLike::create(&pool, post.id, &by_ip).unwrap());
    assert!(!BlogLike::create(&pool, post.id, &by_ip).unwrap());

    // Blank ids fall back to IP
    let blank = Liker::Anonymous { username: "Anonymous", anonymous_id: Some("  "), ip_address: "2.2.2.2" };
    assert!(!BlogLike::create(&pool, post.id, &blank).unwrap());

    // A fresh id from an IP that already liked is still a repeat
    for id in ["anon-456", "anon-789"] {
        let rotated = Liker::Anonymous { username: "Anonymous", anonymous_id: Some(id), ip_address: "1.1.1.1" };
        assert!(!BlogLike::create(&pool, post.id, &rotated).unwrap());
    }
    let same_ip = Liker::Anonymous { username: "Anonymous", anonymous_id: None, ip_address: "1.1.1.1" };
    assert!(!BlogLike::create(&pool, post.id, &same_ip).unwrap());
    let id_after_ip = Liker::Anonymous { username: "Anonymous", anonymous_id: Some("anon-999"), ip_address: "2.2.2.2" };
    assert!(!BlogLike::create(&pool, post.id, &id_after_ip).unwrap());

    assert_eq!(BlogLike::count_for_post(&pool, post.id), 2);
}

#[test]
fn comment_likes() {
    let pool = test_pool();
    let alice = make_user(&pool, "alice");
    let post = make_post(&pool, "Thread");
    let cid = Comment::create(&pool, post.id, "first", CommentAuthor::User(alice.id)).unwrap();

    assert!(CommentLike::create(&pool, cid, alice.id).unwrap());
    assert!(!CommentLike::create(&pool, cid, alice.id).unwrap());
    assert!(CommentLike::has_user_liked(&pool, cid, alice.id));
    assert_eq!(Comment::find_by_id(&pool, cid).unwrap().like_count, 1);

    assert!(CommentLike::delete(&pool, cid, alice.id).unwrap());
    assert!(!CommentLike::delete(&pool, cid, alice.id).unwrap());
    assert_eq!(CommentLike::count_for_comment(&pool, cid), 0);
}

#[test]
fn concurrent_likes_count_once() {
    let tmp = TempDb::new();
    let alice = make_user(&tmp.pool, "alice");
    let post = make_post(&tmp.pool, "Race");
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let pool = tmp.pool.clone();
            let barrier = Arc::clone(&barrier);
            let (post_id, user_id) = (post.id, alice.id);
            thread::spawn(move || {
                barrier.wait();
                BlogLike::create(&pool, post_id, &Liker::User { id: user_id, username: "alice" }).unwrap()
            })
        })
        .collect();
    let inserted = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();

    assert_eq!(inserted, 1);
    assert_eq!(BlogLike::count_for_post(&tmp.pool, post.id), 1);
}

// ═══════════════════════════════════════════════════════════
// Visitor stats
// ═══════════════════════════════════════════════════════════

#[test]
fn visits_mark_first_visit_unique() {
    let pool = test_pool();
    assert_eq!(VisitorStat::record_visit(&pool, "1.1.1.1", "/", None).unwrap(), 1);
    assert_eq!(VisitorStat::record_visit(&pool, "1.1.1.1", "/blog", None).unwrap(), 2);
    assert_eq!(VisitorStat::record_visit(&pool, "2.2.2.2", "/blog", None).unwrap(), 3);

    let conn = pool.get().unwrap();
    let unique: i64 = conn
        .query_row("SELECT COUNT(*) FROM visitor_stats WHERE is_unique = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(unique, 2);
    drop(conn);

    let a = VisitorStat::analytics(&pool).unwrap();
    assert_eq!(a.total_views, 3);
    assert_eq!(a.unique_visitors, 2);
    assert_eq!(a.popular_pages[0].page_visited, "/blog");
    assert_eq!(a.popular_pages[0].count, 2);
    assert_eq!(a.views_by_day.iter().map(|d| d.count).sum::<i64>(), 3);
}

#[test]
fn milestone_every_hundred_views() {
    let pool = test_pool();
    let mut milestones = vec![];
    for i in 0..205 {
        let total = VisitorStat::record_visit(&pool, &format!("10.0.0.{}", i % 7), "/", None).unwrap();
        if VisitorStat::is_milestone(total) {
            milestones.push(total);
        }
    }
    assert_eq!(milestones, vec![100, 200]);
    assert!(!VisitorStat::is_milestone(0));
}

#[test]
fn concurrent_visits_see_distinct_totals() {
    let tmp = TempDb::new();
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pool = tmp.pool.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..25)
                    .map(|_| VisitorStat::record_visit(&pool, &format!("ip{}", i), "/", None).unwrap())
                    .collect::<Vec<i64>>()
            })
        })
        .collect();
    let mut totals: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    totals.sort_unstable();
    assert_eq!(totals, (1..=200).collect::<Vec<i64>>());
    assert_eq!(totals.iter().filter(|t| VisitorStat::is_milestone(**t)).count(), 2);
}

// ═══════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════

#[test]
fn notification_messages() {
    let pool = test_pool();
    Notification::comment(&pool, Actor::user(1, "alice"), "Rust").unwrap();
    Notification::comment(&pool, Actor::anonymous(Some("Sam")), "Rust").unwrap();
    Notification::post_like(&pool, Actor::user(1, "alice"), "Rust").unwrap();
    Notification::comment_like(&pool, Actor::user(1, "alice"), "Rust").unwrap();
    Notification::cv_download(&pool, Actor::anonymous(None), "a job offer").unwrap();
    Notification::view_milestone(&pool, 300).unwrap();
    Notification::new_user(&pool, 2, "bob").unwrap();

    let all: Vec<String> = Notification::recent(&pool, 10).into_iter().map(|n| n.message).collect();
    assert!(all.contains(&"alice posted a comment on 'Rust'!".to_string()));
    assert!(all.contains(&"Anonymous posted a comment on 'Rust'!".to_string()));
    assert!(all.contains(&"alice liked your post 'Rust'!".to_string()));
    assert!(all.contains(&"alice liked a comment on 'Rust'!".to_string()));
    assert!(all.contains(&"Anonymous downloaded your CV for a job offer!".to_string()));
    assert!(all.contains(&"Your website got viewed 300 times!".to_string()));
    assert!(all.contains(&"bob is now a registered user!".to_string()));

    assert_eq!(Notification::recent(&pool, 5).len(), 5);
    let newest = &Notification::recent(&pool, 1)[0];
    assert_eq!(newest.kind, notification::TYPE_NEW_USER);
    assert_eq!(newest.relative_time, "just now");
}

#[test]
fn notification_anonymise_hides_registered_names() {
    let pool = test_pool();
    Notification::new_user(&pool, 7, "alice").unwrap();
    Notification::comment(&pool, Actor::anonymous(Some("Sam")), "Rust").unwrap();

    let mut items = Notification::recent(&pool, 10);
    items.iter_mut().for_each(Notification::anonymise);

    let user = items.iter().find(|n| n.kind == notification::TYPE_NEW_USER).unwrap();
    assert_eq!(user.message, "Anonymous User is now a registered user!");
    assert_eq!(user.username.as_deref(), Some("Anonymous"));
    assert_eq!(user.user_id, None);

    let anon = items.iter().find(|n| n.kind == notification::TYPE_COMMENT).unwrap();
    assert_eq!(anon.message, "Anonymous posted a comment on 'Rust'!");
}

#[test]
fn notification_mark_read() {
    let pool = test_pool();
    let id = Notification::view_milestone(&pool, 100).unwrap();
    assert!(Notification::mark_read(&pool, id).unwrap());
    assert!(Notification::recent(&pool, 1)[0].is_read);
    assert!(!Notification::mark_read(&pool, id + 100).unwrap());
}

#[test]
fn relative_time_strings() {
    let now = Utc::now().naive_utc();
    assert_eq!(relative_time(now, now), "just now");
    assert_eq!(relative_time(now - Duration::seconds(59), now), "just now");
    assert_eq!(relative_time(now - Duration::minutes(1), now), "1 minute ago");
    assert_eq!(relative_time(now - Duration::minutes(45), now), "45 minutes ago");
    assert_eq!(relative_time(now - Duration::hours(1), now), "1 hour ago");
    assert_eq!(relative_time(now - Duration::hours(5), now), "5 hours ago");
    assert_eq!(relative_time(now - Duration::days(1), now), "1 day ago");
    assert_eq!(relative_time(now - Duration::days(12), now), "12 days ago");
    // clock skew never produces negative ages
    assert_eq!(relative_time(now + Duration::minutes(3), now), "just now");
}

#[test]
fn email_masking() {
    assert_eq!(mask_email("jobs@example.com"), "jo***@example.com");
    assert_eq!(mask_email("a@b.io"), "a***@b.io");
    assert_eq!(mask_email("nonsense"), "***");
}

// ═══════════════════════════════════════════════════════════
// Rate limiter
// ═══════════════════════════════════════════════════════════

#[test]
fn rate_limiter_blocks_after_max() {
    let limiter = RateLimiter::new();
    let limit = Limit { max_attempts: 3, window: std::time::Duration::from_secs(60) };
    assert!(limiter.check_and_record("cv_link:1.2.3.4", limit));
    assert!(limiter.check_and_record("cv_link:1.2.3.4", limit));
    assert!(limiter.check_and_record("cv_link:1.2.3.4", limit));
    assert!(!limiter.check_and_record("cv_link:1.2.3.4", limit));
    // other keys are independent
    assert!(limiter.check_and_record("cv_link:5.6.7.8", limit));
}

#[test]
fn rate_limiter_window_expires() {
    let limiter = RateLimiter::new();
    let limit = Limit { max_attempts: 1, window: std::time::Duration::from_millis(30) };
    assert!(limiter.check_and_record("k", limit));
    assert!(!limiter.check_and_record("k", limit));
    thread::sleep(std::time::Duration::from_millis(50));
    assert!(limiter.check_and_record("k", limit));
    limiter.cleanup(std::time::Duration::from_millis(1));
}

// ═══════════════════════════════════════════════════════════
// Signed tokens
// ═══════════════════════════════════════════════════════════

fn claims_at(iat: i64) -> Claims {
    Claims {
        email: "visitor@example.com".to_string(),
        reason: "Hiring".to_string(),
        iat,
        jti: "nonce".to_string(),
    }
}

#[test]
fn token_sign_and_verify() {
    let s = signer();
    let now = Utc::now();
    let token = s.sign(&claims_at(now.timestamp())).unwrap();
    assert_eq!(s.verify(&token, now).unwrap(), claims_at(now.timestamp()));
    assert!(s.verify(&token, now + Duration::minutes(5)).is_ok());
}

#[test]
fn token_age_counts_whole_seconds() {
    let s = signer();
    let issued = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + Duration::milliseconds(900);
    let token = s.sign(&claims_at(issued.timestamp())).unwrap();
    assert!(s.verify(&token, issued + Duration::minutes(4) + Duration::milliseconds(59_500)).is_ok());
    assert_eq!(
        s.verify(&token, issued + Duration::minutes(5) + Duration::seconds(1)),
        Err(TokenError::Expired)
    );
}

#[test]
fn token_expires_after_window() {
    let s = signer();
    let issued = Utc::now();
    let token = s.sign(&claims_at(issued.timestamp())).unwrap();
    assert_eq!(
        s.verify(&token, issued + Duration::minutes(5) + Duration::seconds(1)),
        Err(TokenError::Expired)
    );
}

#[test]
fn token_rejects_tampering_and_foreign_keys() {
    let s = signer();
    let now = Utc::now();
    let token = s.sign(&claims_at(now.timestamp())).unwrap();

    let (payload, sig) = token.split_once('.').unwrap();
    let forged_payload = {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let mut c = claims_at(now.timestamp());
        c.email = "attacker@example.com".to_string();
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&c).unwrap())
    };
    assert_ne!(payload, forged_payload);
    assert_eq!(
        s.verify(&format!("{}.{}", forged_payload, sig), now),
        Err(TokenError::BadSignature)
    );

    let other = TokenSigner::new("another-secret", Duration::minutes(5));
    assert_eq!(other.verify(&token, now), Err(TokenError::BadSignature));

    assert_eq!(s.verify("no-dot-here", now), Err(TokenError::Malformed));
    assert_eq!(s.verify("abc.!!!", now), Err(TokenError::Malformed));
}

// ═══════════════════════════════════════════════════════════
// CV verification flow
// ═══════════════════════════════════════════════════════════

#[test]
fn cv_request_validation() {
    assert_eq!(cv_link::validate_request("not-an-email", "Hiring"), Err(CvLinkError::InvalidEmail));
    assert_eq!(cv_link::validate_request("me@localhost", "Hiring"), Err(CvLinkError::InvalidEmail));
    assert_eq!(cv_link::validate_request("a@b.com", "   "), Err(CvLinkError::MissingReason));
    let (email, reason) = cv_link::validate_request("  a@b.com ", " Hiring ").unwrap();
    assert_eq!((email.as_str(), reason.as_str()), ("a@b.com", "Hiring"));
}

#[test]
fn cv_link_redeems_exactly_once() {
    let pool = test_pool();
    let s = signer();
    let now = Utc::now();
    let link = cv_link::issue_at(&pool, &s, "visitor@example.com", "Hiring", now).unwrap();
    assert_eq!(link.expires_at.timestamp(), now.timestamp() + 5 * 60);

    let record = cv_link::redeem_at(&pool, &s, &link.token, Some("9.9.9.9"), now + Duration::minutes(2)).unwrap();
    assert_eq!(record.email, "visitor@example.com");
    assert_eq!(record.reason, "Hiring");

    assert_eq!(
        cv_link::redeem_at(&pool, &s, &link.token, None, now + Duration::minutes(3)).unwrap_err(),
        CvLinkError::AlreadyUsed
    );

    let stats = CvDownload::analytics(&pool).unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.verified, 1);
    assert_eq!(stats.anonymous, 1);
    assert_eq!(stats.recent[0].email.as_deref(), Some("visitor@example.com"));
    assert_eq!(notifications_of(&pool, notification::TYPE_CV_DOWNLOAD).len(), 1);
}

#[test]
fn cv_link_expired_never_grants() {
    let pool = test_pool();
    let s = signer();
    let issued = Utc::now() - Duration::minutes(6);
    let link = cv_link::issue_at(&pool, &s, "late@example.com", "Curious", issued).unwrap();

    assert_eq!(
        cv_link::redeem_at(&pool, &s, &link.token, None, Utc::now()).unwrap_err(),
        CvLinkError::Expired
    );
    assert!(!CvVerification::find_by_token(&pool, &link.token).unwrap().is_used);
    assert_eq!(CvDownload::analytics(&pool).unwrap().total, 0);
}

#[test]
fn cv_link_redeems_until_last_second() {
    let pool = test_pool();
    let s = signer();
    let issued = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + Duration::milliseconds(900);
    let link = cv_link::issue_at(&pool, &s, "visitor@example.com", "Hiring", issued).unwrap();

    let redeemed_at = issued + Duration::minutes(4) + Duration::milliseconds(59_500);
    assert!(cv_link::redeem_at(&pool, &s, &link.token, None, redeemed_at).is_ok());

    let late = cv_link::issue_at(&pool, &s, "visitor@example.com", "Hiring", issued).unwrap();
    assert_eq!(
        cv_link::redeem_at(&pool, &s, &late.token, None, issued + Duration::minutes(5) + Duration::seconds(1))
            .unwrap_err(),
        CvLinkError::Expired
    );
}

#[test]
fn cv_link_invalid_tokens() {
    let pool = test_pool();
    let s = signer();
    let now = Utc::now();
    let link = cv_link::issue_at(&pool, &s, "visitor@example.com", "Hiring", now).unwrap();

    assert_eq!(cv_link::redeem_at(&pool, &s, "garbage", None, now).unwrap_err(), CvLinkError::Invalid);

    // Correctly signed but never issued
    let stray = s.sign(&claims_at(now.timestamp())).unwrap();
    assert_eq!(cv_link::redeem_at(&pool, &s, &stray, None, now).unwrap_err(), CvLinkError::Invalid);

    // Signed with another key
    let other = TokenSigner::new("another-secret", Duration::minutes(5));
    assert_eq!(cv_link::redeem_at(&pool, &other, &link.token, None, now).unwrap_err(), CvLinkError::Invalid);

    assert!(!CvVerification::find_by_token(&pool, &link.token).unwrap().is_used);
}

#[test]
fn cv_link_concurrent_redemption_single_winner() {
    let tmp = TempDb::new();
    let s = signer();
    let link = cv_link::issue_at(&tmp.pool, &s, "visitor@example.com", "Hiring", Utc::now()).unwrap();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = tmp.pool.clone();
            let signer = s.clone();
            let token = link.token.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cv_link::redeem_at(&pool, &signer, &token, None, Utc::now())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == CvLinkError::AlreadyUsed));
    assert_eq!(CvDownload::analytics(&tmp.pool).unwrap().total, 1);
}

#[test]
fn cv_verification_cleanup() {
    let pool = test_pool();
    let s = signer();
    let now = Utc::now();
    let used = cv_link::issue_at(&pool, &s, "a@example.com", "x", now).unwrap();
    cv_link::redeem_at(&pool, &s, &used.token, None, now).unwrap();
    let stale = cv_link::issue_at(&pool, &s, "b@example.com", "y", now - Duration::hours(1)).unwrap();
    let fresh = cv_link::issue_at(&pool, &s, "c@example.com", "z", now).unwrap();

    assert_eq!(CvVerification::cleanup(&pool, now).unwrap(), 2);
    assert!(CvVerification::find_by_token(&pool, &used.token).is_none());
    assert!(CvVerification::find_by_token(&pool, &stale.token).is_none());
    assert!(CvVerification::find_by_token(&pool, &fresh.token).is_some());
}

#[test]
fn cv_error_reason_codes() {
    assert_eq!(CvLinkError::Invalid.reason_code(), "invalid");
    assert_eq!(CvLinkError::Expired.reason_code(), "expired");
    assert_eq!(CvLinkError::AlreadyUsed.reason_code(), "used");
    assert_eq!(CvLinkError::Storage("db".into()).reason_code(), "unavailable");
}

#[test]
fn cv_download_analytics_by_reason() {
    let pool = test_pool();
    let alice = make_user(&pool, "alice");
    for (reason, user_id) in [("Hiring", None), ("Hiring", Some(alice.id)), ("Curious", None)] {
        CvDownload::create(
            &pool,
            &NewCvDownload { reason, user_id, email: None, ip_address: Some("1.1.1.1"), is_verified: false },
        )
        .unwrap();
    }
    let a = CvDownload::analytics(&pool).unwrap();
    assert_eq!(a.total, 3);
    assert_eq!(a.registered, 1);
    assert_eq!(a.anonymous, 2);
    assert_eq!(a.verified, 0);
    assert_eq!(a.by_reason[0].reason, "Hiring");
    assert_eq!(a.by_reason[0].count, 2);
    assert!(a.recent.iter().any(|r| r.username.as_deref() == Some("alice")));
}

#[test]
fn verification_link_points_at_site() {
    let url = cv_link::verification_url("https://example.com/", "abc.def").unwrap();
    assert_eq!(url, "https://example.com/download-cv/verify?token=abc.def");
    assert!(cv_link::verification_url("not a url", "abc").is_err());
}

// ═══════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
struct CapturingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
    fail: bool,
}

impl Mailer for CapturingMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        if self.fail {
            return Err("SMTP unavailable".to_string());
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

impl CapturingMailer {
    fn last_token(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let body = &sent.last().expect("no mail sent").2;
        let start = body.find("token=").expect("no link in mail") + "token=".len();
        body[start..]
            .split_whitespace()
            .next()
            .unwrap()
            .to_string()
    }
}

struct TestApp {
    client: Client,
    pool: DbPool,
    mailer: Arc<CapturingMailer>,
    cv_file: std::path::PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.cv_file);
    }
}

const CV_BYTES: &[u8] = b"%PDF-1.4 test cv";

fn test_app_with(mailer: CapturingMailer) -> TestApp {
    let pool = test_pool();
    let cv_file = std::env::temp_dir().join(format!("folio_cv_{}.pdf", uuid::Uuid::new_v4()));
    std::fs::write(&cv_file, CV_BYTES).unwrap();

    let mut config = AppConfig::default();
    config.secret_key = "test-secret".to_string();
    config.cv_path = cv_file.display().to_string();
    config.cv_download_name = "Jane_Doe_CV.pdf".to_string();

    let mailer = Arc::new(mailer);
    let client = Client::tracked(crate::build_rocket(config, pool.clone(), mailer.clone()))
        .expect("valid rocket instance");
    TestApp { client, pool, mailer, cv_file }
}

fn test_app() -> TestApp {
    test_app_with(CapturingMailer::default())
}

fn xhr() -> Header<'static> {
    Header::new("X-Requested-With", "XMLHttpRequest")
}

fn register(app: &TestApp, username: &str) -> Value {
    app.client
        .post("/register")
        .header(ContentType::Form)
        .header(xhr())
        .body(format!("username={0}&email={0}%40test.com&password=secret1", username))
        .dispatch()
        .into_json()
        .unwrap()
}

fn request_link(app: &TestApp, ip: &'static str) -> (Status, Value) {
    let resp = app
        .client
        .post("/send-verification-link")
        .header(ContentType::JSON)
        .header(Header::new("X-Real-IP", ip))
        .body(r#"{"email":"visitor@example.com","reason":"Hiring"}"#)
        .dispatch();
    (resp.status(), resp.into_json().unwrap())
}

#[test]
fn http_cv_download_flow() {
    let app = test_app();
    let (status, body) = request_link(&app, "203.0.113.1");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["success"], true);

    {
        let sent = app.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "visitor@example.com");
        assert!(sent[0].2.contains("http://localhost:8000/download-cv/verify?token="));
    }
    let token = app.mailer.last_token();

    let resp = app.client.get(format!("/download-cv/verify?token={}", token)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let disposition = resp.headers().get_one("Content-Disposition").unwrap().to_string();
    assert!(disposition.contains("attachment"));
    assert!(disposition.contains("Jane_Doe_CV.pdf"));
    assert_eq!(resp.into_bytes().unwrap(), CV_BYTES);

    let again = app.client.get(format!("/download-cv/verify?token={}", token)).dispatch();
    assert_eq!(again.status(), Status::SeeOther);
    assert_eq!(again.headers().get_one("Location"), Some("/download-cv/error?reason=used"));

    assert_eq!(CvDownload::analytics(&app.pool).unwrap().verified, 1);
}

#[test]
fn http_cv_bad_tokens_redirect_to_error_page() {
    let app = test_app();
    let resp = app.client.get("/download-cv/verify?token=forged.token").dispatch();
    assert_eq!(resp.headers().get_one("Location"), Some("/download-cv/error?reason=invalid"));

    let resp = app.client.get("/download-cv/verify").dispatch();
    assert_eq!(resp.headers().get_one("Location"), Some("/download-cv/error?reason=invalid"));

    let s = signer();
    let link = cv_link::issue_at(&app.pool, &s, "v@example.com", "x", Utc::now() - Duration::minutes(10)).unwrap();
    let resp = app.client.get(format!("/download-cv/verify?token={}", link.token)).dispatch();
    assert_eq!(resp.headers().get_one("Location"), Some("/download-cv/error?reason=expired"));

    let page = app.client.get("/download-cv/error?reason=expired").dispatch();
    assert_eq!(page.status(), Status::Ok);
    assert!(page.into_string().unwrap().contains("expired"));
}

#[test]
fn http_cv_link_validation_and_rate_limit() {
    let app = test_app();
    let resp = app
        .client
        .post("/send-verification-link")
        .header(ContentType::JSON)
        .body(r#"{"email":"nope","reason":"Hiring"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    assert_eq!(resp.into_json::<Value>().unwrap()["success"], false);

    for _ in 0..3 {
        assert_eq!(request_link(&app, "198.51.100.7").0, Status::Ok);
    }
    let (status, body) = request_link(&app, "198.51.100.7");
    assert_eq!(status, Status::TooManyRequests);
    assert_eq!(body["success"], false);
    assert_eq!(app.mailer.sent.lock().unwrap().len(), 3);
}

#[test]
fn http_cv_link_mail_failure_reported() {
    let app = test_app_with(CapturingMailer { fail: true, ..Default::default() });
    let (status, body) = request_link(&app, "192.0.2.5");
    assert_eq!(status, Status::BadGateway);
    assert_eq!(body["success"], false);
}

#[test]
fn http_register_login_logout() {
    let app = test_app();
    let body = register(&app, "alice");
    assert_eq!(body["success"], true);
    assert_eq!(notifications_of(&app.pool, notification::TYPE_NEW_USER).len(), 1);

    // first account is admin and is signed in
    let resp = app.client.get("/analytics/user-analytics").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let data: Value = resp.into_json().unwrap();
    assert_eq!(data["analytics"]["total_users"], 1);
    assert!(data["analytics"]["all_users"][0].get("password_hash").is_none());

    app.client.get("/logout").dispatch();
    let resp = app.client.get("/analytics/user-analytics").dispatch();
    assert_ne!(resp.status(), Status::Ok);

    let bad = app
        .client
        .post("/login")
        .header(ContentType::Form)
        .header(xhr())
        .body("email=alice%40test.com&password=wrong")
        .dispatch()
        .into_json::<Value>()
        .unwrap();
    assert_eq!(bad["success"], false);

    let good = app
        .client
        .post("/login")
        .header(ContentType::Form)
        .header(xhr())
        .body("email=alice%40test.com&password=secret1")
        .dispatch()
        .into_json::<Value>()
        .unwrap();
    assert_eq!(good["success"], true);
    assert!(good["redirect"].as_str().unwrap().starts_with("/analytics"));
}

#[test]
fn http_register_validation_errors() {
    let app = test_app();
    let body: Value = app
        .client
        .post("/register")
        .header(ContentType::Form)
        .header(xhr())
        .body("username=al&email=&password=123")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"]["username"], "Username must be at least 3 characters");
    assert_eq!(User::count(&app.pool), 0);
}

#[test]
fn http_admin_routes_reject_subscribers() {
    let app = test_app();
    make_user(&app.pool, "owner");
    register(&app, "mallory");

    let resp = app
        .client
        .post("/add")
        .header(ContentType::Form)
        .body("title=Spam&content=Spam")
        .dispatch();
    assert_ne!(resp.status(), Status::Ok);
    assert!(Post::list(&app.pool, None).is_empty());

    let resp = app.client.post("/api/notifications/1/read").dispatch();
    assert_ne!(resp.status(), Status::Ok);
}

#[test]
fn http_admin_manages_posts_and_comments() {
    let app = test_app();
    register(&app, "owner");

    let resp = app
        .client
        .post("/add")
        .header(ContentType::Form)
        .body("title=First&content=Hello+world")
        .dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    let post = Post::list(&app.pool, None).remove(0);
    assert_eq!(post.title, "First");

    app.client
        .post(format!("/update/{}", post.id))
        .header(ContentType::Form)
        .body("title=First+edit&content=Hello")
        .dispatch();
    assert_eq!(Post::find_by_id(&app.pool, post.id).unwrap().title, "First edit");

    let cid = Comment::create(&app.pool, post.id, "hey", CommentAuthor::Anonymous("Sam")).unwrap();
    let toggled: Value = app
        .client
        .post(format!("/comment/author-like/{}", cid))
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(toggled["liked_by_author"], true);

    app.client.get(format!("/delete/comment/{}", cid)).dispatch();
    assert!(Comment::find_by_id(&app.pool, cid).is_none());

    app.client.get(format!("/delete/{}", post.id)).dispatch();
    assert!(Post::find_by_id(&app.pool, post.id).is_none());
}

#[test]
fn http_blog_pages() {
    let app = test_app();
    let post = make_post(&app.pool, "Visible");
    Comment::create(&app.pool, post.id, "first!", CommentAuthor::Anonymous("Sam")).unwrap();

    let home: Value = app.client.get("/").dispatch().into_json().unwrap();
    assert_eq!(home["latest_posts"][0]["title"], "Visible");
    assert_eq!(home["latest_posts"][0]["comments"][0]["content"], "first!");

    let blog: Value = app
        .client
        .get(format!("/blog?post_id={}", post.id))
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(blog["posts"].as_array().unwrap().len(), 1);
    assert_eq!(blog["posts"][0]["user_has_liked"], false);
    assert_eq!(Post::find_by_id(&app.pool, post.id).unwrap().view_count, 1);

    let single: Value = app
        .client
        .get(format!("/blog/post/{}", post.id))
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(single["posts"][0]["view_count"], 2);

    let missing = app.client.get("/blog/post/999").dispatch();
    assert_eq!(missing.headers().get_one("Location"), Some("/blog"));
}

#[test]
fn http_likes() {
    let app = test_app();
    let post = make_post(&app.pool, "Likeable");

    let anon = app
        .client
        .post(format!("/post/like/{}", post.id))
        .header(Header::new("X-Real-IP", "192.0.2.44"))
        .dispatch();
    assert_eq!(anon.status(), Status::Ok);
    assert_eq!(anon.into_json::<Value>().unwrap()["like_count"], 1);

    let dup = app
        .client
        .post(format!("/post/like/{}", post.id))
        .header(Header::new("X-Real-IP", "192.0.2.44"))
        .dispatch();
    assert_eq!(dup.status(), Status::BadRequest);

    let by_id = app
        .client
        .post(format!("/post/anonymous_like/{}", post.id))
        .header(ContentType::JSON)
        .body(r#"{"username":"Sam","anonymous_id":"anon-77"}"#)
        .dispatch();
    assert_eq!(by_id.into_json::<Value>().unwrap()["like_count"], 2);

    let missing = app.client.post("/post/like/999").dispatch();
    assert_eq!(missing.status(), Status::NotFound);

    register(&app, "alice");
    let liked = app.client.post(format!("/post/like/{}", post.id)).dispatch();
    assert_eq!(liked.into_json::<Value>().unwrap()["like_count"], 3);

    let blog: Value = app.client.get("/blog").dispatch().into_json().unwrap();
    assert_eq!(blog["posts"][0]["user_has_liked"], true);

    let unliked = app.client.post(format!("/post/unlike/{}", post.id)).dispatch();
    assert_eq!(unliked.into_json::<Value>().unwrap()["like_count"], 2);
    let again = app.client.post(format!("/post/unlike/{}", post.id)).dispatch();
    assert_eq!(again.status(), Status::NotFound);

    assert_eq!(notifications_of(&app.pool, notification::TYPE_LIKE_POST).len(), 3);
}

#[test]
fn http_comments_and_comment_likes() {
    let app = test_app();
    let post = make_post(&app.pool, "Chatty");

    let resp = app
        .client
        .post("/anonymous_comment")
        .header(ContentType::Form)
        .body(format!("post_id={}&content=Nice+post&author_name=", post.id))
        .dispatch();
    assert_eq!(resp.headers().get_one("Location"), Some(format!("/blog#post-{}", post.id).as_str()));

    register(&app, "alice");
    app.client
        .post("/comment")
        .header(ContentType::Form)
        .body(format!("post_id={}&content=Thanks", post.id))
        .dispatch();

    let comments = Comment::for_post(&app.pool, post.id);
    assert_eq!(comments.len(), 2);
    assert!(comments.iter().any(|c| c.display_name() == "Anonymous"));
    assert!(comments.iter().any(|c| c.display_name() == "alice"));
    assert_eq!(notifications_of(&app.pool, notification::TYPE_COMMENT).len(), 2);

    let cid = comments[0].id;
    let liked = app.client.post(format!("/comment/like/{}", cid)).dispatch();
    assert_eq!(liked.into_json::<Value>().unwrap()["like_count"], 1);
    let dup = app.client.post(format!("/comment/like/{}", cid)).dispatch();
    assert_eq!(dup.status(), Status::BadRequest);
    let gone = app.client.post("/comment/like/4242").dispatch();
    assert_eq!(gone.status(), Status::BadRequest);

    let unliked = app.client.post(format!("/comment/unlike/{}", cid)).dispatch();
    assert_eq!(unliked.into_json::<Value>().unwrap()["like_count"], 0);
    let again = app.client.post(format!("/comment/unlike/{}", cid)).dispatch();
    assert_eq!(again.status(), Status::NotFound);
    assert_eq!(notifications_of(&app.pool, notification::TYPE_LIKE_COMMENT).len(), 1);
}

#[test]
fn http_anonymous_comments_rate_limited() {
    let app = test_app();
    let post = make_post(&app.pool, "Busy");

    let mut statuses = vec![];
    for i in 0..6 {
        let resp = app
            .client
            .post("/anonymous_comment")
            .header(ContentType::Form)
            .header(Header::new("X-Real-IP", "198.51.100.20"))
            .body(format!("post_id={}&content=comment+{}&author_name=Sam", post.id, i))
            .dispatch();
        statuses.push(resp.status());
    }
    assert!(statuses[..5].iter().all(|s| *s == Status::SeeOther));
    assert_eq!(statuses[5], Status::TooManyRequests);
    assert_eq!(Comment::for_post(&app.pool, post.id).len(), 5);

    // another client is unaffected
    let other = app
        .client
        .post("/anonymous_comment")
        .header(ContentType::Form)
        .header(Header::new("X-Real-IP", "198.51.100.21"))
        .body(format!("post_id={}&content=hello&author_name=Kim", post.id))
        .dispatch();
    assert_eq!(other.status(), Status::SeeOther);
    assert_eq!(Comment::for_post(&app.pool, post.id).len(), 6);
}

#[test]
fn http_notifications_masked_for_visitors() {
    let app = test_app();
    make_user(&app.pool, "owner");
    Notification::new_user(&app.pool, 2, "alice").unwrap();

    let feed: Value = app.client.get("/api/notifications").dispatch().into_json().unwrap();
    let first = &feed.as_array().unwrap()[0];
    assert_eq!(first["message"], "Anonymous User is now a registered user!");
    assert_eq!(first["username"], "Anonymous");
    assert_eq!(first["type"], "new_user");
    assert!(first["relative_time"].is_string());

    let history: Value = app.client.get("/notifications-history").dispatch().into_json().unwrap();
    assert_eq!(history["notifications"][0]["username"], "Anonymous");
}

#[test]
fn http_admin_sees_names_and_marks_read() {
    let app = test_app();
    register(&app, "owner");
    Notification::new_user(&app.pool, 9, "alice").unwrap();

    let feed: Value = app.client.get("/api/notifications").dispatch().into_json().unwrap();
    let first = &feed.as_array().unwrap()[0];
    assert_eq!(first["message"], "alice is now a registered user!");

    let id = first["id"].as_i64().unwrap();
    let resp = app.client.post(format!("/api/notifications/{}/read", id)).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert!(Notification::recent(&app.pool, 1)[0].is_read);
}

#[test]
fn http_cv_analytics_masks_emails_for_visitors() {
    let app = test_app();
    CvDownload::create(
        &app.pool,
        &NewCvDownload {
            reason: "Hiring",
            user_id: None,
            email: Some("recruiter@example.com"),
            ip_address: None,
            is_verified: true,
        },
    )
    .unwrap();

    let public: Value = app.client.get("/analytics/cv-analytics").dispatch().into_json().unwrap();
    assert_eq!(public["analytics"]["recent"][0]["email"], "re***@example.com");

    register(&app, "owner");
    let admin: Value = app.client.get("/analytics/cv-analytics").dispatch().into_json().unwrap();
    assert_eq!(admin["analytics"]["recent"][0]["email"], "recruiter@example.com");
}

#[test]
fn http_page_views_raise_milestone() {
    let app = test_app();
    {
        let conn = app.pool.get().unwrap();
        for i in 0..99 {
            conn.execute(
                "INSERT INTO visitor_stats (ip_address, page_visited) VALUES (?1, '/')",
                rusqlite::params![format!("10.1.0.{}", i)],
            )
            .unwrap();
        }
    }

    // analytics pages and APIs are not counted
    app.client.get("/analytics/visitor-analytics").dispatch();
    app.client.get("/api/notifications").dispatch();
    assert!(notifications_of(&app.pool, notification::TYPE_VIEW_MILESTONE).is_empty());

    app.client.get("/").dispatch();
    let milestones = notifications_of(&app.pool, notification::TYPE_VIEW_MILESTONE);
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].message, "Your website got viewed 100 times!");

    let stats: Value = app
        .client
        .get("/analytics/visitor-analytics")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(stats["analytics"]["total_views"], 100);
}

#[test]
fn http_analytics_pages_not_cached() {
    let app = test_app();
    let resp = app.client.get("/analytics/blog-analytics").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert!(resp.headers().get_one("Cache-Control").unwrap().contains("no-store"));
}
