use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;

use crate::db::DbPool;
use crate::models::user::User;

const SESSION_COOKIE: &str = "folio_session";

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

// ── Client IP request guard ──

/// Extracts the real client IP from the request.
/// Checks headers in priority order:
///   1. CF-Connecting-IP (Cloudflare)
///   2. X-Real-IP (nginx proxy_set_header)
///   3. X-Forwarded-For (first IP in the chain = original client)
///   4. Rocket's client_ip() (socket peer address)
///
/// The headers are taken at face value, so this assumes the app sits behind a
/// reverse proxy that overwrites them. Exposed directly, clients can spoof them
/// and dodge the per-IP rate limits.
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn from_request_headers(request: &Request<'_>) -> String {
        let headers = request.headers();
        for name in ["CF-Connecting-IP", "X-Real-IP"] {
            if let Some(ip) = headers.get_one(name).map(str::trim).filter(|ip| !ip.is_empty()) {
                return ip.to_string();
            }
        }

        // X-Forwarded-For: client, proxy1, proxy2 -- take the leftmost
        if let Some(ip) = headers
            .get_one("X-Forwarded-For")
            .and_then(|f| f.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return ip.to_string();
        }

        request
            .client_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(ClientIp(Self::from_request_headers(request)))
    }
}

// ── XHR detection ──

/// True when the request came from `fetch`/XMLHttpRequest and wants JSON back.
pub struct Xhr(pub bool);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Xhr {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let xhr = request
            .headers()
            .get_one("X-Requested-With")
            .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
            .unwrap_or(false);
        Outcome::Success(Xhr(xhr))
    }
}

// ── Authenticated user guard ──

/// Guard: any signed-in user. Use `Option<AuthenticatedUser>` for pages that
/// also serve anonymous visitors.
pub struct AuthenticatedUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match resolve_session_user(request).await {
            Some(user) => Outcome::Success(AuthenticatedUser { user }),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

/// Guard: requires role = admin
pub struct AdminUser {
    pub user: User,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match resolve_session_user(request).await {
            Some(user) if user.is_admin() => Outcome::Success(AdminUser { user }),
            Some(_) => Outcome::Forward(Status::Forbidden),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

async fn resolve_session_user(request: &Request<'_>) -> Option<User> {
    let pool = request.guard::<&State<DbPool>>().await.succeeded()?;
    let cookies = request.cookies();
    let user_id: i64 = cookies.get_private(SESSION_COOKIE)?.value().parse().ok()?;

    match User::get_by_id(pool, user_id) {
        Some(user) => Some(user),
        None => {
            // Account was removed after the cookie was issued.
            cookies.remove_private(Cookie::from(SESSION_COOKIE));
            None
        }
    }
}

// ── Password utilities ──

pub fn hash_password(password: &str) -> Result<String, String> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| e.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ── Session cookie ──

/// Sign the user in. The cookie is encrypted with Rocket's secret key.
pub fn set_session_cookie(cookies: &CookieJar<'_>, user_id: i64, secure: bool) {
    let mut cookie = Cookie::new(SESSION_COOKIE, user_id.to_string());
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    if secure {
        cookie.set_secure(true);
    }
    cookies.add_private(cookie);
}

pub fn clear_session_cookie(cookies: &CookieJar<'_>) {
    cookies.remove_private(Cookie::from(SESSION_COOKIE));
}
