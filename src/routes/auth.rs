use std::collections::BTreeMap;

use rocket::form::Form;
use rocket::http::CookieJar;
use rocket::response::content::RawHtml;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{Either, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::models::notification::Notification;
use crate::models::user::User;
use crate::security::auth::{self, Xhr};

#[derive(Debug, FromForm, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, FromForm, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

type FieldErrors = BTreeMap<&'static str, &'static str>;

/// Field-level problems with a registration, keyed by field name.
pub fn validate_registration(pool: &DbPool, form: &RegisterForm) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let username = form.username.trim();
    let email = form.email.trim();

    if username.is_empty() {
        errors.insert("username", "Username is required");
    } else if username.chars().count() < 3 {
        errors.insert("username", "Username must be at least 3 characters");
    }
    if email.is_empty() {
        errors.insert("email", "Email is required");
    }
    if form.password.is_empty() {
        errors.insert("password", "Password is required");
    } else if form.password.chars().count() < 6 {
        errors.insert("password", "Password must be at least 6 characters");
    }

    if errors.is_empty() {
        if User::exists_with_username(pool, username) {
            errors.insert("username", "Username already taken");
        }
        if User::exists_with_email(pool, email) {
            errors.insert("email", "Email already registered");
        }
    }
    errors
}

fn landing_for(user: &User) -> String {
    let base = if user.is_admin() { "/analytics" } else { "/blog" };
    format!("{}?auth_event=login", base)
}

fn page(title: &str, body: &str) -> RawHtml<String> {
    RawHtml(format!(
        "<html><head><title>{}</title></head>\
         <body style='font-family:sans-serif;max-width:360px;margin:80px auto'>{}</body></html>",
        title, body
    ))
}

#[get("/login?<error>")]
pub fn login_page(error: Option<bool>) -> RawHtml<String> {
    let notice = if error.unwrap_or(false) {
        "<p style='color:#b00'>Invalid email or password</p>"
    } else {
        ""
    };
    page(
        "Login",
        &format!(
            "<h1>Login</h1>{}\
             <form method='post' action='/login'>\
             <p><input name='email' type='email' placeholder='Email'></p>\
             <p><input name='password' type='password' placeholder='Password'></p>\
             <p><button>Login</button> or <a href='/register'>register</a></p></form>",
            notice
        ),
    )
}

#[get("/register")]
pub fn register_page() -> RawHtml<String> {
    page(
        "Register",
        "<h1>Register</h1>\
         <form method='post' action='/register'>\
         <p><input name='username' placeholder='Username'></p>\
         <p><input name='email' type='email' placeholder='Email'></p>\
         <p><input name='password' type='password' placeholder='Password'></p>\
         <p><button>Register</button></p></form>",
    )
}

#[post("/login", data = "<form>")]
pub fn login_submit(
    form: Form<LoginForm>,
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    xhr: Xhr,
) -> Either<Json<Value>, Redirect> {
    let user = match User::authenticate(pool, form.email.trim(), &form.password) {
        Some(u) => u,
        None => {
            log::info!("Failed login for {}", form.email.trim());
            return if xhr.0 {
                Either::Left(Json(json!({"success": false, "error": "Invalid email or password"})))
            } else {
                Either::Right(Redirect::to("/login?error=true"))
            };
        }
    };

    auth::set_session_cookie(cookies, user.id, config.site_url.starts_with("https://"));
    let target = landing_for(&user);
    if xhr.0 {
        Either::Left(Json(json!({"success": true, "redirect": target})))
    } else {
        Either::Right(Redirect::to(target))
    }
}

#[post("/register", data = "<form>")]
pub fn register_submit(
    form: Form<RegisterForm>,
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    cookies: &CookieJar<'_>,
    xhr: Xhr,
) -> Either<Json<Value>, Redirect> {
    let errors = validate_registration(pool, &form);
    if !errors.is_empty() {
        return if xhr.0 {
            Either::Left(Json(json!({"success": false, "errors": errors})))
        } else {
            Either::Right(Redirect::to("/register"))
        };
    }

    let username = form.username.trim();
    let result = auth::hash_password(&form.password)
        .and_then(|hash| User::create(pool, username, form.email.trim(), &hash));
    let user_id = match result {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Registration of {} failed: {}", username, e);
            return if xhr.0 {
                Either::Left(Json(json!({"success": false, "errors": {"general": e}})))
            } else {
                Either::Right(Redirect::to("/register"))
            };
        }
    };

    if let Err(e) = Notification::new_user(pool, user_id, username) {
        log::warn!("New-user notification for {} failed: {}", username, e);
    }
    auth::set_session_cookie(cookies, user_id, config.site_url.starts_with("https://"));
    log::info!("Registered user {} ({})", username, user_id);

    let target = "/blog?auth_event=login";
    if xhr.0 {
        Either::Left(Json(json!({"success": true, "redirect": target})))
    } else {
        Either::Right(Redirect::to(target))
    }
}

#[get("/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Redirect {
    auth::clear_session_cookie(cookies);
    Redirect::to("/?auth_event=logout")
}

pub fn routes() -> Vec<rocket::Route> {
    routes![login_page, register_page, login_submit, register_submit, logout]
}
