use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rocket::fs::NamedFile;
use rocket::http::{Header, Status};
use rocket::response::content::RawHtml;
use rocket::response::{self, Redirect, Responder};
use rocket::serde::json::Json;
use rocket::{tokio, Request, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::email::Mailer;
use crate::rate_limit::{self, RateLimiter};
use crate::security::auth::ClientIp;
use crate::security::cv_link::{self, CvLinkError};
use crate::security::token::TokenSigner;

/// Serves a file as a download with the given filename.
pub struct Attachment {
    file: NamedFile,
    filename: String,
}

impl<'r> Responder<'r, 'static> for Attachment {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let mut resp = self.file.respond_to(req)?;
        resp.set_header(Header::new(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", self.filename.replace('"', "")),
        ));
        resp.set_header(Header::new("Cache-Control", "no-store"));
        Ok(resp)
    }
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub reason: String,
}

fn reply(status: Status, success: bool, message: &str) -> (Status, Json<Value>) {
    (status, Json(json!({ "success": success, "message": message })))
}

#[post("/send-verification-link", format = "json", data = "<body>")]
pub async fn send_verification_link(
    body: Json<VerificationRequest>,
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    signer: &State<TokenSigner>,
    mailer: &State<Arc<dyn Mailer>>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
) -> (Status, Json<Value>) {
    let rate_key = format!("cv_link:{}", client_ip.0);
    if !limiter.check_and_record(&rate_key, rate_limit::VERIFICATION_LINKS) {
        return reply(
            Status::TooManyRequests,
            false,
            "Too many requests. Please wait a few minutes before asking for another link.",
        );
    }

    let link = match cv_link::issue_at(pool, signer, &body.email, &body.reason, Utc::now()) {
        Ok(link) => link,
        Err(e @ (CvLinkError::InvalidEmail | CvLinkError::MissingReason)) => {
            return reply(Status::BadRequest, false, &e.to_string());
        }
        Err(e) => {
            log::error!("Could not issue CV link: {}", e);
            return reply(
                Status::InternalServerError,
                false,
                "Unable to create a verification link right now. Please try again later.",
            );
        }
    };

    let mailer = Arc::clone(mailer.inner());
    let site_url = config.site_url.clone();
    let minutes = config.cv_link_minutes;
    let email = link.email.clone();
    let sent = tokio::task::spawn_blocking(move || {
        cv_link::send_link(mailer.as_ref(), &site_url, &link, minutes)
    })
    .await;

    match sent {
        Ok(Ok(())) => {
            log::info!("CV verification link sent to {}", email);
            reply(
                Status::Ok,
                true,
                "Verification link sent! Please check your email inbox.",
            )
        }
        Ok(Err(e)) => {
            log::warn!("CV verification email failed: {}", e);
            reply(
                Status::BadGateway,
                false,
                "Failed to send verification email. Please check your email address and try again later.",
            )
        }
        Err(e) => {
            log::error!("CV verification email task failed: {}", e);
            reply(
                Status::InternalServerError,
                false,
                "Failed to send verification email. Please try again later.",
            )
        }
    }
}

fn error_redirect(reason: &str) -> Redirect {
    Redirect::to(format!("/download-cv/error?reason={}", reason))
}

#[get("/download-cv/verify?<token>")]
pub async fn verify_download(
    token: Option<String>,
    pool: &State<DbPool>,
    config: &State<AppConfig>,
    signer: &State<TokenSigner>,
    client_ip: ClientIp,
) -> Result<Attachment, Redirect> {
    let token = match token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t.to_string(),
        None => return Err(error_redirect(CvLinkError::Invalid.reason_code())),
    };

    // Don't burn the link if there is nothing to hand out.
    if !Path::new(&config.cv_path).is_file() {
        log::error!("CV file missing at {}", config.cv_path);
        return Err(error_redirect("unavailable"));
    }

    let record = match cv_link::redeem_at(pool, signer, &token, Some(&client_ip.0), Utc::now()) {
        Ok(r) => r,
        Err(e) => {
            log::info!("CV link rejected: {}", e);
            return Err(error_redirect(e.reason_code()));
        }
    };

    match NamedFile::open(&config.cv_path).await {
        Ok(file) => {
            log::info!("Serving CV to verified visitor ({})", record.reason);
            Ok(Attachment {
                file,
                filename: config.cv_download_name.clone(),
            })
        }
        Err(e) => {
            log::error!("Could not open CV file {}: {}", config.cv_path, e);
            Err(error_redirect("unavailable"))
        }
    }
}

fn error_message(reason: &str) -> (&'static str, &'static str) {
    match reason {
        "expired" => (
            "Link expired",
            "This download link has expired. Links are valid for a few minutes only; please request a new one.",
        ),
        "used" => (
            "Link already used",
            "This download link has already been used. Each link works once; please request a new one.",
        ),
        "unavailable" => (
            "Download unavailable",
            "The CV can't be downloaded right now. Please try again later.",
        ),
        _ => (
            "Invalid link",
            "This download link is not valid. Please request a new one.",
        ),
    }
}

#[get("/download-cv/error?<reason>")]
pub fn download_error(reason: Option<String>) -> RawHtml<String> {
    let (title, message) = error_message(reason.as_deref().unwrap_or("invalid"));
    RawHtml(format!(
        "<html><body style='font-family:sans-serif;text-align:center;padding:80px'>\
         <h1>{}</h1><p>{}</p><a href='/'>← Home</a></body></html>",
        title, message
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![send_verification_link, verify_download, download_error]
}
