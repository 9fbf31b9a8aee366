//! Email-verified CV downloads.
//!
//! A visitor asks for the CV with an email address and a reason. We mail them
//! a signed link that is valid for a few minutes and can be redeemed once.
//! Redemption checks the signature and age, then claims the stored record with
//! a conditional update so that two concurrent clicks can't both get the file.

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::db::DbPool;
use crate::email::Mailer;
use crate::models::cv::{CvDownload, CvVerification, NewCvDownload};
use crate::models::notification::{Actor, Notification};
use crate::security::token::{Claims, TokenError, TokenSigner};

const MAX_REASON_LEN: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CvLinkError {
    #[error("Invalid verification link")]
    Invalid,
    #[error("Verification link has expired")]
    Expired,
    #[error("Verification link has already been used")]
    AlreadyUsed,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Please tell us why you need the CV")]
    MissingReason,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("could not send email: {0}")]
    Mail(String),
}

impl CvLinkError {
    /// Short code used in the `/download-cv/error?reason=` redirect.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CvLinkError::Invalid | CvLinkError::InvalidEmail | CvLinkError::MissingReason => {
                "invalid"
            }
            CvLinkError::Expired => "expired",
            CvLinkError::AlreadyUsed => "used",
            CvLinkError::Storage(_) | CvLinkError::Mail(_) => "unavailable",
        }
    }
}

impl From<TokenError> for CvLinkError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => CvLinkError::Expired,
            TokenError::Malformed | TokenError::BadSignature => CvLinkError::Invalid,
        }
    }
}

/// A freshly issued, not yet mailed, verification.
#[derive(Debug, Clone)]
pub struct IssuedLink {
    pub email: String,
    pub reason: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Trim and validate the visitor's input.
pub fn validate_request(email: &str, reason: &str) -> Result<(String, String), CvLinkError> {
    let email = email.trim();
    match email.parse::<lettre::Address>() {
        Ok(addr) if addr.domain().contains('.') => {}
        _ => return Err(CvLinkError::InvalidEmail),
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CvLinkError::MissingReason);
    }
    let reason: String = reason.chars().take(MAX_REASON_LEN).collect();
    Ok((email.to_string(), reason))
}

/// Sign a token for (email, reason) and persist the pending verification.
pub fn issue_at(
    pool: &DbPool,
    signer: &TokenSigner,
    email: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<IssuedLink, CvLinkError> {
    let (email, reason) = validate_request(email, reason)?;
    let claims = Claims {
        email: email.clone(),
        reason: reason.clone(),
        iat: now.timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };
    let token = signer.sign(&claims).map_err(|e| CvLinkError::Storage(e.to_string()))?;
    let expires_at = claims.issued_at().unwrap_or(now) + signer.max_age();

    CvVerification::create(pool, &email, &reason, &token, expires_at).map_err(|e| {
        log::error!("Failed to store CV verification for {}: {}", email, e);
        CvLinkError::Storage(e)
    })?;

    Ok(IssuedLink {
        email,
        reason,
        token,
        expires_at,
    })
}

/// `{site_url}/download-cv/verify?token=...`
pub fn verification_url(site_url: &str, token: &str) -> Result<String, CvLinkError> {
    let base = Url::parse(site_url).map_err(|e| CvLinkError::Mail(format!("bad SITE_URL: {}", e)))?;
    let mut url = base
        .join("/download-cv/verify")
        .map_err(|e| CvLinkError::Mail(e.to_string()))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

fn email_body(link: &str, minutes: i64) -> String {
    format!(
        "Hello,\n\n\
         Thank you for your interest in my CV. Please click the link below to download it:\n\n\
         {}\n\n\
         This link will expire in {} minutes and can only be used once.\n\n\
         If you did not request this, you can safely ignore this email.\n",
        link, minutes
    )
}

/// Mail the verification link. Blocking; call from `spawn_blocking` in async code.
pub fn send_link(
    mailer: &dyn Mailer,
    site_url: &str,
    link: &IssuedLink,
    valid_minutes: i64,
) -> Result<(), CvLinkError> {
    let url = verification_url(site_url, &link.token)?;
    mailer
        .send(&link.email, "Your CV Download Link", &email_body(&url, valid_minutes))
        .map_err(|e| {
            log::warn!("CV link email to {} failed: {}", link.email, e);
            CvLinkError::Mail(e)
        })
}

/// Redeem a token at `now`. On success the verification is consumed and the
/// download is recorded; the caller serves the file.
pub fn redeem_at(
    pool: &DbPool,
    signer: &TokenSigner,
    token: &str,
    ip_address: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CvVerification, CvLinkError> {
    signer.verify(token, now)?;

    let record = CvVerification::find_by_token(pool, token.trim()).ok_or(CvLinkError::Invalid)?;
    if record.is_used {
        return Err(CvLinkError::AlreadyUsed);
    }
    if record.is_expired_at(now) {
        return Err(CvLinkError::Expired);
    }

    let claimed = CvVerification::mark_used(pool, &record.token).map_err(CvLinkError::Storage)?;
    if !claimed {
        return Err(CvLinkError::AlreadyUsed);
    }

    let download = NewCvDownload {
        reason: &record.reason,
        user_id: None,
        email: Some(&record.email),
        ip_address,
        is_verified: true,
    };
    if let Err(e) = CvDownload::create(pool, &download) {
        log::error!("Failed to record CV download for {}: {}", record.email, e);
    }
    if let Err(e) = Notification::cv_download(pool, Actor::anonymous(None), &record.reason) {
        log::warn!("CV download notification for verification {} failed: {}", record.id, e);
    }

    log::info!("CV verification {} redeemed", record.id);
    Ok(record)
}
