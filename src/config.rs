use rocket::figment::providers::{Env, Serialized};
use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

pub const DEV_SECRET_KEY: &str = "dev_key_for_blog";

/// Environment variables read into `AppConfig`. Keys are lowercased by figment.
const ENV_KEYS: &[&str] = &[
    "SECRET_KEY",
    "DATABASE_URL",
    "SITE_URL",
    "CV_PATH",
    "CV_DOWNLOAD_NAME",
    "CV_LINK_MINUTES",
    "MAIL_SERVER",
    "MAIL_PORT",
    "MAIL_USE_TLS",
    "MAIL_USE_SSL",
    "MAIL_USERNAME",
    "MAIL_PASSWORD",
    "MAIL_DEFAULT_SENDER",
    "ADMIN_USERNAME",
    "ADMIN_EMAIL",
    "ADMIN_PASSWORD",
    "TASK_CLEANUP_MINUTES",
];

/// Application settings. Defaults suit local development; production
/// deployments override them through the environment or a `.env` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub secret_key: String,
    pub database_url: String,
    pub site_url: String,
    pub cv_path: String,
    pub cv_download_name: String,
    /// Lifetime of a CV verification link.
    pub cv_link_minutes: i64,
    pub mail: MailConfig,
    pub admin: Option<AdminSeed>,
    pub task_cleanup_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub use_ssl: bool,
    pub username: String,
    pub password: String,
    pub default_sender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Flat shape of the environment, before grouping into `AppConfig`.
#[derive(Debug, Deserialize, Serialize)]
struct RawConfig {
    secret_key: String,
    database_url: String,
    site_url: String,
    cv_path: String,
    cv_download_name: String,
    cv_link_minutes: i64,
    mail_server: String,
    mail_port: u16,
    mail_use_tls: bool,
    mail_use_ssl: bool,
    mail_username: String,
    mail_password: String,
    mail_default_sender: String,
    admin_username: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
    task_cleanup_minutes: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            secret_key: DEV_SECRET_KEY.to_string(),
            database_url: "sqlite://website/db/folio.db".to_string(),
            site_url: "http://localhost:8000".to_string(),
            cv_path: "website/private/cv.pdf".to_string(),
            cv_download_name: "CV.pdf".to_string(),
            cv_link_minutes: 5,
            mail_server: "smtp.gmail.com".to_string(),
            mail_port: 587,
            mail_use_tls: true,
            mail_use_ssl: false,
            mail_username: String::new(),
            mail_password: String::new(),
            mail_default_sender: String::new(),
            admin_username: None,
            admin_email: None,
            admin_password: None,
            task_cleanup_minutes: 60,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let admin = match (raw.admin_username, raw.admin_email, raw.admin_password) {
            (Some(username), Some(email), Some(password))
                if !username.is_empty() && !email.is_empty() && !password.is_empty() =>
            {
                Some(AdminSeed {
                    username,
                    email,
                    password,
                })
            }
            _ => None,
        };

        AppConfig {
            secret_key: raw.secret_key,
            database_url: raw.database_url,
            site_url: raw.site_url,
            cv_path: raw.cv_path,
            cv_download_name: raw.cv_download_name,
            cv_link_minutes: raw.cv_link_minutes.max(1),
            mail: MailConfig {
                server: raw.mail_server,
                port: raw.mail_port,
                use_tls: raw.mail_use_tls,
                use_ssl: raw.mail_use_ssl,
                default_sender: if raw.mail_default_sender.is_empty() {
                    raw.mail_username.clone()
                } else {
                    raw.mail_default_sender
                },
                username: raw.mail_username,
                password: raw.mail_password,
            },
            admin,
            task_cleanup_minutes: raw.task_cleanup_minutes.max(1),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

impl AppConfig {
    /// Defaults overlaid with the whitelisted environment variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(RawConfig::default())).merge(Env::raw().only(ENV_KEYS))
    }

    pub fn load() -> Result<Self, String> {
        Self::from_figment(&Self::figment())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, String> {
        figment
            .extract::<RawConfig>()
            .map(AppConfig::from)
            .map_err(|e| format!("Invalid configuration: {}", e))
    }

    pub fn mail_configured(&self) -> bool {
        !self.mail.server.is_empty() && !self.mail.username.is_empty()
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.secret_key == DEV_SECRET_KEY
    }
}
