use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::MailConfig;

/// Outbound mail. The app holds one as `Arc<dyn Mailer>` managed state.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String>;
}

/// Plain-text mail over SMTP using the configured relay.
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        SmtpMailer { config }
    }

    fn transport(&self) -> Result<SmtpTransport, String> {
        let cfg = &self.config;
        let builder = if cfg.use_ssl {
            SmtpTransport::relay(&cfg.server).map_err(|e| format!("SMTP relay error: {}", e))?
        } else if cfg.use_tls {
            SmtpTransport::starttls_relay(&cfg.server)
                .map_err(|e| format!("SMTP relay error: {}", e))?
        } else {
            SmtpTransport::builder_dangerous(&cfg.server)
        };

        let builder = builder.port(cfg.port);
        let builder = if cfg.username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
        };
        Ok(builder.build())
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        if self.config.default_sender.is_empty() {
            return Err("No sender configured: set MAIL_DEFAULT_SENDER or MAIL_USERNAME".to_string());
        }

        let email = Message::builder()
            .from(
                self.config
                    .default_sender
                    .parse()
                    .map_err(|e| format!("Invalid from address: {}", e))?,
            )
            .to(to.parse().map_err(|e| format!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| format!("Failed to build email: {}", e))?;

        self.transport()?
            .send(&email)
            .map_err(|e| format!("SMTP send error: {}", e))?;
        log::info!("Sent \"{}\" to {}", subject, to);
        Ok(())
    }
}
