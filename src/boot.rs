use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::process;

use crate::config::AppConfig;
use crate::db::DbTarget;

/// Required directories that will be created if missing
const REQUIRED_DIRS: &[&str] = &["website", "website/db", "website/static", "website/private"];

/// Run all boot checks. Call this before Rocket launches.
/// Creates missing directories, warns about missing files, and
/// aborts on configuration that can't work.
pub fn run(config: &AppConfig) {
    info!("Boot check starting...");

    let mut warnings = 0u32;
    let mut errors = 0u32;

    // ── 1. Directories ─────────────────────────────────
    for dir in REQUIRED_DIRS {
        let path = Path::new(dir);
        if !path.exists() {
            match fs::create_dir_all(path) {
                Ok(_) => info!("  Created directory: {}", dir),
                Err(e) => {
                    error!("  FAILED to create directory {}: {}", dir, e);
                    errors += 1;
                }
            }
        }
    }

    // ── 2. Database target ─────────────────────────────
    match DbTarget::parse(&config.database_url) {
        Ok(DbTarget::File(path)) => {
            if let Some(parent) = Path::new(&path).parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("  Database directory {} not usable: {}", parent.display(), e);
                    errors += 1;
                }
            }
        }
        Ok(DbTarget::Memory) => {
            warn!("  DATABASE_URL points at an in-memory database; nothing will persist");
            warnings += 1;
        }
        Err(e) => {
            error!("  {}", e);
            errors += 1;
        }
    }

    // ── 3. CV file ─────────────────────────────────────
    if !Path::new(&config.cv_path).is_file() {
        warn!("  CV file not found at {} (downloads will fail)", config.cv_path);
        warnings += 1;
    }

    // ── 4. Secrets and mail ────────────────────────────
    if config.uses_dev_secret() {
        warn!("  SECRET_KEY is the development default; set a real one in production");
        warnings += 1;
    }
    if !config.mail_configured() {
        warn!("  MAIL_USERNAME not set; verification emails cannot be sent");
        warnings += 1;
    }
    if url::Url::parse(&config.site_url).is_err() {
        error!("  SITE_URL is not a valid URL: {}", config.site_url);
        errors += 1;
    }

    // ── Summary ─────────────────────────────────────────
    if errors > 0 {
        error!(
            "Boot check FAILED: {} error(s), {} warning(s). Aborting.",
            errors, warnings
        );
        process::exit(1);
    }

    if warnings > 0 {
        warn!(
            "Boot check passed with {} warning(s). Some features may not work correctly.",
            warnings
        );
    } else {
        info!("Boot check passed. All systems go.");
    }
}
