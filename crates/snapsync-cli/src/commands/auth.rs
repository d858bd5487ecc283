//! Auth commands - Login, Logout and Status
//!
//! The sign-in flow itself happens elsewhere; `login` takes the resulting
//! identity token and stores it in the system keyring, remembers the email
//! and turns private mode on. `logout` reverses all three and drops the
//! user's cached pages.

use anyhow::{Context, Result};
use clap::Subcommand;
use snapsync_cache::{DatabasePool, SqliteSettingsStore};
use snapsync_core::config::Config;
use snapsync_core::domain::{Email, IdToken, Partition};
use snapsync_core::ports::ISettingsStore;
use snapsync_remote::auth::KeyringTokenSource;
use tracing::info;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Store an identity token for a user and switch to private mode
    Login {
        /// Email of the signed-in user
        #[arg(long)]
        email: String,
        /// Identity token issued by the sign-in provider
        #[arg(long)]
        token: String,
    },
    /// Remove the stored token and return to anonymous mode
    Logout,
    /// Show the signed-in user
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let pool = DatabasePool::new(&config.cache.database)
            .await
            .context("Failed to open settings database")?;
        let settings = SqliteSettingsStore::new(pool.pool().clone());

        match self {
            AuthCommand::Login { email, token } => {
                execute_login(&settings, email, token, &*fmt).await
            }
            AuthCommand::Logout => execute_logout(&settings, &*fmt).await,
            AuthCommand::Status => execute_status(&settings, format, &*fmt).await,
        }
    }
}

async fn execute_login(
    settings: &SqliteSettingsStore,
    email: &str,
    token: &str,
    fmt: &dyn OutputFormatter,
) -> Result<()> {
    let email = Email::new(email).context("Invalid email")?;
    let token = IdToken::new(token).context("Invalid token")?;

    KeyringTokenSource::store(&email, &token).context("Failed to store token in keyring")?;
    settings.set_private_email(Some(&email)).await?;
    settings.set_private(true).await?;

    info!(email = %email, "Signed in");
    fmt.success(&format!("Signed in as {}", email));
    fmt.info(&format!("Uploads go to partition {}", Partition::for_user(Some(&email))));
    Ok(())
}

async fn execute_logout(settings: &SqliteSettingsStore, fmt: &dyn OutputFormatter) -> Result<()> {
    let Some(email) = settings.private_email().await? else {
        fmt.info("Nobody is signed in. Nothing to log out.");
        return Ok(());
    };

    KeyringTokenSource::clear(&email).context("Failed to clear token from keyring")?;
    settings.set_private_email(None).await?;
    settings.set_private(false).await?;
    let dropped = settings
        .clear_pages(Some(&email))
        .await
        .context("Failed to clear cached pages")?;

    info!(email = %email, dropped_pages = dropped, "Signed out");
    fmt.success(&format!("Signed out {}", email));
    fmt.info("Token removed from keyring");
    Ok(())
}

async fn execute_status(
    settings: &SqliteSettingsStore,
    format: OutputFormat,
    fmt: &dyn OutputFormatter,
) -> Result<()> {
    let email = settings.private_email().await?;
    let private = settings.is_private().await?;
    let has_token = match &email {
        Some(email) => KeyringTokenSource::load(email)
            .context("Failed to read keyring")?
            .is_some(),
        None => false,
    };

    if format.is_json() {
        fmt.print_json(&serde_json::json!({
            "email": email.as_ref().map(Email::as_str),
            "private": private,
            "token_stored": has_token,
        }));
        return Ok(());
    }

    match email {
        Some(email) => {
            fmt.success(&format!("Signed in as {}", email));
            fmt.info(&format!(
                "Token: {}",
                if has_token { "stored" } else { "missing, run 'snapsync auth login'" }
            ));
            fmt.info(&format!("Private mode: {}", if private { "on" } else { "off" }));
        }
        None => {
            fmt.info("Authentication status: anonymous");
            fmt.info("Run 'snapsync auth login --email <email> --token <token>' to sign in");
        }
    }
    Ok(())
}
