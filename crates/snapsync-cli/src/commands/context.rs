//! Wiring shared by the commands
//!
//! Opens the settings database, resolves the effective user and builds the
//! backend client, capture store and upload queue from the configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use snapsync_cache::{DatabasePool, SqliteSettingsStore};
use snapsync_core::config::Config;
use snapsync_core::domain::{Email, UserInfo};
use snapsync_core::ports::{ISettingsStore, ITokenSource};
use snapsync_remote::api::PicsClient;
use snapsync_remote::auth::{KeyringTokenSource, NoTokenSource};
use snapsync_sync::capture::CaptureStore;
use snapsync_sync::queue::UploadQueue;
use tracing::{debug, warn};

/// Everything a command needs to talk to the queue and the backend
pub struct AppContext {
    pub config: Config,
    pub settings: Arc<SqliteSettingsStore>,
    /// Signed-in user when private mode is on, otherwise anonymous
    pub user: Option<UserInfo>,
    pub backend: Arc<PicsClient>,
    pub store: Arc<CaptureStore>,
}

impl AppContext {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = DatabasePool::new(&config.cache.database)
            .await
            .context("Failed to open settings database")?;
        let settings = Arc::new(SqliteSettingsStore::new(pool.pool().clone()));

        let user = effective_user(settings.as_ref()).await?;
        let token_source: Arc<dyn ITokenSource> = match &user {
            Some(user) => Arc::new(KeyringTokenSource::new(user.email.clone())),
            None => Arc::new(NoTokenSource),
        };

        let backend = Arc::new(PicsClient::new(&config.backend, token_source));
        backend.set_token(user.as_ref().map(|u| u.id_token.clone()));

        let store = Arc::new(CaptureStore::from_config(&config.queue));
        store.init().await.context("Failed to create queue directories")?;

        Ok(Self {
            config: config.clone(),
            settings,
            user,
            backend,
            store,
        })
    }

    pub fn email(&self) -> Option<&Email> {
        self.user.as_ref().map(|u| &u.email)
    }

    pub fn queue(&self) -> UploadQueue {
        UploadQueue::new(Arc::clone(&self.store), self.backend.clone())
            .with_stale_after(self.config.queue.stale_after())
    }
}

/// The user uploads and feeds run as
///
/// Private mode with a remembered email and a stored token; anything else
/// is anonymous.
async fn effective_user(settings: &dyn ISettingsStore) -> Result<Option<UserInfo>> {
    if !settings.is_private().await? {
        debug!("Private mode off; running anonymously");
        return Ok(None);
    }
    let Some(email) = settings.private_email().await? else {
        warn!("Private mode is on but nobody is signed in");
        return Ok(None);
    };
    match KeyringTokenSource::new(email.clone()).fetch_token().await? {
        Some(token) => Ok(Some(UserInfo::new(email, token))),
        None => {
            warn!(email = %email, "No stored token; running anonymously");
            Ok(None)
        }
    }
}
