use std::sync::Arc;

use crate::auth::password::Passwords;
use crate::auth::repo::{PgUserDirectory, UserDirectory};
use crate::config::AppConfig;
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn UserDirectory>,
    pub passwords: Passwords,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connect to Postgres, apply migrations and build the hasher.
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;

        let directory = Arc::new(PgUserDirectory::new(pool)) as Arc<dyn UserDirectory>;
        Self::from_parts(directory, config)
    }

    pub fn from_parts(directory: Arc<dyn UserDirectory>, config: AppConfig) -> anyhow::Result<Self> {
        let passwords = Passwords::new(&config.password)?;
        Ok(Self {
            directory,
            passwords,
            config: Arc::new(config),
        })
    }
}
