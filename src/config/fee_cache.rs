use std::sync::Arc;

use log::{debug, info};
use tokio::sync::RwLock;

use crate::database::models::SystemFeeConfig;
use crate::database::Database;
use crate::error::{Result, SettlementError};

/// Read-through cache over the single active fee configuration. The
/// cache is invalidated on every write path; a missing active config is
/// an operational fault, not something to default around.
#[derive(Clone)]
pub struct FeeConfigCache {
    db: Database,
    cached: Arc<RwLock<Option<SystemFeeConfig>>>,
}

impl FeeConfigCache {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn active(&self) -> Result<SystemFeeConfig> {
        if let Some(config) = self.cached.read().await.clone() {
            return Ok(config);
        }
        let config = self
            .db
            .active_fee_config()
            .await?
            .ok_or(SettlementError::ConfigInconsistent)?;
        debug!("Loaded active fee config '{}' into cache", config.name);
        *self.cached.write().await = Some(config.clone());
        Ok(config)
    }

    pub async fn insert(&self, config: &SystemFeeConfig) -> Result<SystemFeeConfig> {
        let created = self.db.insert_fee_config(config).await?;
        self.invalidate().await;
        Ok(created)
    }

    pub async fn activate(&self, config_id: i64) -> Result<()> {
        self.db.activate_fee_config(config_id).await?;
        self.invalidate().await;
        info!("Fee config {} is now active", config_id);
        Ok(())
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}
