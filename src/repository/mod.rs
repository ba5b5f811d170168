//! Data access layer (Repository pattern)

pub mod campaign;
pub mod credential;
pub mod delivery;

pub use campaign::CampaignRepository;
pub use credential::CredentialRepository;
pub use delivery::DeliveryAttemptRepository;

use sqlx::MySqlPool;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    pool: MySqlPool,
}

impl DbPool {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn inner(&self) -> &MySqlPool {
        &self.pool
    }
}

impl std::ops::Deref for DbPool {
    type Target = MySqlPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
