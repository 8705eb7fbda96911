//! API key lookup for request authentication.
//!
//! Keys are stored as SHA-256 hashes; the plaintext prefix narrows the
//! candidate set before the hash comparison.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::entities::api_keys;

/// How many leading characters of the plaintext key are stored for lookup.
const PREFIX_LEN: usize = 8;

/// Repository for API key authentication.
#[derive(Debug, Clone)]
pub struct ApiKeyRepository {
    db: DatabaseConnection,
}

impl ApiKeyRepository {
    /// Creates a new API key repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds the active key matching a presented plaintext key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_active_by_key(
        &self,
        presented: &str,
    ) -> Result<Option<api_keys::Model>, DbErr> {
        // Keys are ASCII by construction; anything too short or without a
        // char boundary at the prefix cut cannot match a stored key.
        let Some(prefix) = presented.get(..PREFIX_LEN) else {
            return Ok(None);
        };
        let hash = hash_key(presented);

        let found = api_keys::Entity::find()
            .filter(api_keys::Column::Prefix.eq(prefix))
            .filter(api_keys::Column::KeyHash.eq(hash))
            .filter(api_keys::Column::IsActive.eq(true))
            .filter(api_keys::Column::RevokedAt.is_null())
            .one(&self.db)
            .await?;

        Ok(found)
    }

    /// Stores a new key for a ledger. The plaintext is never persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create(&self, ledger_id: Uuid, plaintext: &str) -> Result<api_keys::Model, DbErr> {
        let prefix = plaintext.chars().take(PREFIX_LEN).collect::<String>();
        let row = api_keys::ActiveModel {
            id: Set(Uuid::now_v7()),
            ledger_id: Set(ledger_id),
            key_hash: Set(hash_key(plaintext)),
            prefix: Set(prefix),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
            revoked_at: Set(None),
        };
        row.insert(&self.db).await
    }
}

/// SHA-256 hex digest of a plaintext key.
#[must_use]
pub fn hash_key(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}
