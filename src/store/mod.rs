pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub behavioral_profiles: sled::Tree,
    pub review_items: sled::Tree,
    pub quiz_results: sled::Tree,
    pub due_digests: sled::Tree,
    pub schema_meta: sled::Tree,
    // Secondary index trees
    pub review_due_index: sled::Tree,
    /// review item key -> 首次写入时分配的序号（大端 u64）
    pub review_item_order: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let behavioral_profiles = db.open_tree(trees::BEHAVIORAL_PROFILES)?;
        let review_items = db.open_tree(trees::REVIEW_ITEMS)?;
        let quiz_results = db.open_tree(trees::QUIZ_RESULTS)?;
        let due_digests = db.open_tree(trees::DUE_DIGESTS)?;
        let schema_meta = db.open_tree(trees::SCHEMA_META)?;
        // Secondary index trees
        let review_due_index = db.open_tree(trees::REVIEW_DUE_INDEX)?;
        let review_item_order = db.open_tree(trees::REVIEW_ITEM_ORDER)?;

        Ok(Self {
            db,
            behavioral_profiles,
            review_items,
            quiz_results,
            due_digests,
            schema_meta,
            review_due_index,
            review_item_order,
        })
    }

    /// Opens the store and brings the schema up to date.
    pub fn open_and_migrate(sled_path: &str) -> Result<Self, StoreError> {
        let store = Self::open(sled_path)?;
        store.run_migrations()?;
        Ok(store)
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    /// Monotonic across restarts.
    pub(crate) fn next_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) fn map_transaction_error(
    error: sled::transaction::TransactionError<StoreError>,
) -> StoreError {
    match error {
        sled::transaction::TransactionError::Abort(store_error) => store_error,
        sled::transaction::TransactionError::Storage(storage_error) => {
            StoreError::Sled(storage_error)
        }
    }
}

pub(crate) fn abort_serialization(
    error: serde_json::Error,
) -> sled::transaction::ConflictableTransactionError<StoreError> {
    sled::transaction::ConflictableTransactionError::Abort(StoreError::Serialization(error))
}
