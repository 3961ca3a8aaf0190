use async_trait::async_trait;

use crate::error::Result;
use crate::models::ContextRecord;

/// Port for persisting import contexts
#[async_trait]
pub trait TaskHistoryStore: Send + Sync {
    /// Persist a new context record and return the id allocated for it
    async fn create(&self, record: ContextRecord) -> Result<u64>;

    /// Overwrite the record with the same id
    async fn update(&self, record: ContextRecord) -> Result<()>;

    async fn get(&self, id: u64) -> Result<Option<ContextRecord>>;

    /// All records ordered by id
    async fn list(&self) -> Result<Vec<ContextRecord>>;

    /// Drop every record
    async fn clear(&self) -> Result<()>;
}
