//! Shared CRUD surface of the table repositories.

use crate::db::errors::Result;

/// CRUD over one table, borrowed from a connection or transaction.
///
/// Table-specific queries (locking, sweeps, overlap checks) live as inherent methods on each
/// repository; this trait only covers what every table has.
#[async_trait::async_trait]
pub trait Repository {
    type CreateRequest;
    type UpdateRequest;
    type Response;
    type Id: Send + Sync;
    /// Filter and pagination for [`Repository::list`]
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    /// `None` when no row has this id
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Fails with [`DbError::NotFound`](crate::db::errors::DbError::NotFound) when no row has this id
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;

    /// Whether a row was deleted
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;
}
