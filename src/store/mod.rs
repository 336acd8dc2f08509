//! Object store abstraction.
//!
//! The `ObjectStore` trait decouples the diary engine from the storage that
//! actually holds customers, tickets, locations and attachments. The engine
//! needs four things from it: upsert, fetch, query by predicate, and delete
//! with cascade along the ownership edges described by [`Record`].
//!
//! [`InMemoryStore`] is the provided implementation, used by the tests and
//! by embedders that keep the whole diary in memory (with snapshots for
//! durability).
//!
//! # Relationship maintenance
//!
//! Implementations keep both sides of an ownership edge in step:
//! - Inserting a child that names an owner appends the child to the owner's
//!   list (unless already present).
//! - Re-inserting a child under a different owner moves it.
//! - Deleting any entity removes it from its owner's list and deletes
//!   everything it owns, recursively.
//!
//! # Batches
//!
//! A save touches several records at once: the owner, the children it
//! keeps, and the children it drops. [`WriteBatch`] collects those writes
//! and [`ObjectStore::apply`] lands them together. Either every op is
//! visible afterwards or none is.
//!
//! [`Record`]: crate::entity::Record

use crate::entity::{DiaryEntity, EntityRef, Record};
use crate::error::{Error, Result};
use uuid::Uuid;

pub mod inmemory;

pub use inmemory::{InMemoryStore, StoreStats};

/// One staged change in a [`WriteBatch`].
#[derive(Clone, Debug)]
pub enum WriteOp {
    /// Insert or replace a record, linking it under its owner.
    Upsert(Record),
    /// Delete a record and everything it owns.
    Delete(EntityRef),
}

/// Ordered writes applied all-or-nothing by [`ObjectStore::apply`].
///
/// Ops run in the order they were staged, so an owner must be upserted
/// before children that name it.
///
/// # Example
///
/// ```
/// use diary_kit::entity::EntityRef;
/// use diary_kit::model::{Customer, Ticket};
/// use diary_kit::store::WriteBatch;
///
/// let customer = Customer::new("Maria Lopez");
/// let stale = Ticket::new(customer.id, "Old visit", "");
///
/// let mut batch = WriteBatch::new();
/// batch
///     .upsert(customer.clone())
///     .upsert(Ticket::new(customer.id, "Marketing Visit", ""))
///     .delete(EntityRef::ticket(stale.id));
/// assert_eq!(batch.len(), 3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert-or-replace of `entity`.
    pub fn upsert<T: DiaryEntity>(&mut self, entity: T) -> &mut Self {
        self.ops.push(WriteOp::Upsert(entity.into_record()));
        self
    }

    /// Stage a cascading delete of `target`.
    pub fn delete(&mut self, target: EntityRef) -> &mut Self {
        self.ops.push(WriteOp::Delete(target));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Trait for object store implementations.
///
/// **IMPORTANT:** All methods use `&self` so a store can be shared between
/// the service and any number of views. Implementations use interior
/// mutability.
///
/// **ASYNC:** All methods are async and must be awaited.
#[allow(async_fn_in_trait)]
pub trait ObjectStore: Send + Sync + Clone {
    /// Insert an entity, replacing any stored entity with the same id.
    ///
    /// A replaced entity keeps its original position in query order.
    ///
    /// # Errors
    /// - `Error::ValidationError` if `DiaryEntity::validate()` fails
    /// - `Error::NotFound` if the entity names an owner that is not stored
    async fn insert<T: DiaryEntity>(&self, entity: T) -> Result<()>;

    /// Fetch an entity by id.
    ///
    /// # Returns
    /// - `Ok(Some(entity))` - Entity found
    /// - `Ok(None)` - Entity not found (not an error)
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable
    async fn fetch<T: DiaryEntity>(&self, id: Uuid) -> Result<Option<T>>;

    /// All entities of type `T` matching `predicate`, in insertion order.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable
    async fn query<T, P>(&self, predicate: P) -> Result<Vec<T>>
    where
        T: DiaryEntity,
        P: Fn(&T) -> bool + Send;

    /// Delete an entity and everything it owns.
    ///
    /// Returns the number of records removed; `0` when `target` was not
    /// stored.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable
    async fn delete(&self, target: EntityRef) -> Result<usize>;

    /// Apply every op of `batch` in order, or none of them.
    ///
    /// Returns the number of records deleted, cascades included. Readers
    /// never observe a batch half applied.
    ///
    /// # Errors
    /// The error of the first failing op. The store is left exactly as it
    /// was before the call.
    async fn apply(&self, batch: WriteBatch) -> Result<usize>;

    /// All entities of type `T`, in insertion order.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable
    async fn fetch_all<T: DiaryEntity>(&self) -> Result<Vec<T>> {
        self.query(|_: &T| true).await
    }

    /// Fetch several entities, keeping the order of `ids` and skipping ids
    /// that are not stored.
    ///
    /// Default implementation calls `fetch()` for each id.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable
    async fn fetch_many<T: DiaryEntity>(&self, ids: &[Uuid]) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.fetch::<T>(*id).await? {
                results.push(entity);
            }
        }
        Ok(results)
    }

    /// Fetch an entity that must exist.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the entity is not stored
    async fn require<T: DiaryEntity>(&self, id: Uuid) -> Result<T> {
        self.fetch::<T>(id)
            .await?
            .ok_or_else(|| Error::NotFound(EntityRef::new(T::kind(), id).to_string()))
    }

    /// Count stored entities of type `T`.
    ///
    /// # Errors
    /// Returns `Err` if the store is unavailable
    async fn count<T: DiaryEntity>(&self) -> Result<u64> {
        Ok(self.fetch_all::<T>().await?.len() as u64)
    }

    /// Health check - verify the store is accessible.
    ///
    /// # Errors
    /// Returns `Err` if the store is not accessible
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
