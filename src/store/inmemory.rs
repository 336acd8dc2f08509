//! In-memory object store (default, thread-safe, async).
//!
//! Uses DashMap keyed by [`EntityRef`] with a monotonically increasing
//! sequence number per record so queries return insertion order.
//!
//! Every write goes through [`InMemoryStore::apply`] as a batch. The batch
//! holds a store-wide write gate and records each touched key's previous
//! value, so a failing op rolls the whole batch back. Reads take the same
//! gate shared and therefore see whole batches only.

use super::{ObjectStore, WriteBatch, WriteOp};
use crate::entity::{DiaryEntity, EntityKind, EntityRef, Record};
use crate::error::{Error, Result};
use crate::serialization::{read_snapshot, write_snapshot};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Previous value of every key a batch touched; `None` if it was absent.
type UndoLog = HashMap<EntityRef, Option<StoredRecord>>;

/// Stored record with its insertion sequence.
#[derive(Clone)]
struct StoredRecord {
    seq: u64,
    record: Record,
}

/// Thread-safe async in-memory object store.
///
/// Clones share the same underlying map.
///
/// # Example
///
/// ```no_run
/// use diary_kit::store::{InMemoryStore, ObjectStore};
/// use diary_kit::model::{Customer, Ticket};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let customer = Customer::new("Maria Lopez");
///     store.insert(customer.clone()).await?;
///     store.insert(Ticket::new(customer.id, "Marketing Visit", "")).await?;
///
///     // The ticket was linked into the customer's ticket list
///     let customer: Customer = store.require(customer.id).await?;
///     assert_eq!(customer.tickets.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    records: Arc<DashMap<EntityRef, StoredRecord>>,
    next_seq: Arc<AtomicU64>,
    gate: Arc<RwLock<()>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        InMemoryStore {
            records: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// Restore a store from bytes produced by [`InMemoryStore::snapshot`].
    ///
    /// # Errors
    /// - `Error::InvalidSnapshot` / `Error::VersionMismatch` /
    ///   `Error::DeserializationError` for unreadable bytes
    /// - `Error::ValidationError` if a record breaks an entity invariant
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self> {
        let store = InMemoryStore::new();
        store.restore(bytes)?;
        Ok(store)
    }

    /// Get the current number of records of every kind.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Per-kind record counts.
    pub fn stats(&self) -> StoreStats {
        let _gate = self.read_gate();
        let mut stats = StoreStats::default();
        for entry in self.records.iter() {
            match &entry.record {
                Record::Customer(_) => stats.customers += 1,
                Record::Location(_) => stats.locations += 1,
                Record::Ticket(_) => stats.tickets += 1,
                Record::Attachment(a) => {
                    stats.attachments += 1;
                    stats.attachment_bytes += a.data.len();
                }
            }
        }
        stats
    }

    /// Print store statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Store Stats: {} customers, {} locations, {} tickets, {} attachments ({} bytes)",
            stats.customers,
            stats.locations,
            stats.tickets,
            stats.attachments,
            stats.attachment_bytes
        );
    }

    /// Serialize every record, in insertion order.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if encoding fails
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let records = {
            let _gate = self.read_gate();
            self.ordered_records()
        };
        debug!("✓ InMemory SNAPSHOT {} records", records.len());
        write_snapshot(&records)
    }

    /// Replace the contents of this store with a snapshot.
    ///
    /// The store is left untouched when the snapshot cannot be read or a
    /// record fails validation.
    ///
    /// # Errors
    /// Same as [`InMemoryStore::from_snapshot`]
    pub fn restore(&self, bytes: &[u8]) -> Result<()> {
        let records: Vec<Record> = read_snapshot(bytes)?;
        for record in &records {
            record.validate()?;
        }

        let _gate = self.write_gate();
        self.records.clear();
        for record in records {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            self.records
                .insert(record.entity_ref(), StoredRecord { seq, record });
        }

        info!("✓ InMemory RESTORE {} records", self.records.len());
        Ok(())
    }

    /// Remove every record.
    pub fn clear_all(&self) {
        let _gate = self.write_gate();
        self.records.clear();
        warn!("⚠ InMemory CLEAR_ALL executed - diary emptied!");
    }

    fn ordered_records(&self) -> Vec<Record> {
        let mut entries: Vec<(u64, Record)> = self
            .records
            .iter()
            .map(|entry| (entry.seq, entry.record.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, record)| record).collect()
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_batch(&self, batch: WriteBatch) -> Result<usize> {
        let _gate = self.write_gate();
        let mut undo = UndoLog::new();
        let mut removed = 0;

        for op in batch.into_ops() {
            let outcome = match op {
                WriteOp::Upsert(record) => self.put(record, &mut undo),
                WriteOp::Delete(target) => {
                    self.remove_cascade(target, &mut removed, &mut undo);
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                let touched = undo.len();
                self.rollback(undo);
                warn!("InMemory APPLY rolled back ({} records restored): {}", touched, e);
                return Err(e);
            }
        }
        Ok(removed)
    }

    fn remember(&self, key: EntityRef, undo: &mut UndoLog) {
        undo.entry(key)
            .or_insert_with(|| self.records.get(&key).map(|entry| entry.value().clone()));
    }

    fn rollback(&self, undo: UndoLog) {
        for (key, previous) in undo {
            match previous {
                Some(stored) => {
                    self.records.insert(key, stored);
                }
                None => {
                    self.records.remove(&key);
                }
            }
        }
    }

    fn put(&self, record: Record, undo: &mut UndoLog) -> Result<()> {
        record.validate()?;

        let key = record.entity_ref();
        let new_parent = record.parent();

        if let Some(parent) = new_parent {
            if !self.records.contains_key(&parent) {
                return Err(Error::NotFound(format!(
                    "owner {} of {} is not stored",
                    parent, key
                )));
            }
        }

        let (seq, old_parent) = match self.records.get(&key) {
            Some(existing) => (existing.seq, existing.record.parent()),
            None => (self.next_seq.fetch_add(1, Ordering::SeqCst), None),
        };
        self.remember(key, undo);

        if old_parent != new_parent {
            if let Some(old) = old_parent {
                self.remember(old, undo);
                if let Some(mut owner) = self.records.get_mut(&old) {
                    owner.record.detach_child(key);
                }
            }
        }

        self.records.insert(key, StoredRecord { seq, record });

        if let Some(parent) = new_parent {
            self.remember(parent, undo);
            if let Some(mut owner) = self.records.get_mut(&parent) {
                owner.record.attach_child(key);
            }
        }

        debug!("✓ InMemory PUT {}", key);
        Ok(())
    }

    fn remove_cascade(&self, target: EntityRef, removed: &mut usize, undo: &mut UndoLog) {
        self.remember(target, undo);
        let Some((_, stored)) = self.records.remove(&target) else {
            return;
        };
        *removed += 1;

        if let Some(parent) = stored.record.parent() {
            self.remember(parent, undo);
            if let Some(mut owner) = self.records.get_mut(&parent) {
                owner.record.detach_child(target);
            }
        }

        for child in stored.record.children() {
            self.remove_cascade(child, removed, undo);
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryStore {
    async fn insert<T: DiaryEntity>(&self, entity: T) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.upsert(entity);
        self.apply_batch(batch).map(|_| ())
    }

    async fn fetch<T: DiaryEntity>(&self, id: Uuid) -> Result<Option<T>> {
        let _gate = self.read_gate();
        let key = EntityRef::new(T::kind(), id);
        Ok(self
            .records
            .get(&key)
            .and_then(|entry| T::from_record(&entry.record).cloned()))
    }

    async fn query<T, P>(&self, predicate: P) -> Result<Vec<T>>
    where
        T: DiaryEntity,
        P: Fn(&T) -> bool + Send,
    {
        // Clone out first so the predicate never runs under a shard lock
        let gate = self.read_gate();
        let mut entries: Vec<(u64, T)> = self
            .records
            .iter()
            .filter(|entry| entry.key().kind == T::kind())
            .filter_map(|entry| T::from_record(&entry.record).map(|e| (entry.seq, e.clone())))
            .collect();
        drop(gate);
        entries.sort_by_key(|(seq, _)| *seq);

        Ok(entries
            .into_iter()
            .map(|(_, entity)| entity)
            .filter(|entity| predicate(entity))
            .collect())
    }

    async fn delete(&self, target: EntityRef) -> Result<usize> {
        let mut batch = WriteBatch::new();
        batch.delete(target);
        let removed = self.apply_batch(batch)?;

        if removed == 0 {
            debug!("✓ InMemory DELETE {} -> absent", target);
        } else {
            debug!("✓ InMemory DELETE {} ({} records)", target, removed);
        }
        Ok(removed)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<usize> {
        let staged = batch.len();
        let removed = self.apply_batch(batch)?;
        debug!("✓ InMemory APPLY {} ops ({} records removed)", staged, removed);
        Ok(removed)
    }

    async fn count<T: DiaryEntity>(&self) -> Result<u64> {
        let _gate = self.read_gate();
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.key().kind == T::kind())
            .count() as u64)
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub customers: usize,
    pub locations: usize,
    pub tickets: usize,
    pub attachments: usize,
    pub attachment_bytes: usize,
}

impl StoreStats {
    pub fn of(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Customer => self.customers,
            EntityKind::Location => self.locations,
            EntityKind::Ticket => self.tickets,
            EntityKind::Attachment => self.attachments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attachment, AttachmentOwner, Customer, Location, Ticket};
    use crate::status::TicketStatus;

    async fn customer_with_graph(store: &InMemoryStore) -> (Customer, Ticket) {
        let customer = Customer::new("Acme Plumbing");
        store.insert(customer.clone()).await.expect("Failed to insert");

        let mut location = Location::new("Warehouse", None);
        location.customer_id = Some(customer.id);
        store.insert(location).await.expect("Failed to insert");

        let mut doc = Attachment::new("contract.pdf", "pdf", vec![1, 2, 3]);
        doc.owner = Some(AttachmentOwner::Customer(customer.id));
        store.insert(doc).await.expect("Failed to insert");

        let ticket = Ticket::new(customer.id, "Leak repair", "Warehouse");
        store.insert(ticket.clone()).await.expect("Failed to insert");

        let mut photo = Attachment::new("leak.jpg", "image", vec![9; 16]);
        photo.owner = Some(AttachmentOwner::Ticket(ticket.id));
        store.insert(photo).await.expect("Failed to insert");

        (customer, ticket)
    }

    #[tokio::test]
    async fn test_insert_links_owner_lists() {
        let store = InMemoryStore::new();
        let (customer, ticket) = customer_with_graph(&store).await;

        let customer: Customer = store.require(customer.id).await.expect("Failed to fetch");
        assert_eq!(customer.locations.len(), 1);
        assert_eq!(customer.attachments.len(), 1);
        assert_eq!(customer.tickets, vec![ticket.id]);

        let ticket: Ticket = store.require(ticket.id).await.expect("Failed to fetch");
        assert_eq!(ticket.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_customer_cascades() {
        let store = InMemoryStore::new();
        let (customer, _) = customer_with_graph(&store).await;
        let bystander = Customer::new("Unrelated");
        store.insert(bystander.clone()).await.expect("Failed to insert");

        let removed = store
            .delete(EntityRef::customer(customer.id))
            .await
            .expect("Failed to delete");

        // customer + location + doc + ticket + photo
        assert_eq!(removed, 5);
        assert_eq!(store.len(), 1);
        assert!(store
            .fetch::<Customer>(bystander.id)
            .await
            .expect("Failed to fetch")
            .is_some());
    }

    #[tokio::test]
    async fn test_delete_ticket_unlinks_from_customer() {
        let store = InMemoryStore::new();
        let (customer, ticket) = customer_with_graph(&store).await;

        let removed = store
            .delete(EntityRef::ticket(ticket.id))
            .await
            .expect("Failed to delete");
        assert_eq!(removed, 2);

        let customer: Customer = store.require(customer.id).await.expect("Failed to fetch");
        assert!(customer.tickets.is_empty());
        assert_eq!(store.stats().attachments, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = InMemoryStore::new();
        let removed = store
            .delete(EntityRef::ticket(Uuid::now_v7()))
            .await
            .expect("Failed to delete");
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_reinsert_under_new_owner_moves_child() {
        let store = InMemoryStore::new();
        let first = Customer::new("First");
        let second = Customer::new("Second");
        store.insert(first.clone()).await.expect("Failed to insert");
        store.insert(second.clone()).await.expect("Failed to insert");

        let mut ticket = Ticket::new(first.id, "Move me", "");
        store.insert(ticket.clone()).await.expect("Failed to insert");

        ticket.customer_id = second.id;
        store.insert(ticket.clone()).await.expect("Failed to insert");

        let first: Customer = store.require(first.id).await.expect("Failed to fetch");
        let second: Customer = store.require(second.id).await.expect("Failed to fetch");
        assert!(first.tickets.is_empty());
        assert_eq!(second.tickets, vec![ticket.id]);
    }

    #[tokio::test]
    async fn test_insert_rejects_missing_owner() {
        let store = InMemoryStore::new();
        let ticket = Ticket::new(Uuid::now_v7(), "Orphan", "");
        let result = store.insert(ticket).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_insert_rejects_inconsistent_ticket() {
        let store = InMemoryStore::new();
        let customer = Customer::new("Strict");
        store.insert(customer.clone()).await.expect("Failed to insert");

        let mut ticket = Ticket::new(customer.id, "Bad", "");
        ticket.status = TicketStatus::Done;
        let result = store.insert(ticket).await;
        assert!(matches!(result, Err(Error::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_query_preserves_insertion_order_on_update() {
        let store = InMemoryStore::new();
        let mut a = Customer::new("a");
        let b = Customer::new("b");
        store.insert(a.clone()).await.expect("Failed to insert");
        store.insert(b.clone()).await.expect("Failed to insert");

        a.name = "a (renamed)".to_string();
        store.insert(a.clone()).await.expect("Failed to insert");

        let all: Vec<Customer> = store.fetch_all().await.expect("Failed to query");
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[0].name, "a (renamed)");
        assert_eq!(all[1].id, b.id);
    }

    #[tokio::test]
    async fn test_query_with_predicate() {
        let store = InMemoryStore::new();
        store
            .insert(Customer::new("Maria"))
            .await
            .expect("Failed to insert");
        store
            .insert(Customer::new("Bob"))
            .await
            .expect("Failed to insert");

        let found: Vec<Customer> = store
            .query(|c: &Customer| c.name.starts_with('M'))
            .await
            .expect("Failed to query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Maria");
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let store = InMemoryStore::new();
        let (customer, ticket) = customer_with_graph(&store).await;

        let bytes = store.snapshot().expect("Failed to snapshot");
        let restored = InMemoryStore::from_snapshot(&bytes).expect("Failed to restore");

        assert_eq!(restored.stats(), store.stats());
        let restored_customer: Customer = restored
            .require(customer.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(restored_customer.tickets, vec![ticket.id]);
    }

    #[tokio::test]
    async fn test_restore_garbage_leaves_store_untouched() {
        let store = InMemoryStore::new();
        customer_with_graph(&store).await;
        let before = store.stats();

        assert!(store.restore(b"not a snapshot").is_err());
        assert_eq!(store.stats(), before);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = InMemoryStore::new();
        let clone = store.clone();
        clone
            .insert(Customer::new("Shared"))
            .await
            .expect("Failed to insert");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_lands_whole_batch() {
        let store = InMemoryStore::new();
        let customer = Customer::new("Batched");
        let ticket = Ticket::new(customer.id, "Survey", "");
        let mut photo = Attachment::new("site.jpg", "image", vec![1; 4]);
        photo.owner = Some(AttachmentOwner::Ticket(ticket.id));

        let mut batch = WriteBatch::new();
        batch
            .upsert(customer.clone())
            .upsert(ticket.clone())
            .upsert(photo);
        let removed = store.apply(batch).await.expect("Failed to apply");

        assert_eq!(removed, 0);
        assert_eq!(store.len(), 3);
        let customer: Customer = store.require(customer.id).await.expect("Failed to fetch");
        assert_eq!(customer.tickets, vec![ticket.id]);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_store_empty() {
        let store = InMemoryStore::new();
        let customer = Customer::new("Never saved");
        let orphan = Ticket::new(Uuid::now_v7(), "Orphan", "");

        let mut batch = WriteBatch::new();
        batch.upsert(customer.clone()).upsert(orphan);
        let result = store.apply(batch).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(store.is_empty());
        assert!(store
            .fetch::<Customer>(customer.id)
            .await
            .expect("Failed to fetch")
            .is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_restores_cascade_delete() {
        let store = InMemoryStore::new();
        let (customer, ticket) = customer_with_graph(&store).await;
        let before = store.stats();

        let mut broken = Ticket::new(customer.id, "Broken", "");
        broken.status = TicketStatus::Done;

        let mut batch = WriteBatch::new();
        batch
            .delete(EntityRef::ticket(ticket.id))
            .delete(EntityRef::customer(customer.id))
            .upsert(broken);
        let result = store.apply(batch).await;

        assert!(matches!(result, Err(Error::ValidationError(_))));
        assert_eq!(store.stats(), before);
        let customer: Customer = store.require(customer.id).await.expect("Failed to fetch");
        assert_eq!(customer.tickets, vec![ticket.id]);
        assert_eq!(customer.locations.len(), 1);
        let ticket: Ticket = store.require(ticket.id).await.expect("Failed to fetch");
        assert_eq!(ticket.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_restores_moved_child() {
        let store = InMemoryStore::new();
        let first = Customer::new("First");
        let second = Customer::new("Second");
        store.insert(first.clone()).await.expect("Failed to insert");
        store.insert(second.clone()).await.expect("Failed to insert");
        let mut ticket = Ticket::new(first.id, "Stay put", "");
        store.insert(ticket.clone()).await.expect("Failed to insert");

        ticket.customer_id = second.id;
        let mut batch = WriteBatch::new();
        batch
            .upsert(ticket.clone())
            .upsert(Ticket::new(Uuid::now_v7(), "Orphan", ""));
        assert!(store.apply(batch).await.is_err());

        let first: Customer = store.require(first.id).await.expect("Failed to fetch");
        let second: Customer = store.require(second.id).await.expect("Failed to fetch");
        assert_eq!(first.tickets, vec![ticket.id]);
        assert!(second.tickets.is_empty());
        let stored: Ticket = store.require(ticket.id).await.expect("Failed to fetch");
        assert_eq!(stored.customer_id, first.id);
    }

    #[tokio::test]
    async fn test_stats_by_kind() {
        let store = InMemoryStore::new();
        customer_with_graph(&store).await;
        let stats = store.stats();
        assert_eq!(stats.of(EntityKind::Customer), 1);
        assert_eq!(stats.of(EntityKind::Attachment), 2);
        assert_eq!(stats.attachment_bytes, 19);

        store.clear_all();
        assert!(store.is_empty());
    }
}
