//! High-level diary service.
//!
//! [`DiaryService`] is the one place that writes to the store on behalf of a
//! user action. It owns:
//!
//! - the submission handler (one exhaustive match over [`Submission`])
//! - ticket status mutation, through [`apply_status`] only
//! - deletes, cascading along ownership edges, and orphan purge
//! - pull-model views: callers re-run a view function whenever they learn the
//!   store changed or the search text changed
//!
//! The service is `Clone`; clones share the store, configuration, metrics
//! and the commit lock.
//!
//! # Consistency
//!
//! A save stages every write it makes (owner, kept children, dropped
//! children) in one [`WriteBatch`] and hands it to [`ObjectStore::apply`],
//! so a failure leaves the store as it was. Mutations hold the commit lock
//! exclusively and views hold it shared, so a view never interleaves with a
//! save.
//!
//! # Example
//!
//! ```
//! use diary_kit::{DiaryService, InMemoryStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> diary_kit::Result<()> {
//! let diary = DiaryService::new(InMemoryStore::new());
//!
//! let mut form = diary.customer_form(None).await?;
//! form.fields.name = "Maria Lopez".to_string();
//! diary.submit_customer(form.submit()?).await?;
//!
//! let sections = diary.customer_sections("mar").await?;
//! assert_eq!(sections[0].key, "M");
//! # Ok(())
//! # }
//! ```

use crate::attachment::AttachmentPreview;
use crate::config::DiaryConfig;
use crate::entity::{EntityKind, EntityRef};
use crate::error::{Error, Result};
use crate::form::{
    CustomerForm, CustomerPayload, Submission, TicketForm, TicketPayload, Validate,
};
use crate::location::{DebouncedSearch, LocationSearch};
use crate::model::{Attachment, AttachmentOwner, Customer, Location, Ticket};
use crate::observability::{DiaryMetrics, NoOpMetrics};
use crate::search::{filter, join_customers, SearchQuery, TicketRow};
use crate::sections::{bucket_by_status, group_alphabetically, Section, StatusSection};
use crate::status::{apply_status, TicketStatus};
use crate::store::{ObjectStore, WriteBatch};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Ticket list view: the three status buckets in display order.
pub type TicketSections = [StatusSection<TicketRow>; 3];

/// High-level diary service.
#[derive(Clone)]
pub struct DiaryService<S: ObjectStore> {
    store: S,
    config: Arc<DiaryConfig>,
    metrics: Arc<dyn DiaryMetrics>,
    commit_lock: Arc<RwLock<()>>,
}

impl<S: ObjectStore> DiaryService<S> {
    /// Create a service with the default configuration.
    pub fn new(store: S) -> Self {
        DiaryService {
            store,
            config: Arc::new(DiaryConfig::default()),
            metrics: Arc::new(NoOpMetrics),
            commit_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Create a service with a custom configuration.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if `config` fails validation
    pub fn with_config(store: S, config: DiaryConfig) -> Result<Self> {
        config.validate()?;
        let mut service = DiaryService::new(store);
        service.config = Arc::new(config);
        Ok(service)
    }

    /// Replace the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn DiaryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DiaryConfig {
        &self.config
    }

    /// Name shown for a customer, honouring the configured unnamed label.
    pub fn display_name<'a>(&'a self, customer: &'a Customer) -> &'a str {
        customer.display_name(&self.config.unnamed_customer_label)
    }

    /// Wrap a location search service with the configured quiet period.
    pub fn debounced_search<L: LocationSearch>(&self, service: L) -> DebouncedSearch<L> {
        DebouncedSearch::new(service, self.config.search_debounce())
    }

    // ---- forms ----------------------------------------------------------

    /// Open the customer form: blank for `None`, pre-filled for an id.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if `target` does not exist
    pub async fn customer_form(&self, target: Option<Uuid>) -> Result<CustomerForm> {
        let policy = self.config.persistence;
        let Some(id) = target else {
            return Ok(CustomerForm::create(policy));
        };

        let _guard = self.commit_lock.read().await;
        let customer: Customer = self.store.require(id).await?;
        let locations = self.store.fetch_many(&customer.locations).await?;
        let attachments = self.store.fetch_many(&customer.attachments).await?;
        Ok(CustomerForm::edit(&customer, locations, attachments, policy))
    }

    /// Open the ticket form.
    ///
    /// - `target = Some(id)`: edit that ticket
    /// - `target = None, customer = Some(id)`: new ticket for that customer
    /// - both `None`: blank form, customer still to be picked
    ///
    /// # Errors
    /// Returns `Error::NotFound` if a given id does not exist
    pub async fn ticket_form(
        &self,
        target: Option<Uuid>,
        customer: Option<Uuid>,
    ) -> Result<TicketForm> {
        let policy = self.config.persistence;
        let _guard = self.commit_lock.read().await;

        if let Some(id) = target {
            let ticket: Ticket = self.store.require(id).await?;
            let attachments = self.store.fetch_many(&ticket.attachments).await?;
            let locations = self.load_locations(ticket.customer_id).await?;
            return Ok(TicketForm::edit(&ticket, attachments, locations, policy));
        }

        match customer {
            Some(id) => {
                let customer: Customer = self.store.require(id).await?;
                let locations = self.store.fetch_many(&customer.locations).await?;
                Ok(TicketForm::create_for(&customer, locations, policy))
            }
            None => Ok(TicketForm::create(policy)),
        }
    }

    /// Commit a customer form. Returns the customer id.
    ///
    /// On update the customer's locations and attachments are replaced by
    /// the submitted lists; children no longer listed are deleted.
    ///
    /// # Errors
    /// - `Error::ValidationError` if the fields are invalid (nothing written)
    /// - `Error::NotFound` if the update target does not exist
    /// - `Err` from the store
    pub async fn submit_customer(&self, submission: Submission<CustomerPayload>) -> Result<Uuid> {
        let result = self.commit_customer(submission).await;
        self.observe("submit_customer", result)
    }

    async fn commit_customer(&self, submission: Submission<CustomerPayload>) -> Result<Uuid> {
        submission.validate()?;
        let _guard = self.commit_lock.write().await;
        let timer = Instant::now();
        let created = submission.is_create();

        let (mut customer, payload) = match submission {
            Submission::Create { fields: payload } => {
                let mut customer = Customer::new(payload.fields.name.clone());
                payload.fields.apply_to(&mut customer);
                (customer, payload)
            }
            Submission::Update {
                target,
                fields: payload,
            } => {
                let mut customer: Customer = self.store.require(target).await?;
                payload.fields.apply_to(&mut customer);
                (customer, payload)
            }
        };

        let id = customer.id;
        let owner = AttachmentOwner::Customer(id);
        let previous_locations = std::mem::take(&mut customer.locations);
        let previous_attachments = std::mem::take(&mut customer.attachments);
        customer.locations = payload.locations.iter().map(|l| l.id).collect();
        customer.attachments = payload.attachments.iter().map(|a| a.id).collect();

        let mut batch = WriteBatch::new();
        stage_dropped(
            &mut batch,
            EntityKind::Location,
            &previous_locations,
            &customer.locations,
        );
        let dropped = stage_dropped(
            &mut batch,
            EntityKind::Attachment,
            &previous_attachments,
            &customer.attachments,
        );
        if dropped > 0 {
            debug!("Dropping {} attachments from {}", dropped, EntityRef::from(owner));
        }
        batch.upsert(customer);
        for mut location in payload.locations {
            location.customer_id = Some(id);
            batch.upsert(location);
        }
        for mut attachment in payload.attachments {
            attachment.owner = Some(owner);
            batch.upsert(attachment);
        }
        self.store.apply(batch).await?;

        let target = EntityRef::customer(id);
        self.metrics.record_commit(&target, created, timer.elapsed());
        info!(
            "✓ Customer {} {}",
            id,
            if created { "created" } else { "updated" }
        );
        Ok(id)
    }

    /// Commit a ticket form. Returns the ticket id.
    ///
    /// The submitted status goes through [`apply_status`], so the closed
    /// date is derived, never taken from the form. Changing the customer
    /// moves the ticket between the two customers.
    ///
    /// # Errors
    /// - `Error::ValidationError` if the fields are invalid (nothing written)
    /// - `Error::NotFound` if the ticket or the customer does not exist
    /// - `Err` from the store
    pub async fn submit_ticket(&self, submission: Submission<TicketPayload>) -> Result<Uuid> {
        let result = self.commit_ticket(submission).await;
        self.observe("submit_ticket", result)
    }

    async fn commit_ticket(&self, submission: Submission<TicketPayload>) -> Result<Uuid> {
        submission.validate()?;
        let _guard = self.commit_lock.write().await;
        let timer = Instant::now();
        let created = submission.is_create();

        let customer_id = submission
            .fields()
            .fields
            .customer_id
            .ok_or_else(|| Error::ValidationError("ticket customer is required".to_string()))?;
        self.store.require::<Customer>(customer_id).await?;

        let (mut ticket, payload) = match submission {
            Submission::Create { fields: payload } => {
                let ticket = Ticket::new(
                    customer_id,
                    payload.fields.service_name.clone(),
                    payload.fields.location_name.clone().unwrap_or_default(),
                );
                (ticket, payload)
            }
            Submission::Update {
                target,
                fields: payload,
            } => {
                let mut ticket: Ticket = self.store.require(target).await?;
                if ticket.customer_id != customer_id {
                    debug!(
                        "Ticket {} moves from customer {} to {}",
                        target, ticket.customer_id, customer_id
                    );
                }
                ticket.customer_id = customer_id;
                ticket.service_name = payload.fields.service_name.clone();
                ticket.location_name = payload.fields.location_name.clone().unwrap_or_default();
                (ticket, payload)
            }
        };

        ticket.set_coordinate(payload.fields.coordinate);
        let transition = apply_status(&mut ticket, payload.fields.status, Utc::now());

        let id = ticket.id;
        let owner = AttachmentOwner::Ticket(id);
        let previous_attachments = std::mem::take(&mut ticket.attachments);
        ticket.attachments = payload.attachments.iter().map(|a| a.id).collect();

        let mut batch = WriteBatch::new();
        let dropped = stage_dropped(
            &mut batch,
            EntityKind::Attachment,
            &previous_attachments,
            &ticket.attachments,
        );
        if dropped > 0 {
            debug!("Dropping {} attachments from {}", dropped, EntityRef::from(owner));
        }
        batch.upsert(ticket);
        for mut attachment in payload.attachments {
            attachment.owner = Some(owner);
            batch.upsert(attachment);
        }
        for mut location in payload.new_locations {
            location.customer_id = Some(customer_id);
            batch.upsert(location);
        }
        self.store.apply(batch).await?;

        let target = EntityRef::ticket(id);
        if !created && !transition.is_noop() {
            self.metrics.record_status_change(&target, &transition);
        }
        self.metrics.record_commit(&target, created, timer.elapsed());
        info!(
            "✓ Ticket {} {}",
            id,
            if created { "created" } else { "updated" }
        );
        Ok(id)
    }

    /// Delete children inserted early by a form that was then cancelled.
    ///
    /// Pass the result of `CustomerForm::cancel` or `TicketForm::cancel`.
    /// Returns the number of records removed.
    ///
    /// # Errors
    /// Returns `Err` from the store
    pub async fn discard(&self, early_inserts: Vec<EntityRef>) -> Result<usize> {
        let _guard = self.commit_lock.write().await;
        let mut batch = WriteBatch::new();
        for target in early_inserts {
            // Only unowned children; anything claimed since is left alone
            if self.is_unowned(target).await? {
                batch.delete(target);
            }
        }
        let removed = self.store.apply(batch).await?;
        if removed > 0 {
            info!("Discarded {} early-inserted records", removed);
        }
        Ok(removed)
    }

    // ---- status ---------------------------------------------------------

    /// Set a ticket's status explicitly (status picker).
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the ticket does not exist
    pub async fn set_status(&self, ticket_id: Uuid, status: TicketStatus) -> Result<Ticket> {
        let result = self.change_status(ticket_id, |_| status).await;
        self.observe("set_status", result)
    }

    /// Advance a ticket one step through `pending → in_progress → done →
    /// pending` (single gesture).
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the ticket does not exist
    pub async fn cycle_status(&self, ticket_id: Uuid) -> Result<Ticket> {
        let result = self
            .change_status(ticket_id, TicketStatus::next_in_cycle)
            .await;
        self.observe("cycle_status", result)
    }

    async fn change_status<F>(&self, ticket_id: Uuid, pick: F) -> Result<Ticket>
    where
        F: FnOnce(TicketStatus) -> TicketStatus,
    {
        let _guard = self.commit_lock.write().await;
        let mut ticket: Ticket = self.store.require(ticket_id).await?;

        let target = pick(ticket.status);
        let transition = apply_status(&mut ticket, target, Utc::now());
        if transition.is_noop() {
            return Ok(ticket);
        }

        self.store.insert(ticket.clone()).await?;
        self.metrics
            .record_status_change(&EntityRef::ticket(ticket_id), &transition);
        Ok(ticket)
    }

    // ---- deletes --------------------------------------------------------

    /// Delete a customer with its locations, attachments, tickets and the
    /// tickets' attachments. Returns the number of records removed.
    ///
    /// # Errors
    /// Returns `Err` from the store
    pub async fn delete_customer(&self, id: Uuid) -> Result<usize> {
        self.delete(EntityRef::customer(id)).await
    }

    /// Delete a ticket and its attachments.
    ///
    /// # Errors
    /// Returns `Err` from the store
    pub async fn delete_ticket(&self, id: Uuid) -> Result<usize> {
        self.delete(EntityRef::ticket(id)).await
    }

    /// Delete a location. Tickets keep the location name they copied.
    ///
    /// # Errors
    /// Returns `Err` from the store
    pub async fn delete_location(&self, id: Uuid) -> Result<usize> {
        self.delete(EntityRef::new(EntityKind::Location, id)).await
    }

    /// Delete a single attachment.
    ///
    /// # Errors
    /// Returns `Err` from the store
    pub async fn delete_attachment(&self, id: Uuid) -> Result<usize> {
        self.delete(EntityRef::new(EntityKind::Attachment, id)).await
    }

    async fn delete(&self, target: EntityRef) -> Result<usize> {
        let _guard = self.commit_lock.write().await;
        let result = self.store.delete(target).await;
        let removed = self.observe("delete", result)?;
        self.metrics.record_delete(&target, removed);
        if removed > 0 {
            info!("✓ Deleted {} ({} records)", target, removed);
        }
        Ok(removed)
    }

    /// Delete every attachment and location that has no owner.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    /// Returns `Err` from the store
    pub async fn purge_orphans(&self) -> Result<usize> {
        let _guard = self.commit_lock.write().await;

        let attachments: Vec<Attachment> = self
            .store
            .query(|a: &Attachment| a.owner.is_none())
            .await?;
        let locations: Vec<Location> = self
            .store
            .query(|l: &Location| l.customer_id.is_none())
            .await?;

        let mut batch = WriteBatch::new();
        for attachment in &attachments {
            batch.delete(EntityRef::new(EntityKind::Attachment, attachment.id));
        }
        for location in &locations {
            batch.delete(EntityRef::new(EntityKind::Location, location.id));
        }
        let removed = self.store.apply(batch).await?;

        if removed > 0 {
            warn!(
                "Purged {} orphaned records ({} attachments, {} locations)",
                removed,
                attachments.len(),
                locations.len()
            );
        }
        Ok(removed)
    }

    // ---- views ----------------------------------------------------------

    /// Customer index: customers matching `search`, grouped alphabetically.
    ///
    /// # Errors
    /// Returns `Err` from the store
    pub async fn customer_sections(&self, search: &str) -> Result<Vec<Section<Customer>>> {
        let timer = Instant::now();
        let query = SearchQuery::new(search);

        let _guard = self.commit_lock.read().await;
        let customers: Vec<Customer> = self.store.fetch_all().await?;
        let matched = filter(customers, &query);
        let count = matched.len();
        let sections = group_alphabetically(matched, &self.config.fallback_section_key);

        self.metrics.record_view("customers", count, timer.elapsed());
        Ok(sections)
    }

    /// Ticket list: tickets matching `search` in the three status buckets.
    ///
    /// # Errors
    /// Returns `Err` from the store
    pub async fn ticket_sections(&self, search: &str) -> Result<TicketSections> {
        let _guard = self.commit_lock.read().await;
        let tickets: Vec<Ticket> = self.store.fetch_all().await?;
        self.ticket_view("tickets", tickets, search).await
    }

    /// Tickets of one customer, in the three status buckets.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the customer does not exist
    pub async fn customer_ticket_sections(
        &self,
        customer_id: Uuid,
        search: &str,
    ) -> Result<TicketSections> {
        let _guard = self.commit_lock.read().await;
        let tickets = self.load_tickets(customer_id).await?;
        self.ticket_view("customer_tickets", tickets, search).await
    }

    /// Callers hold the commit lock.
    async fn ticket_view(
        &self,
        view: &str,
        tickets: Vec<Ticket>,
        search: &str,
    ) -> Result<TicketSections> {
        let timer = Instant::now();
        let query = SearchQuery::new(search);

        let customers: Vec<Customer> = self.store.fetch_all().await?;
        let rows = filter(join_customers(tickets, &customers), &query);
        let count = rows.len();
        let sections = bucket_by_status(rows, self.config.bucket_order);

        self.metrics.record_view(view, count, timer.elapsed());
        Ok(sections)
    }

    /// A customer's tickets in stored order.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the customer does not exist
    pub async fn tickets_of(&self, customer_id: Uuid) -> Result<Vec<Ticket>> {
        let _guard = self.commit_lock.read().await;
        self.load_tickets(customer_id).await
    }

    /// A customer's locations in stored order.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the customer does not exist
    pub async fn locations_of(&self, customer_id: Uuid) -> Result<Vec<Location>> {
        let _guard = self.commit_lock.read().await;
        self.load_locations(customer_id).await
    }

    /// Attachments of a customer or ticket in stored order.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the owner does not exist
    pub async fn attachments_of(&self, owner: AttachmentOwner) -> Result<Vec<Attachment>> {
        let _guard = self.commit_lock.read().await;
        let ids = match owner {
            AttachmentOwner::Customer(id) => self.store.require::<Customer>(id).await?.attachments,
            AttachmentOwner::Ticket(id) => self.store.require::<Ticket>(id).await?.attachments,
        };
        self.store.fetch_many(&ids).await
    }

    /// Hand an attachment to a previewer.
    ///
    /// # Errors
    /// - `Error::NotFound` if the attachment does not exist
    /// - `Error::AttachmentError` from the previewer
    pub async fn preview_attachment<P: AttachmentPreview>(
        &self,
        id: Uuid,
        preview: &P,
    ) -> Result<()> {
        let attachment: Attachment = {
            let _guard = self.commit_lock.read().await;
            self.store.require(id).await?
        };
        let result = preview.preview(&attachment);
        self.observe("preview_attachment", result)
    }

    // ---- internals ------------------------------------------------------

    async fn load_tickets(&self, customer_id: Uuid) -> Result<Vec<Ticket>> {
        let customer: Customer = self.store.require(customer_id).await?;
        self.store.fetch_many(&customer.tickets).await
    }

    async fn load_locations(&self, customer_id: Uuid) -> Result<Vec<Location>> {
        let customer: Customer = self.store.require(customer_id).await?;
        self.store.fetch_many(&customer.locations).await
    }

    async fn is_unowned(&self, target: EntityRef) -> Result<bool> {
        Ok(match target.kind {
            EntityKind::Attachment => self
                .store
                .fetch::<Attachment>(target.id)
                .await?
                .is_some_and(|a| a.owner.is_none()),
            EntityKind::Location => self
                .store
                .fetch::<Location>(target.id)
                .await?
                .is_some_and(|l| l.customer_id.is_none()),
            EntityKind::Customer | EntityKind::Ticket => false,
        })
    }

    fn observe<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.metrics.record_error(operation, &e.to_string());
        }
        result
    }
}

/// Stage deletes for children listed in `previous` but not in `kept`.
/// Returns how many were staged.
fn stage_dropped(
    batch: &mut WriteBatch,
    kind: EntityKind,
    previous: &[Uuid],
    kept: &[Uuid],
) -> usize {
    let kept: HashSet<&Uuid> = kept.iter().collect();
    let mut dropped = 0;
    for id in previous.iter().filter(|id| !kept.contains(id)) {
        batch.delete(EntityRef::new(kind, *id));
        dropped += 1;
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{NoOpPreview, PickedFile};
    use crate::config::PersistencePolicy;
    use crate::location::NamedPoint;
    use crate::model::Coordinate;
    use crate::store::InMemoryStore;
    use std::sync::Mutex as StdMutex;

    async fn customer_named(diary: &DiaryService<InMemoryStore>, name: &str) -> Uuid {
        let mut form = diary.customer_form(None).await.expect("Failed to open form");
        form.fields.name = name.to_string();
        diary
            .submit_customer(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit customer")
    }

    async fn ticket_for(
        diary: &DiaryService<InMemoryStore>,
        customer: Uuid,
        service: &str,
    ) -> Uuid {
        let mut form = diary
            .ticket_form(None, Some(customer))
            .await
            .expect("Failed to open form");
        form.fields.service_name = service.to_string();
        diary
            .submit_ticket(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit ticket")
    }

    #[tokio::test]
    async fn test_create_customer_and_ticket() {
        let diary = DiaryService::new(InMemoryStore::new());
        let customer = customer_named(&diary, "Maria Lopez").await;
        let ticket = ticket_for(&diary, customer, "Marketing Visit").await;

        let tickets = diary.tickets_of(customer).await.expect("Failed to list");
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].id, ticket);
        assert_eq!(tickets[0].status, TicketStatus::Pending);
        assert!(tickets[0].closed_at.is_none());
    }

    #[tokio::test]
    async fn test_invalid_submission_writes_nothing() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());

        let submission = Submission::Create {
            fields: CustomerPayload {
                fields: Default::default(),
                locations: Vec::new(),
                attachments: Vec::new(),
            },
        };
        let result = diary.submit_customer(submission).await;

        assert!(matches!(result, Err(Error::ValidationError(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_ticket_for_missing_customer_is_rejected() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());

        let mut form = diary.ticket_form(None, None).await.expect("Failed to open form");
        form.fields.customer_id = Some(Uuid::now_v7());
        form.fields.service_name = "Ghost".to_string();

        let result = diary.submit_ticket(form.submit().expect("Invalid form")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_status_cycle_and_closed_date() {
        let diary = DiaryService::new(InMemoryStore::new());
        let customer = customer_named(&diary, "Acme").await;
        let ticket = ticket_for(&diary, customer, "Repair").await;

        let t = diary.cycle_status(ticket).await.expect("Failed to cycle");
        assert_eq!(t.status, TicketStatus::InProgress);
        assert!(t.closed_at.is_none());

        let t = diary.cycle_status(ticket).await.expect("Failed to cycle");
        assert_eq!(t.status, TicketStatus::Done);
        assert!(t.closed_at.is_some());

        let t = diary.cycle_status(ticket).await.expect("Failed to cycle");
        assert_eq!(t.status, TicketStatus::Pending);
        assert!(t.closed_at.is_none());
    }

    #[tokio::test]
    async fn test_set_done_twice_keeps_closed_date() {
        let diary = DiaryService::new(InMemoryStore::new());
        let customer = customer_named(&diary, "Acme").await;
        let ticket = ticket_for(&diary, customer, "Repair").await;

        let first = diary
            .set_status(ticket, TicketStatus::Done)
            .await
            .expect("Failed to set status");
        let second = diary
            .set_status(ticket, TicketStatus::Done)
            .await
            .expect("Failed to set status");
        assert_eq!(first.closed_at, second.closed_at);
    }

    #[tokio::test]
    async fn test_status_of_missing_ticket() {
        let diary = DiaryService::new(InMemoryStore::new());
        let result = diary.cycle_status(Uuid::now_v7()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_edit_ticket_replaces_attachments() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());
        let customer = customer_named(&diary, "Acme").await;

        let mut form = diary
            .ticket_form(None, Some(customer))
            .await
            .expect("Failed to open form");
        form.fields.service_name = "Survey".to_string();
        form.attachments
            .add(&store, PickedFile::photo("before.jpg", vec![1, 2, 3]))
            .await
            .expect("Failed to add");
        let ticket = diary
            .submit_ticket(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");
        assert_eq!(
            diary
                .attachments_of(AttachmentOwner::Ticket(ticket))
                .await
                .expect("Failed to list")
                .len(),
            1
        );

        let mut form = diary
            .ticket_form(Some(ticket), None)
            .await
            .expect("Failed to open form");
        let ids: Vec<Uuid> = form.attachments.items().iter().map(|a| a.id).collect();
        for id in ids {
            form.attachments.remove(id);
        }
        diary
            .submit_ticket(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");

        let stored: Ticket = store.require(ticket).await.expect("Failed to fetch");
        assert!(stored.attachments.is_empty());
        assert_eq!(store.stats().attachments, 0);
    }

    #[tokio::test]
    async fn test_failed_ticket_save_changes_nothing() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());
        let customer = customer_named(&diary, "Acme").await;

        let mut form = diary
            .ticket_form(None, Some(customer))
            .await
            .expect("Failed to open form");
        form.fields.service_name = "Old name".to_string();
        form.attachments
            .add(&store, PickedFile::photo("old.jpg", vec![1]))
            .await
            .expect("Failed to add");
        let ticket = diary
            .submit_ticket(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");
        let old_photo = store
            .require::<Ticket>(ticket)
            .await
            .expect("Failed to fetch")
            .attachments[0];

        // Rename, swap the photo, and add a location that the store rejects
        let mut form = diary
            .ticket_form(Some(ticket), None)
            .await
            .expect("Failed to open form");
        form.fields.service_name = "New name".to_string();
        form.attachments.remove(old_photo);
        form.attachments
            .add(&store, PickedFile::photo("new.jpg", vec![2]))
            .await
            .expect("Failed to add");
        let mut submission = form.submit().expect("Invalid form");
        if let Submission::Update { fields, .. } = &mut submission {
            let mut half = Location::new("Half", None);
            half.latitude = Some(1.0);
            fields.new_locations.push(half);
        }

        let result = diary.submit_ticket(submission).await;
        assert!(matches!(result, Err(Error::ValidationError(_))));

        let stored: Ticket = store.require(ticket).await.expect("Failed to fetch");
        assert_eq!(stored.service_name, "Old name");
        assert_eq!(stored.attachments, vec![old_photo]);
        let stats = store.stats();
        assert_eq!(stats.attachments, 1);
        assert_eq!(stats.locations, 0);
    }

    #[tokio::test]
    async fn test_failed_customer_save_keeps_locations() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());

        let mut form = diary.customer_form(None).await.expect("Failed to open form");
        form.fields.name = "Acme".to_string();
        form.locations
            .add(&store, NamedPoint::new("HQ", Coordinate::new(1.0, 2.0)))
            .await
            .expect("Failed to add");
        let customer = diary
            .submit_customer(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");

        let mut form = diary
            .customer_form(Some(customer))
            .await
            .expect("Failed to open form");
        form.fields.name = "Acme Renamed".to_string();
        let hq = form.locations.items()[0].id;
        form.locations.remove(hq);
        let mut submission = form.submit().expect("Invalid form");
        if let Submission::Update { fields, .. } = &mut submission {
            let mut half = Location::new("Half", None);
            half.longitude = Some(2.0);
            fields.locations.push(half);
        }

        let result = diary.submit_customer(submission).await;
        assert!(matches!(result, Err(Error::ValidationError(_))));

        let stored: Customer = store.require(customer).await.expect("Failed to fetch");
        assert_eq!(stored.name, "Acme");
        assert_eq!(stored.locations, vec![hq]);
        assert_eq!(store.stats().locations, 1);
    }

    #[tokio::test]
    async fn test_edit_ticket_moves_between_customers() {
        let diary = DiaryService::new(InMemoryStore::new());
        let first = customer_named(&diary, "First").await;
        let second = customer_named(&diary, "Second").await;
        let ticket = ticket_for(&diary, first, "Move me").await;

        let mut form = diary
            .ticket_form(Some(ticket), None)
            .await
            .expect("Failed to open form");
        form.fields.customer_id = Some(second);
        diary
            .submit_ticket(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");

        assert!(diary.tickets_of(first).await.expect("list").is_empty());
        assert_eq!(diary.tickets_of(second).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_ticket_status_from_form_sets_closed_date() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());
        let customer = customer_named(&diary, "Acme").await;

        let mut form = diary
            .ticket_form(None, Some(customer))
            .await
            .expect("Failed to open form");
        form.fields.service_name = "Done on arrival".to_string();
        form.fields.status = TicketStatus::Done;
        let id = diary
            .submit_ticket(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");

        let ticket: Ticket = store.require(id).await.expect("Failed to fetch");
        assert!(ticket.closed_at.is_some());
        assert!(ticket.is_consistent());
    }

    #[tokio::test]
    async fn test_customer_locations_replace_on_save() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());

        let mut form = diary.customer_form(None).await.expect("Failed to open form");
        form.fields.name = "Acme".to_string();
        form.locations
            .add(&store, NamedPoint::new("HQ", Coordinate::new(1.0, 2.0)))
            .await
            .expect("Failed to add");
        form.locations
            .add(&store, NamedPoint::new("Depot", Coordinate::new(3.0, 4.0)))
            .await
            .expect("Failed to add");
        let customer = diary
            .submit_customer(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");

        let names: Vec<String> = diary
            .locations_of(customer)
            .await
            .expect("Failed to list")
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["HQ", "Depot"]);

        let mut form = diary
            .customer_form(Some(customer))
            .await
            .expect("Failed to open form");
        let hq = form.locations.items()[0].id;
        form.locations.remove(hq);
        diary
            .submit_customer(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");

        let remaining = diary.locations_of(customer).await.expect("Failed to list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "Depot");
        assert_eq!(store.stats().locations, 1);
    }

    #[tokio::test]
    async fn test_new_ticket_defaults_to_first_location() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());

        let mut form = diary.customer_form(None).await.expect("Failed to open form");
        form.fields.name = "Acme".to_string();
        form.locations
            .add(&store, NamedPoint::new("Front desk", Coordinate::new(0.0, 0.0)))
            .await
            .expect("Failed to add");
        let customer = diary
            .submit_customer(form.submit().expect("Invalid form"))
            .await
            .expect("Failed to submit");

        let ticket = ticket_for(&diary, customer, "Check-in").await;
        let stored: Ticket = store.require(ticket).await.expect("Failed to fetch");
        assert_eq!(stored.location_name, "Front desk");
    }

    #[tokio::test]
    async fn test_delete_customer_cascades() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());
        let customer = customer_named(&diary, "Acme").await;
        ticket_for(&diary, customer, "One").await;
        ticket_for(&diary, customer, "Two").await;

        let removed = diary.delete_customer(customer).await.expect("Failed to delete");
        assert_eq!(removed, 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_immediate_form_leaves_orphans_until_purged() {
        let store = InMemoryStore::new();
        let config = DiaryConfig::default().with_persistence(PersistencePolicy::Immediate);
        let diary = DiaryService::with_config(store.clone(), config).expect("Invalid config");

        let mut form = diary.customer_form(None).await.expect("Failed to open form");
        form.attachments
            .add(&store, PickedFile::photo("a.jpg", vec![1]))
            .await
            .expect("Failed to add");
        form.locations
            .add(&store, NamedPoint::new("Yard", Coordinate::new(0.0, 0.0)))
            .await
            .expect("Failed to add");
        let _ = form.cancel();

        assert_eq!(store.len(), 2);
        assert_eq!(diary.purge_orphans().await.expect("Failed to purge"), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_discard_early_inserts() {
        let store = InMemoryStore::new();
        let config = DiaryConfig::default().with_persistence(PersistencePolicy::Immediate);
        let diary = DiaryService::with_config(store.clone(), config).expect("Invalid config");

        let mut form = diary.customer_form(None).await.expect("Failed to open form");
        form.attachments
            .add(&store, PickedFile::photo("a.jpg", vec![1]))
            .await
            .expect("Failed to add");

        let removed = diary.discard(form.cancel()).await.expect("Failed to discard");
        assert_eq!(removed, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_views_search_and_group() {
        let diary = DiaryService::new(InMemoryStore::new());
        let maria = customer_named(&diary, "Maria Lopez").await;
        let bob = customer_named(&diary, "bob").await;
        ticket_for(&diary, bob, "Marketing Visit").await;
        let other = ticket_for(&diary, bob, "Plumbing").await;
        diary
            .set_status(other, TicketStatus::InProgress)
            .await
            .expect("Failed to set status");
        ticket_for(&diary, maria, "Roof").await;

        let customers = diary.customer_sections("MAR").await.expect("Failed view");
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].key, "M");

        // "mar" hits "Marketing Visit" by service and "Roof" via Maria
        let tickets = diary.ticket_sections(" mar ").await.expect("Failed view");
        assert!(tickets[0].is_empty());
        assert_eq!(tickets[1].items.len(), 2);
        assert!(tickets[2].is_empty());

        let all = diary.ticket_sections("").await.expect("Failed view");
        let total: usize = all.iter().map(|s| s.items.len()).sum();
        assert_eq!(total, 3);
        assert_eq!(all[0].items[0].ticket.id, other);

        let bobs = diary
            .customer_ticket_sections(bob, "")
            .await
            .expect("Failed view");
        assert_eq!(bobs.iter().map(|s| s.items.len()).sum::<usize>(), 2);
    }

    #[tokio::test]
    async fn test_preview_attachment() {
        let store = InMemoryStore::new();
        let diary = DiaryService::new(store.clone());
        let attachment = Attachment::new("plan.pdf", "pdf", vec![0; 16]);
        store.insert(attachment.clone()).await.expect("Failed to insert");

        diary
            .preview_attachment(attachment.id, &NoOpPreview)
            .await
            .expect("Failed to preview");
        let missing = diary.preview_attachment(Uuid::now_v7(), &NoOpPreview).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_errors_reach_metrics() {
        #[derive(Default)]
        struct Recording {
            errors: StdMutex<Vec<String>>,
        }

        impl DiaryMetrics for Recording {
            fn record_error(&self, operation: &str, _error: &str) {
                self.errors
                    .lock()
                    .expect("Failed to lock errors")
                    .push(operation.to_string());
            }
        }

        let metrics = Arc::new(Recording::default());
        let diary = DiaryService::new(InMemoryStore::new()).with_metrics(metrics.clone());
        let _ = diary.set_status(Uuid::now_v7(), TicketStatus::Done).await;

        assert_eq!(
            *metrics.errors.lock().expect("Failed to lock errors"),
            vec!["set_status".to_string()]
        );
    }

    #[test]
    fn test_service_clone_shares_state() {
        let diary = DiaryService::new(InMemoryStore::new());
        let other = diary.clone();
        assert!(Arc::ptr_eq(&diary.commit_lock, &other.commit_lock));
        assert!(Arc::ptr_eq(&diary.config, &other.config));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DiaryConfig::default().with_fallback_section_key("  ");
        let result = DiaryService::with_config(InMemoryStore::new(), config);
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
