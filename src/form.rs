//! Form drafts and submissions.
//!
//! A form collects field edits plus working lists of children, validates
//! with [`Validate::is_valid`], and turns into a [`Submission`]: either
//! `Create` or `Update { target }`. The service consumes submissions with
//! one exhaustive match, so there is no other way to write a customer or a
//! ticket from a form.

use crate::attachment::AttachmentEditor;
use crate::config::PersistencePolicy;
use crate::entity::{EntityKind, EntityRef};
use crate::error::{Error, Result};
use crate::location::{choose_location_name, LocationEditor, NamedPoint};
use crate::model::{Attachment, AttachmentOwner, Coordinate, Customer, Location, Ticket};
use crate::status::TicketStatus;
use crate::store::ObjectStore;
use uuid::Uuid;

/// Pure validity check run before any commit.
pub trait Validate {
    /// # Errors
    /// Returns `Error::ValidationError` naming the first missing field
    fn validate(&self) -> Result<()>;

    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Editable customer fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerFields {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub description: String,
}

impl CustomerFields {
    pub fn named(name: impl Into<String>) -> Self {
        CustomerFields {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_customer(customer: &Customer) -> Self {
        CustomerFields {
            name: customer.name.clone(),
            address: customer.address.clone(),
            phone: customer.phone.clone(),
            email: customer.email.clone(),
            description: customer.description.clone(),
        }
    }

    /// Copy the fields onto `customer`, leaving relationships alone.
    pub fn apply_to(&self, customer: &mut Customer) {
        customer.name = self.name.clone();
        customer.address = self.address.clone();
        customer.phone = self.phone.clone();
        customer.email = self.email.clone();
        customer.description = self.description.clone();
    }
}

impl Validate for CustomerFields {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError(
                "customer name is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Editable ticket fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TicketFields {
    pub customer_id: Option<Uuid>,
    pub service_name: String,

    /// `None` means "not chosen": the customer's first location is used
    pub location_name: Option<String>,

    pub status: TicketStatus,
    pub coordinate: Option<Coordinate>,
}

impl TicketFields {
    pub fn from_ticket(ticket: &Ticket) -> Self {
        TicketFields {
            customer_id: Some(ticket.customer_id),
            service_name: ticket.service_name.clone(),
            location_name: Some(ticket.location_name.clone()),
            status: ticket.status,
            coordinate: ticket.coordinate(),
        }
    }
}

impl Validate for TicketFields {
    fn validate(&self) -> Result<()> {
        if self.customer_id.is_none() {
            return Err(Error::ValidationError(
                "ticket customer is required".to_string(),
            ));
        }
        if self.service_name.trim().is_empty() {
            return Err(Error::ValidationError(
                "ticket service name is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of saving a form.
#[derive(Clone, Debug, PartialEq)]
pub enum Submission<F> {
    /// Create a new entity.
    Create { fields: F },

    /// Overwrite the entity `target`.
    Update { target: Uuid, fields: F },
}

impl<F> Submission<F> {
    pub fn fields(&self) -> &F {
        match self {
            Submission::Create { fields } | Submission::Update { fields, .. } => fields,
        }
    }

    pub fn target(&self) -> Option<Uuid> {
        match self {
            Submission::Create { .. } => None,
            Submission::Update { target, .. } => Some(*target),
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Submission::Create { .. })
    }

    fn from_target(target: Option<Uuid>, fields: F) -> Self {
        match target {
            Some(target) => Submission::Update { target, fields },
            None => Submission::Create { fields },
        }
    }
}

impl<F: Validate> Validate for Submission<F> {
    fn validate(&self) -> Result<()> {
        self.fields().validate()
    }
}

/// Everything a customer form commits.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomerPayload {
    pub fields: CustomerFields,

    /// Replaces the customer's locations
    pub locations: Vec<Location>,

    /// Replaces the customer's attachments
    pub attachments: Vec<Attachment>,
}

impl Validate for CustomerPayload {
    fn validate(&self) -> Result<()> {
        self.fields.validate()
    }
}

/// Everything a ticket form commits.
#[derive(Clone, Debug, PartialEq)]
pub struct TicketPayload {
    /// `location_name` is always resolved (`Some`) in a payload
    pub fields: TicketFields,

    /// Locations added to the customer from within the ticket form
    pub new_locations: Vec<Location>,

    /// Replaces the ticket's attachments
    pub attachments: Vec<Attachment>,
}

impl Validate for TicketPayload {
    fn validate(&self) -> Result<()> {
        self.fields.validate()
    }
}

/// Draft state of the customer create/edit form.
#[derive(Clone, Debug)]
pub struct CustomerForm {
    target: Option<Uuid>,
    pub fields: CustomerFields,
    pub locations: LocationEditor,
    pub attachments: AttachmentEditor,
}

impl CustomerForm {
    /// Blank form for a new customer.
    pub fn create(policy: PersistencePolicy) -> Self {
        CustomerForm {
            target: None,
            fields: CustomerFields::default(),
            locations: LocationEditor::new(policy),
            attachments: AttachmentEditor::new(policy),
        }
    }

    /// Form pre-filled from an existing customer and its children.
    pub fn edit(
        customer: &Customer,
        locations: Vec<Location>,
        attachments: Vec<Attachment>,
        policy: PersistencePolicy,
    ) -> Self {
        CustomerForm {
            target: Some(customer.id),
            fields: CustomerFields::from_customer(customer),
            locations: LocationEditor::for_existing(customer.id, locations, policy),
            attachments: AttachmentEditor::for_existing(
                AttachmentOwner::Customer(customer.id),
                attachments,
                policy,
            ),
        }
    }

    pub fn target(&self) -> Option<Uuid> {
        self.target
    }

    pub fn is_valid(&self) -> bool {
        self.fields.is_valid()
    }

    /// Validate and package the form.
    ///
    /// # Errors
    /// Returns `Error::ValidationError` when a required field is missing;
    /// the form is consumed either way, so check `is_valid()` first to keep
    /// editing
    pub fn submit(self) -> Result<Submission<CustomerPayload>> {
        self.fields.validate()?;
        let payload = CustomerPayload {
            fields: self.fields,
            locations: self.locations.into_working_list(),
            attachments: self.attachments.into_working_list(),
        };
        Ok(Submission::from_target(self.target, payload))
    }

    /// Abandon the form. Returns children that were inserted early and are
    /// now unowned.
    pub fn cancel(self) -> Vec<EntityRef> {
        self.locations
            .cancel()
            .into_iter()
            .map(|id| EntityRef::new(EntityKind::Location, id))
            .chain(
                self.attachments
                    .cancel()
                    .into_iter()
                    .map(|id| EntityRef::new(EntityKind::Attachment, id)),
            )
            .collect()
    }
}

/// Draft state of the ticket create/edit form.
#[derive(Clone, Debug)]
pub struct TicketForm {
    target: Option<Uuid>,
    policy: PersistencePolicy,
    pub fields: TicketFields,
    customer_locations: Vec<Location>,
    pub new_locations: LocationEditor,
    pub attachments: AttachmentEditor,
}

impl TicketForm {
    /// Blank form; a customer must be selected before it can be saved.
    pub fn create(policy: PersistencePolicy) -> Self {
        TicketForm {
            target: None,
            policy,
            fields: TicketFields::default(),
            customer_locations: Vec::new(),
            new_locations: LocationEditor::new(policy),
            attachments: AttachmentEditor::new(policy),
        }
    }

    /// New ticket for a known customer.
    pub fn create_for(
        customer: &Customer,
        locations: Vec<Location>,
        policy: PersistencePolicy,
    ) -> Self {
        let mut form = TicketForm::create(policy);
        form.select_customer(customer, locations);
        form
    }

    /// Form pre-filled from an existing ticket.
    pub fn edit(
        ticket: &Ticket,
        attachments: Vec<Attachment>,
        customer_locations: Vec<Location>,
        policy: PersistencePolicy,
    ) -> Self {
        TicketForm {
            target: Some(ticket.id),
            policy,
            fields: TicketFields::from_ticket(ticket),
            customer_locations,
            new_locations: LocationEditor::for_existing(ticket.customer_id, Vec::new(), policy),
            attachments: AttachmentEditor::for_existing(
                AttachmentOwner::Ticket(ticket.id),
                attachments,
                policy,
            ),
        }
    }

    pub fn target(&self) -> Option<Uuid> {
        self.target
    }

    pub fn is_valid(&self) -> bool {
        self.fields.is_valid()
    }

    /// Pick the owning customer. Resets the location choice and any
    /// location staged for the previous customer.
    pub fn select_customer(&mut self, customer: &Customer, locations: Vec<Location>) {
        if self.fields.customer_id != Some(customer.id) {
            self.fields.location_name = None;
        }
        self.fields.customer_id = Some(customer.id);
        self.customer_locations = locations;
        self.new_locations = LocationEditor::for_existing(customer.id, Vec::new(), self.policy);
    }

    /// Names offered in the location picker: saved locations first, then
    /// ones added in this form.
    pub fn location_options(&self) -> Vec<&str> {
        self.customer_locations
            .iter()
            .map(|l| l.name.as_str())
            .chain(self.new_locations.names())
            .collect()
    }

    pub fn choose_location(&mut self, name: impl Into<String>) {
        self.fields.location_name = Some(name.into());
    }

    /// "Add new location" from the picker: create it for the selected
    /// customer and make it the chosen location.
    ///
    /// # Errors
    /// - `Error::ValidationError` if no customer is selected yet
    /// - `Err` from the store under `Immediate` policy
    pub async fn add_location<S: ObjectStore>(
        &mut self,
        store: &S,
        point: NamedPoint,
    ) -> Result<Location> {
        if self.fields.customer_id.is_none() {
            return Err(Error::ValidationError(
                "select a customer before adding a location".to_string(),
            ));
        }
        let location = self.new_locations.add(store, point).await?;
        self.fields.location_name = Some(location.name.clone());
        Ok(location)
    }

    /// Location name that will be stored: the explicit choice, else the
    /// customer's first location, else empty.
    pub fn resolved_location_name(&self) -> String {
        let all: Vec<Location> = self
            .customer_locations
            .iter()
            .chain(self.new_locations.items())
            .cloned()
            .collect();
        choose_location_name(self.fields.location_name.as_deref(), &all)
    }

    /// Validate and package the form.
    ///
    /// # Errors
    /// Returns `Error::ValidationError` when a required field is missing
    pub fn submit(self) -> Result<Submission<TicketPayload>> {
        self.fields.validate()?;

        let location_name = self.resolved_location_name();
        let mut fields = self.fields;
        fields.location_name = Some(location_name);

        let new_locations = self
            .new_locations
            .into_working_list()
            .into_iter()
            .map(|mut location| {
                location.customer_id = fields.customer_id;
                location
            })
            .collect();

        let payload = TicketPayload {
            fields,
            new_locations,
            attachments: self.attachments.into_working_list(),
        };
        Ok(Submission::from_target(self.target, payload))
    }

    /// Abandon the form. Returns attachments that were inserted early and
    /// are now unowned.
    pub fn cancel(self) -> Vec<EntityRef> {
        self.new_locations
            .cancel()
            .into_iter()
            .map(|id| EntityRef::new(EntityKind::Location, id))
            .chain(
                self.attachments
                    .cancel()
                    .into_iter()
                    .map(|id| EntityRef::new(EntityKind::Attachment, id)),
            )
            .collect()
    }
}
