//! Core entity trait and the record graph stored by an `ObjectStore`.

use crate::error::{Error, Result};
use crate::model::{Attachment, AttachmentOwner, Customer, Location, Ticket};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The four entity types of the diary graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Customer,
    Location,
    Ticket,
    Attachment,
}

impl EntityKind {
    /// Namespace used when rendering entity references.
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Location => "location",
            EntityKind::Ticket => "ticket",
            EntityKind::Attachment => "attachment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Typed pointer to a stored entity. Renders as `"{prefix}:{id}"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        EntityRef { kind, id }
    }

    pub fn customer(id: Uuid) -> Self {
        EntityRef::new(EntityKind::Customer, id)
    }

    pub fn ticket(id: Uuid) -> Self {
        EntityRef::new(EntityKind::Ticket, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.id)
    }
}

impl From<AttachmentOwner> for EntityRef {
    fn from(owner: AttachmentOwner) -> Self {
        match owner {
            AttachmentOwner::Customer(id) => EntityRef::customer(id),
            AttachmentOwner::Ticket(id) => EntityRef::ticket(id),
        }
    }
}

/// Any stored entity.
///
/// The ownership edges of the graph are derived from the records
/// themselves: [`Record::parent`] is the back reference on the child and
/// [`Record::children`] the ordered lists on the owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Customer(Customer),
    Location(Location),
    Ticket(Ticket),
    Attachment(Attachment),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Customer(_) => EntityKind::Customer,
            Record::Location(_) => EntityKind::Location,
            Record::Ticket(_) => EntityKind::Ticket,
            Record::Attachment(_) => EntityKind::Attachment,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Record::Customer(c) => c.id,
            Record::Location(l) => l.id,
            Record::Ticket(t) => t.id,
            Record::Attachment(a) => a.id,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }

    /// Owner of this record, if it has one.
    pub fn parent(&self) -> Option<EntityRef> {
        match self {
            Record::Customer(_) => None,
            Record::Location(l) => l.customer_id.map(EntityRef::customer),
            Record::Ticket(t) => Some(EntityRef::customer(t.customer_id)),
            Record::Attachment(a) => a.owner.map(EntityRef::from),
        }
    }

    /// Everything this record owns, in stored order. Deleting the record
    /// deletes all of these.
    pub fn children(&self) -> Vec<EntityRef> {
        match self {
            Record::Customer(c) => c
                .locations
                .iter()
                .map(|id| EntityRef::new(EntityKind::Location, *id))
                .chain(
                    c.attachments
                        .iter()
                        .map(|id| EntityRef::new(EntityKind::Attachment, *id)),
                )
                .chain(c.tickets.iter().map(|id| EntityRef::ticket(*id)))
                .collect(),
            Record::Ticket(t) => t
                .attachments
                .iter()
                .map(|id| EntityRef::new(EntityKind::Attachment, *id))
                .collect(),
            Record::Location(_) | Record::Attachment(_) => Vec::new(),
        }
    }

    fn child_list_mut(&mut self, kind: EntityKind) -> Option<&mut Vec<Uuid>> {
        match (self, kind) {
            (Record::Customer(c), EntityKind::Location) => Some(&mut c.locations),
            (Record::Customer(c), EntityKind::Attachment) => Some(&mut c.attachments),
            (Record::Customer(c), EntityKind::Ticket) => Some(&mut c.tickets),
            (Record::Ticket(t), EntityKind::Attachment) => Some(&mut t.attachments),
            _ => None,
        }
    }

    /// Append `child` to the matching owned list unless already present.
    ///
    /// Returns true if the list changed.
    pub fn attach_child(&mut self, child: EntityRef) -> bool {
        match self.child_list_mut(child.kind) {
            Some(list) if !list.contains(&child.id) => {
                list.push(child.id);
                true
            }
            _ => false,
        }
    }

    /// Remove `child` from the matching owned list.
    ///
    /// Returns true if the list changed.
    pub fn detach_child(&mut self, child: EntityRef) -> bool {
        match self.child_list_mut(child.kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|id| *id != child.id);
                list.len() != before
            }
            None => false,
        }
    }

    /// Structural invariants checked on every insert.
    pub fn validate(&self) -> Result<()> {
        match self {
            Record::Customer(c) => c.validate(),
            Record::Location(l) => l.validate(),
            Record::Ticket(t) => t.validate(),
            Record::Attachment(a) => a.validate(),
        }
    }
}

/// Trait implemented by every type the object store can hold.
///
/// # Example
///
/// ```
/// use diary_kit::entity::{DiaryEntity, EntityKind};
/// use diary_kit::model::Customer;
///
/// let customer = Customer::new("Maria Lopez");
/// assert_eq!(Customer::kind(), EntityKind::Customer);
/// assert_eq!(customer.entity_ref().to_string(), format!("customer:{}", customer.id));
/// ```
pub trait DiaryEntity: Send + Sync + Serialize + DeserializeOwned + Clone + 'static {
    /// Unique id of this entity.
    fn entity_id(&self) -> Uuid;

    /// Entity type, used to namespace store keys.
    fn kind() -> EntityKind;

    /// Wrap into the store's record type.
    fn into_record(self) -> Record;

    /// Borrow out of a record of the same kind.
    fn from_record(record: &Record) -> Option<&Self>;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::kind(), self.entity_id())
    }

    /// Optional: Validate before the entity is written.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl DiaryEntity for Customer {
    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Customer
    }

    fn into_record(self) -> Record {
        Record::Customer(self)
    }

    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Customer(c) => Some(c),
            _ => None,
        }
    }
}

impl DiaryEntity for Location {
    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Location
    }

    fn into_record(self) -> Record {
        Record::Location(self)
    }

    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Location(l) => Some(l),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.latitude.is_some() != self.longitude.is_some() {
            return Err(Error::ValidationError(format!(
                "location {} has only one coordinate",
                self.id
            )));
        }
        Ok(())
    }
}

impl DiaryEntity for Ticket {
    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Ticket
    }

    fn into_record(self) -> Record {
        Record::Ticket(self)
    }

    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Ticket(t) => Some(t),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.is_consistent() {
            return Err(Error::ValidationError(format!(
                "ticket {} is {} but closed_at is {:?}",
                self.id,
                self.status.as_str(),
                self.closed_at
            )));
        }
        Ok(())
    }
}

impl DiaryEntity for Attachment {
    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn kind() -> EntityKind {
        EntityKind::Attachment
    }

    fn into_record(self) -> Record {
        Record::Attachment(self)
    }

    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Attachment(a) => Some(a),
            _ => None,
        }
    }
}
