//! Diary object graph: customers own locations, tickets and attachments;
//! tickets own attachments.
//!
//! Relationships are held as ordered id lists on the owner plus a back
//! reference on the child. The store keeps both sides in step
//! (see [`crate::store`]).

use crate::status::TicketStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label shown for customers whose name is blank.
pub const UNNAMED_CUSTOMER: &str = "Unnamed Customer";

/// A point on the map.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }

    /// Planar distance in degrees. Only used for ranking nearby results.
    pub fn distance_degrees(&self, other: &Coordinate) -> f64 {
        let dlat = self.latitude - other.latitude;
        let dlon = self.longitude - other.longitude;
        (dlat * dlat + dlon * dlon).sqrt()
    }
}

/// A customer and the ids of everything it owns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub description: String,

    /// Owned locations, in insertion order
    pub locations: Vec<Uuid>,

    /// Owned attachments, in insertion order
    pub attachments: Vec<Uuid>,

    /// Tickets raised for this customer, in insertion order
    pub tickets: Vec<Uuid>,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Customer {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            name: name.into(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            description: String::new(),
            locations: Vec::new(),
            attachments: Vec::new(),
            tickets: Vec::new(),
        }
    }

    /// Trimmed name, or `unnamed_label` when the name is blank.
    pub fn display_name<'a>(&'a self, unnamed_label: &'a str) -> &'a str {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            unnamed_label
        } else {
            trimmed
        }
    }
}

/// A named place belonging to a customer.
///
/// `customer_id` is `None` only while the location is staged in a form that
/// has not been saved yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Location {
    pub fn new(name: impl Into<String>, coordinate: Option<Coordinate>) -> Self {
        Location {
            id: Uuid::now_v7(),
            customer_id: None,
            name: name.into(),
            latitude: coordinate.map(|c| c.latitude),
            longitude: coordinate.map(|c| c.longitude),
        }
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        }
    }
}

/// A unit of service work for one customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub created_at: DateTime<Utc>,

    /// Present if and only if `status == Done`
    pub closed_at: Option<DateTime<Utc>>,

    pub status: TicketStatus,
    pub service_name: String,

    /// Copied from one of the customer's locations; not a reference.
    pub location_name: String,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Owned attachments, in insertion order
    pub attachments: Vec<Uuid>,
}

impl Ticket {
    pub fn new(
        customer_id: Uuid,
        service_name: impl Into<String>,
        location_name: impl Into<String>,
    ) -> Self {
        Ticket {
            id: Uuid::now_v7(),
            customer_id,
            created_at: Utc::now(),
            closed_at: None,
            status: TicketStatus::Pending,
            service_name: service_name.into(),
            location_name: location_name.into(),
            latitude: None,
            longitude: None,
            attachments: Vec::new(),
        }
    }

    /// `closed_at` is set exactly when the ticket is done.
    pub fn is_consistent(&self) -> bool {
        self.closed_at.is_some() == self.status.is_closed()
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        }
    }

    pub fn set_coordinate(&mut self, coordinate: Option<Coordinate>) {
        self.latitude = coordinate.map(|c| c.latitude);
        self.longitude = coordinate.map(|c| c.longitude);
    }
}

/// Entity that owns an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachmentOwner {
    Customer(Uuid),
    Ticket(Uuid),
}

/// A file attached to a customer or a ticket.
///
/// `owner` is `None` while the attachment is staged in an unsaved form, or
/// after an early-persisted pick was abandoned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub owner: Option<AttachmentOwner>,
    pub file_name: String,

    /// Free-text tag: `"image"` for photos, otherwise usually the extension
    pub file_type: String,

    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, file_type: impl Into<String>, data: Vec<u8>) -> Self {
        Attachment {
            id: Uuid::now_v7(),
            owner: None,
            file_name: file_name.into(),
            file_type: file_type.into(),
            data,
        }
    }

    pub fn is_image(&self) -> bool {
        self.file_type.eq_ignore_ascii_case("image")
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
