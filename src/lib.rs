//! # diary-kit
//!
//! Ticket lifecycle and list-view engine for a field-service diary: customers,
//! their locations and attachments, and service tickets that move through a
//! `pending → in_progress → done` workflow.
//!
//! ## Features
//!
//! - **Status state machine:** one `apply_status` entry point keeps the
//!   closed date in step with the `done` status
//! - **Pull-model views:** free-text search, an alphabetical customer index
//!   and three fixed ticket status buckets, recomputed on demand
//! - **Working lists:** forms edit attachments and locations locally and
//!   replace the owner's collection on save
//! - **Store agnostic:** everything persists through [`ObjectStore`]; an
//!   in-memory store with cascade delete and snapshots is included
//! - **Debounced location search** with a stale-response guard
//!
//! ## Quick Start
//!
//! ```
//! use diary_kit::{DiaryService, InMemoryStore, TicketStatus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> diary_kit::Result<()> {
//! let diary = DiaryService::new(InMemoryStore::new());
//!
//! // 1. Create a customer through its form
//! let mut form = diary.customer_form(None).await?;
//! form.fields.name = "Maria Lopez".to_string();
//! let customer = diary.submit_customer(form.submit()?).await?;
//!
//! // 2. Open a ticket for them
//! let mut form = diary.ticket_form(None, Some(customer)).await?;
//! form.fields.service_name = "Marketing Visit".to_string();
//! let ticket = diary.submit_ticket(form.submit()?).await?;
//!
//! // 3. Move it along and read the list view
//! diary.set_status(ticket, TicketStatus::Done).await?;
//! let sections = diary.ticket_sections("mar").await?;
//! assert_eq!(sections[2].title(), "Done");
//! assert_eq!(sections[2].items.len(), 1);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod attachment;
pub mod config;
pub mod entity;
pub mod error;
pub mod form;
pub mod location;
pub mod model;
pub mod observability;
pub mod search;
pub mod sections;
pub mod serialization;
pub mod service;
pub mod status;
pub mod store;

// Re-exports for convenience
pub use config::{DiaryConfig, PersistencePolicy};
pub use entity::{DiaryEntity, EntityKind, EntityRef};
pub use error::{Error, Result};
pub use form::{Submission, Validate};
pub use model::{Attachment, AttachmentOwner, Coordinate, Customer, Location, Ticket};
pub use service::DiaryService;
pub use status::{apply_status, TicketStatus};
pub use store::{InMemoryStore, ObjectStore, WriteBatch};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
