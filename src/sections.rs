//! Sectioning of list views.
//!
//! Two independent policies, both pure functions of their input:
//!
//! - [`group_alphabetically`]: customer index. One section per upper-cased
//!   first character of the trimmed name, blank names under a fallback key
//!   (`#` by default). Sections ascend by code point; items inside a section
//!   ascend case-insensitively by name.
//! - [`bucket_by_status`]: ticket list. Always exactly three sections, in
//!   the order `In Progress, Pending, Done`, empty ones included.
//!
//! Nothing here caches. Callers re-run the function whenever the store or
//! the search text changes.

use crate::model::{Customer, Ticket};
use crate::search::TicketRow;
use crate::status::TicketStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Ordering inside each status bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketOrder {
    /// Creation date descending, ties broken by id descending.
    #[default]
    NewestFirst,

    /// Keep the order the items were passed in.
    Preserve,
}

/// An alphabetical section.
#[derive(Clone, Debug, PartialEq)]
pub struct Section<T> {
    pub key: String,
    pub items: Vec<T>,
}

/// A status bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSection<T> {
    pub status: TicketStatus,
    pub items: Vec<T>,
}

impl<T> StatusSection<T> {
    pub fn title(&self) -> &'static str {
        self.status.label()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Items that can be filed in the alphabetical index.
pub trait Alphabetized {
    fn sort_name(&self) -> &str;
}

impl<T: Alphabetized + ?Sized> Alphabetized for &T {
    fn sort_name(&self) -> &str {
        (**self).sort_name()
    }
}

impl Alphabetized for Customer {
    fn sort_name(&self) -> &str {
        &self.name
    }
}

/// Items that can be filed in a status bucket.
pub trait Statused {
    fn status(&self) -> TicketStatus;
    fn created_at(&self) -> DateTime<Utc>;
    fn ticket_id(&self) -> Uuid;
}

impl<T: Statused + ?Sized> Statused for &T {
    fn status(&self) -> TicketStatus {
        (**self).status()
    }

    fn created_at(&self) -> DateTime<Utc> {
        (**self).created_at()
    }

    fn ticket_id(&self) -> Uuid {
        (**self).ticket_id()
    }
}

impl Statused for Ticket {
    fn status(&self) -> TicketStatus {
        self.status
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn ticket_id(&self) -> Uuid {
        self.id
    }
}

impl Statused for TicketRow {
    fn status(&self) -> TicketStatus {
        self.ticket.status
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.ticket.created_at
    }

    fn ticket_id(&self) -> Uuid {
        self.ticket.id
    }
}

/// Index key for a name: its first character upper-cased, or `fallback`.
pub fn section_key(name: &str, fallback: &str) -> String {
    match name.trim().chars().next() {
        Some(first) => first.to_uppercase().collect(),
        None => fallback.to_string(),
    }
}

/// Group items into alphabetical sections.
pub fn group_alphabetically<T: Alphabetized>(items: Vec<T>, fallback: &str) -> Vec<Section<T>> {
    let mut buckets: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        let key = section_key(item.sort_name(), fallback);
        buckets.entry(key).or_default().push(item);
    }

    buckets
        .into_iter()
        .map(|(key, mut items)| {
            // Stable: equal names keep their input order
            items.sort_by_cached_key(|item| item.sort_name().trim().to_lowercase());
            Section { key, items }
        })
        .collect()
}

/// Partition items into the three status buckets, in display order.
pub fn bucket_by_status<T: Statused>(items: Vec<T>, order: BucketOrder) -> [StatusSection<T>; 3] {
    let mut sections = TicketStatus::DISPLAY_ORDER.map(|status| StatusSection {
        status,
        items: Vec::new(),
    });

    for item in items {
        sections[item.status().display_rank()].items.push(item);
    }

    if order == BucketOrder::NewestFirst {
        for section in sections.iter_mut() {
            section.items.sort_by(|a, b| {
                b.created_at()
                    .cmp(&a.created_at())
                    .then_with(|| b.ticket_id().cmp(&a.ticket_id()))
            });
        }
    }

    sections
}
