//! Free-text search over customers and tickets.
//!
//! A query matches an item when the trimmed, case-folded query is a
//! substring of any of the item's searchable fields:
//!
//! | Item | Fields |
//! |------|--------|
//! | Customer | name, phone, email |
//! | Ticket ([`TicketRow`]) | service name, location name, owning customer's name |
//!
//! An empty (or all-whitespace) query returns the input unchanged. Every
//! call rescans the collection; there is no index.

use crate::model::{Customer, Ticket};
use std::collections::HashMap;
use uuid::Uuid;

/// Normalised search text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchQuery {
    needle: String,
}

impl SearchQuery {
    pub fn new(raw: &str) -> Self {
        SearchQuery {
            needle: raw.trim().to_lowercase(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.needle
    }

    /// Case-insensitive substring test against one field.
    pub fn matches(&self, field: &str) -> bool {
        field.to_lowercase().contains(&self.needle)
    }

    /// True for an empty query, otherwise when any field matches.
    pub fn matches_any<'a>(&self, fields: impl IntoIterator<Item = &'a str>) -> bool {
        self.is_empty() || fields.into_iter().any(|field| self.matches(field))
    }
}

impl From<&str> for SearchQuery {
    fn from(raw: &str) -> Self {
        SearchQuery::new(raw)
    }
}

/// Something that exposes text fields to [`filter`].
pub trait Searchable {
    fn search_fields(&self) -> Vec<&str>;
}

impl<T: Searchable + ?Sized> Searchable for &T {
    fn search_fields(&self) -> Vec<&str> {
        (**self).search_fields()
    }
}

impl Searchable for Customer {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.phone.as_str(),
            self.email.as_str(),
        ]
    }
}

/// A ticket joined with the name of the customer it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct TicketRow {
    pub ticket: Ticket,

    /// `None` when the owning customer could not be resolved
    pub customer_name: Option<String>,
}

impl TicketRow {
    pub fn new(ticket: Ticket, customer_name: Option<String>) -> Self {
        TicketRow {
            ticket,
            customer_name,
        }
    }

    /// Customer name for display, falling back to `unnamed_label`.
    pub fn customer_label<'a>(&'a self, unnamed_label: &'a str) -> &'a str {
        match self.customer_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => unnamed_label,
        }
    }
}

impl Searchable for TicketRow {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.ticket.service_name.as_str(),
            self.ticket.location_name.as_str(),
        ];
        if let Some(name) = &self.customer_name {
            fields.push(name);
        }
        fields
    }
}

/// Pair every ticket with its owning customer's name.
pub fn join_customers(tickets: Vec<Ticket>, customers: &[Customer]) -> Vec<TicketRow> {
    let names: HashMap<Uuid, &str> = customers
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();

    tickets
        .into_iter()
        .map(|ticket| {
            let customer_name = names.get(&ticket.customer_id).map(|n| n.to_string());
            TicketRow::new(ticket, customer_name)
        })
        .collect()
}

/// Keep the items matching `query`, preserving their order.
pub fn filter<T: Searchable>(items: Vec<T>, query: &SearchQuery) -> Vec<T> {
    if query.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| query.matches_any(item.search_fields()))
        .collect()
}
