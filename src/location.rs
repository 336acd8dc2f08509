//! Location search and the per-form location working list.
//!
//! # Search
//!
//! [`LocationSearch`] is the seam to a map/geocoding service. The engine
//! never calls it directly from a keystroke; it goes through
//! [`DebouncedSearch`], which waits for a quiet period and then discards
//! any response that a newer query has overtaken:
//!
//! ```text
//! keystroke "ma"  ──┐ sleep(quiet) ── superseded ─▶ None
//! keystroke "mar" ──┴──────────────── sleep(quiet) ── search ─▶ Some(results)
//! ```
//!
//! A failing service yields an empty list, never an error.
//!
//! # Ticket location
//!
//! A ticket stores the *name* of one of its customer's locations, copied at
//! save time. [`choose_location_name`] resolves the name to store.

use crate::config::PersistencePolicy;
use crate::error::Result;
use crate::model::{Coordinate, Location};
use crate::store::ObjectStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Default cap on results returned by [`InMemoryLocationSearch`].
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// A search hit: a named point on the map.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedPoint {
    pub name: String,
    pub coordinate: Coordinate,
}

impl NamedPoint {
    pub fn new(name: impl Into<String>, coordinate: Coordinate) -> Self {
        NamedPoint {
            name: name.into(),
            coordinate,
        }
    }
}

/// Area the user is looking at; biases ranking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionHint {
    pub center: Coordinate,
    pub span_degrees: f64,
}

impl RegionHint {
    pub fn new(center: Coordinate, span_degrees: f64) -> Self {
        RegionHint {
            center,
            span_degrees,
        }
    }
}

/// Trait for map search services.
#[allow(async_fn_in_trait)]
pub trait LocationSearch: Send + Sync {
    /// Resolve a query to ranked named points.
    ///
    /// # Errors
    /// Returns `Error::SearchError` if the service fails. Callers in this
    /// crate treat that as an empty result.
    async fn search(&self, query: &str, region: Option<&RegionHint>) -> Result<Vec<NamedPoint>>;
}

/// Search over a fixed list of places.
///
/// Prefix matches rank before substring matches; inside each group, points
/// closer to the region centre come first, then names alphabetically.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLocationSearch {
    places: Vec<NamedPoint>,
    max_results: usize,
    latency: Option<Duration>,
}

impl InMemoryLocationSearch {
    pub fn new(places: Vec<NamedPoint>) -> Self {
        InMemoryLocationSearch {
            places,
            max_results: DEFAULT_MAX_RESULTS,
            latency: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Simulated service latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

impl LocationSearch for InMemoryLocationSearch {
    async fn search(&self, query: &str, region: Option<&RegionHint>) -> Result<Vec<NamedPoint>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(bool, f64, &NamedPoint)> = self
            .places
            .iter()
            .filter_map(|place| {
                let name = place.name.to_lowercase();
                if !name.contains(&needle) {
                    return None;
                }
                let distance = region
                    .map(|r| r.center.distance_degrees(&place.coordinate))
                    .unwrap_or(0.0);
                Some((!name.starts_with(&needle), distance, place))
            })
            .collect();

        hits.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then_with(|| a.2.name.cmp(&b.2.name))
        });

        Ok(hits
            .into_iter()
            .take(self.max_results)
            .map(|(_, _, place)| place.clone())
            .collect())
    }
}

/// Debounced front end to a [`LocationSearch`].
///
/// Each call to [`DebouncedSearch::search`] takes a generation number. A
/// call returns `None` when a newer call started while it was waiting or
/// while its request was in flight; only the latest call returns
/// `Some(results)`.
pub struct DebouncedSearch<S: LocationSearch> {
    service: S,
    quiet_period: Duration,
    generation: AtomicU64,
}

impl<S: LocationSearch> DebouncedSearch<S> {
    pub fn new(service: S, quiet_period: Duration) -> Self {
        DebouncedSearch {
            service,
            quiet_period,
            generation: AtomicU64::new(0),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Run `text` after the quiet period unless overtaken.
    ///
    /// Blank text clears the results immediately (and still overtakes any
    /// pending call).
    pub async fn search(&self, text: &str, region: Option<&RegionHint>) -> Option<Vec<NamedPoint>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let query = text.trim();
        if query.is_empty() {
            return Some(Vec::new());
        }

        tokio::time::sleep(self.quiet_period).await;
        if !self.is_current(generation) {
            debug!("Location search '{}' superseded before dispatch", query);
            return None;
        }

        let results = match self.service.search(query, region).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Location search '{}' failed: {}", query, e);
                Vec::new()
            }
        };

        if !self.is_current(generation) {
            debug!("Discarding stale location results for '{}'", query);
            return None;
        }

        debug!("Location search '{}' -> {} results", query, results.len());
        Some(results)
    }

    /// Make every pending call return `None`.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Form-local working list of a customer's locations.
#[derive(Clone, Debug)]
pub struct LocationEditor {
    customer: Option<Uuid>,
    policy: PersistencePolicy,
    working: Vec<Location>,
    persisted_early: Vec<Uuid>,
}

impl LocationEditor {
    /// Editor for a customer that does not exist yet.
    pub fn new(policy: PersistencePolicy) -> Self {
        LocationEditor {
            customer: None,
            policy,
            working: Vec::new(),
            persisted_early: Vec::new(),
        }
    }

    /// Editor seeded with an existing customer's locations.
    pub fn for_existing(
        customer: Uuid,
        existing: Vec<Location>,
        policy: PersistencePolicy,
    ) -> Self {
        LocationEditor {
            customer: Some(customer),
            policy,
            working: existing,
            persisted_early: Vec::new(),
        }
    }

    pub fn customer(&self) -> Option<Uuid> {
        self.customer
    }

    pub fn items(&self) -> &[Location] {
        &self.working
    }

    pub fn names(&self) -> Vec<&str> {
        self.working.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// Turn a chosen search hit into a location and append it.
    ///
    /// Under `Immediate` policy the location is inserted right away, linked
    /// to the customer when the customer already exists.
    ///
    /// # Errors
    /// Returns `Err` if the store rejects the early insert
    pub async fn add<S: ObjectStore>(&mut self, store: &S, point: NamedPoint) -> Result<Location> {
        let mut location = Location::new(point.name, Some(point.coordinate));
        location.customer_id = self.customer;

        if self.policy == PersistencePolicy::Immediate {
            store.insert(location.clone()).await?;
            if self.customer.is_none() {
                self.persisted_early.push(location.id);
            }
        }

        debug!("Location '{}' added to working list", location.name);
        self.working.push(location.clone());
        Ok(location)
    }

    /// Drop a location from the working list.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.working.len();
        self.working.retain(|l| l.id != id);
        self.working.len() != before
    }

    /// The list to commit.
    pub fn into_working_list(self) -> Vec<Location> {
        self.working
    }

    /// Abandon the edit. Returns ids that were inserted early without an
    /// owner.
    pub fn cancel(self) -> Vec<Uuid> {
        self.persisted_early
    }
}

/// Name of the first saved location, or an empty string.
pub fn default_location_name(locations: &[Location]) -> String {
    locations
        .first()
        .map(|l| l.name.clone())
        .unwrap_or_default()
}

/// Location name to store on a ticket: the explicit choice, else the
/// default.
pub fn choose_location_name(chosen: Option<&str>, locations: &[Location]) -> String {
    match chosen {
        Some(name) => name.to_string(),
        None => default_location_name(locations),
    }
}
