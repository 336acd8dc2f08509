//! Ticket status workflow.
//!
//! A ticket is always in exactly one of three states:
//!
//! ```
//! use diary_kit::status::TicketStatus;
//!
//! let _s = TicketStatus::Pending;     // created, not started
//! let _s = TicketStatus::InProgress;  // being worked on
//! let _s = TicketStatus::Done;        // closed, carries a closed date
//! ```
//!
//! # Transitions
//!
//! No transition is ever rejected and no state is terminal. Two gestures
//! exist in a UI (an explicit status picker and a single "advance" tap), and
//! both go through [`apply_status`]:
//!
//! | Gesture | Call |
//! |---------|------|
//! | Picker | `apply_status(ticket, target, now)` |
//! | Advance | `cycle_status(ticket, now)` = `apply_status(ticket, status.next_in_cycle(), now)` |
//!
//! The cycle order is `Pending -> InProgress -> Done -> Pending`.
//!
//! # Closed date
//!
//! After every call, `ticket.closed_at.is_some() == (ticket.status == Done)`:
//! entering `Done` stamps the closed date if it is absent, and any other
//! target clears it.

use crate::error::{Error, Result};
use crate::model::Ticket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Workflow status of a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Created and waiting to be started. New tickets default to this.
    #[default]
    Pending,

    /// Work has started.
    InProgress,

    /// Work is finished. The only status that carries a closed date.
    Done,
}

impl TicketStatus {
    /// Every status, in declaration order.
    pub const ALL: [TicketStatus; 3] = [
        TicketStatus::Pending,
        TicketStatus::InProgress,
        TicketStatus::Done,
    ];

    /// Order of the status buckets in ticket lists.
    ///
    /// Operational urgency, not alphabetical: work in flight first, then
    /// the backlog, then closed work.
    pub const DISPLAY_ORDER: [TicketStatus; 3] = [
        TicketStatus::InProgress,
        TicketStatus::Pending,
        TicketStatus::Done,
    ];

    /// Next status for the single-gesture advance.
    pub fn next_in_cycle(self) -> Self {
        match self {
            TicketStatus::Pending => TicketStatus::InProgress,
            TicketStatus::InProgress => TicketStatus::Done,
            TicketStatus::Done => TicketStatus::Pending,
        }
    }

    /// Stable machine name (`pending`, `in_progress`, `done`).
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Done => "done",
        }
    }

    /// Human-readable label, also used as the bucket title.
    pub fn label(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "Pending",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::Done => "Done",
        }
    }

    /// Whether this status requires a closed date.
    pub fn is_closed(self) -> bool {
        self == TicketStatus::Done
    }

    /// Position of this status in [`TicketStatus::DISPLAY_ORDER`].
    pub fn display_rank(self) -> usize {
        match self {
            TicketStatus::InProgress => 0,
            TicketStatus::Pending => 1,
            TicketStatus::Done => 2,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for TicketStatus {
    type Err = Error;

    /// Accepts both machine names and labels, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "pending" => Ok(TicketStatus::Pending),
            "in_progress" | "inprogress" => Ok(TicketStatus::InProgress),
            "done" => Ok(TicketStatus::Done),
            _ => Err(Error::ValidationError(format!(
                "unknown ticket status '{}'",
                s
            ))),
        }
    }
}

/// Record of a single status mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusTransition {
    /// Status before the mutation
    pub from: TicketStatus,

    /// Status after the mutation
    pub to: TicketStatus,

    /// Closed date after the mutation
    pub closed_at: Option<DateTime<Utc>>,
}

impl StatusTransition {
    /// True when the status did not change.
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Set a ticket's status and re-assert the closed-date rule.
///
/// This is the only place a ticket status is written.
pub fn apply_status(
    ticket: &mut Ticket,
    status: TicketStatus,
    now: DateTime<Utc>,
) -> StatusTransition {
    let from = ticket.status;
    ticket.status = status;

    if status.is_closed() {
        if ticket.closed_at.is_none() {
            ticket.closed_at = Some(now);
        }
    } else {
        ticket.closed_at = None;
    }

    trace!(
        "ticket {} status {} -> {} (closed_at: {:?})",
        ticket.id,
        from.as_str(),
        status.as_str(),
        ticket.closed_at
    );

    StatusTransition {
        from,
        to: status,
        closed_at: ticket.closed_at,
    }
}

/// Advance a ticket one step along `Pending -> InProgress -> Done -> Pending`.
pub fn cycle_status(ticket: &mut Ticket, now: DateTime<Utc>) -> StatusTransition {
    let next = ticket.status.next_in_cycle();
    apply_status(ticket, next, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn ticket() -> Ticket {
        Ticket::new(Uuid::now_v7(), "Boiler service", "Main office")
    }

    #[test]
    fn test_status_default() {
        assert_eq!(TicketStatus::default(), TicketStatus::Pending);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TicketStatus::Pending.to_string(), "Pending");
        assert_eq!(TicketStatus::InProgress.to_string(), "In Progress");
        assert_eq!(TicketStatus::Done.to_string(), "Done");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            "in_progress".parse::<TicketStatus>().unwrap(),
            TicketStatus::InProgress
        );
        assert_eq!(
            "In Progress".parse::<TicketStatus>().unwrap(),
            TicketStatus::InProgress
        );
        assert_eq!(" DONE ".parse::<TicketStatus>().unwrap(), TicketStatus::Done);
        assert!("archived".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_display_order_is_fixed() {
        assert_eq!(
            TicketStatus::DISPLAY_ORDER,
            [
                TicketStatus::InProgress,
                TicketStatus::Pending,
                TicketStatus::Done
            ]
        );
        for (rank, status) in TicketStatus::DISPLAY_ORDER.iter().enumerate() {
            assert_eq!(status.display_rank(), rank);
        }
    }

    #[test]
    fn test_cycle_returns_to_pending_after_three_steps() {
        let mut t = ticket();
        let now = Utc::now();

        assert_eq!(cycle_status(&mut t, now).to, TicketStatus::InProgress);
        assert_eq!(cycle_status(&mut t, now).to, TicketStatus::Done);
        assert!(t.closed_at.is_some());
        assert_eq!(cycle_status(&mut t, now).to, TicketStatus::Pending);
        assert!(t.closed_at.is_none());
    }

    #[test]
    fn test_done_keeps_existing_closed_date() {
        let mut t = ticket();
        let first = Utc::now();
        apply_status(&mut t, TicketStatus::Done, first);

        let later = first + Duration::hours(3);
        let transition = apply_status(&mut t, TicketStatus::Done, later);

        assert!(transition.is_noop());
        assert_eq!(t.closed_at, Some(first));
    }

    #[test]
    fn test_leaving_done_clears_closed_date() {
        let mut t = ticket();
        apply_status(&mut t, TicketStatus::Done, Utc::now());
        apply_status(&mut t, TicketStatus::InProgress, Utc::now());

        assert_eq!(t.status, TicketStatus::InProgress);
        assert!(t.closed_at.is_none());
    }

    #[test]
    fn test_pending_clears_stray_closed_date() {
        let mut t = ticket();
        t.closed_at = Some(Utc::now());

        apply_status(&mut t, TicketStatus::Pending, Utc::now());
        assert!(t.closed_at.is_none());
        assert!(t.is_consistent());
    }

    #[test]
    fn test_any_state_reachable_from_any_state() {
        for from in TicketStatus::ALL {
            for to in TicketStatus::ALL {
                let mut t = ticket();
                apply_status(&mut t, from, Utc::now());
                let transition = apply_status(&mut t, to, Utc::now());
                assert_eq!(transition.from, from);
                assert_eq!(t.status, to);
                assert!(t.is_consistent());
            }
        }
    }
}
