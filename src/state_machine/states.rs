use serde::{Deserialize, Serialize};
use std::fmt;

/// Booking status. The single transition table for the whole crate lives on this enum.
///
/// ```text
/// created → requested → matching → matched → accepted → enroute → arrived
///         → started → in_progress → work_completed → completed
///
/// any non-terminal ──→ cancelled | payment_failed
/// cancelled | completed ──→ refunded   (refund settlement only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    /// Booking recorded, payment not yet captured
    Created,
    /// Payment captured, waiting for matching to start
    Requested,
    /// Candidates being ranked
    Matching,
    /// Offers outstanding, no provider assigned yet
    Matched,
    /// A provider won the claim
    Accepted,
    Enroute,
    Arrived,
    Started,
    InProgress,
    /// Provider reports the job done; awaiting confirmation or timeout
    WorkCompleted,
    Completed,
    Cancelled,
    /// Payment capture failed
    PaymentFailed,
    /// Money returned to the customer after cancellation or completion
    Refunded,
}

/// The forward lifecycle, in order
pub const FORWARD_SEQUENCE: [BookingState; 11] = [
    BookingState::Created,
    BookingState::Requested,
    BookingState::Matching,
    BookingState::Matched,
    BookingState::Accepted,
    BookingState::Enroute,
    BookingState::Arrived,
    BookingState::Started,
    BookingState::InProgress,
    BookingState::WorkCompleted,
    BookingState::Completed,
];

impl BookingState {
    /// Position in the forward lifecycle; `None` for the failure/refund states
    pub fn forward_index(&self) -> Option<usize> {
        FORWARD_SEQUENCE.iter().position(|s| s == self)
    }

    /// The direct forward successor, if any
    pub fn successor(&self) -> Option<BookingState> {
        let idx = self.forward_index()?;
        FORWARD_SEQUENCE.get(idx + 1).copied()
    }

    /// Check if this is a terminal state (no further `transition()` allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Refunded | Self::PaymentFailed
        )
    }

    /// Whether a booking in this state must have an assigned provider
    pub fn requires_provider(&self) -> bool {
        matches!(
            self,
            Self::Accepted
                | Self::Enroute
                | Self::Arrived
                | Self::Started
                | Self::InProgress
                | Self::WorkCompleted
                | Self::Completed
        )
    }

    /// Whether this state comes strictly before `other` in the forward lifecycle
    pub fn precedes(&self, other: BookingState) -> bool {
        match (self.forward_index(), other.forward_index()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// Statuses from which cancellation is still possible
    pub fn is_cancellable(&self) -> bool {
        !self.is_terminal() && self.precedes(Self::InProgress)
    }

    /// States in which the booking is still looking for a provider
    pub fn is_pre_assignment(&self) -> bool {
        matches!(self, Self::Requested | Self::Matching | Self::Matched)
    }

    /// States a provider drives once assigned
    pub fn is_provider_driven(&self) -> bool {
        matches!(
            self,
            Self::Accepted
                | Self::Enroute
                | Self::Arrived
                | Self::Started
                | Self::InProgress
                | Self::WorkCompleted
        )
    }

    /// The transition table: is `self → to` an edge?
    pub fn can_transition_to(&self, to: BookingState) -> bool {
        match to {
            Self::Cancelled | Self::PaymentFailed => !self.is_terminal(),
            Self::Refunded => matches!(self, Self::Cancelled | Self::Completed),
            _ => self.successor() == Some(to),
        }
    }

    /// Every state reachable in one step
    pub fn next_states(&self) -> Vec<BookingState> {
        ALL_STATES
            .iter()
            .copied()
            .filter(|to| self.can_transition_to(*to))
            .collect()
    }
}

pub const ALL_STATES: [BookingState; 14] = [
    BookingState::Created,
    BookingState::Requested,
    BookingState::Matching,
    BookingState::Matched,
    BookingState::Accepted,
    BookingState::Enroute,
    BookingState::Arrived,
    BookingState::Started,
    BookingState::InProgress,
    BookingState::WorkCompleted,
    BookingState::Completed,
    BookingState::Cancelled,
    BookingState::PaymentFailed,
    BookingState::Refunded,
];

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Requested => write!(f, "requested"),
            Self::Matching => write!(f, "matching"),
            Self::Matched => write!(f, "matched"),
            Self::Accepted => write!(f, "accepted"),
            Self::Enroute => write!(f, "enroute"),
            Self::Arrived => write!(f, "arrived"),
            Self::Started => write!(f, "started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::WorkCompleted => write!(f, "work_completed"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::PaymentFailed => write!(f, "payment_failed"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl std::str::FromStr for BookingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "requested" => Ok(Self::Requested),
            "matching" => Ok(Self::Matching),
            "matched" => Ok(Self::Matched),
            "accepted" => Ok(Self::Accepted),
            "enroute" => Ok(Self::Enroute),
            "arrived" => Ok(Self::Arrived),
            "started" => Ok(Self::Started),
            "in_progress" => Ok(Self::InProgress),
            "work_completed" => Ok(Self::WorkCompleted),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "payment_failed" => Ok(Self::PaymentFailed),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("Invalid booking state: {s}")),
        }
    }
}

impl Default for BookingState {
    fn default() -> Self {
        Self::Created
    }
}
