use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Lifecycle states of a booking. Wire names match the stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    EnRoute,
    Arrived,
    Ongoing,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// The single next step of the active-job progression, driven by the
    /// assigned helper. Pending has no next step here: it leaves via an
    /// accept (which carries the helper identity) or a cancel.
    pub fn next_active(self) -> Option<BookingStatus> {
        match self {
            BookingStatus::Confirmed => Some(BookingStatus::EnRoute),
            BookingStatus::EnRoute => Some(BookingStatus::Arrived),
            BookingStatus::Arrived => Some(BookingStatus::Ongoing),
            BookingStatus::Ongoing => Some(BookingStatus::Completed),
            BookingStatus::Pending | BookingStatus::Completed | BookingStatus::Cancelled => None,
        }
    }

    /// Full edge relation of the lifecycle graph: the linear progression,
    /// plus cancel from any non-terminal state. Terminal states have no
    /// outgoing edges.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == BookingStatus::Cancelled {
            return true;
        }
        self.next_active() == Some(next)
            || (self == BookingStatus::Pending && next == BookingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub address: String,
    pub location: Option<GeoPoint>,
    pub status: BookingStatus,
    pub helper_name: Option<String>,
    pub helper_phone: Option<String>,
    pub eta_minutes: Option<u32>,
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Helper identity written atomically with the pending -> confirmed switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperAssignment {
    pub helper_name: String,
    pub helper_phone: String,
    pub eta_minutes: u32,
}
