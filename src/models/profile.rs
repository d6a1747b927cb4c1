use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One per authenticated customer. The booking-creation flow reads it to
/// prefill a missing address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub customer_id: Uuid,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}
