use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session-local, never persisted. Synthesized by the relay when it
/// observes a status diff; capped to the most recent entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(booking_id: Uuid, title: &str, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            title: title.to_string(),
            body,
            created_at: Utc::now(),
            read: false,
        }
    }
}
