use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, GeoPoint};
use crate::models::notification::Notification;
use crate::relay::NotificationRelay;
use crate::store::{BookingStore, CancelOutcome, ChangeEvent, ChangeKind, NewBooking};

/// One customer's session: creates bookings, conditionally withdraws them,
/// and watches the change feed until a booking settles.
pub struct CustomerSession {
    store: Arc<BookingStore>,
    customer_id: Uuid,
    relay: NotificationRelay,
}

impl CustomerSession {
    /// Seeds the relay with one bulk read of the customer's own bookings so
    /// rows that already exist never notify on startup.
    pub fn new(store: Arc<BookingStore>, customer_id: Uuid, notification_cap: usize) -> Self {
        let seed = store.bookings_for_customer(customer_id);
        let relay = NotificationRelay::for_customer(customer_id, &seed, notification_cap);
        Self {
            store,
            customer_id,
            relay,
        }
    }

    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    pub fn relay(&self) -> &NotificationRelay {
        &self.relay
    }

    pub fn create_booking(
        &mut self,
        service_id: Uuid,
        address: Option<String>,
        location: Option<GeoPoint>,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Booking, AppError> {
        let booking = self.store.create_booking(NewBooking {
            customer_id: self.customer_id,
            service_id,
            address,
            location,
            scheduled_for,
        })?;
        // Record the fresh row in the relay map; the subscription may not
        // be live yet and the first observed transition must still diff
        // against pending.
        self.relay.observe(&ChangeEvent {
            kind: ChangeKind::Insert,
            booking: booking.clone(),
            old: None,
        });
        Ok(booking)
    }

    /// Withdraw a booking that is still unassigned. Losing the race against
    /// a simultaneous acceptance surfaces as "no longer available".
    pub fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking, AppError> {
        match self.store.cancel_booking(booking_id)? {
            CancelOutcome::Cancelled(booking) => Ok(booking),
            CancelOutcome::Lost => Err(AppError::BookingTaken(format!(
                "booking {} was already accepted by a helper",
                booking_id
            ))),
        }
    }

    pub fn my_bookings(&self) -> Vec<Booking> {
        self.store.bookings_for_customer(self.customer_id)
    }

    /// Consume the change feed until the booking reaches a terminal state,
    /// routing every event through the relay. A lagged stream reseeds the
    /// relay from a fresh bulk read. The subscription is released when the
    /// stream is dropped on return.
    pub async fn watch_until_terminal(&mut self, booking_id: Uuid) -> Result<Booking, AppError> {
        let mut stream = BroadcastStream::new(self.store.subscribe());

        // The booking may have settled before we subscribed.
        if let Some(booking) = self.store.booking(booking_id) {
            if booking.status.is_terminal() {
                return Ok(booking);
            }
        }

        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    self.relay.observe(&event);
                    if event.booking.id == booking_id && event.booking.status.is_terminal() {
                        return Ok(event.booking);
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(skipped, "change feed lagged; resyncing relay");
                    let seed = self.store.bookings_for_customer(self.customer_id);
                    self.relay.resync(&seed);
                    if let Some(booking) = self.store.booking(booking_id) {
                        if booking.status.is_terminal() {
                            return Ok(booking);
                        }
                    }
                }
            }
        }

        Err(AppError::Internal("change feed closed".to_string()))
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.relay.notifications().cloned().collect()
    }
}
