use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus, HelperAssignment};
use crate::models::notification::Notification;
use crate::relay::NotificationRelay;
use crate::store::{AcceptOutcome, BookingStore, ChangeEvent, ChangeKind};

#[derive(Debug, Clone)]
pub struct HelperIdentity {
    pub name: String,
    pub phone: String,
}

struct Lead {
    booking: Booking,
    /// Set when the lead becomes the currently displayed one; queued leads
    /// behind it have no running countdown yet.
    deadline: Option<Instant>,
}

/// What a waiting helper session woke up for.
#[derive(Debug)]
pub enum HelperWake {
    Notification(Notification),
    LeadExpired(Booking),
    FeedClosed,
}

/// One helper's view of the marketplace: a relay for alerts plus a local
/// queue of time-boxed leads. The store is only ever touched by an explicit
/// accept; expiry and decline stay on this side of the wire.
pub struct HelperSession {
    store: Arc<BookingStore>,
    identity: HelperIdentity,
    relay: NotificationRelay,
    leads: VecDeque<Lead>,
    lead_timeout: Duration,
    eta_range: (u32, u32),
    available: bool,
}

impl HelperSession {
    pub fn new(
        store: Arc<BookingStore>,
        identity: HelperIdentity,
        lead_timeout: Duration,
        eta_range: (u32, u32),
        notification_cap: usize,
    ) -> Self {
        Self {
            store,
            identity,
            relay: NotificationRelay::for_helper(notification_cap),
            leads: VecDeque::new(),
            lead_timeout,
            eta_range,
            available: true,
        }
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
        self.relay.set_available(available);
    }

    pub fn current_lead(&self) -> Option<&Booking> {
        self.leads.front().map(|lead| &lead.booking)
    }

    pub fn queued_leads(&self) -> usize {
        self.leads.len()
    }

    pub fn relay(&self) -> &NotificationRelay {
        &self.relay
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.leads.front().and_then(|lead| lead.deadline)
    }

    /// The head of the queue just changed; the new head's countdown starts
    /// now.
    fn arm_current(&mut self) {
        let timeout = self.lead_timeout;
        if let Some(head) = self.leads.front_mut() {
            if head.deadline.is_none() {
                head.deadline = Some(Instant::now() + timeout);
            }
        }
    }

    /// Feed one change event through the session: relay diffing plus lead
    /// queue upkeep. Returns the notification the relay raised, if any.
    pub fn handle_event(&mut self, event: &ChangeEvent) -> Option<Notification> {
        let notification = self.relay.observe(event);

        match event.kind {
            ChangeKind::Insert => {
                if self.available && event.booking.status == BookingStatus::Pending {
                    self.leads.push_back(Lead {
                        booking: event.booking.clone(),
                        deadline: None,
                    });
                    self.arm_current();
                }
            }
            ChangeKind::Update => {
                // A queued lead that left pending was taken or withdrawn
                // elsewhere; it is no longer offerable.
                if event.booking.status != BookingStatus::Pending {
                    self.evict(event.booking.id);
                }
            }
            ChangeKind::Delete => {
                self.evict(event.booking.id);
            }
        }

        notification
    }

    fn evict(&mut self, booking_id: Uuid) {
        let was_head = self
            .leads
            .front()
            .is_some_and(|lead| lead.booking.id == booking_id);
        self.leads.retain(|lead| lead.booking.id != booking_id);
        if was_head {
            self.arm_current();
        }
    }

    /// Drop the current lead if its countdown ran out. Purely local: the
    /// booking stays pending in the store and may still be accepted later.
    pub fn tick_expiry(&mut self, now: Instant) -> Option<Booking> {
        let expired = self
            .leads
            .front()
            .and_then(|lead| lead.deadline)
            .is_some_and(|deadline| deadline <= now);

        if !expired {
            return None;
        }

        let lead = self.leads.pop_front()?;
        self.arm_current();
        debug!(booking_id = %lead.booking.id, "lead expired locally");
        Some(lead.booking)
    }

    /// Try to take the current lead. A lost race is not an error: the lead
    /// is dropped silently and `Ok(None)` is returned.
    pub fn accept_current(&mut self) -> Result<Option<Booking>, AppError> {
        let Some(lead) = self.leads.pop_front() else {
            return Ok(None);
        };
        self.arm_current();

        let assignment = HelperAssignment {
            helper_name: self.identity.name.clone(),
            helper_phone: self.identity.phone.clone(),
            eta_minutes: pick_eta_minutes(lead.booking.id, self.eta_range),
        };

        match self.store.accept_booking(lead.booking.id, assignment)? {
            AcceptOutcome::Accepted(booking) => {
                info!(booking_id = %booking.id, helper = %self.identity.name, "lead accepted");
                Ok(Some(booking))
            }
            AcceptOutcome::Lost => {
                debug!(booking_id = %lead.booking.id, "lead already taken");
                Ok(None)
            }
        }
    }

    /// Pass on the current lead. Local removal only.
    pub fn decline_current(&mut self) -> Option<Booking> {
        let lead = self.leads.pop_front()?;
        self.arm_current();
        Some(lead.booking)
    }

    /// Park the session until something needs the helper's attention. A
    /// lagged feed resyncs the relay from a fresh bulk read before events
    /// keep flowing.
    pub async fn wait(&mut self, rx: &mut broadcast::Receiver<ChangeEvent>) -> HelperWake {
        loop {
            let deadline = self.next_deadline();
            let sleep_target = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => {
                        if let Some(notification) = self.handle_event(&event) {
                            return HelperWake::Notification(notification);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "change feed lagged; resyncing relay");
                        let snapshot = self.store.all_bookings();
                        self.relay.resync(&snapshot);
                    }
                    Err(RecvError::Closed) => return HelperWake::FeedClosed,
                },
                _ = sleep_until(sleep_target), if deadline.is_some() => {
                    if let Some(expired) = self.tick_expiry(Instant::now()) {
                        return HelperWake::LeadExpired(expired);
                    }
                }
            }
        }
    }
}

/// Display-hint ETA in the configured range, derived from the booking id so
/// the accept path stays reproducible. Never recomputed after acceptance.
pub fn pick_eta_minutes(booking_id: Uuid, (min, max): (u32, u32)) -> u32 {
    let span = max.saturating_sub(min).saturating_add(1);
    let folded = booking_id
        .as_bytes()
        .iter()
        .fold(0u32, |acc, byte| acc.wrapping_mul(31).wrapping_add(*byte as u32));
    min + folded % span
}
