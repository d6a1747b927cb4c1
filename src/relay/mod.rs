use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::models::booking::{Booking, BookingStatus};
use crate::models::notification::Notification;
use crate::store::{ChangeEvent, ChangeKind};

/// Which side of the marketplace this relay serves. Customers only watch
/// their own bookings; helpers watch everything and get lead alerts while
/// they are available.
#[derive(Debug, Clone, Copy)]
pub enum RelayMode {
    Customer { customer_id: Uuid },
    Helper { available: bool },
}

/// Diffs successive statuses per booking id against a session-local map and
/// raises a user-facing notification exactly once per transition. Owned by a
/// single session; torn down with it.
pub struct NotificationRelay {
    mode: RelayMode,
    last_status: HashMap<Uuid, BookingStatus>,
    notifications: VecDeque<Notification>,
    cap: usize,
}

impl NotificationRelay {
    /// Customer relay, seeded with one bulk read of the customer's own
    /// bookings so that pre-existing rows never notify on first contact.
    pub fn for_customer(customer_id: Uuid, seed: &[Booking], cap: usize) -> Self {
        let mut relay = Self {
            mode: RelayMode::Customer { customer_id },
            last_status: HashMap::new(),
            notifications: VecDeque::new(),
            cap,
        };
        relay.resync(seed);
        relay
    }

    /// Helper relay. Starts with an empty map: a helper cares about new
    /// pending bookings, not prior state.
    pub fn for_helper(cap: usize) -> Self {
        Self {
            mode: RelayMode::Helper { available: true },
            last_status: HashMap::new(),
            notifications: VecDeque::new(),
            cap,
        }
    }

    pub fn set_available(&mut self, available: bool) {
        if let RelayMode::Helper { available: a } = &mut self.mode {
            *a = available;
        }
    }

    /// Replace the status map with a fresh bulk read. Run after the feed
    /// lagged, so that the exactly-once-per-diff guarantee holds across the
    /// gap.
    pub fn resync(&mut self, bookings: &[Booking]) {
        self.last_status.clear();
        for booking in bookings {
            self.last_status.insert(booking.id, booking.status);
        }
    }

    fn watches(&self, booking: &Booking) -> bool {
        match self.mode {
            RelayMode::Customer { customer_id } => booking.customer_id == customer_id,
            RelayMode::Helper { .. } => true,
        }
    }

    /// Feed one change event through the diff. Returns the notification
    /// emitted for it, if any.
    pub fn observe(&mut self, event: &ChangeEvent) -> Option<Notification> {
        if !self.watches(&event.booking) {
            return None;
        }

        let id = event.booking.id;
        let status = event.booking.status;

        match event.kind {
            ChangeKind::Insert => {
                self.last_status.insert(id, status);
                match self.mode {
                    RelayMode::Helper { available: true } if status == BookingStatus::Pending => {
                        Some(self.push(Notification::new(
                            id,
                            "New Lead",
                            format!("New job request at {}", event.booking.address),
                        )))
                    }
                    _ => None,
                }
            }
            ChangeKind::Update => match self.last_status.get(&id).copied() {
                // First sighting of this id: record silently. Emitting here
                // would fire on initial load for rows the seed missed.
                None => {
                    self.last_status.insert(id, status);
                    None
                }
                Some(prev) if prev == status => None,
                Some(_) => {
                    self.last_status.insert(id, status);
                    transition_message(&event.booking).map(|n| self.push(n))
                }
            },
            ChangeKind::Delete => {
                self.last_status.remove(&id);
                None
            }
        }
    }

    fn push(&mut self, notification: Notification) -> Notification {
        self.notifications.push_back(notification.clone());
        while self.notifications.len() > self.cap {
            self.notifications.pop_front();
        }
        notification
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    pub fn mark_read(&mut self, id: Uuid) {
        if let Some(notification) = self.notifications.iter_mut().find(|n| n.id == id) {
            notification.read = true;
        }
    }

    pub fn tracked_status(&self, booking_id: Uuid) -> Option<BookingStatus> {
        self.last_status.get(&booking_id).copied()
    }
}

/// User-facing message for a status a booking just moved into. Statuses
/// without a message (pending) update the map but stay silent.
fn transition_message(booking: &Booking) -> Option<Notification> {
    let helper = booking.helper_name.as_deref().unwrap_or("Your helper");
    let (title, body) = match booking.status {
        BookingStatus::Confirmed => (
            "Helper Assigned",
            format!(
                "{} accepted your booking, arriving in about {} minutes",
                helper,
                booking.eta_minutes.unwrap_or(0)
            ),
        ),
        BookingStatus::EnRoute => ("Helper On The Way", format!("{helper} is heading to you")),
        BookingStatus::Arrived => ("Helper Arrived", format!("{helper} is at your address")),
        BookingStatus::Ongoing => ("Job Started", format!("{helper} started the job")),
        BookingStatus::Completed => ("Job Completed", "Your booking is complete".to_string()),
        BookingStatus::Cancelled => ("Booking Cancelled", "The booking was cancelled".to_string()),
        BookingStatus::Pending => return None,
    };
    Some(Notification::new(booking.id, title, body))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::NotificationRelay;
    use crate::models::booking::{Booking, BookingStatus};
    use crate::store::{ChangeEvent, ChangeKind};

    fn booking(id: u128, customer: u128, status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::from_u128(id),
            customer_id: Uuid::from_u128(customer),
            service_id: Uuid::from_u128(1),
            address: "12 Rose Lane".to_string(),
            location: None,
            status,
            helper_name: (status != BookingStatus::Pending).then(|| "Rita".to_string()),
            helper_phone: None,
            eta_minutes: None,
            scheduled_for: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn update(b: Booking) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Update,
            booking: b,
            old: None,
        }
    }

    fn insert(b: Booking) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Insert,
            booking: b,
            old: None,
        }
    }

    #[test]
    fn exactly_one_notification_per_transition() {
        let seed = [booking(1, 7, BookingStatus::Pending)];
        let mut relay = NotificationRelay::for_customer(Uuid::from_u128(7), &seed, 25);

        let statuses = [
            BookingStatus::Pending,
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Confirmed,
            BookingStatus::EnRoute,
        ];

        let emitted: Vec<_> = statuses
            .iter()
            .filter_map(|s| relay.observe(&update(booking(1, 7, *s))))
            .collect();

        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].title, "Helper Assigned");
        assert_eq!(emitted[1].title, "Helper On The Way");
    }

    #[test]
    fn no_spurious_notification_on_seed() {
        let seed = [booking(1, 7, BookingStatus::Confirmed)];
        let mut relay = NotificationRelay::for_customer(Uuid::from_u128(7), &seed, 25);

        let none = relay.observe(&update(booking(1, 7, BookingStatus::Confirmed)));
        assert!(none.is_none());
        assert_eq!(relay.notifications().count(), 0);
    }

    #[test]
    fn duplicate_update_delivery_emits_once() {
        let seed = [booking(1, 7, BookingStatus::Pending)];
        let mut relay = NotificationRelay::for_customer(Uuid::from_u128(7), &seed, 25);

        let first = relay.observe(&update(booking(1, 7, BookingStatus::Confirmed)));
        assert!(first.is_some());
        assert_eq!(first.unwrap().booking_id, Uuid::from_u128(1));

        // Transport retry delivers the same row again.
        let second = relay.observe(&update(booking(1, 7, BookingStatus::Confirmed)));
        assert!(second.is_none());
        assert_eq!(relay.notifications().count(), 1);
    }

    #[test]
    fn first_sighting_of_unknown_id_is_silent() {
        let mut relay = NotificationRelay::for_customer(Uuid::from_u128(7), &[], 25);

        let none = relay.observe(&update(booking(9, 7, BookingStatus::Confirmed)));
        assert!(none.is_none());

        // The map caught up, so the next transition does notify.
        let some = relay.observe(&update(booking(9, 7, BookingStatus::EnRoute)));
        assert!(some.is_some());
    }

    #[test]
    fn customer_relay_ignores_other_customers() {
        let mut relay = NotificationRelay::for_customer(Uuid::from_u128(7), &[], 25);

        relay.observe(&insert(booking(1, 8, BookingStatus::Pending)));
        let none = relay.observe(&update(booking(1, 8, BookingStatus::Confirmed)));

        assert!(none.is_none());
        assert!(relay.tracked_status(Uuid::from_u128(1)).is_none());
    }

    #[test]
    fn available_helper_is_alerted_on_new_pending_booking() {
        let mut relay = NotificationRelay::for_helper(25);

        let lead = relay.observe(&insert(booking(1, 7, BookingStatus::Pending)));
        assert_eq!(lead.unwrap().title, "New Lead");
    }

    #[test]
    fn unavailable_helper_records_inserts_silently() {
        let mut relay = NotificationRelay::for_helper(25);
        relay.set_available(false);

        let none = relay.observe(&insert(booking(1, 7, BookingStatus::Pending)));
        assert!(none.is_none());
        assert_eq!(relay.tracked_status(Uuid::from_u128(1)), Some(BookingStatus::Pending));
    }

    #[test]
    fn buffer_is_capped_to_most_recent() {
        let mut relay = NotificationRelay::for_helper(3);

        for id in 0..5u128 {
            relay.observe(&insert(booking(id, 7, BookingStatus::Pending)));
        }

        let kept: Vec<_> = relay.notifications().map(|n| n.booking_id).collect();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0], Uuid::from_u128(2));
        assert_eq!(kept[2], Uuid::from_u128(4));
    }

    #[test]
    fn resync_restores_exactly_once_after_gap() {
        let seed = [booking(1, 7, BookingStatus::Pending)];
        let mut relay = NotificationRelay::for_customer(Uuid::from_u128(7), &seed, 25);

        // Feed gap: the booking advanced twice while we were not listening.
        relay.resync(&[booking(1, 7, BookingStatus::EnRoute)]);

        let none = relay.observe(&update(booking(1, 7, BookingStatus::EnRoute)));
        assert!(none.is_none());

        let some = relay.observe(&update(booking(1, 7, BookingStatus::Arrived)));
        assert_eq!(some.unwrap().title, "Helper Arrived");
    }

    #[test]
    fn mark_read_flips_single_entry() {
        let mut relay = NotificationRelay::for_helper(25);
        let lead = relay
            .observe(&insert(booking(1, 7, BookingStatus::Pending)))
            .unwrap();
        relay.observe(&insert(booking(2, 7, BookingStatus::Pending)));

        assert_eq!(relay.unread_count(), 2);
        relay.mark_read(lead.id);
        assert_eq!(relay.unread_count(), 1);
    }
}
