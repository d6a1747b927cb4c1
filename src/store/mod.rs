use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus, GeoPoint, HelperAssignment};
use crate::models::profile::Profile;
use crate::models::service::{default_catalog, Service};

/// Label shown when a booking references a service row that no longer
/// resolves.
pub const SERVICE_PLACEHOLDER: &str = "Service";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row-level change feed event. `old` carries the pre-image on updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub booking: Booking,
    pub old: Option<Booking>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Outcome of the conditional pending -> confirmed write. A lost race is an
/// expected result, not an error.
#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    Accepted(Booking),
    Lost,
}

/// Outcome of the conditional pending -> cancelled write.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled(Booking),
    Lost,
}

/// The authoritative record of booking lifecycle state. Writers to the same
/// row serialize on the map's entry lock, which is what makes the
/// conditional accept/cancel writes safe against each other.
pub struct BookingStore {
    bookings: DashMap<Uuid, Booking>,
    services: DashMap<Uuid, Service>,
    profiles: DashMap<Uuid, Profile>,
    changes_tx: broadcast::Sender<ChangeEvent>,
}

impl BookingStore {
    pub fn new(event_buffer_size: usize) -> Self {
        let (changes_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let store = Self {
            bookings: DashMap::new(),
            services: DashMap::new(),
            profiles: DashMap::new(),
            changes_tx,
        };

        for service in default_catalog() {
            store.services.insert(service.id, service);
        }

        store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes_tx.subscribe()
    }

    fn publish(&self, kind: ChangeKind, booking: Booking, old: Option<Booking>) {
        if let Some(prev) = &old {
            debug_assert!(
                prev.status.can_transition_to(booking.status),
                "illegal transition {:?} -> {:?}",
                prev.status,
                booking.status
            );
        }
        let _ = self.changes_tx.send(ChangeEvent { kind, booking, old });
    }

    pub fn create_booking(&self, new: NewBooking) -> Result<Booking, AppError> {
        let address = match new.address.filter(|a| !a.trim().is_empty()) {
            Some(address) => address,
            None => self
                .profiles
                .get(&new.customer_id)
                .map(|profile| profile.address.clone())
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| {
                    AppError::BadRequest("address is required and no profile address is set".to_string())
                })?,
        };

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            service_id: new.service_id,
            address,
            location: new.location,
            status: BookingStatus::Pending,
            helper_name: None,
            helper_phone: None,
            eta_minutes: None,
            scheduled_for: new.scheduled_for.unwrap_or(now),
            created_at: now,
            updated_at: now,
        };

        self.bookings.insert(booking.id, booking.clone());
        self.publish(ChangeKind::Insert, booking.clone(), None);

        info!(booking_id = %booking.id, customer_id = %booking.customer_id, "booking created");
        Ok(booking)
    }

    pub fn booking(&self, id: Uuid) -> Option<Booking> {
        self.bookings.get(&id).map(|entry| entry.value().clone())
    }

    pub fn bookings_for_customer(&self, customer_id: Uuid) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|entry| entry.value().customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn all_bookings(&self) -> Vec<Booking> {
        self.bookings
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn bookings_with_status(&self, status: BookingStatus) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Conditional pending -> confirmed write. Status, helper identity and
    /// ETA land in one write under the row lock; the helper fields are set
    /// exactly once. Any current status other than pending means another
    /// actor won the row first.
    pub fn accept_booking(
        &self,
        id: Uuid,
        assignment: HelperAssignment,
    ) -> Result<AcceptOutcome, AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("booking {} not found", id)))?;

        if booking.status != BookingStatus::Pending {
            return Ok(AcceptOutcome::Lost);
        }

        let old = booking.clone();
        booking.status = BookingStatus::Confirmed;
        booking.helper_name = Some(assignment.helper_name);
        booking.helper_phone = Some(assignment.helper_phone);
        booking.eta_minutes = Some(assignment.eta_minutes);
        booking.updated_at = Utc::now();

        let updated = booking.clone();
        drop(booking);
        self.publish(ChangeKind::Update, updated.clone(), Some(old));

        info!(booking_id = %id, helper = %updated.helper_name.as_deref().unwrap_or(""), "booking accepted");
        Ok(AcceptOutcome::Accepted(updated))
    }

    /// Single-step progression through the active-job states. Only the
    /// status and the update timestamp change.
    pub fn advance_booking(&self, id: Uuid) -> Result<Booking, AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("booking {} not found", id)))?;

        if booking.status.is_terminal() {
            return Err(AppError::PolicyRejected(format!(
                "booking {} is already finalized",
                id
            )));
        }

        let next = booking.status.next_active().ok_or_else(|| {
            AppError::BadRequest("a pending booking must be accepted before it can progress".to_string())
        })?;

        let old = booking.clone();
        booking.status = next;
        booking.updated_at = Utc::now();

        let updated = booking.clone();
        drop(booking);
        self.publish(ChangeKind::Update, updated.clone(), Some(old));

        Ok(updated)
    }

    /// Conditional pending -> cancelled write. A booking that already left
    /// pending (a helper got there first) reports a lost race; a terminal
    /// booking rejects the write outright.
    pub fn cancel_booking(&self, id: Uuid) -> Result<CancelOutcome, AppError> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("booking {} not found", id)))?;

        if booking.status.is_terminal() {
            return Err(AppError::PolicyRejected(format!(
                "booking {} is already finalized",
                id
            )));
        }
        if booking.status != BookingStatus::Pending {
            return Ok(CancelOutcome::Lost);
        }

        let old = booking.clone();
        booking.status = BookingStatus::Cancelled;
        booking.updated_at = Utc::now();

        let updated = booking.clone();
        drop(booking);
        self.publish(ChangeKind::Update, updated.clone(), Some(old));

        info!(booking_id = %id, "booking cancelled");
        Ok(CancelOutcome::Cancelled(updated))
    }

    pub fn services(&self) -> Vec<Service> {
        self.services
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Display name for a booking's service, degrading to a placeholder when
    /// the catalog row is missing.
    pub fn service_label(&self, service_id: Uuid) -> String {
        self.services
            .get(&service_id)
            .map(|entry| entry.value().name.clone())
            .unwrap_or_else(|| SERVICE_PLACEHOLDER.to_string())
    }

    pub fn upsert_profile(&self, profile: Profile) -> Profile {
        self.profiles.insert(profile.customer_id, profile.clone());
        profile
    }

    pub fn profile(&self, customer_id: Uuid) -> Option<Profile> {
        self.profiles
            .get(&customer_id)
            .map(|entry| entry.value().clone())
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::{AcceptOutcome, BookingStore, CancelOutcome, NewBooking};
    use crate::error::AppError;
    use crate::models::booking::{BookingStatus, HelperAssignment};

    fn store() -> BookingStore {
        BookingStore::new(64)
    }

    fn new_booking(customer_id: Uuid) -> NewBooking {
        NewBooking {
            customer_id,
            service_id: Uuid::from_u128(1),
            address: Some("12 Rose Lane".to_string()),
            location: None,
            scheduled_for: None,
        }
    }

    fn assignment(name: &str) -> HelperAssignment {
        HelperAssignment {
            helper_name: name.to_string(),
            helper_phone: "+1-555-0100".to_string(),
            eta_minutes: 20,
        }
    }

    #[test]
    fn create_starts_pending_with_no_helper() {
        let store = store();
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.helper_name.is_none());
        assert!(booking.eta_minutes.is_none());
    }

    #[test]
    fn create_without_address_falls_back_to_profile() {
        let store = store();
        let customer_id = Uuid::new_v4();
        store.upsert_profile(crate::models::profile::Profile {
            customer_id,
            name: "Dana".to_string(),
            phone: "+1-555-0199".to_string(),
            address: "7 Hill Street".to_string(),
            created_at: chrono::Utc::now(),
        });

        let mut request = new_booking(customer_id);
        request.address = None;
        let booking = store.create_booking(request).unwrap();
        assert_eq!(booking.address, "7 Hill Street");
    }

    #[test]
    fn create_without_address_or_profile_is_rejected() {
        let store = store();
        let mut request = new_booking(Uuid::new_v4());
        request.address = None;

        let err = store.create_booking(request).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn accept_populates_helper_fields_in_one_write() {
        let store = store();
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();

        let outcome = store.accept_booking(booking.id, assignment("Rita")).unwrap();
        let AcceptOutcome::Accepted(updated) = outcome else {
            panic!("accept lost on a fresh pending booking");
        };

        assert_eq!(updated.status, BookingStatus::Confirmed);
        assert_eq!(updated.helper_name.as_deref(), Some("Rita"));
        assert_eq!(updated.helper_phone.as_deref(), Some("+1-555-0100"));
        assert_eq!(updated.eta_minutes, Some(20));
    }

    #[test]
    fn second_accept_observes_lost_race() {
        let store = store();
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();

        store.accept_booking(booking.id, assignment("Rita")).unwrap();
        let second = store.accept_booking(booking.id, assignment("Marco")).unwrap();

        assert!(matches!(second, AcceptOutcome::Lost));
        let stored = store.booking(booking.id).unwrap();
        assert_eq!(stored.helper_name.as_deref(), Some("Rita"));
    }

    #[tokio::test]
    async fn concurrent_accepts_resolve_to_exactly_one_winner() {
        let store = Arc::new(store());
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            let id = booking.id;
            handles.push(tokio::spawn(async move {
                store.accept_booking(id, assignment(&format!("helper-{n}")))
            }));
        }

        let mut wins = 0;
        let mut losses = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                AcceptOutcome::Accepted(_) => wins += 1,
                AcceptOutcome::Lost => losses += 1,
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(losses, 7);

        let stored = store.booking(booking.id).unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert!(stored.helper_name.is_some());
    }

    #[test]
    fn advance_walks_the_full_progression() {
        let store = store();
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();
        store.accept_booking(booking.id, assignment("Rita")).unwrap();

        let expected = [
            BookingStatus::EnRoute,
            BookingStatus::Arrived,
            BookingStatus::Ongoing,
            BookingStatus::Completed,
        ];
        for status in expected {
            let updated = store.advance_booking(booking.id).unwrap();
            assert_eq!(updated.status, status);
        }
    }

    #[test]
    fn pending_booking_cannot_advance() {
        let store = store();
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();

        let err = store.advance_booking(booking.id).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn completed_booking_rejects_further_writes() {
        let store = store();
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();
        store.accept_booking(booking.id, assignment("Rita")).unwrap();
        for _ in 0..4 {
            store.advance_booking(booking.id).unwrap();
        }

        assert!(matches!(
            store.advance_booking(booking.id),
            Err(AppError::PolicyRejected(_))
        ));
        assert!(matches!(
            store.cancel_booking(booking.id),
            Err(AppError::PolicyRejected(_))
        ));
    }

    #[test]
    fn cancel_races_with_accept() {
        let store = store();
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();

        store.accept_booking(booking.id, assignment("Rita")).unwrap();
        let outcome = store.cancel_booking(booking.id).unwrap();

        assert!(matches!(outcome, CancelOutcome::Lost));
        assert_eq!(
            store.booking(booking.id).unwrap().status,
            BookingStatus::Confirmed
        );
    }

    #[test]
    fn cancel_from_pending_wins_before_accept() {
        let store = store();
        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();

        let cancel = store.cancel_booking(booking.id).unwrap();
        assert!(matches!(cancel, CancelOutcome::Cancelled(_)));

        let accept = store.accept_booking(booking.id, assignment("Rita")).unwrap();
        assert!(matches!(accept, AcceptOutcome::Lost));
    }

    #[test]
    fn change_feed_sees_insert_then_update() {
        let store = store();
        let mut rx = store.subscribe();

        let booking = store.create_booking(new_booking(Uuid::new_v4())).unwrap();
        store.accept_booking(booking.id, assignment("Rita")).unwrap();

        let insert = rx.try_recv().unwrap();
        assert_eq!(insert.kind, super::ChangeKind::Insert);
        assert!(insert.old.is_none());

        let update = rx.try_recv().unwrap();
        assert_eq!(update.kind, super::ChangeKind::Update);
        assert_eq!(update.booking.status, BookingStatus::Confirmed);
        assert_eq!(
            update.old.as_ref().map(|b| b.status),
            Some(BookingStatus::Pending)
        );
    }

    #[test]
    fn missing_service_degrades_to_placeholder_label() {
        let store = store();
        assert_eq!(store.service_label(Uuid::from_u128(1)), "Home Cleaning");
        assert_eq!(store.service_label(Uuid::new_v4()), super::SERVICE_PLACEHOLDER);
    }
}
