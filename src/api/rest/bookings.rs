use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{departure_point, haversine_km, step_toward};
use crate::models::booking::{Booking, BookingStatus, GeoPoint, HelperAssignment};
use crate::session::helper::pick_eta_minutes;
use crate::state::AppState;
use crate::store::{AcceptOutcome, CancelOutcome, NewBooking};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/accept", post(accept_booking))
        .route("/bookings/:id/advance", post(advance_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/track", get(track_booking))
        .route("/customers/:id/bookings", get(list_customer_bookings))
        .route("/leads", get(list_leads))
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct AcceptBookingRequest {
    pub helper_name: String,
    pub helper_phone: String,
}

#[derive(Serialize)]
pub struct BookingDetail {
    pub booking: Booking,
    pub service_name: String,
}

#[derive(Serialize)]
pub struct TrackResponse {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub position: GeoPoint,
    pub progress: f64,
    pub eta_minutes_remaining: u32,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.store.create_booking(NewBooking {
        customer_id: payload.customer_id,
        service_id: payload.service_id,
        address: payload.address,
        location: payload.location,
        scheduled_for: payload.scheduled_for,
    })?;

    state
        .metrics
        .bookings_total
        .with_label_values(&["created"])
        .inc();
    state.metrics.pending_bookings.inc();

    Ok(Json(booking))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingDetail>, AppError> {
    let booking = state
        .store
        .booking(id)
        .ok_or_else(|| AppError::NotFound(format!("booking {} not found", id)))?;

    let service_name = state.store.service_label(booking.service_id);

    Ok(Json(BookingDetail {
        booking,
        service_name,
    }))
}

async fn list_customer_bookings(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Json<Vec<Booking>> {
    let mut bookings = state.store.bookings_for_customer(customer_id);
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(bookings)
}

/// Bookings still waiting on a helper, oldest first. Helper dashboards load
/// this once and then follow the change feed.
async fn list_leads(State(state): State<Arc<AppState>>) -> Json<Vec<Booking>> {
    let mut leads = state.store.bookings_with_status(BookingStatus::Pending);
    leads.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Json(leads)
}

async fn accept_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    if payload.helper_name.trim().is_empty() {
        return Err(AppError::BadRequest("helper_name cannot be empty".to_string()));
    }

    let start = Instant::now();
    let assignment = HelperAssignment {
        helper_name: payload.helper_name,
        helper_phone: payload.helper_phone,
        eta_minutes: pick_eta_minutes(id, state.eta_range),
    };

    match state.store.accept_booking(id, assignment)? {
        AcceptOutcome::Accepted(booking) => {
            state
                .metrics
                .accept_latency_seconds
                .with_label_values(&["won"])
                .observe(start.elapsed().as_secs_f64());
            state.metrics.accepts_total.with_label_values(&["won"]).inc();
            state
                .metrics
                .bookings_total
                .with_label_values(&["confirmed"])
                .inc();
            state.metrics.pending_bookings.dec();
            Ok(Json(booking))
        }
        AcceptOutcome::Lost => {
            state
                .metrics
                .accept_latency_seconds
                .with_label_values(&["lost"])
                .observe(start.elapsed().as_secs_f64());
            state.metrics.accepts_total.with_label_values(&["lost"]).inc();
            Err(AppError::BookingTaken(format!(
                "booking {} was already taken",
                id
            )))
        }
    }
}

async fn advance_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.store.advance_booking(id)?;

    if booking.status == BookingStatus::Completed {
        state
            .metrics
            .bookings_total
            .with_label_values(&["completed"])
            .inc();
    }

    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    match state.store.cancel_booking(id)? {
        CancelOutcome::Cancelled(booking) => {
            state
                .metrics
                .bookings_total
                .with_label_values(&["cancelled"])
                .inc();
            state.metrics.pending_bookings.dec();
            Ok(Json(booking))
        }
        CancelOutcome::Lost => Err(AppError::BookingTaken(format!(
            "booking {} was already accepted by a helper",
            id
        ))),
    }
}

/// Simulated live position of the assigned helper: a deterministic walk
/// from a derived departure point toward the job address, paced by the ETA
/// chosen at acceptance. A display convenience, not real telemetry.
async fn track_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackResponse>, AppError> {
    let booking = state
        .store
        .booking(id)
        .ok_or_else(|| AppError::NotFound(format!("booking {} not found", id)))?;

    let target = booking
        .location
        .ok_or_else(|| AppError::BadRequest("booking has no coordinates".to_string()))?;
    let eta_minutes = booking
        .eta_minutes
        .ok_or_else(|| AppError::BadRequest("no helper assigned yet".to_string()))?;

    let start_point = departure_point(&target, booking.id);
    let (position, progress) = match booking.status {
        BookingStatus::Pending => {
            return Err(AppError::BadRequest("no helper assigned yet".to_string()));
        }
        BookingStatus::Cancelled => {
            return Err(AppError::BadRequest("booking was cancelled".to_string()));
        }
        BookingStatus::Confirmed => (start_point, 0.0),
        BookingStatus::EnRoute if eta_minutes == 0 => (target, 1.0),
        BookingStatus::EnRoute => {
            let elapsed = (Utc::now() - booking.updated_at)
                .to_std()
                .unwrap_or_default();
            let total_km = haversine_km(&start_point, &target);
            let speed_kmh = total_km / (eta_minutes as f64 / 60.0);
            let position = step_toward(&start_point, &target, elapsed, speed_kmh);
            let remaining = haversine_km(&position, &target);
            let progress = if total_km <= f64::EPSILON {
                1.0
            } else {
                1.0 - remaining / total_km
            };
            (position, progress)
        }
        BookingStatus::Arrived | BookingStatus::Ongoing | BookingStatus::Completed => (target, 1.0),
    };

    let eta_minutes_remaining = (eta_minutes as f64 * (1.0 - progress)).ceil() as u32;

    Ok(Json(TrackResponse {
        booking_id: booking.id,
        status: booking.status,
        position,
        progress,
        eta_minutes_remaining,
    }))
}
