use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::profile::Profile;
use crate::models::service::Service;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/services", get(list_services))
        .route("/profiles", put(upsert_profile))
        .route("/profiles/:customer_id", get(get_profile))
}

#[derive(Deserialize)]
pub struct UpsertProfileRequest {
    pub customer_id: Uuid,
    pub name: String,
    pub phone: String,
    pub address: String,
}

async fn list_services(State(state): State<Arc<AppState>>) -> Json<Vec<Service>> {
    let mut services = state.store.services();
    services.sort_by(|a, b| a.name.cmp(&b.name));
    Json(services)
}

async fn upsert_profile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpsertProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let created_at = state
        .store
        .profile(payload.customer_id)
        .map(|existing| existing.created_at)
        .unwrap_or_else(Utc::now);

    let profile = state.store.upsert_profile(Profile {
        customer_id: payload.customer_id,
        name: payload.name,
        phone: payload.phone,
        address: payload.address,
        created_at,
    });

    Ok(Json(profile))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Profile>, AppError> {
    let profile = state
        .store
        .profile(customer_id)
        .ok_or_else(|| AppError::NotFound(format!("profile {} not found", customer_id)))?;

    Ok(Json(profile))
}
