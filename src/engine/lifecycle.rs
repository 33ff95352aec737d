use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{fare, queue};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::identity::{Identity, Role};
use crate::models::ride::{
    CancelReason, GeoPoint, NewRide, Ride, RideStatus, RideView, VehicleType,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRideInput {
    pub order_id: String,
    pub store_owner_id: Uuid,
    pub pickup: String,
    pub destination: String,
    pub pickup_location: GeoPoint,
    pub drop_location: GeoPoint,
    pub vehicle_type: VehicleType,
}

/// Every REST or realtime input maps onto exactly one of the operations in
/// this module; handlers stay transport-only. All state changes go through
/// the store's CAS, so none of these functions need locks.

pub fn create_ride(
    state: &AppState,
    customer_id: Uuid,
    input: CreateRideInput,
) -> Result<Ride, AppError> {
    if input.order_id.trim().is_empty() {
        return Err(AppError::BadRequest("order_id cannot be empty".to_string()));
    }
    if input.pickup.trim().is_empty() || input.destination.trim().is_empty() {
        return Err(AppError::BadRequest(
            "pickup and destination are required".to_string(),
        ));
    }
    validate_point(&input.pickup_location)?;
    validate_point(&input.drop_location)?;

    let distance_km = haversine_km(&input.pickup_location, &input.drop_location);
    let fare = fare::estimate(input.vehicle_type, distance_km);

    let ride = state.rides.create(NewRide {
        order_id: input.order_id,
        customer_id,
        store_owner_id: input.store_owner_id,
        pickup: input.pickup,
        destination: input.destination,
        pickup_location: input.pickup_location,
        drop_location: input.drop_location,
        vehicle_type: input.vehicle_type,
        fare,
    });

    state.metrics.rides_active.inc();
    info!(ride_id = %ride.id, order_id = %ride.order_id, fare, "ride created");

    Ok(ride)
}

pub async fn store_owner_accept(
    state: &AppState,
    owner_id: Uuid,
    ride_id: Uuid,
) -> Result<Ride, AppError> {
    let ride = state.rides.get(ride_id)?;
    require_store_owner(&ride, owner_id)?;

    let ride = state.rides.transition(
        ride_id,
        RideStatus::PendingStoreOwner,
        RideStatus::PendingCaptain,
        |_| {},
    )?;

    queue::enqueue_dispatch(state, ride_id).await?;
    info!(ride_id = %ride_id, "store owner accepted; captain search queued");

    Ok(ride)
}

pub fn store_owner_reject(
    state: &AppState,
    owner_id: Uuid,
    ride_id: Uuid,
) -> Result<Ride, AppError> {
    let ride = state.rides.get(ride_id)?;
    require_store_owner(&ride, owner_id)?;

    state.rides.transition(
        ride_id,
        RideStatus::PendingStoreOwner,
        RideStatus::Cancelled,
        |ride| ride.cancelled_reason = Some(CancelReason::StoreRejected),
    )
}

/// First captain through the CAS wins; everyone else is told the ride is
/// already assigned. Candidate-set membership is not required: a captain who
/// found the ride via polling may accept, the CAS arbitrates all comers.
pub fn captain_accept(state: &AppState, captain_id: Uuid, ride_id: Uuid) -> Result<Ride, AppError> {
    let ride = state.rides.get(ride_id)?;

    match ride.status {
        RideStatus::PendingCaptain => {}
        RideStatus::Accepted | RideStatus::Enroute | RideStatus::Delivered => {
            return Err(AppError::Conflict("ride already assigned".to_string()));
        }
        RideStatus::Cancelled => {
            return Err(AppError::Conflict("ride no longer available".to_string()));
        }
        RideStatus::PendingStoreOwner => {
            return Err(AppError::Conflict(
                "ride is awaiting the store owner".to_string(),
            ));
        }
    }

    if !state.hub.reserve_captain(captain_id, ride_id) {
        return Err(AppError::Conflict(
            "captain already has an active ride".to_string(),
        ));
    }

    match state.rides.transition(
        ride_id,
        RideStatus::PendingCaptain,
        RideStatus::Accepted,
        |ride| ride.captain_id = Some(captain_id),
    ) {
        Ok(ride) => Ok(ride),
        Err(_) => {
            // Lost the race after reserving; free our claim only.
            state.hub.release_captain(captain_id, ride_id);
            debug!(ride_id = %ride_id, captain_id = %captain_id, "captain lost assignment race");
            Err(AppError::Conflict("ride already assigned".to_string()))
        }
    }
}

/// Pickup handoff: the assigned captain keys in the store owner's code.
/// A correct code resubmitted after the transition hits the CAS and returns
/// `Conflict`, never a duplicate side effect.
pub fn verify_store_otp(
    state: &AppState,
    captain_id: Uuid,
    ride_id: Uuid,
    otp: &str,
) -> Result<Ride, AppError> {
    let ride = state.rides.get(ride_id)?;
    require_captain(&ride, captain_id)?;

    if otp != ride.otp_store_owner {
        return Err(AppError::BadRequest("incorrect code".to_string()));
    }

    state
        .rides
        .transition(ride_id, RideStatus::Accepted, RideStatus::Enroute, |_| {})
}

/// Drop-off handoff against the customer's code. Ratings are accepted
/// opaquely for the external review collaborator.
pub fn confirm_delivery(
    state: &AppState,
    captain_id: Uuid,
    ride_id: Uuid,
    otp: &str,
) -> Result<Ride, AppError> {
    let ride = state.rides.get(ride_id)?;
    require_captain(&ride, captain_id)?;

    if otp != ride.otp_customer {
        return Err(AppError::BadRequest("incorrect code".to_string()));
    }

    state
        .rides
        .transition(ride_id, RideStatus::Enroute, RideStatus::Delivered, |_| {})
}

pub fn cancel_ride(state: &AppState, actor: Identity, ride_id: Uuid) -> Result<Ride, AppError> {
    let ride = state.rides.get(ride_id)?;

    let reason = match actor.role {
        Role::Customer if ride.customer_id == actor.id => CancelReason::CustomerCancelled,
        Role::StoreOwner if ride.store_owner_id == actor.id => CancelReason::StoreOwnerCancelled,
        _ => {
            return Err(AppError::Forbidden(
                "not authorized to cancel this ride".to_string(),
            ));
        }
    };

    if ride.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "ride is already {}",
            ride.status.as_str()
        )));
    }

    // Expected status comes from the read above; if the ride moved in
    // between, the CAS reports the conflict and the client refreshes.
    state
        .rides
        .transition(ride_id, ride.status, RideStatus::Cancelled, |ride| {
            ride.cancelled_reason = Some(reason);
        })
}

/// Polling fallback for captains without a live connection: open offers that
/// name the caller as a candidate.
pub fn pending_for_captain(state: &AppState, captain_id: Uuid) -> Vec<RideView> {
    let now = chrono::Utc::now();

    state
        .offers
        .iter()
        .filter(|entry| entry.is_open_for(captain_id, now))
        .filter_map(|entry| state.rides.get(entry.ride_id).ok())
        .filter(|ride| ride.status == RideStatus::PendingCaptain)
        .map(|ride| ride.view_for(Role::Captain))
        .collect()
}

pub fn validate_point(point: &GeoPoint) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
        return Err(AppError::BadRequest("invalid coordinates".to_string()));
    }
    Ok(())
}

fn require_store_owner(ride: &Ride, owner_id: Uuid) -> Result<(), AppError> {
    if ride.store_owner_id != owner_id {
        return Err(AppError::Forbidden(
            "not the store owner for this ride".to_string(),
        ));
    }
    Ok(())
}

fn require_captain(ride: &Ride, captain_id: Uuid) -> Result<(), AppError> {
    if ride.captain_id != Some(captain_id) {
        return Err(AppError::Forbidden(
            "not the captain assigned to this ride".to_string(),
        ));
    }
    Ok(())
}
