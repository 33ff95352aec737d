use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::identity::{Identity, Role};
use crate::models::ride::{CancelReason, Ride, RideStatus, RideView};
use crate::realtime::events::ServerEvent;
use crate::state::AppState;
use crate::store::RideEvent;

/// Translates every successful ride transition into targeted gateway
/// emissions, plus terminal bookkeeping (subscription teardown, outcome
/// metrics). Transport only; all business decisions happened before the
/// event was published.
pub async fn run_event_notifier(
    state: Arc<AppState>,
    mut events: broadcast::Receiver<RideEvent>,
) {
    info!("event notifier started");

    loop {
        match events.recv().await {
            Ok(event) => handle_event(&state, event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event notifier lagged; clients reconcile over polling");
            }
            Err(RecvError::Closed) => break,
        }
    }

    warn!("event notifier stopped: event channel closed");
}

fn handle_event(state: &AppState, event: RideEvent) {
    let ride = &event.ride;

    match ride.status {
        RideStatus::PendingStoreOwner => {
            state.gateway.emit_to_identity(
                Identity::store_owner(ride.store_owner_id),
                ServerEvent::RideAwaitingStoreOwner {
                    ride: ride.view_for(Role::StoreOwner),
                },
            );
        }
        RideStatus::PendingCaptain => {
            state.gateway.emit_to_identity(
                Identity::customer(ride.customer_id),
                ServerEvent::RideAwaitingCaptain {
                    ride: ride.view_for(Role::Customer),
                },
            );
            state.gateway.emit_to_identity(
                Identity::store_owner(ride.store_owner_id),
                ServerEvent::RideAwaitingCaptain {
                    ride: ride.view_for(Role::StoreOwner),
                },
            );
        }
        RideStatus::Accepted => {
            emit_to_parties(state, ride, |view| ServerEvent::RideConfirmedCaptain {
                ride: view,
            });
        }
        RideStatus::Enroute => {
            emit_to_parties(state, ride, |view| ServerEvent::RideStarted { ride: view });
        }
        RideStatus::Delivered => {
            emit_to_parties(state, ride, |view| ServerEvent::RideDelivered { ride: view });
            close_ride(state, ride, "delivered");
        }
        RideStatus::Cancelled => {
            emit_to_parties(state, ride, |view| ServerEvent::RideCancelled { ride: view });
            let outcome = ride
                .cancelled_reason
                .map(|reason| match reason {
                    CancelReason::StoreRejected => "store-rejected",
                    CancelReason::CustomerCancelled => "customer-cancelled",
                    CancelReason::StoreOwnerCancelled => "store-owner-cancelled",
                    CancelReason::NoCaptainFound => "no-captain-found",
                })
                .unwrap_or("cancelled");
            close_ride(state, ride, outcome);
        }
    }
}

/// Sends role-scoped views to the customer, the store owner, and (when
/// assigned) the captain.
fn emit_to_parties(state: &AppState, ride: &Ride, build: impl Fn(RideView) -> ServerEvent) {
    state.gateway.emit_to_identity(
        Identity::customer(ride.customer_id),
        build(ride.view_for(Role::Customer)),
    );
    state.gateway.emit_to_identity(
        Identity::store_owner(ride.store_owner_id),
        build(ride.view_for(Role::StoreOwner)),
    );
    if let Some(captain_id) = ride.captain_id {
        state.gateway.emit_to_identity(
            Identity::captain(captain_id),
            build(ride.view_for(Role::Captain)),
        );
    }
}

fn close_ride(state: &AppState, ride: &Ride, outcome: &str) {
    state.hub.ride_closed(ride.id, ride.captain_id);
    state.metrics.rides_active.dec();
    state
        .metrics
        .rides_total
        .with_label_values(&[outcome])
        .inc();

    info!(ride_id = %ride.id, outcome, "ride closed");
}
