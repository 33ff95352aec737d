use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::matcher;
use crate::engine::queue::DispatchJob;
use crate::models::identity::{Identity, Role};
use crate::models::offer::AssignmentOffer;
use crate::models::ride::{CancelReason, Ride, RideStatus};
use crate::realtime::events::ServerEvent;
use crate::state::AppState;
use crate::store::RideEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchOutcome {
    Assigned,
    Cancelled,
    Exhausted,
}

impl SearchOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SearchOutcome::Assigned => "assigned",
            SearchOutcome::Cancelled => "cancelled",
            SearchOutcome::Exhausted => "exhausted",
        }
    }
}

/// Consumes dispatch jobs and spawns one independent search task per ride, so
/// dispatch for ride A never waits on ride B.
pub async fn run_dispatch_engine(state: Arc<AppState>, mut job_rx: mpsc::Receiver<DispatchJob>) {
    info!("dispatch engine started");

    while let Some(job) = job_rx.recv().await {
        state.metrics.rides_awaiting_dispatch.dec();

        let state = state.clone();
        tokio::spawn(async move {
            search_for_captain(state, job.ride_id).await;
        });
    }

    warn!("dispatch engine stopped: queue channel closed");
}

async fn search_for_captain(state: Arc<AppState>, ride_id: Uuid) {
    let start = Instant::now();
    let outcome = run_search(&state, ride_id).await;

    state
        .metrics
        .dispatch_search_seconds
        .with_label_values(&[outcome.as_str()])
        .observe(start.elapsed().as_secs_f64());

    info!(ride_id = %ride_id, outcome = outcome.as_str(), "captain search finished");
}

/// Runs up to `max_search_attempts` offer waves, widening the radius between
/// waves. Always resolves: the ride ends up assigned, cancelled by a party,
/// or cancelled with `no-captain-found`. Never a silent hang in
/// `pending-captain`.
async fn run_search(state: &Arc<AppState>, ride_id: Uuid) -> SearchOutcome {
    let config = &state.config;
    let freshness = chrono::Duration::from_std(config.presence_freshness)
        .unwrap_or_else(|_| chrono::Duration::seconds(30));
    let wave_length = chrono::Duration::from_std(config.offer_deadline)
        .unwrap_or_else(|_| chrono::Duration::seconds(15));
    let mut radius_km = config.search_radius_km;

    for attempt in 1..=config.max_search_attempts {
        let ride = match state.rides.get(ride_id) {
            Ok(ride) => ride,
            Err(_) => return SearchOutcome::Cancelled,
        };

        match ride.status {
            RideStatus::PendingCaptain => {}
            RideStatus::Accepted | RideStatus::Enroute | RideStatus::Delivered => {
                return SearchOutcome::Assigned;
            }
            _ => return SearchOutcome::Cancelled,
        }

        // Subscribe before the multicast so an instant acceptance cannot be
        // missed between sending offers and starting the wait.
        let mut events = state.rides.subscribe();

        let now = Utc::now();
        let candidates = matcher::find_candidates(
            &state.hub,
            &ride.pickup_location,
            radius_km,
            freshness,
            now,
        );
        let candidate_ids: HashSet<Uuid> =
            candidates.iter().map(|candidate| candidate.captain_id).collect();

        let deadline = now + wave_length;
        state.offers.insert(
            ride_id,
            AssignmentOffer {
                ride_id,
                candidate_captain_ids: candidate_ids.clone(),
                attempt,
                radius_km,
                offered_at: now,
                deadline,
            },
        );

        if candidates.is_empty() {
            debug!(ride_id = %ride_id, attempt, radius_km, "no eligible captains in radius");
        } else {
            let offer_event = ServerEvent::NewRide {
                ride: ride.view_for(Role::Captain),
                expires_at: deadline,
            };
            state.gateway.emit_to_set(
                candidates
                    .iter()
                    .map(|candidate| Identity::captain(candidate.captain_id)),
                &offer_event,
            );

            info!(
                ride_id = %ride_id,
                attempt,
                candidates = candidates.len(),
                radius_km,
                "offer wave sent"
            );
        }

        let resolution = wait_for_resolution(&mut events, ride_id, config.offer_deadline).await;
        state.offers.remove(&ride_id);

        match resolution {
            Some(ride) if ride.status == RideStatus::Accepted => {
                let losers = candidate_ids
                    .into_iter()
                    .filter(|candidate| Some(*candidate) != ride.captain_id)
                    .map(Identity::captain);
                state
                    .gateway
                    .emit_to_set(losers, &ServerEvent::RideUnavailable { ride_id });

                state
                    .metrics
                    .offer_waves_total
                    .with_label_values(&["accepted"])
                    .inc();
                return SearchOutcome::Assigned;
            }
            Some(_) => {
                // Cancelled mid-search by the store or the customer.
                let candidates = candidate_ids.into_iter().map(Identity::captain);
                state
                    .gateway
                    .emit_to_set(candidates, &ServerEvent::RideUnavailable { ride_id });

                state
                    .metrics
                    .offer_waves_total
                    .with_label_values(&["cancelled"])
                    .inc();
                return SearchOutcome::Cancelled;
            }
            None => {
                state
                    .metrics
                    .offer_waves_total
                    .with_label_values(&["expired"])
                    .inc();
                radius_km *= config.radius_growth_factor;
            }
        }
    }

    // Exhausted: cancel via the CAS. A conflict here means a captain won at
    // the buzzer or a party cancelled first; either way the ride is resolved.
    match state.rides.transition(
        ride_id,
        RideStatus::PendingCaptain,
        RideStatus::Cancelled,
        |ride| ride.cancelled_reason = Some(CancelReason::NoCaptainFound),
    ) {
        Ok(_) => SearchOutcome::Exhausted,
        Err(_) => match state.rides.get(ride_id) {
            Ok(ride) if ride.captain_id.is_some() => SearchOutcome::Assigned,
            _ => SearchOutcome::Cancelled,
        },
    }
}

/// Waits one wave for the ride to leave `pending-captain`. Returns the ride
/// after the transition, or None if the wave expired.
async fn wait_for_resolution(
    events: &mut broadcast::Receiver<RideEvent>,
    ride_id: Uuid,
    wave: Duration,
) -> Option<Ride> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event)
                    if event.ride.id == ride_id
                        && event.previous == RideStatus::PendingCaptain =>
                {
                    return Some(event.ride);
                }
                Ok(_) => continue,
                // On lag the next wave re-reads the store, so nothing is lost.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };

    timeout(wave, wait).await.unwrap_or(None)
}
