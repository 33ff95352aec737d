use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ride::{NewRide, Ride, RideStatus};

/// A successful status change, published for the notifier and the dispatch
/// engine. Ride creation is published with `previous == status`.
#[derive(Debug, Clone)]
pub struct RideEvent {
    pub previous: RideStatus,
    pub ride: Ride,
}

/// Durable home of ride records. `transition` is the only mutation path and
/// is a compare-and-swap on `status`: correctness under concurrent accepts
/// and duplicate submissions is enforced here, not by application locks.
pub struct RideStore {
    rides: DashMap<Uuid, Ride>,
    events_tx: broadcast::Sender<RideEvent>,
}

impl RideStore {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            rides: DashMap::new(),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RideEvent> {
        self.events_tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }

    pub fn create(&self, new_ride: NewRide) -> Ride {
        let (otp_store_owner, otp_customer) = distinct_otp_pair();

        let ride = Ride {
            id: Uuid::new_v4(),
            order_id: new_ride.order_id,
            customer_id: new_ride.customer_id,
            store_owner_id: new_ride.store_owner_id,
            captain_id: None,
            status: RideStatus::PendingStoreOwner,
            pickup: new_ride.pickup,
            destination: new_ride.destination,
            pickup_location: new_ride.pickup_location,
            drop_location: new_ride.drop_location,
            vehicle_type: new_ride.vehicle_type,
            fare: new_ride.fare,
            otp_store_owner,
            otp_customer,
            created_at: Utc::now(),
            accepted_at: None,
            enroute_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancelled_reason: None,
        };

        self.rides.insert(ride.id, ride.clone());

        let _ = self.events_tx.send(RideEvent {
            previous: RideStatus::PendingStoreOwner,
            ride: ride.clone(),
        });

        ride
    }

    pub fn get(&self, ride_id: Uuid) -> Result<Ride, AppError> {
        self.rides
            .get(&ride_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))
    }

    /// Compare-and-swap transition. Fails with `Conflict` when the ride is not
    /// in `expected` anymore; the first caller wins any race, every later
    /// caller is told to refresh. Transition timestamps are stamped once and
    /// never overwritten.
    pub fn transition(
        &self,
        ride_id: Uuid,
        expected: RideStatus,
        next: RideStatus,
        apply: impl FnOnce(&mut Ride),
    ) -> Result<Ride, AppError> {
        let mut entry = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

        if entry.status != expected {
            return Err(AppError::Conflict(format!(
                "ride is {}, expected {}",
                entry.status.as_str(),
                expected.as_str()
            )));
        }

        if expected.is_terminal() {
            return Err(AppError::Conflict(format!(
                "ride is already {}",
                expected.as_str()
            )));
        }

        entry.status = next;

        let now = Utc::now();
        match next {
            RideStatus::Accepted => {
                entry.accepted_at.get_or_insert(now);
            }
            RideStatus::Enroute => {
                entry.enroute_at.get_or_insert(now);
            }
            RideStatus::Delivered => {
                entry.delivered_at.get_or_insert(now);
            }
            RideStatus::Cancelled => {
                entry.cancelled_at.get_or_insert(now);
            }
            RideStatus::PendingStoreOwner | RideStatus::PendingCaptain => {}
        }

        apply(&mut entry);
        let updated = entry.clone();

        // Published while the entry lock is held: a later transition of the
        // same ride cannot get its event out first, so consumers see one
        // ride's events in transition order.
        let _ = self.events_tx.send(RideEvent {
            previous: expected,
            ride: updated.clone(),
        });

        drop(entry);
        Ok(updated)
    }

    /// Polling fallback: the ride the captain is currently serving, if any.
    pub fn active_for_captain(&self, captain_id: Uuid) -> Option<Ride> {
        self.rides
            .iter()
            .find(|entry| {
                entry.captain_id == Some(captain_id) && entry.status.is_trackable()
            })
            .map(|entry| entry.value().clone())
    }
}

fn generate_otp() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..10_000))
}

/// Store-facing and customer-facing codes must differ so one handoff proof
/// can never stand in for the other.
fn distinct_otp_pair() -> (String, String) {
    let first = generate_otp();
    loop {
        let second = generate_otp();
        if second != first {
            return (first, second);
        }
    }
}
