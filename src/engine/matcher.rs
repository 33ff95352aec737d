use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::ride::GeoPoint;
use crate::realtime::locations::LocationHub;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub captain_id: Uuid,
    pub distance_km: f64,
}

/// Builds the candidate pool for one offer wave from a presence snapshot.
/// Eligible: online, pinged within the freshness window, has a known
/// location, not already serving a ride, and within the search radius.
/// Ordered nearest-first.
pub fn find_candidates(
    hub: &LocationHub,
    pickup: &GeoPoint,
    radius_km: f64,
    freshness: Duration,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = hub
        .snapshot()
        .into_iter()
        .filter_map(|presence| {
            if !presence.is_online || !presence.is_fresh(now, freshness) {
                return None;
            }

            let location = presence.last_location?;

            if hub.active_ride(presence.captain_id).is_some() {
                return None;
            }

            let distance_km = haversine_km(&location, pickup);
            if distance_km > radius_km {
                return None;
            }

            Some(Candidate {
                captain_id: presence.captain_id,
                distance_km,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    candidates
}
