use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::identity::Identity;
use crate::models::presence::CaptainPresence;
use crate::models::ride::GeoPoint;

/// Ingests captain GPS pings and fans them out to exactly the viewers
/// tracking the ride the captain is serving, never globally. Also owns the
/// per-captain reservation index that backs the at-most-one-active-ride
/// guarantee.
pub struct LocationHub {
    presence: DashMap<Uuid, CaptainPresence>,
    subscribers: DashMap<Uuid, HashSet<Identity>>,
    reservations: DashMap<Uuid, Uuid>,
}

impl LocationHub {
    pub fn new() -> Self {
        Self {
            presence: DashMap::new(),
            subscribers: DashMap::new(),
            reservations: DashMap::new(),
        }
    }

    pub fn set_online(&self, captain_id: Uuid, is_online: bool, now: DateTime<Utc>) {
        let mut entry = self
            .presence
            .entry(captain_id)
            .or_insert_with(|| CaptainPresence {
                captain_id,
                is_online,
                last_location: None,
                last_seen_at: now,
            });

        entry.is_online = is_online;
        entry.last_seen_at = now;
    }

    /// O(1) overwrite of the captain's presence; no history is retained.
    /// Returns the ride being served and its subscribers, if any, so the
    /// caller can fan the ping out.
    pub fn record_location(
        &self,
        captain_id: Uuid,
        location: GeoPoint,
        now: DateTime<Utc>,
    ) -> Option<(Uuid, Vec<Identity>)> {
        {
            let mut entry = self
                .presence
                .entry(captain_id)
                .or_insert_with(|| CaptainPresence {
                    captain_id,
                    is_online: true,
                    last_location: None,
                    last_seen_at: now,
                });

            entry.is_online = true;
            entry.last_location = Some(location);
            entry.last_seen_at = now;
        }

        let ride_id = *self.reservations.get(&captain_id)?;
        let viewers = self
            .subscribers
            .get(&ride_id)
            .map(|set| set.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();

        if viewers.is_empty() {
            return None;
        }

        Some((ride_id, viewers))
    }

    /// Snapshot for the matcher; no lock is held across a search.
    pub fn snapshot(&self) -> Vec<CaptainPresence> {
        self.presence
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.presence
            .iter()
            .filter(|entry| entry.is_online)
            .count()
    }

    pub fn subscribe(&self, ride_id: Uuid, viewer: Identity) {
        self.subscribers.entry(ride_id).or_default().insert(viewer);
    }

    pub fn unsubscribe(&self, ride_id: Uuid, viewer: Identity) {
        if let Some(mut set) = self.subscribers.get_mut(&ride_id) {
            set.remove(&viewer);
        }
    }

    /// Claims the captain for a ride. Fails if the captain already has an
    /// active ride; a captain serves at most one ride at a time.
    pub fn reserve_captain(&self, captain_id: Uuid, ride_id: Uuid) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.reservations.entry(captain_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(ride_id);
                true
            }
        }
    }

    pub fn active_ride(&self, captain_id: Uuid) -> Option<Uuid> {
        self.reservations.get(&captain_id).map(|entry| *entry)
    }

    /// Releases a reservation, but only the one for `ride_id`; a loser of an
    /// assignment race must not free the winner's claim.
    pub fn release_captain(&self, captain_id: Uuid, ride_id: Uuid) {
        self.reservations
            .remove_if(&captain_id, |_, reserved| *reserved == ride_id);
    }

    /// Terminal teardown: drops all subscriptions for the ride and the
    /// captain's reservation. After this, pings for the ride reach no one.
    pub fn ride_closed(&self, ride_id: Uuid, captain_id: Option<Uuid>) {
        self.subscribers.remove(&ride_id);
        if let Some(captain_id) = captain_id {
            self.release_captain(captain_id, ride_id);
        }
    }
}

impl Default for LocationHub {
    fn default() -> Self {
        Self::new()
    }
}
