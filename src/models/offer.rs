use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// In-flight captain search for one ride. Exists only while the ride sits in
/// `pending-captain`; removed on acceptance, wave expiry, or cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOffer {
    pub ride_id: Uuid,
    pub candidate_captain_ids: HashSet<Uuid>,
    pub attempt: u32,
    pub radius_km: f64,
    pub offered_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl AssignmentOffer {
    pub fn is_open_for(&self, captain_id: Uuid, now: DateTime<Utc>) -> bool {
        self.deadline > now && self.candidate_captain_ids.contains(&captain_id)
    }
}
