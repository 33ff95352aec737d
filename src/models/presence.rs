use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ride::GeoPoint;

/// Ephemeral availability record for one captain. Lives only for the process
/// lifetime; written by location pings and availability toggles, read by the
/// matcher when it builds a candidate pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptainPresence {
    pub captain_id: Uuid,
    pub is_online: bool,
    pub last_location: Option<GeoPoint>,
    pub last_seen_at: DateTime<Utc>,
}

impl CaptainPresence {
    /// A captain not seen within the freshness window is treated as offline
    /// even if the flag still says online.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_seen_at <= window
    }
}
