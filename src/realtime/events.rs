use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::identity::Role;
use crate::models::ride::{GeoPoint, RideView};

/// Server-to-client realtime events. Event names are part of the wire
/// contract consumed by the three client apps and serialize kebab-case.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Offer multicast to candidate captains during a search wave.
    NewRide {
        ride: RideView,
        expires_at: DateTime<Utc>,
    },
    RideAwaitingStoreOwner { ride: RideView },
    RideAwaitingCaptain { ride: RideView },
    RideConfirmedCaptain { ride: RideView },
    RideStarted { ride: RideView },
    RideDelivered { ride: RideView },
    RideCancelled { ride: RideView },
    /// Sent to losing candidates the moment another captain wins.
    RideUnavailable { ride_id: Uuid },
    CaptainLocation {
        ride_id: Uuid,
        captain_id: Uuid,
        location: GeoPoint,
    },
    Error { message: String },
}

/// Client-to-server realtime events. camelCase aliases accepted because the
/// web clients send them that way.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Join {
        #[serde(alias = "userType")]
        user_type: Role,
        #[serde(alias = "userId")]
        user_id: Uuid,
    },
    UpdateLocationCaptain {
        #[serde(default, alias = "userId")]
        user_id: Option<Uuid>,
        location: GeoPoint,
    },
    UpdateAvailabilityCaptain {
        #[serde(alias = "isOnline")]
        is_online: bool,
    },
    TrackRide {
        #[serde(alias = "rideId")]
        ride_id: Uuid,
    },
    UntrackRide {
        #[serde(alias = "rideId")]
        ride_id: Uuid,
    },
}
