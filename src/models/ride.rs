use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::identity::Role;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Statuses are part of the wire contract and serialize kebab-case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RideStatus {
    PendingStoreOwner,
    PendingCaptain,
    Accepted,
    Enroute,
    Delivered,
    Cancelled,
}

impl RideStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Delivered | RideStatus::Cancelled)
    }

    /// Whether live location tracking is meaningful for a ride in this status.
    pub fn is_trackable(&self) -> bool {
        matches!(self, RideStatus::Accepted | RideStatus::Enroute)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::PendingStoreOwner => "pending-store-owner",
            RideStatus::PendingCaptain => "pending-captain",
            RideStatus::Accepted => "accepted",
            RideStatus::Enroute => "enroute",
            RideStatus::Delivered => "delivered",
            RideStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VehicleType {
    Bike,
    Auto,
    Car,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CancelReason {
    StoreRejected,
    CustomerCancelled,
    StoreOwnerCancelled,
    NoCaptainFound,
}

/// The delivery-dispatch record for one order, distinct from the order itself.
/// The order, its fare inputs, and geocoding are owned by external
/// collaborators; the ride only stores their outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub order_id: String,
    pub customer_id: Uuid,
    pub store_owner_id: Uuid,
    pub captain_id: Option<Uuid>,
    pub status: RideStatus,
    pub pickup: String,
    pub destination: String,
    pub pickup_location: GeoPoint,
    pub drop_location: GeoPoint,
    pub vehicle_type: VehicleType,
    pub fare: f64,
    pub otp_store_owner: String,
    pub otp_customer: String,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub enroute_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<CancelReason>,
}

/// Creation input, assembled by the lifecycle layer once the fare is computed.
#[derive(Debug, Clone)]
pub struct NewRide {
    pub order_id: String,
    pub customer_id: Uuid,
    pub store_owner_id: Uuid,
    pub pickup: String,
    pub destination: String,
    pub pickup_location: GeoPoint,
    pub drop_location: GeoPoint,
    pub vehicle_type: VehicleType,
    pub fare: f64,
}

/// Role-scoped projection of a ride. The store owner sees the pickup OTP, the
/// customer the drop-off OTP, the captain neither. OTPs never cross roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideView {
    pub id: Uuid,
    pub order_id: String,
    pub status: RideStatus,
    pub pickup: String,
    pub destination: String,
    pub pickup_location: GeoPoint,
    pub drop_location: GeoPoint,
    pub vehicle_type: VehicleType,
    pub fare: f64,
    pub captain_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_reason: Option<CancelReason>,
}

impl Ride {
    pub fn view_for(&self, role: Role) -> RideView {
        let otp = match role {
            Role::StoreOwner => Some(self.otp_store_owner.clone()),
            Role::Customer => Some(self.otp_customer.clone()),
            Role::Captain => None,
        };

        RideView {
            id: self.id,
            order_id: self.order_id.clone(),
            status: self.status,
            pickup: self.pickup.clone(),
            destination: self.destination.clone(),
            pickup_location: self.pickup_location,
            drop_location: self.drop_location,
            vehicle_type: self.vehicle_type,
            fare: self.fare,
            captain_id: self.captain_id,
            otp,
            created_at: self.created_at,
            cancelled_reason: self.cancelled_reason,
        }
    }
}
