use serde::Serialize;

use crate::models::ride::VehicleType;

// Flat pricing: base charge plus a per-kilometre rate over the crow-flies
// distance. Route-aware pricing is the external pricing service's problem;
// this mirrors its published rate card.
const BIKE_BASE: f64 = 20.0;
const BIKE_PER_KM: f64 = 8.0;
const AUTO_BASE: f64 = 30.0;
const AUTO_PER_KM: f64 = 12.0;
const CAR_BASE: f64 = 50.0;
const CAR_PER_KM: f64 = 16.0;

#[derive(Debug, Clone, Serialize)]
pub struct FareEstimates {
    pub bike: f64,
    pub auto: f64,
    pub car: f64,
}

pub fn estimate(vehicle_type: VehicleType, distance_km: f64) -> f64 {
    let distance_km = distance_km.max(0.0);
    let raw = match vehicle_type {
        VehicleType::Bike => BIKE_BASE + BIKE_PER_KM * distance_km,
        VehicleType::Auto => AUTO_BASE + AUTO_PER_KM * distance_km,
        VehicleType::Car => CAR_BASE + CAR_PER_KM * distance_km,
    };

    (raw * 100.0).round() / 100.0
}

pub fn estimate_all(distance_km: f64) -> FareEstimates {
    FareEstimates {
        bike: estimate(VehicleType::Bike, distance_km),
        auto: estimate(VehicleType::Auto, distance_km),
        car: estimate(VehicleType::Car, distance_km),
    }
}
