use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Mean earth radius in km
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Subset of the vehicle data reply needed to plan charging.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VehicleData {
    pub vin: String,
    pub charge_state: ChargeState,

    #[serde(default)]
    pub drive_state: DriveState,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChargeState {
    pub charge_current_request: i32,
    pub charge_limit_soc: i32,
    pub battery_level: i32,

    /// "Charging", "Complete", "Stopped", "Disconnected", ...
    pub charging_state: String,

    #[serde(default)]
    pub scheduled_charging_mode: Option<String>,

    /// Unix timestamp, null when no charge is scheduled
    #[serde(default)]
    pub scheduled_charging_start_time: Option<i64>,
}

impl ChargeState {
    pub fn is_charging(&self) -> bool {
        self.charging_state == "Charging"
    }

    pub fn is_disconnected(&self) -> bool {
        self.charging_state == "Disconnected"
    }

    pub fn scheduled_start(&self) -> Option<DateTime<Utc>> {
        self.scheduled_charging_start_time
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DriveState {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl VehicleData {
    pub fn location(&self) -> Option<Location> {
        match (self.drive_state.latitude, self.drive_state.longitude) {
            (Some(lat), Some(lon)) => Some(Location::new(lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in km (haversine).
    pub fn distance_km(&self, other: &Location) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let t = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * t.sqrt().atan2((1.0 - t).sqrt());
        EARTH_RADIUS_KM * c
    }
}
