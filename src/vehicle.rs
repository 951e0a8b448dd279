//! Per-vehicle reads and commands.
//!
//! Reads go to the owner API. Commands go through the signed-command proxy
//! when one is configured, since newer vehicles only accept signed commands.

use crate::{
    client::{ApiError, Endpoint, Tesla},
    vehicle_data::VehicleData,
};
use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Vehicle data sections fetched for charge planning
const DATA_ENDPOINTS: &str = "charge_state;drive_state;location_data";

/// Replies that mean the command had nothing to do
const ALREADY_SET: &str = "already_set";
const IS_CHARGING: &str = "is_charging";

#[derive(Error, Debug)]
pub enum VehicleError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Vehicle {vin} did not come online after {attempts} attempts")]
    WakeTimeout { vin: String, attempts: u32 },

    #[error("Command {command} failed: {reason}")]
    CommandRejected { command: &'static str, reason: String },

    #[error("Charge limit must be between 50 and 100 percent, got {0}")]
    InvalidChargeLimit(u8),
}

/// A vehicle record as listed for the account.
///
/// Only the fields this tool uses are typed; the rest of the record is kept
/// so that printing a vehicle shows everything the API returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: u64,
    pub vehicle_id: u64,
    pub vin: String,

    #[serde(default)]
    pub display_name: Option<String>,

    pub state: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vehicle {
    pub fn is_online(&self) -> bool {
        self.state == "online"
    }
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Reply to a vehicle command.
#[derive(Debug, Deserialize)]
struct CommandResult {
    result: bool,

    #[serde(default)]
    reason: Option<String>,

    /// Older firmware reports the reason under this key
    #[serde(default)]
    string: Option<String>,
}

impl CommandResult {
    fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .filter(|r| !r.is_empty())
            .or(self.string.as_deref())
            .unwrap_or("")
    }

    /// True when the command succeeded or failed only because there was nothing to do.
    fn accepted(&self, tolerated: &[&str]) -> bool {
        self.result || tolerated.iter().any(|t| self.reason().contains(t))
    }
}

#[derive(Serialize)]
struct ScheduledCharging {
    enable: bool,
    /// Minutes after local midnight
    time: u32,
}

#[derive(Serialize)]
struct ScheduledDeparture {
    enable: bool,
    off_peak_charging_enabled: bool,
    preconditioning_enabled: bool,
    preconditioning_weekdays_only: bool,
    off_peak_charging_weekdays_only: bool,
    departure_time: u32,
    end_off_peak_time: u32,
}

impl ScheduledDeparture {
    fn new(
        enable: bool,
        preconditioning: bool,
        departure_time: u32,
        end_off_peak_time: u32,
    ) -> Self {
        Self {
            enable,
            off_peak_charging_enabled: false,
            preconditioning_enabled: preconditioning,
            preconditioning_weekdays_only: false,
            off_peak_charging_weekdays_only: false,
            departure_time,
            end_off_peak_time,
        }
    }
}

/// Minutes between local midnight and `time`, in the given zone.
pub fn minutes_after_midnight<Tz: TimeZone>(time: DateTime<Utc>, zone: &Tz) -> u32 {
    let local = time.with_timezone(zone);
    local.hour() * 60 + local.minute()
}

impl Tesla {
    /// True when the vehicle is awake and reachable.
    pub async fn available(&mut self, vin: &str) -> Result<bool, VehicleError> {
        let vehicle: Vehicle = self
            .get(Endpoint::Api, &format!("/api/1/vehicles/{vin}"))
            .await?;
        debug!(vin, state = %vehicle.state, "vehicle state");
        Ok(vehicle.is_online())
    }

    /// Wakes the vehicle and waits until it reports online.
    pub async fn wake_up(&mut self, vin: &str) -> Result<(), VehicleError> {
        if self.available(vin).await? {
            debug!(vin, "vehicle already online");
            return Ok(());
        }

        info!(vin, "waking up vehicle");
        let vehicle: Vehicle = self
            .post(Endpoint::Api, &format!("/api/1/vehicles/{vin}/wake_up"), &json!({}))
            .await?;
        if vehicle.is_online() {
            return Ok(());
        }

        let interval = self.config().wake_interval;
        let attempts = self.config().wake_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(interval).await;
            if self.available(vin).await? {
                info!(vin, attempt, "vehicle is online");
                return Ok(());
            }
        }

        Err(VehicleError::WakeTimeout {
            vin: vin.to_string(),
            attempts,
        })
    }

    pub async fn vehicle_data(&mut self, vin: &str) -> Result<VehicleData, VehicleError> {
        let path = format!(
            "/api/1/vehicles/{vin}/vehicle_data?endpoints={}",
            url::form_urlencoded::byte_serialize(DATA_ENDPOINTS.as_bytes()).collect::<String>()
        );
        Ok(self.get(Endpoint::Api, &path).await?)
    }

    pub async fn charge_start(&mut self, vin: &str) -> Result<(), VehicleError> {
        self.command(vin, "charge_start", &json!({}), &[IS_CHARGING, ALREADY_SET])
            .await
    }

    pub async fn charge_stop(&mut self, vin: &str) -> Result<(), VehicleError> {
        self.command(vin, "charge_stop", &json!({}), &["not_charging"])
            .await
    }

    pub async fn set_charge_limit(&mut self, vin: &str, percent: u8) -> Result<(), VehicleError> {
        if !(50..=100).contains(&percent) {
            return Err(VehicleError::InvalidChargeLimit(percent));
        }
        self.command(vin, "set_charge_limit", &json!({ "percent": percent }), &[ALREADY_SET])
            .await
    }

    /// Schedules charging to start at `start`, with scheduled departure off.
    pub async fn scheduled_charging<Tz: TimeZone>(
        &mut self,
        vin: &str,
        start: DateTime<Utc>,
        departure: DateTime<Utc>,
        zone: &Tz,
    ) -> Result<(), VehicleError> {
        let departure_m = minutes_after_midnight(departure, zone);
        self.set_scheduled_departure(
            vin,
            ScheduledDeparture::new(false, false, departure_m, departure_m),
        )
        .await?;
        self.set_scheduled_charging(vin, true, minutes_after_midnight(start, zone))
            .await
    }

    /// Schedules a departure with off-peak charging ending at `end_off_peak`.
    pub async fn scheduled_departure<Tz: TimeZone>(
        &mut self,
        vin: &str,
        end_off_peak: DateTime<Utc>,
        departure: DateTime<Utc>,
        preheat: bool,
        zone: &Tz,
    ) -> Result<(), VehicleError> {
        let end_off_peak_m = minutes_after_midnight(end_off_peak, zone);
        let departure_m = minutes_after_midnight(departure, zone);
        self.set_scheduled_charging(vin, true, end_off_peak_m).await?;
        self.set_scheduled_departure(
            vin,
            ScheduledDeparture::new(true, preheat, departure_m, end_off_peak_m),
        )
        .await
    }

    /// Turns off both scheduled departure and scheduled charging.
    pub async fn scheduled_disable<Tz: TimeZone>(
        &mut self,
        vin: &str,
        time: DateTime<Utc>,
        departure: DateTime<Utc>,
        zone: &Tz,
    ) -> Result<(), VehicleError> {
        let departure_m = minutes_after_midnight(departure, zone);
        self.set_scheduled_departure(
            vin,
            ScheduledDeparture::new(false, false, departure_m, departure_m),
        )
        .await?;
        self.set_scheduled_charging(vin, false, minutes_after_midnight(time, zone))
            .await
    }

    async fn set_scheduled_charging(
        &mut self,
        vin: &str,
        enable: bool,
        time: u32,
    ) -> Result<(), VehicleError> {
        self.command(
            vin,
            "set_scheduled_charging",
            &ScheduledCharging { enable, time },
            &[ALREADY_SET],
        )
        .await
    }

    async fn set_scheduled_departure(
        &mut self,
        vin: &str,
        departure: ScheduledDeparture,
    ) -> Result<(), VehicleError> {
        self.command(vin, "set_scheduled_departure", &departure, &[ALREADY_SET])
            .await
    }

    async fn command<B: Serialize>(
        &mut self,
        vin: &str,
        command: &'static str,
        body: &B,
        tolerated: &[&str],
    ) -> Result<(), VehicleError> {
        let path = format!("/api/1/vehicles/{vin}/command/{command}");
        let result: CommandResult = self.post(Endpoint::Command, &path, body).await?;

        if !result.accepted(tolerated) {
            return Err(VehicleError::CommandRejected {
                command,
                reason: result.reason().to_string(),
            });
        }
        if !result.result {
            warn!(vin, command, reason = result.reason(), "command had nothing to do");
        } else {
            info!(vin, command, "command accepted");
        }
        Ok(())
    }
}
