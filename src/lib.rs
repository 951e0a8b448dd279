pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod logging;
pub mod planner;
pub mod prices;
pub mod prompt;
pub mod session;
pub mod vehicle;
pub mod vehicle_data;

pub use client::{ApiError, Endpoint, Tesla};
pub use config::Config;
pub use vehicle::{Vehicle, VehicleError};
pub use vehicle_data::VehicleData;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Prompt(#[from] prompt::PromptError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Vehicle(#[from] VehicleError),

    #[error(transparent)]
    Price(#[from] prices::PriceError),

    #[error("No vehicles in account")]
    NoVehicles,

    #[error("Output failed: {0}")]
    Io(#[from] std::io::Error),
}
