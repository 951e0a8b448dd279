//! Interactive session setup.
//!
//! Asks for the account e-mail, reuses a cached session when there is one and
//! otherwise asks for an SSO refresh token to start a new session.

use crate::{Error, client::Tesla, config::Config, prompt::prompt, vehicle::Vehicle};
use std::io::{BufRead, Write};
use tracing::info;

pub const EMAIL_PROMPT: &str = "Enter e-mail: ";
pub const REFRESH_TOKEN_PROMPT: &str = "Enter SSO refresh token: ";

/// Opens an authorized client for the account named on `input`.
///
/// With `force` set, a refresh token is asked for even if a session is cached.
pub async fn login<R: BufRead, W: Write>(
    config: Config,
    input: &mut R,
    output: &mut W,
    force: bool,
) -> Result<Tesla, Error> {
    let email = prompt(input, output, EMAIL_PROMPT)?;
    let mut tesla = Tesla::open(email, config)?;

    if force || !tesla.authorized() {
        let refresh_token = prompt(input, output, REFRESH_TOKEN_PROMPT)?;
        tesla.refresh_token(&refresh_token).await?;
        info!(email = %tesla.email(), "session stored");
    } else {
        info!(email = %tesla.email(), "using cached session");
    }

    Ok(tesla)
}

pub async fn first_vehicle(tesla: &mut Tesla) -> Result<Vehicle, Error> {
    tesla
        .vehicle_list()
        .await?
        .into_iter()
        .next()
        .ok_or(Error::NoVehicles)
}

/// The whole interactive flow: log in, then print the account's first vehicle.
pub async fn run<R: BufRead, W: Write>(
    config: Config,
    input: &mut R,
    output: &mut W,
) -> Result<Vehicle, Error> {
    let mut tesla = login(config, input, output, false).await?;
    let vehicle = first_vehicle(&mut tesla).await?;
    writeln!(output, "{vehicle}")?;
    Ok(vehicle)
}
