//! Hourly electricity spot prices and cheapest-window search.

use crate::config::Config;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Number of most recent records requested. Covers today and tomorrow.
const RECORD_LIMIT: &str = "100";

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Failed to download spot prices: {0}")]
    ReqwestRequest(#[from] reqwest::Error),

    #[error("Spot price service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No prices in reply: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unexpected time format {0:?}")]
    InvalidTime(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEntry {
    /// Start of the hour the price applies to
    pub time: DateTime<Utc>,
    /// EUR per MWh
    pub price: f64,
}

#[derive(Deserialize)]
struct PriceReply {
    records: Vec<PriceRecord>,
}

#[derive(Deserialize)]
struct PriceRecord {
    #[serde(rename = "HourUTC")]
    hour_utc: String,
    /// DKK prices are sometimes missing, EUR is always published
    #[serde(rename = "SpotPriceEUR")]
    spot_price_eur: Option<f64>,
}

/// Downloads and parses the upcoming spot prices for the configured area.
pub async fn fetch(config: &Config, now: DateTime<Utc>) -> Result<Vec<PriceEntry>, PriceError> {
    let filter = format!(r#"{{"PriceArea":["{}"]}}"#, config.price_area);
    debug!(url = %config.price_url, area = %config.price_area, "downloading spot prices");

    let response = reqwest::Client::new()
        .get(&config.price_url)
        .query(&[
            ("offset", "0"),
            ("limit", RECORD_LIMIT),
            ("filter", filter.as_str()),
            ("sort", "HourUTC DESC"),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(PriceError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }

    parse(&response.text().await?, now)
}

/// Parses a price reply, dropping hours that are already over.
///
/// Records without a price are skipped. The result is sorted by time.
pub fn parse(json: &str, now: DateTime<Utc>) -> Result<Vec<PriceEntry>, PriceError> {
    let reply: PriceReply = serde_json::from_str(json)?;

    let mut prices = Vec::with_capacity(reply.records.len());
    for record in reply.records {
        let Some(price) = record.spot_price_eur else {
            continue;
        };
        let time = parse_hour(&record.hour_utc)?;
        if time + TimeDelta::hours(1) < now {
            continue;
        }
        prices.push(PriceEntry { time, price });
    }

    prices.sort_by_key(|p| p.time);
    Ok(prices)
}

/// Hours are published as naive UTC ("2024-01-01T13:00:00"); an explicit
/// offset is accepted too.
fn parse_hour(s: &str) -> Result<DateTime<Utc>, PriceError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(s) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|t| t.and_utc())
        .map_err(|_| PriceError::InvalidTime(s.to_string()))
}

/// Finds the start of the cheapest run of `hours` consecutive prices whose
/// last hour starts before `limit`.
///
/// With no usable prices the run is placed right before `limit`. Ties keep
/// the earliest run.
pub fn find_cheapest_start(
    prices: &[PriceEntry],
    hours: usize,
    limit: DateTime<Utc>,
) -> DateTime<Utc> {
    if hours < 1 {
        return limit;
    }
    if prices.len() < 2 {
        return limit - TimeDelta::hours(hours as i64);
    }

    let mut found = 0;
    let mut found_sum = f64::MAX;
    for (start, window) in prices.windows(hours).enumerate() {
        if window[hours - 1].time >= limit {
            break;
        }
        let sum: f64 = window.iter().map(|p| p.price).sum();
        if sum < found_sum {
            found_sum = sum;
            found = start;
        }
    }

    debug!(hours, start = %prices[found].time, "cheapest window");
    prices[found].time
}

/// Lowest and highest entry by price.
pub fn min_max(prices: &[PriceEntry]) -> Option<(PriceEntry, PriceEntry)> {
    let first = *prices.first()?;
    Some(prices.iter().fold((first, first), |(min, max), p| {
        (
            if p.price < min.price { *p } else { min },
            if p.price > max.price { *p } else { max },
        )
    }))
}
