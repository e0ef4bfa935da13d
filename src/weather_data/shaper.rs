//! Turns an archive response into a [`WeatherFrame`].

use crate::types::weather_frame::{
    WeatherFrame, CITY, LATITUDE, LONGITUDE, RELATIVE_HUMIDITY, TEMPERATURE, TIME,
};
use crate::weather_data::error::ShapeError;
use crate::weather_data::raw_observation::RawObservation;
use chrono::NaiveDateTime;
use polars::prelude::*;

/// `hourly.time` comes as `2025-03-01T13:00`; seconds are accepted too.
const TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Zips the parallel hourly arrays of `raw` into one row per timestamp.
///
/// Every row is stamped with the coordinates the API echoed back (not the
/// requested ones) and with `city_name`. A response without hourly data yields
/// an empty frame, which callers must treat as "nothing for this window"
/// rather than as a failure.
///
/// # Errors
///
/// * [`ShapeError::LengthMismatch`] if the hourly arrays differ in length.
/// * [`ShapeError::InvalidTimestamp`] if a `time` entry cannot be parsed.
/// * [`ShapeError::Frame`] if Polars rejects the columns.
pub fn shape(raw: &RawObservation, city_name: &str) -> Result<WeatherFrame, ShapeError> {
    let Some(hourly) = raw.hourly.as_ref().filter(|hourly| !hourly.is_empty()) else {
        return Ok(WeatherFrame::empty());
    };

    let expected = hourly.time.len();
    ensure_len(city_name, TEMPERATURE, expected, hourly.temperature_2m.len())?;
    ensure_len(
        city_name,
        RELATIVE_HUMIDITY,
        expected,
        hourly.relative_humidity_2m.len(),
    )?;

    let times = hourly
        .time
        .iter()
        .map(|value| {
            parse_time(value).map_err(|source| ShapeError::InvalidTimestamp {
                city: city_name.to_string(),
                value: value.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let frame = df!(
        TIME => times,
        TEMPERATURE => &hourly.temperature_2m,
        RELATIVE_HUMIDITY => &hourly.relative_humidity_2m,
        LATITUDE => vec![raw.latitude; expected],
        LONGITUDE => vec![raw.longitude; expected],
        CITY => vec![city_name; expected],
    )
    .map_err(|source| ShapeError::Frame {
        city: city_name.to_string(),
        source,
    })?;

    Ok(WeatherFrame::new(frame))
}

fn ensure_len(
    city: &str,
    column: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), ShapeError> {
    if expected == found {
        return Ok(());
    }
    Err(ShapeError::LengthMismatch {
        city: city.to_string(),
        column,
        expected,
        found,
    })
}

fn parse_time(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TIME_FORMATS[0])
        .or_else(|_| NaiveDateTime::parse_from_str(value, TIME_FORMATS[1]))
}
