//! Contains the `WeatherFrame` structure, the columnar row-set that flows from
//! the shaper to the sinks.

use crate::types::weather_row::WeatherRow;
use polars::prelude::*;

pub const TIME: &str = "time";
pub const TEMPERATURE: &str = "temperature_2m";
pub const RELATIVE_HUMIDITY: &str = "relative_humidity_2m";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const CITY: &str = "city";

/// Column order of every non-empty frame.
pub const COLUMNS: [&str; 6] = [TIME, TEMPERATURE, RELATIVE_HUMIDITY, LATITUDE, LONGITUDE, CITY];

/// A wrapper around a Polars `DataFrame` holding hourly weather rows.
///
/// A non-empty frame always has the columns listed in [`COLUMNS`], with `time`
/// as a timezone-naive datetime in the location's local time. The empty frame
/// has no columns at all and is what the shaper returns when the archive had
/// nothing for a window.
#[derive(Debug, Clone)]
pub struct WeatherFrame {
    frame: DataFrame,
}

impl Default for WeatherFrame {
    fn default() -> Self {
        Self::empty()
    }
}

impl WeatherFrame {
    pub(crate) fn new(frame: DataFrame) -> Self {
        Self { frame }
    }

    /// A frame without rows or columns.
    pub fn empty() -> Self {
        Self::new(DataFrame::empty())
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Appends the rows of `other` below the rows of `self`.
    ///
    /// Appending an empty frame is a no-op; appending to an empty frame adopts
    /// the other frame's columns.
    ///
    /// # Errors
    ///
    /// Returns a [`PolarsError`] if both frames are non-empty and their schemas differ.
    pub fn append(&mut self, other: WeatherFrame) -> PolarsResult<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            self.frame = other.frame;
            return Ok(());
        }
        self.frame.vstack_mut(&other.frame)?;
        Ok(())
    }

    /// Collects the frame into typed rows.
    ///
    /// # Errors
    ///
    /// Returns a [`PolarsError`] if a required column is missing or has an
    /// unexpected type, or if a row has a null `time` or `city`.
    pub fn rows(&self) -> PolarsResult<Vec<WeatherRow>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let series = |name: &str| {
            self.frame
                .column(name)
                .map(|column| column.as_materialized_series())
        };
        let times = series(TIME)?.datetime()?;
        let temperatures = series(TEMPERATURE)?.f64()?;
        let humidities = series(RELATIVE_HUMIDITY)?.f64()?;
        let latitudes = series(LATITUDE)?.f64()?;
        let longitudes = series(LONGITUDE)?.f64()?;
        let cities = series(CITY)?.str()?;

        times
            .as_datetime_iter()
            .zip(temperatures.into_iter())
            .zip(humidities.into_iter())
            .zip(latitudes.into_iter())
            .zip(longitudes.into_iter())
            .zip(cities.into_iter())
            .enumerate()
            .map(|(index, row)| {
                let (((((time, temperature), relative_humidity), latitude), longitude), city) = row;
                let (Some(timestamp), Some(city)) = (time, city) else {
                    return Err(PolarsError::ComputeError(
                        format!("row {index} has a null '{TIME}' or '{CITY}'").into(),
                    ));
                };
                Ok(WeatherRow {
                    timestamp,
                    temperature,
                    relative_humidity,
                    latitude,
                    longitude,
                    city_name: city.to_string(),
                })
            })
            .collect()
    }

    /// Serializes the rows as newline-delimited JSON, one object per row.
    ///
    /// This is the payload format of the warehouse load job and of the local file sink.
    pub fn to_ndjson(&self) -> Result<Vec<u8>, NdjsonError> {
        let mut out = Vec::new();
        for row in self.rows()? {
            serde_json::to_writer(&mut out, &row)?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NdjsonError {
    #[error("Failed to read rows from frame")]
    Frame(#[from] PolarsError),

    #[error("Failed to encode row as JSON")]
    Json(#[from] serde_json::Error),
}
