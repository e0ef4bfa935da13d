//! Loads hourly weather for Spanish cities from the Open-Meteo archive into
//! BigQuery.
//!
//! The pipeline fetches each (city, date window) work item with an
//! [`ArchiveFetcher`], turns the response into a [`WeatherFrame`] with
//! [`shape`], and appends the rows to a [`RowSink`]. A [`RunPlan`] decides
//! which items run and whether rows are written per item (bulk backfill) or
//! once at the end (daily load).

mod config;
mod error;
mod pipeline;
mod sink;
mod types;
mod utils;
mod weather_data;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, Settings};
pub use error::EtlError;
pub use pipeline::*;

pub use sink::auth::{ServiceAccountKey, ServiceAccountTokenSource, StaticToken, TokenSource};
pub use sink::bigquery::{BigQuerySink, TableRef};
pub use sink::error::SinkError;
pub use sink::ndjson::NdjsonFileSink;
pub use sink::{RowSink, SinkTarget};

pub use types::city::{City, LatLon, SPANISH_CITIES};
pub use types::date_window::{DateWindow, WeekWindows, WorkItem};
pub use types::weather_frame::{NdjsonError, WeatherFrame};
pub use types::weather_row::WeatherRow;

pub use weather_data::error::{FetchError, ShapeError};
pub use weather_data::fetcher::{ArchiveFetcher, ObservationSource};
pub use weather_data::raw_observation::{HourlyBlock, RawObservation};
pub use weather_data::retry::RetryPolicy;
pub use weather_data::shaper::shape;
