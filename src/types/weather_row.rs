use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One hourly sample for one city, as written to the warehouse.
///
/// Field names serialize to the table's column names.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WeatherRow {
    /// Local wall-clock time of the sample, in the city's own timezone.
    #[serde(rename = "time")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "temperature_2m")]
    pub temperature: Option<f64>,
    #[serde(rename = "relative_humidity_2m")]
    pub relative_humidity: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(rename = "city")]
    pub city_name: String,
}
