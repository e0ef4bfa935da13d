use serde::Deserialize;

/// The archive API's JSON body for one location and date range.
///
/// Only the fields the ETL reads are modelled; everything else in the response
/// is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawObservation {
    /// Latitude of the grid cell the API resolved the request to.
    pub latitude: Option<f64>,
    /// Longitude of the grid cell the API resolved the request to.
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    /// IANA timezone used for `hourly.time` when requested with `timezone=auto`.
    pub timezone: Option<String>,
    pub utc_offset_seconds: Option<i32>,
    pub hourly: Option<HourlyBlock>,
}

/// Parallel per-hour arrays. All three must have the same length.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HourlyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
}

impl HourlyBlock {
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
            && self.temperature_2m.is_empty()
            && self.relative_humidity_2m.is_empty()
    }
}

/// Error body the archive returns with a 4xx status, e.g. for dates out of range.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error: bool,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_archive_response() {
        let body = r#"{
            "latitude": 40.4,
            "longitude": -3.7000003,
            "generationtime_ms": 0.1,
            "utc_offset_seconds": 3600,
            "timezone": "Europe/Madrid",
            "timezone_abbreviation": "GMT+1",
            "elevation": 661.0,
            "hourly_units": {
                "time": "iso8601",
                "temperature_2m": "°C",
                "relative_humidity_2m": "%"
            },
            "hourly": {
                "time": ["2025-03-01T00:00", "2025-03-01T01:00"],
                "temperature_2m": [7.9, null],
                "relative_humidity_2m": [81, 84]
            }
        }"#;
        let raw: RawObservation = serde_json::from_str(body).unwrap();
        assert_eq!(raw.latitude, Some(40.4));
        assert_eq!(raw.timezone.as_deref(), Some("Europe/Madrid"));
        let hourly = raw.hourly.unwrap();
        assert_eq!(hourly.time.len(), 2);
        assert_eq!(hourly.temperature_2m, vec![Some(7.9), None]);
        assert_eq!(hourly.relative_humidity_2m, vec![Some(81.0), Some(84.0)]);
    }

    #[test]
    fn missing_hourly_is_none() {
        let raw: RawObservation = serde_json::from_str(r#"{"latitude": 1.0}"#).unwrap();
        assert!(raw.hourly.is_none());
    }

    #[test]
    fn parses_error_body() {
        let body = r#"{"error": true, "reason": "Parameter 'start_date' is out of allowed range"}"#;
        let parsed: ApiErrorBody = serde_json::from_str(body).unwrap();
        assert!(parsed.error);
        assert!(parsed.reason.unwrap().contains("start_date"));
    }
}
