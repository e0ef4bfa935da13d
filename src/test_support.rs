//! Fixtures shared by the unit tests.

use axum::Router;
use chrono::{Days, NaiveDate};
use serde_json::{json, Value};

/// An archive response with one sample per hour from `start` to `end`.
pub(crate) fn archive_body(lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> Value {
    let mut time = Vec::new();
    let mut temperature = Vec::new();
    let mut humidity = Vec::new();
    let mut date = start;
    while date <= end {
        for hour in 0..24 {
            time.push(format!("{}T{:02}:00", date, hour));
            temperature.push(json!(8.0 + hour as f64 / 2.0));
            humidity.push(json!(60 + hour));
        }
        date = date.checked_add_days(Days::new(1)).unwrap();
    }
    json!({
        "latitude": lat,
        "longitude": lon,
        "generationtime_ms": 0.2,
        "utc_offset_seconds": 3600,
        "timezone": "Europe/Madrid",
        "timezone_abbreviation": "GMT+1",
        "elevation": 650.0,
        "hourly_units": {"time": "iso8601", "temperature_2m": "°C", "relative_humidity_2m": "%"},
        "hourly": {
            "time": time,
            "temperature_2m": temperature,
            "relative_humidity_2m": humidity
        }
    })
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub(crate) async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
