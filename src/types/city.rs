//! The fixed catalog of Spanish cities the ETL collects weather for.

use std::fmt;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use weather_etl::LatLon;
///
/// let madrid = LatLon(40.4168, -3.7038);
/// assert_eq!(madrid.0, 40.4168); // Latitude
/// assert_eq!(madrid.1, -3.7038); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

/// A named location whose hourly weather is collected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    /// Label written to the `city` column of every row.
    pub name: &'static str,
    pub location: LatLon,
}

impl City {
    pub const fn new(name: &'static str, latitude: f64, longitude: f64) -> Self {
        Self {
            name,
            location: LatLon(latitude, longitude),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.location.0
    }

    pub fn longitude(&self) -> f64 {
        self.location.1
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The 16 cities loaded by both the bulk backfill and the daily run.
pub const SPANISH_CITIES: [City; 16] = [
    City::new("Madrid", 40.4168, -3.7038),
    City::new("Barcelona", 41.3851, 2.1734),
    City::new("Valencia", 39.4699, -0.3763),
    City::new("Sevilla", 37.3891, -5.9845),
    City::new("Bilbao", 43.2630, -2.9350),
    City::new("Zaragoza", 41.6488, -0.8891),
    City::new("Málaga", 36.7213, -4.4214),
    // Palma de Mallorca
    City::new("Palma", 39.5696, 2.6502),
    // Las Palmas de Gran Canaria
    City::new("Las Palmas", 28.1235, -15.4363),
    City::new("Santa Cruz de Tenerife", 28.4636, -16.2518),
    City::new("Santander", 43.4623, -3.8099),
    City::new("Santiago de Compostela", 42.8782, -8.5448),
    City::new("Cáceres", 39.4760, -6.3722),
    City::new("León", 42.5987, -5.5671),
    City::new("Salamanca", 40.9701, -5.6635),
    City::new("Guadalajara", 40.6333, -3.1667),
];
