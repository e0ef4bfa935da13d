use crate::config::ConfigError;
use crate::sink::error::SinkError;
use crate::weather_data::error::{FetchError, ShapeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
