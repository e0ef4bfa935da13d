pub mod error;
pub mod fetcher;
pub mod raw_observation;
pub mod retry;
pub mod shaper;
