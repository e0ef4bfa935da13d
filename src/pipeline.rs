//! Drives work items through fetch, shape and write.
//!
//! Bulk and daily loads are the same loop over a [`RunPlan`]; they differ only
//! in the items, in when rows are flushed to the sink, and in the pause
//! between archive calls.

use crate::error::EtlError;
use crate::sink::{RowSink, SinkTarget};
use crate::types::city::City;
use crate::types::date_window::{DateWindow, WorkItem};
use crate::types::weather_frame::WeatherFrame;
use crate::utils::error_chain;
use crate::weather_data::error::ShapeError;
use crate::weather_data::fetcher::{ArchiveFetcher, ObservationSource};
use crate::weather_data::shaper::shape;
use bon::bon;
use chrono::NaiveDate;
use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const BULK_PACING: Duration = Duration::from_secs(1);
pub const DAILY_PACING: Duration = Duration::from_millis(500);

/// When shaped rows are handed to the sink.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Write each item's rows as soon as they are shaped. A failed write only
    /// loses that item.
    PerItem,
    /// Accumulate all rows and write them in one call after the last item.
    AtEnd,
}

/// The items to process, in order, and how to process them.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    items: Vec<WorkItem>,
    flush: FlushPolicy,
    pacing: Duration,
}

impl RunPlan {
    pub fn new(items: Vec<WorkItem>, flush: FlushPolicy, pacing: Duration) -> Self {
        Self {
            items,
            flush,
            pacing,
        }
    }

    /// Backfill: every city crossed with the weekly windows of `[start, end]`,
    /// city-major, flushed per item.
    pub fn bulk(cities: &[City], start: NaiveDate, end: NaiveDate) -> Self {
        let items = cities
            .iter()
            .flat_map(|city| {
                DateWindow::weekly(start, end).map(move |window| WorkItem::new(*city, window))
            })
            .collect();
        Self::new(items, FlushPolicy::PerItem, BULK_PACING)
    }

    /// Incremental load: every city for the single day `date`, flushed once.
    pub fn daily(cities: &[City], date: NaiveDate) -> Self {
        let window = DateWindow::single(date);
        let items = cities
            .iter()
            .map(|city| WorkItem::new(*city, window))
            .collect();
        Self::new(items, FlushPolicy::AtEnd, DAILY_PACING)
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn flush(&self) -> FlushPolicy {
        self.flush
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }
}

/// Outcome of a run. Every item lands in exactly one of the item counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_written: usize,
    pub items_with_data: usize,
    pub items_empty: usize,
    pub fetch_failures: usize,
    pub shape_failures: usize,
    pub write_failures: usize,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.fetch_failures + self.shape_failures + self.write_failures
    }

    /// Nothing was written and at least one step failed.
    pub fn is_total_failure(&self) -> bool {
        self.rows_written == 0 && self.failures() > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows written; {} items with data, {} empty; failures: {} fetch, {} shape, {} write",
            self.rows_written,
            self.items_with_data,
            self.items_empty,
            self.fetch_failures,
            self.shape_failures,
            self.write_failures
        )
    }
}

/// Runs plans against an observation source and a row sink.
///
/// Failures never abort a run. A failed fetch or shape skips that item, and a
/// failed write is counted and logged.
pub struct Pipeline {
    source: Arc<dyn ObservationSource>,
    sink: Arc<dyn RowSink>,
}

#[bon]
impl Pipeline {
    #[builder]
    pub fn new(source: Arc<dyn ObservationSource>, sink: Arc<dyn RowSink>) -> Self {
        Self { source, sink }
    }

    /// A pipeline reading from the archive at `archive_url` (the public API
    /// when `None`) and writing to `target`.
    ///
    /// # Errors
    ///
    /// Any configuration, credentials or client setup failure, before any
    /// request is made.
    pub async fn connect(
        target: &SinkTarget,
        archive_url: Option<String>,
    ) -> Result<Self, EtlError> {
        let source = ArchiveFetcher::builder().maybe_base_url(archive_url).build()?;
        let sink = target.open().await?;
        Ok(Self::builder().source(Arc::new(source)).sink(sink).build())
    }

    pub async fn run(&self, plan: &RunPlan) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut pending = WeatherFrame::empty();
        let total = plan.items().len();
        info!(
            "Processing {} items into {}",
            total,
            self.sink.destination()
        );

        for (index, item) in plan.items().iter().enumerate() {
            if index > 0 && !plan.pacing().is_zero() {
                tokio::time::sleep(plan.pacing()).await;
            }
            info!("[{}/{}] {}", index + 1, total, item);

            let Some(frame) = self.fetch_and_shape(item, &mut summary).await else {
                continue;
            };
            match plan.flush() {
                FlushPolicy::PerItem => {
                    summary.items_with_data += 1;
                    self.write(&frame, &mut summary).await;
                }
                FlushPolicy::AtEnd => match pending.append(frame) {
                    Ok(()) => summary.items_with_data += 1,
                    Err(source) => {
                        let err = ShapeError::Frame {
                            city: item.city.name.to_string(),
                            source,
                        };
                        error!("Could not accumulate rows for {}: {}", item, error_chain(&err));
                        summary.shape_failures += 1;
                    }
                },
            }
        }

        if plan.flush() == FlushPolicy::AtEnd {
            if pending.is_empty() {
                info!("No data inserted");
            } else {
                self.write(&pending, &mut summary).await;
            }
        }

        info!("Run finished: {}", summary);
        summary
    }

    /// Returns the shaped rows, or `None` when the item produced nothing to write.
    async fn fetch_and_shape(
        &self,
        item: &WorkItem,
        summary: &mut RunSummary,
    ) -> Option<WeatherFrame> {
        let raw = match self.source.fetch(item.city.location, item.window).await {
            Ok(raw) => raw,
            Err(err) => {
                error!("Fetch failed for {}: {}", item, error_chain(&err));
                summary.fetch_failures += 1;
                return None;
            }
        };
        let frame = match shape(&raw, item.city.name) {
            Ok(frame) => frame,
            Err(err) => {
                error!("Rejected response for {}: {}", item, error_chain(&err));
                summary.shape_failures += 1;
                return None;
            }
        };
        if frame.is_empty() {
            warn!("No data for {}", item);
            summary.items_empty += 1;
            return None;
        }
        Some(frame)
    }

    async fn write(&self, frame: &WeatherFrame, summary: &mut RunSummary) {
        match self.sink.append(frame).await {
            Ok(rows) => summary.rows_written += rows,
            Err(err) => {
                error!(
                    "Failed writing {} rows to {}: {}",
                    frame.height(),
                    self.sink.destination(),
                    error_chain(&err)
                );
                summary.write_failures += 1;
            }
        }
    }
}
