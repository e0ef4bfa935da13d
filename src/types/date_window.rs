//! Date windows and the work items the pipeline iterates over.

use crate::types::city::City;
use chrono::{Days, Local, NaiveDate};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Longest window requested from the archive in a single call.
pub const WEEK_DAYS: u64 = 7;

/// A closed calendar interval `[start, end]`, with `start <= end`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Returns `None` when `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// A window covering exactly one day.
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The one-day window for the day before the local date of execution.
    pub fn yesterday() -> Self {
        let today = Local::now().date_naive();
        Self::single(today.pred_opt().unwrap_or(today))
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Splits `[start, end]` into consecutive windows of at most seven days.
    ///
    /// Window `i` starts at `start + 7i` and ends at `min(start + 7i + 6, end)`.
    /// The final window is clipped to `end` and may be shorter. An inverted
    /// campaign yields no windows.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use weather_etl::DateWindow;
    ///
    /// let d = |day| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
    /// let windows: Vec<_> = DateWindow::weekly(d(1), d(10)).collect();
    /// assert_eq!(windows, vec![
    ///     DateWindow::new(d(1), d(7)).unwrap(),
    ///     DateWindow::new(d(8), d(10)).unwrap(),
    /// ]);
    /// ```
    pub fn weekly(start: NaiveDate, end: NaiveDate) -> WeekWindows {
        WeekWindows {
            next_start: (start <= end).then_some(start),
            end,
        }
    }
}

impl Display for DateWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Iterator returned by [`DateWindow::weekly`].
#[derive(Debug, Clone)]
pub struct WeekWindows {
    next_start: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for WeekWindows {
    type Item = DateWindow;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start.take()?;
        let week_end = start
            .checked_add_days(Days::new(WEEK_DAYS - 1))
            .unwrap_or(NaiveDate::MAX);
        let end = week_end.min(self.end);
        self.next_start = end.succ_opt().filter(|next| *next <= self.end);
        Some(DateWindow { start, end })
    }
}

/// One (city, window) pair to fetch, shape and write.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WorkItem {
    pub city: City,
    pub window: DateWindow,
}

impl WorkItem {
    pub fn new(city: City, window: DateWindow) -> Self {
        Self { city, window }
    }
}

impl Display for WorkItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.city, self.window)
    }
}
