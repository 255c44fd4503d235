//! Inclusive calendar-year spans

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::error::PartitionError;
use crate::utils::time::year_bounds;

/// Years `first..=last`, each mapped to one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearSpan {
    pub first: i32,
    pub last: i32,
}

impl YearSpan {
    pub fn new(first: i32, last: i32) -> Result<Self, PartitionError> {
        if first > last {
            return Err(PartitionError::InvalidRange(format!(
                "start year {} is after end year {}",
                first, last
            )));
        }
        for year in [first, last] {
            if year_bounds(year).is_none() {
                return Err(PartitionError::InvalidRange(format!(
                    "year {} is outside the supported calendar",
                    year
                )));
            }
        }
        Ok(Self { first, last })
    }

    pub fn single(year: i32) -> Result<Self, PartitionError> {
        Self::new(year, year)
    }

    /// Every year touched by the dates `start..=end`
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, PartitionError> {
        Self::new(start.year(), end.year())
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.first..=self.last
    }

    pub fn len(&self) -> usize {
        (self.last - self.first + 1) as usize
    }

    pub fn contains(&self, year: i32) -> bool {
        self.years().contains(&year)
    }
}

impl fmt::Display for YearSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}..={}", self.first, self.last)
        }
    }
}
