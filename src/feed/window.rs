use std::num::NonZeroU32;

use time::{Date, Duration, OffsetDateTime, Time, UtcOffset};

use crate::error::{FeedError, Result};
use crate::storage::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub page: u32,
    pub newest: Date,
    pub oldest: Date,
}

impl DayWindow {
    pub fn contains(&self, day: Date) -> bool {
        self.oldest <= day && day <= self.newest
    }
}

/// Backward-looking fixed-size windows anchored at `today`.
///
/// Page `p` covers `[today - p*W + 1, today - (p-1)*W]`. The instant range
/// handed to the store is half-open from local midnight of the oldest day to
/// local midnight after the newest day, so neighbouring pages share a bound
/// but never a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindows {
    size: NonZeroU32,
    today: Date,
    offset: UtcOffset,
}

impl PageWindows {
    pub fn new(size: NonZeroU32, today: Date, offset: UtcOffset) -> Self {
        Self {
            size,
            today,
            offset,
        }
    }

    pub fn size(&self) -> u32 {
        self.size.get()
    }

    pub fn today(&self) -> Date {
        self.today
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn days(&self, page: u32) -> Result<DayWindow> {
        if page == 0 {
            return Err(FeedError::validation("page numbers start at 1"));
        }
        let out_of_range = || FeedError::validation(format!("page {page} is out of range"));
        let span = (Date::MAX - Date::MIN).whole_days();
        let size = i64::from(self.size.get());
        let back = i64::from(page - 1)
            .checked_mul(size)
            .filter(|days| *days <= span)
            .ok_or_else(out_of_range)?;
        let newest = self
            .today
            .checked_sub(Duration::days(back))
            .ok_or_else(out_of_range)?;
        let oldest = Some(size - 1)
            .filter(|days| *days <= span)
            .and_then(|days| newest.checked_sub(Duration::days(days)))
            .ok_or_else(out_of_range)?;
        Ok(DayWindow {
            page,
            newest,
            oldest,
        })
    }

    pub fn range(&self, page: u32) -> Result<TimeRange> {
        let days = self.days(page)?;
        let after_newest = days
            .newest
            .next_day()
            .ok_or_else(|| FeedError::validation(format!("page {page} is out of range")))?;
        Ok(TimeRange {
            start: local_midnight(days.oldest, self.offset),
            end: local_midnight(after_newest, self.offset),
        })
    }
}

pub fn bucket_key(ts: OffsetDateTime, offset: UtcOffset) -> Date {
    ts.to_offset(offset).date()
}

fn local_midnight(day: Date, offset: UtcOffset) -> OffsetDateTime {
    day.with_time(Time::MIDNIGHT).assume_offset(offset)
}
