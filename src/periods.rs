//! Billing period calendar logic.
//!
//! Everything here is pure: period selection for the meter-reading screen,
//! bucketing a date into its quarter (or any other billing interval), and
//! generating the periods of a calendar year.

use chrono::{Datelike, Days, NaiveDate};

use crate::errors::AppError;
use crate::models::{BillingInterval, BillingPeriod, PeriodDraft};

/// How far ahead an upcoming period becomes available for reading entry.
pub const NEAR_FUTURE_WINDOW_DAYS: u64 = 30;

/// Whether a period with the inclusive range `[start, end]` is relevant for
/// meter-reading entry on `today`.
///
/// A period is selected when it has already ended, is in progress, or starts
/// within the next [`NEAR_FUTURE_WINDOW_DAYS`] days.
pub fn is_relevant_for_readings(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> bool {
    let window_end = today
        .checked_add_days(Days::new(NEAR_FUTURE_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MAX);

    let past = end < today;
    let current = start <= today && today <= end;
    let near_future = start > today && start <= window_end;

    past || current || near_future
}

/// Keeps the periods relevant for meter-reading entry, preserving input order.
pub fn filter_for_meter_readings(periods: Vec<BillingPeriod>, today: NaiveDate) -> Vec<BillingPeriod> {
    periods
        .into_iter()
        .filter(|p| is_relevant_for_readings(p.start_date, p.end_date, today))
        .collect()
}

/// Periods returned by the period listing: the reading-cycle subset when
/// `for_meter_readings` is set, otherwise all of them.
pub fn select_periods(
    periods: Vec<BillingPeriod>,
    for_meter_readings: bool,
    today: NaiveDate,
) -> Vec<BillingPeriod> {
    if for_meter_readings {
        filter_for_meter_readings(periods, today)
    } else {
        periods
    }
}

/// Quarter of the year (1-4) a date falls into: `ceil(month / 3)`.
pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() + 2) / 3
}

/// Last calendar day of the given month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Display label of the bucket with 0-based `index` within `year`.
pub fn period_name(year: i32, interval: BillingInterval, index: u32) -> String {
    match interval {
        BillingInterval::Monthly => format!("{}-{:02}", year, index + 1),
        BillingInterval::Quarterly => format!("{}-Q{}", year, index + 1),
        BillingInterval::Tertiary => format!("{}-T{}", year, index + 1),
        BillingInterval::Annual => format!("{}", year),
    }
}

fn bucket(
    year: i32,
    interval: BillingInterval,
    index: u32,
    grace_days: u32,
) -> Result<PeriodDraft, AppError> {
    let months = interval.months();
    let first_month = index * months + 1;
    let last_month = first_month + months - 1;

    let out_of_range = || AppError::Validation(format!("Year {} is out of range", year));

    let start_date = NaiveDate::from_ymd_opt(year, first_month, 1).ok_or_else(out_of_range)?;
    let end_date = last_day_of_month(year, last_month).ok_or_else(out_of_range)?;
    let reading_deadline = end_date
        .checked_add_days(Days::new(u64::from(grace_days)))
        .ok_or_else(out_of_range)?;

    Ok(PeriodDraft {
        period_name: period_name(year, interval, index),
        period_type: interval,
        start_date,
        end_date,
        reading_deadline,
    })
}

/// The period of the given interval that contains `date`.
pub fn period_for_date(
    date: NaiveDate,
    interval: BillingInterval,
    grace_days: u32,
) -> Result<PeriodDraft, AppError> {
    let index = (date.month() - 1) / interval.months();
    bucket(date.year(), interval, index, grace_days)
}

/// Quarter bucket of a reading date: Q = ceil(month / 3), spanning the first
/// day of the quarter's first month to the last day of its last month.
pub fn quarter_period_for(date: NaiveDate, grace_days: u32) -> Result<PeriodDraft, AppError> {
    period_for_date(date, BillingInterval::Quarterly, grace_days)
}

/// Single-day period named after the reading date itself.
///
/// Older imports grouped readings this way. It is kept separate from the
/// quarter scheme and never merged with it. The stored `period_type` is
/// `quarterly`: one period row is shared by every service read on that date,
/// so no single service interval applies, and these readings were billed
/// with the quarterly cycle.
pub fn reading_date_period(date: NaiveDate, grace_days: u32) -> Result<PeriodDraft, AppError> {
    let reading_deadline = date
        .checked_add_days(Days::new(u64::from(grace_days)))
        .ok_or_else(|| AppError::Validation(format!("Date {} is out of range", date)))?;

    Ok(PeriodDraft {
        period_name: format!("Reading {}", date.format("%Y-%m-%d")),
        period_type: BillingInterval::Quarterly,
        start_date: date,
        end_date: date,
        reading_deadline,
    })
}

/// All periods of `interval` covering calendar year `year`, in order.
pub fn periods_for_year(
    year: i32,
    interval: BillingInterval,
    grace_days: u32,
) -> Result<Vec<PeriodDraft>, AppError> {
    let count = 12 / interval.months();
    (0..count)
        .map(|index| bucket(year, interval, index, grace_days))
        .collect()
}

/// How imported readings are grouped into periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodNaming {
    /// `YYYY-Qn` quarter buckets.
    #[default]
    Quarter,
    /// One period per distinct reading date.
    ReadingDate,
}

impl PeriodNaming {
    pub fn draft_for(&self, date: NaiveDate, grace_days: u32) -> Result<PeriodDraft, AppError> {
        match self {
            PeriodNaming::Quarter => quarter_period_for(date, grace_days),
            PeriodNaming::ReadingDate => reading_date_period(date, grace_days),
        }
    }
}
