//! Meter-reading import from a spreadsheet exported as CSV.
//!
//! Expected header columns (by name):
//! - household_number
//! - service (utility service name, case-insensitive)
//! - reading_date (`YYYY-MM-DD`, `DD.MM.YYYY` or `DD/MM/YYYY`)
//! - meter_reading
//! - raw_consumption (optional)

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;

use crate::db_storage::BillingStorage;
use crate::errors::AppError;
use crate::models::NewReading;
use crate::periods::PeriodNaming;

/// Dates before this year come from broken spreadsheet cells.
pub const MIN_PLAUSIBLE_YEAR: i32 = 2000;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

#[derive(Debug, Clone, Deserialize)]
struct RawRow {
    household_number: String,
    service: String,
    reading_date: String,
    meter_reading: String,
    #[serde(default)]
    raw_consumption: Option<String>,
}

/// A spreadsheet row that parsed cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    /// 1-based data row number, for reporting.
    pub line: usize,
    pub household_number: String,
    pub service: String,
    pub reading_date: NaiveDate,
    pub meter_reading: BigDecimal,
    pub raw_consumption: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

pub fn parse_reading_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Parses a spreadsheet number, accepting a decimal comma.
pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    let normalized = raw.trim().replace(' ', "").replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    BigDecimal::from_str(&normalized).ok()
}

fn parse_row(line: usize, raw: RawRow) -> Result<ImportRow, RowError> {
    let fail = |message: String| RowError { line, message };

    let household_number = raw.household_number.trim().to_string();
    if household_number.is_empty() {
        return Err(fail("missing household number".to_string()));
    }
    let service = raw.service.trim().to_string();
    if service.is_empty() {
        return Err(fail("missing service".to_string()));
    }

    let reading_date = parse_reading_date(&raw.reading_date)
        .ok_or_else(|| fail(format!("invalid reading date '{}'", raw.reading_date)))?;
    if reading_date.year() < MIN_PLAUSIBLE_YEAR {
        return Err(fail(format!("implausible reading date {}", reading_date)));
    }

    let meter_reading = parse_amount(&raw.meter_reading)
        .ok_or_else(|| fail(format!("invalid meter reading '{}'", raw.meter_reading)))?;

    let raw_consumption = match raw.raw_consumption.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(
            parse_amount(value).ok_or_else(|| fail(format!("invalid consumption '{}'", value)))?,
        ),
    };

    Ok(ImportRow {
        line,
        household_number,
        service,
        reading_date,
        meter_reading,
        raw_consumption,
    })
}

/// Reads every data row; rows that fail to parse are returned as errors and
/// do not stop the rest of the file.
pub fn read_rows<R: Read>(reader: R) -> Vec<Result<ImportRow, RowError>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    csv_reader
        .deserialize::<RawRow>()
        .enumerate()
        .map(|(idx, record)| {
            let line = idx + 1;
            record
                .map_err(|e| RowError {
                    line,
                    message: e.to_string(),
                })
                .and_then(|raw| parse_row(line, raw))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub duplicates: usize,
    pub parse_errors: usize,
    pub unknown_households: usize,
    pub unknown_services: usize,
    pub periods_created: usize,
    pub meters_created: usize,
}

/// Imports parsed rows. Parse errors and unknown households or services skip
/// the row; store failures abort the run.
pub async fn import_readings(
    storage: &BillingStorage,
    rows: Vec<Result<ImportRow, RowError>>,
    naming: PeriodNaming,
    grace_days: u32,
) -> Result<ImportSummary, AppError> {
    let total = rows.len();
    let mut summary = ImportSummary::default();

    for (idx, row) in rows.into_iter().enumerate() {
        if (idx + 1) % 100 == 0 {
            tracing::info!("Processed {}/{} rows", idx + 1, total);
        }

        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Skipping row {}: {}", e.line, e.message);
                summary.parse_errors += 1;
                continue;
            }
        };

        let Some(household) = storage.find_household_by_number(&row.household_number).await?
        else {
            tracing::warn!(
                "Skipping row {}: unknown household {}",
                row.line,
                row.household_number
            );
            summary.unknown_households += 1;
            continue;
        };

        let Some(service) = storage.find_service_by_name(&row.service).await? else {
            tracing::warn!("Skipping row {}: unknown service {}", row.line, row.service);
            summary.unknown_services += 1;
            continue;
        };

        let (meter, meter_created) = storage
            .find_or_create_meter(household.id, service.id)
            .await?;
        if meter_created {
            summary.meters_created += 1;
        }

        let draft = match naming.draft_for(row.reading_date, grace_days) {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!("Skipping row {}: {}", row.line, e);
                summary.parse_errors += 1;
                continue;
            }
        };
        let (period, period_created) = storage.find_or_create_period(&draft).await?;
        if period_created {
            summary.periods_created += 1;
        }

        if storage.find_reading(meter.id, period.id).await?.is_some() {
            tracing::debug!(
                "Row {}: household {} already has a {} reading for {}",
                row.line,
                household.household_number,
                service.name,
                period.period_name
            );
            summary.duplicates += 1;
            continue;
        }

        let reading = NewReading {
            household_meter_id: meter.id,
            billing_period_id: period.id,
            meter_reading: row.meter_reading,
            raw_consumption: row.raw_consumption,
            reading_date: row.reading_date,
            notes: Some(format!("Imported from spreadsheet row {}", row.line)),
        };

        match storage.record_reading(&reading).await {
            Ok(_) => summary.imported += 1,
            Err(AppError::Conflict(_)) => summary.duplicates += 1,
            Err(AppError::Validation(msg)) => {
                tracing::warn!("Skipping row {}: {}", row.line, msg);
                summary.parse_errors += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        "Import finished: {} imported, {} duplicates, {} unparseable, {} unknown households, {} unknown services",
        summary.imported,
        summary.duplicates,
        summary.parse_errors,
        summary.unknown_households,
        summary.unknown_services
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(parse_reading_date("2019-08-31"), Some(date(2019, 8, 31)));
        assert_eq!(parse_reading_date("31.8.2019"), Some(date(2019, 8, 31)));
        assert_eq!(parse_reading_date(" 31/08/2019 "), Some(date(2019, 8, 31)));
        assert_eq!(parse_reading_date("August 31"), None);
    }

    #[test]
    fn test_amount_accepts_decimal_comma() {
        assert_eq!(parse_amount("123,5"), BigDecimal::from_str("123.5").ok());
        assert_eq!(parse_amount("1 204.25"), BigDecimal::from_str("1204.25").ok());
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn test_read_rows_skips_bad_rows() {
        let csv = "household_number,service,reading_date,meter_reading,raw_consumption\n\
                   12,Cold water,2019-08-31,1204.5,12.5\n\
                   13,Cold water,not a date,100,\n\
                   14,Heat,31.12.1899,5,\n\
                   15,Heat,01.10.2019,\"7,25\",\n";

        let rows = read_rows(csv.as_bytes());
        assert_eq!(rows.len(), 4);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.household_number, "12");
        assert_eq!(first.reading_date, date(2019, 8, 31));
        assert_eq!(first.raw_consumption, BigDecimal::from_str("12.5").ok());

        assert_eq!(rows[1].as_ref().unwrap_err().line, 2);
        assert!(rows[2]
            .as_ref()
            .unwrap_err()
            .message
            .contains("implausible"));

        let last = rows[3].as_ref().unwrap();
        assert_eq!(last.meter_reading, BigDecimal::from_str("7.25").unwrap());
        assert_eq!(last.raw_consumption, None);
    }

    #[test]
    fn test_missing_consumption_column_is_optional() {
        let csv = "household_number,service,reading_date,meter_reading\n\
                   3,Heat,2024-02-29,88\n";
        let rows = read_rows(csv.as_bytes());
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_ok());
    }
}
