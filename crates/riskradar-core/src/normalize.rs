//! Series normalizer.
//!
//! Adapters extract loosely-typed [`RawRecord`]s from provider payloads; this
//! module turns them into a canonical [`TimeSeries`] according to the
//! provider's [`ProviderSchema`].

use std::collections::BTreeMap;

use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use crate::data_source::SourceFailure;
use crate::domain::{parse_date, Observation};
use crate::{CanonicalSymbol, TimeSeries, Unit};

/// How a provider encodes observation dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `YYYY-MM-DD`, optionally followed by a time component.
    Iso,
    UnixSeconds,
    UnixMillis,
}

/// Field layout of one provider's series payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSchema {
    pub date_field: &'static str,
    pub value_field: &'static str,
    pub date_format: DateFormat,
    /// Raw values that mean "no observation on this date".
    pub missing_markers: &'static [&'static str],
}

/// Scalar as found in the provider payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(f64),
    Null,
}

impl RawValue {
    /// Lossless view of a JSON scalar; arrays and objects yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Number(number) => number.as_f64().map(Self::Number),
            serde_json::Value::String(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One provider row; `None` means the field was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub date: Option<RawValue>,
    pub value: Option<RawValue>,
}

impl RawRecord {
    pub fn new(date: impl Into<RawValue>, value: impl Into<RawValue>) -> Self {
        Self {
            date: Some(date.into()),
            value: Some(value.into()),
        }
    }

    /// Pull the schema's date and value fields out of a JSON object row.
    pub fn from_json_row(row: &serde_json::Value, schema: &ProviderSchema) -> Self {
        Self {
            date: row.get(schema.date_field).and_then(RawValue::from_json),
            value: row.get(schema.value_field).and_then(RawValue::from_json),
        }
    }
}

const DEFAULT_MISSING: &[&str] = &["", ".", "null", "NaN", "nan", "N/A", "#N/A"];

/// Normalize raw provider rows into a sorted, de-duplicated series.
///
/// Rows with unparseable dates or values are dropped with a warning. A
/// duplicate date keeps its last occurrence in input order.
pub fn normalize(
    symbol: &CanonicalSymbol,
    unit: Unit,
    records: Vec<RawRecord>,
    schema: &ProviderSchema,
) -> Result<TimeSeries, SourceFailure> {
    if records.is_empty() {
        return Err(SourceFailure::no_data(format!(
            "no observations returned for '{symbol}'"
        )));
    }

    let total = records.len();
    let mut by_date = BTreeMap::new();
    let mut dropped = 0_usize;

    for (index, record) in records.into_iter().enumerate() {
        let date = match record.date.as_ref().map(|raw| parse_raw_date(raw, schema.date_format)) {
            Some(Some(date)) => date,
            _ => {
                warn!(symbol = %symbol, row = index, field = schema.date_field, "dropping row with unparseable date");
                dropped += 1;
                continue;
            }
        };

        let value = match parse_raw_value(record.value.as_ref(), schema) {
            Some(value) => value,
            None => {
                warn!(symbol = %symbol, row = index, field = schema.value_field, "dropping row with unparseable value");
                dropped += 1;
                continue;
            }
        };

        by_date.insert(date, value);
    }

    if by_date.is_empty() {
        return Err(SourceFailure::parse(format!(
            "all {total} rows for '{symbol}' were malformed"
        )));
    }

    let observations = by_date
        .into_iter()
        .map(|(date, value)| Observation::new(date, value))
        .collect::<Vec<_>>();

    if observations.iter().all(|observation| observation.value.is_none()) {
        return Err(SourceFailure::no_data(format!(
            "every observation for '{symbol}' is missing"
        )));
    }

    debug!(symbol = %symbol, rows = total, dropped, kept = observations.len(), "normalized series");

    TimeSeries::new(symbol.clone(), unit, observations)
        .map_err(|error| SourceFailure::parse(error.to_string()))
}

fn parse_raw_date(raw: &RawValue, format: DateFormat) -> Option<Date> {
    match (format, raw) {
        (DateFormat::Iso, RawValue::Text(text)) => {
            let day = text.trim().get(..10)?;
            parse_date(day).ok()
        }
        (DateFormat::UnixSeconds, RawValue::Number(seconds)) => unix_to_date(*seconds),
        (DateFormat::UnixMillis, RawValue::Number(millis)) => unix_to_date(*millis / 1000.0),
        (DateFormat::UnixSeconds, RawValue::Text(text)) => {
            text.trim().parse::<f64>().ok().and_then(unix_to_date)
        }
        (DateFormat::UnixMillis, RawValue::Text(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|millis| unix_to_date(millis / 1000.0)),
        _ => None,
    }
}

fn unix_to_date(seconds: f64) -> Option<Date> {
    if !seconds.is_finite() {
        return None;
    }
    OffsetDateTime::from_unix_timestamp(seconds.floor() as i64)
        .ok()
        .map(OffsetDateTime::date)
}

/// `Some(None)` for explicit gaps, `None` for rows that must be dropped.
fn parse_raw_value(raw: Option<&RawValue>, schema: &ProviderSchema) -> Option<Option<f64>> {
    match raw? {
        RawValue::Null => Some(None),
        RawValue::Number(number) if number.is_finite() => Some(Some(*number)),
        RawValue::Number(_) => Some(None),
        RawValue::Text(text) => {
            let trimmed = text.trim();
            let is_marker = schema
                .missing_markers
                .iter()
                .chain(DEFAULT_MISSING)
                .any(|marker| *marker == trimmed);
            if is_marker {
                return Some(None);
            }
            match trimmed.parse::<f64>() {
                Ok(number) if number.is_finite() => Some(Some(number)),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::FailureReason;
    use time::macros::date;

    const ISO: ProviderSchema = ProviderSchema {
        date_field: "date",
        value_field: "value",
        date_format: DateFormat::Iso,
        missing_markers: &["."],
    };

    fn symbol() -> CanonicalSymbol {
        CanonicalSymbol::parse("US_10Y").expect("valid symbol")
    }

    #[test]
    fn sorts_ascending_and_keeps_last_duplicate() {
        let records = vec![
            RawRecord::new("2024-01-03", "4.10"),
            RawRecord::new("2024-01-02", "4.00"),
            RawRecord::new("2024-01-03", "4.15"),
        ];

        let series = normalize(&symbol(), Unit::Percent, records, &ISO).expect("normalizes");

        assert_eq!(
            series.observations(),
            &[
                Observation::present(date!(2024 - 01 - 02), 4.00),
                Observation::present(date!(2024 - 01 - 03), 4.15),
            ]
        );
        assert_eq!(series.unit(), Unit::Percent);
    }

    #[test]
    fn drops_malformed_rows_and_keeps_missing_markers_as_gaps() {
        let records = vec![
            RawRecord::new("2024-01-02", "4.00"),
            RawRecord::new("not-a-date", "4.05"),
            RawRecord::new("2024-01-03", "."),
            RawRecord::new("2024-01-04", "abc"),
            RawRecord {
                date: Some(RawValue::from("2024-01-05")),
                value: None,
            },
        ];

        let series = normalize(&symbol(), Unit::Percent, records, &ISO).expect("normalizes");

        assert_eq!(series.len(), 2);
        assert_eq!(series.value_on(date!(2024 - 01 - 03)), None);
        assert_eq!(series.present_count(), 1);
    }

    #[test]
    fn empty_input_is_no_data() {
        let failure = normalize(&symbol(), Unit::Percent, Vec::new(), &ISO).expect_err("must fail");
        assert_eq!(failure.reason, FailureReason::NoData);
    }

    #[test]
    fn all_rows_malformed_is_parse_error() {
        let records = vec![RawRecord::new("garbage", "1.0"), RawRecord::new("2024-01-02", "x")];
        let failure = normalize(&symbol(), Unit::Percent, records, &ISO).expect_err("must fail");
        assert_eq!(failure.reason, FailureReason::ParseError);
    }

    #[test]
    fn only_gaps_is_no_data() {
        let records = vec![RawRecord::new("2024-01-02", "."), RawRecord::new("2024-01-03", ".")];
        let failure = normalize(&symbol(), Unit::Percent, records, &ISO).expect_err("must fail");
        assert_eq!(failure.reason, FailureReason::NoData);
    }

    #[test]
    fn parses_unix_seconds() {
        let schema = ProviderSchema {
            date_format: DateFormat::UnixSeconds,
            ..ISO
        };
        let records = vec![
            RawRecord::new(1_704_205_800.0, 13.2),
            RawRecord {
                date: Some(RawValue::Number(1_704_292_200.0)),
                value: Some(RawValue::Null),
            },
        ];

        let series = normalize(&symbol(), Unit::Index, records, &schema).expect("normalizes");
        assert_eq!(series.first_date(), Some(date!(2024 - 01 - 02)));
        assert_eq!(series.value_on(date!(2024 - 01 - 03)), None);
    }
}
