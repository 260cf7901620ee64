use serde::Deserialize;
use time::Duration;

use super::{check_status, ProviderProtocol};
use crate::data_source::SourceFailure;
use crate::http_client::{HttpRequest, HttpResponse};
use crate::normalize::{DateFormat, ProviderSchema, RawRecord, RawValue};
use crate::{DateRange, ProviderId};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

const SCHEMA: ProviderSchema = ProviderSchema {
    date_field: "timestamp",
    value_field: "close",
    date_format: DateFormat::UnixSeconds,
    missing_markers: &[],
};

/// Yahoo Finance v8 chart endpoint (daily closes).
#[derive(Debug, Clone)]
pub struct YahooProtocol {
    base_url: String,
}

impl Default for YahooProtocol {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }
}

impl YahooProtocol {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ProviderProtocol for YahooProtocol {
    fn provider(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn schema(&self) -> ProviderSchema {
        SCHEMA
    }

    fn build_request(&self, symbol: &str, range: &DateRange) -> Result<HttpRequest, SourceFailure> {
        let period1 = range.start().midnight().assume_utc().unix_timestamp();
        // period2 is exclusive.
        let period2 = (range.end().midnight().assume_utc() + Duration::days(1)).unix_timestamp();
        let url = format!(
            "{}/{}?period1={period1}&period2={period2}&interval=1d&events=history",
            self.base_url,
            urlencoding::encode(symbol),
        );
        Ok(HttpRequest::get(url).with_header("referer", "https://finance.yahoo.com/"))
    }

    fn interpret(&self, response: &HttpResponse) -> Result<Vec<RawRecord>, SourceFailure> {
        check_status(ProviderId::Yahoo, response)?;

        let chart: YahooChartResponse = serde_json::from_str(&response.body)
            .map_err(|e| SourceFailure::parse(format!("failed to parse yahoo chart: {e}")))?;

        if let Some(error) = chart.chart.error {
            return Err(SourceFailure::no_data(format!(
                "yahoo chart error: {}",
                error.description.unwrap_or(error.code)
            )));
        }

        let Some(result) = chart.chart.result.and_then(|results| results.into_iter().next()) else {
            return Err(SourceFailure::no_data("yahoo chart has no result"));
        };
        let Some(timestamps) = result.timestamp else {
            return Err(SourceFailure::no_data("yahoo chart has no timestamps"));
        };
        let closes = result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|quote| quote.close)
            .unwrap_or_default();

        // Daily bars are stamped at the exchange open; shift into exchange local time
        // so FX bars opening before midnight UTC keep their trading date.
        let offset = result.meta.map(|meta| meta.gmtoffset).unwrap_or(0);

        Ok(timestamps
            .iter()
            .enumerate()
            .map(|(index, timestamp)| RawRecord {
                date: Some(RawValue::Number((timestamp + offset) as f64)),
                value: closes.get(index).and_then(RawValue::from_json),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    meta: Option<YahooChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    close: Vec<serde_json::Value>,
}
