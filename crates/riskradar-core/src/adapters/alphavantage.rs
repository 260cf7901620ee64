use std::collections::BTreeMap;

use serde::Deserialize;

use super::{check_status, ProviderProtocol};
use crate::data_source::SourceFailure;
use crate::http_client::{HttpAuth, HttpRequest, HttpResponse};
use crate::normalize::{DateFormat, ProviderSchema, RawRecord, RawValue};
use crate::{DateRange, ProviderId};

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

const SCHEMA: ProviderSchema = ProviderSchema {
    date_field: "date",
    value_field: "4. close",
    date_format: DateFormat::Iso,
    missing_markers: &[],
};

/// Alpha Vantage `FX_DAILY`. Symbols are six-letter pairs such as `EURUSD`.
///
/// The endpoint has no date filter; the adapter trims to the requested range.
#[derive(Debug, Clone)]
pub struct AlphaVantageProtocol {
    base_url: String,
    auth: HttpAuth,
}

impl AlphaVantageProtocol {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            auth: HttpAuth::query_param("apikey", api_key),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl ProviderProtocol for AlphaVantageProtocol {
    fn provider(&self) -> ProviderId {
        ProviderId::AlphaVantage
    }

    fn schema(&self) -> ProviderSchema {
        SCHEMA
    }

    fn build_request(&self, symbol: &str, _range: &DateRange) -> Result<HttpRequest, SourceFailure> {
        if symbol.len() != 6 || !symbol.is_ascii() {
            return Err(SourceFailure::no_data(format!(
                "'{symbol}' is not a currency pair"
            )));
        }
        let (from, to) = symbol.split_at(3);
        let url = format!(
            "{}?function=FX_DAILY&from_symbol={}&to_symbol={}&outputsize=full",
            self.base_url,
            urlencoding::encode(from),
            urlencoding::encode(to),
        );
        Ok(HttpRequest::get(url).with_auth(&self.auth))
    }

    fn interpret(&self, response: &HttpResponse) -> Result<Vec<RawRecord>, SourceFailure> {
        check_status(ProviderId::AlphaVantage, response)?;

        let payload: AlphaVantageFxDaily = serde_json::from_str(&response.body)
            .map_err(|e| SourceFailure::parse(format!("failed to parse alphavantage payload: {e}")))?;

        // Quota and key problems arrive as 200 responses with a notice instead of data.
        if let Some(notice) = payload.note.or(payload.information) {
            if notice.contains("apikey") && notice.contains("invalid") {
                return Err(SourceFailure::unauthorized(notice));
            }
            return Err(SourceFailure::rate_limited(notice));
        }
        if let Some(message) = payload.error_message {
            return Err(SourceFailure::no_data(message));
        }

        let Some(series) = payload.series else {
            return Err(SourceFailure::parse("alphavantage payload has no daily series"));
        };

        Ok(series
            .into_iter()
            .map(|(date, bar)| RawRecord {
                date: Some(RawValue::Text(date)),
                value: bar.get(SCHEMA.value_field).and_then(RawValue::from_json),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct AlphaVantageFxDaily {
    #[serde(rename = "Time Series FX (Daily)", default)]
    series: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
    #[serde(rename = "Error Message", default)]
    error_message: Option<String>,
}
