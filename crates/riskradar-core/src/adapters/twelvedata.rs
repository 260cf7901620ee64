use serde::Deserialize;

use super::{check_status, ProviderProtocol};
use crate::data_source::SourceFailure;
use crate::domain::format_date;
use crate::http_client::{HttpAuth, HttpRequest, HttpResponse};
use crate::normalize::{DateFormat, ProviderSchema, RawRecord};
use crate::{DateRange, ProviderId};

const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";

const SCHEMA: ProviderSchema = ProviderSchema {
    date_field: "datetime",
    value_field: "close",
    date_format: DateFormat::Iso,
    missing_markers: &[],
};

/// Twelve Data `time_series` endpoint with daily bars.
#[derive(Debug, Clone)]
pub struct TwelveDataProtocol {
    base_url: String,
    auth: HttpAuth,
}

impl TwelveDataProtocol {
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

impl ProviderProtocol for TwelveDataProtocol {
    fn provider(&self) -> ProviderId {
        ProviderId::TwelveData
    }

    fn schema(&self) -> ProviderSchema {
        SCHEMA
    }

    fn build_request(&self, symbol: &str, range: &DateRange) -> Result<HttpRequest, SourceFailure> {
        let url = format!(
            "{}/time_series?symbol={}&interval=1day&start_date={}&end_date={}&outputsize=5000&order=ASC",
            self.base_url,
            urlencoding::encode(symbol),
            format_date(range.start()),
            format_date(range.end()),
        );
        Ok(HttpRequest::get(url).with_auth(&self.auth))
    }

    fn interpret(&self, response: &HttpResponse) -> Result<Vec<RawRecord>, SourceFailure> {
        check_status(ProviderId::TwelveData, response)?;

        let payload: TwelveDataTimeSeries = serde_json::from_str(&response.body)
            .map_err(|e| SourceFailure::parse(format!("failed to parse twelvedata payload: {e}")))?;

        // Errors come back with HTTP 200 and the real status in the body.
        if payload.status.as_deref() == Some("error") {
            let message = payload
                .message
                .unwrap_or_else(|| String::from("twelvedata returned an error"));
            return Err(match payload.code {
                Some(429) => SourceFailure::rate_limited(message),
                Some(401) | Some(403) => SourceFailure::unauthorized(message),
                Some(400) | Some(404) => SourceFailure::no_data(message),
                _ => SourceFailure::network(message),
            });
        }

        Ok(payload
            .values
            .iter()
            .map(|row| RawRecord::from_json_row(row, &SCHEMA))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct TwelveDataTimeSeries {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    values: Vec<serde_json::Value>,
}
