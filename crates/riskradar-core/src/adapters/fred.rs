use serde::Deserialize;

use super::{check_status, ProviderProtocol};
use crate::data_source::SourceFailure;
use crate::domain::format_date;
use crate::http_client::{HttpAuth, HttpRequest, HttpResponse};
use crate::normalize::{DateFormat, ProviderSchema, RawRecord};
use crate::{DateRange, ProviderId};

const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org/fred";

const SCHEMA: ProviderSchema = ProviderSchema {
    date_field: "date",
    value_field: "value",
    date_format: DateFormat::Iso,
    missing_markers: &["."],
};

/// FRED `series/observations` JSON API.
#[derive(Debug, Clone)]
pub struct FredProtocol {
    base_url: String,
    auth: HttpAuth,
}

impl FredProtocol {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            auth: HttpAuth::query_param("api_key", api_key),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl ProviderProtocol for FredProtocol {
    fn provider(&self) -> ProviderId {
        ProviderId::Fred
    }

    fn schema(&self) -> ProviderSchema {
        SCHEMA
    }

    fn build_request(&self, symbol: &str, range: &DateRange) -> Result<HttpRequest, SourceFailure> {
        let url = format!(
            "{}/series/observations?series_id={}&observation_start={}&observation_end={}&file_type=json",
            self.base_url,
            urlencoding::encode(symbol),
            format_date(range.start()),
            format_date(range.end()),
        );
        Ok(HttpRequest::get(url).with_auth(&self.auth))
    }

    fn interpret(&self, response: &HttpResponse) -> Result<Vec<RawRecord>, SourceFailure> {
        // FRED reports a bad key as a 400 with an explanatory message.
        if response.status == 400 {
            if let Ok(error) = serde_json::from_str::<FredError>(&response.body) {
                if error.error_message.contains("api_key") {
                    return Err(SourceFailure::unauthorized(error.error_message));
                }
                return Err(SourceFailure::no_data(error.error_message));
            }
        }
        check_status(ProviderId::Fred, response)?;

        let payload: FredObservations = serde_json::from_str(&response.body)
            .map_err(|e| SourceFailure::parse(format!("failed to parse fred observations: {e}")))?;

        Ok(payload
            .observations
            .iter()
            .map(|row| RawRecord::from_json_row(row, &SCHEMA))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct FredObservations {
    #[serde(default)]
    observations: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FredError {
    error_message: String,
}
