use super::{check_status, ProviderProtocol};
use crate::data_source::SourceFailure;
use crate::domain::format_date;
use crate::http_client::{HttpRequest, HttpResponse};
use crate::normalize::{DateFormat, ProviderSchema, RawRecord, RawValue};
use crate::{DateRange, ProviderId};

const DEFAULT_BASE_URL: &str = "https://fred.stlouisfed.org/graph/fredgraph.csv";

// The CSV is read by position: first column is the date, second the value.
const SCHEMA: ProviderSchema = ProviderSchema {
    date_field: "observation_date",
    value_field: "value",
    date_format: DateFormat::Iso,
    missing_markers: &["."],
};

/// Keyless FRED graph CSV download.
#[derive(Debug, Clone)]
pub struct FredGraphProtocol {
    base_url: String,
}

impl Default for FredGraphProtocol {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }
}

impl FredGraphProtocol {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ProviderProtocol for FredGraphProtocol {
    fn provider(&self) -> ProviderId {
        ProviderId::FredGraph
    }

    fn schema(&self) -> ProviderSchema {
        SCHEMA
    }

    fn build_request(&self, symbol: &str, range: &DateRange) -> Result<HttpRequest, SourceFailure> {
        let url = format!(
            "{}?id={}&cosd={}&coed={}",
            self.base_url,
            urlencoding::encode(symbol),
            format_date(range.start()),
            format_date(range.end()),
        );
        Ok(HttpRequest::get(url).with_header("accept", "text/csv"))
    }

    fn interpret(&self, response: &HttpResponse) -> Result<Vec<RawRecord>, SourceFailure> {
        check_status(ProviderId::FredGraph, response)?;

        let body = response.body.trim_start();
        if body.starts_with('<') {
            // Unknown ids come back as an HTML error page.
            return Err(SourceFailure::no_data("fredgraph returned an html page"));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| SourceFailure::parse(format!("failed to read fredgraph header: {e}")))?;
        if headers.len() < 2 {
            return Err(SourceFailure::parse(format!(
                "fredgraph csv has {} column(s), expected 2",
                headers.len()
            )));
        }

        let mut records = Vec::new();
        for row in reader.records() {
            let Ok(row) = row else {
                records.push(RawRecord {
                    date: None,
                    value: None,
                });
                continue;
            };
            records.push(RawRecord {
                date: row.get(0).map(RawValue::from),
                value: row.get(1).map(RawValue::from),
            });
        }

        Ok(records)
    }
}
