// Prometheus API response decoding. Sample values arrive as strings and are
// parsed exactly once here; a value that does not parse is an error.

use serde::Deserialize;

use crate::error::QueryError;
use crate::models::{Labels, RawSeries, Sample};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MatrixItem {
    #[serde(default)]
    metric: Labels,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

#[derive(Debug, Deserialize)]
struct VectorItem {
    value: (f64, String),
}

fn decode_data(body: &[u8]) -> Result<ApiData, QueryError> {
    let resp: ApiResponse =
        serde_json::from_slice(body).map_err(|source| QueryError::Decode { source })?;
    if resp.status != "success" {
        return Err(QueryError::Unsuccessful {
            status: resp.status,
            error_type: resp.error_type.unwrap_or_default(),
            error: resp.error.unwrap_or_default(),
        });
    }
    resp.data.ok_or(QueryError::MissingData)
}

/// Decodes a `query_range` body; the result must be a matrix.
pub fn decode_matrix(body: &[u8]) -> Result<Vec<RawSeries>, QueryError> {
    let data = decode_data(body)?;
    if data.result_type != "matrix" {
        return Err(QueryError::UnexpectedResultType {
            expected: "matrix",
            actual: data.result_type,
        });
    }
    let items: Vec<MatrixItem> =
        serde_json::from_value(data.result).map_err(|source| QueryError::Decode { source })?;

    items
        .into_iter()
        .map(|item| {
            let samples = item
                .values
                .iter()
                .map(|(ts, raw)| {
                    Ok(Sample {
                        timestamp: *ts,
                        value: parse_value(raw)?,
                    })
                })
                .collect::<Result<Vec<_>, QueryError>>()?;
            Ok(RawSeries::new(item.metric, samples))
        })
        .collect()
}

/// Decodes a `query` body to one number: first vector element or the scalar.
/// An empty vector yields `default`.
pub fn decode_instant(body: &[u8], default: f64) -> Result<f64, QueryError> {
    let data = decode_data(body)?;
    match data.result_type.as_str() {
        "vector" => {
            let items: Vec<VectorItem> = serde_json::from_value(data.result)
                .map_err(|source| QueryError::Decode { source })?;
            match items.first() {
                Some(item) => parse_value(&item.value.1),
                None => Ok(default),
            }
        }
        "scalar" => {
            let (_, raw): (f64, String) = serde_json::from_value(data.result)
                .map_err(|source| QueryError::Decode { source })?;
            parse_value(&raw)
        }
        other => Err(QueryError::UnexpectedResultType {
            expected: "vector or scalar",
            actual: other.to_string(),
        }),
    }
}

/// Prometheus encodes sample values as strings ("12.5", "NaN", "+Inf").
pub fn parse_value(raw: &str) -> Result<f64, QueryError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| QueryError::InvalidSample {
            raw: raw.to_string(),
        })
}
