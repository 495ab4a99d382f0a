// Query errors for the Prometheus HTTP API

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("prometheus returned HTTP {status} for {url}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },
    #[error("query not successful: status={status} errorType={error_type} error={error}")]
    Unsuccessful {
        status: String,
        error_type: String,
        error: String,
    },
    #[error("successful response carried no data")]
    MissingData,
    #[error("failed to decode prometheus response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid sample value '{raw}'")]
    InvalidSample { raw: String },
    #[error("unexpected result type: expected {expected}, got {actual}")]
    UnexpectedResultType {
        expected: &'static str,
        actual: String,
    },
}
