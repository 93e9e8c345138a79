//! Prometheus HTTP API response shapes (`/api/v1/query`).

use std::collections::BTreeMap;

use bw_acquire::AcquisitionError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<Sample>,
}

/// One instant-vector element: label set plus `[timestamp, "value"]`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub value: (f64, String),
}

impl Sample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// The sample value as a finite float.
    pub fn number(&self) -> Result<f64, String> {
        let raw = self.value.1.trim();
        let v: f64 = raw.parse().map_err(|_| format!("value {raw:?} is not a number"))?;
        if !v.is_finite() {
            return Err(format!("value {raw:?} is not finite"));
        }
        Ok(v)
    }

    /// The sample value as an integral code.
    pub fn code(&self) -> Result<i64, String> {
        let v = self.number()?;
        if v.fract() != 0.0 {
            return Err(format!("value {v} is not an integer code"));
        }
        Ok(v as i64)
    }
}

#[derive(Debug, Deserialize)]
pub struct BuildInfoResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<BuildInfo>,
}

#[derive(Debug, Deserialize)]
pub struct BuildInfo {
    #[serde(default)]
    pub version: String,
}

/// Unwrap an instant-vector result.
pub fn into_vector(resp: QueryResponse) -> Result<Vec<Sample>, AcquisitionError> {
    if resp.status != "success" {
        return Err(AcquisitionError::Decode(format!(
            "query failed: {}: {}",
            resp.error_type.unwrap_or_else(|| "error".to_string()),
            resp.error.unwrap_or_default()
        )));
    }
    let data = resp.data.ok_or_else(|| AcquisitionError::Decode("response has no data".to_string()))?;
    if data.result_type != "vector" {
        return Err(AcquisitionError::Decode(format!("expected a vector result, got {}", data.result_type)));
    }
    Ok(data.result)
}

/// Parse a raw response body.
pub fn parse_vector(body: &str) -> Result<Vec<Sample>, AcquisitionError> {
    let resp: QueryResponse = serde_json::from_str(body).map_err(|e| AcquisitionError::Decode(e.to_string()))?;
    into_vector(resp)
}
