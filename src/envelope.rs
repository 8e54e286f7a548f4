//! Result envelope and JSON encoding
//!
//! Every request prints exactly one document on stdout: `{"result": {...}}`
//! or `{"error": {...}}`. Non-finite floats never reach the JSON encoder as
//! numbers; they are written as the strings `"nan"`, `"inf"` and `"-inf"`.

use crate::errors::{ErrorKind, SdvError};
use crate::metadata::{GroupMetadata, VariableDescriptor};
use crate::plot::PlotStrategy;
use crate::registry::FormatInfo;
use crate::types::AttributeValue;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::error;

/// Serialize an `f64`, replacing non-finite values by sentinel strings.
pub fn serialize_float<S: Serializer>(value: f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_nan() {
        serializer.serialize_str("nan")
    } else if value == f64::INFINITY {
        serializer.serialize_str("inf")
    } else if value == f64::NEG_INFINITY {
        serializer.serialize_str("-inf")
    } else {
        serializer.serialize_f64(value)
    }
}

/// `{"result": ...}` or `{"error": ...}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope<T, E> {
    Result(T),
    Error(E),
}

impl<T: Serialize, E: Serialize> Envelope<T, E> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Result(_))
    }

    /// Encode as a single JSON document.
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to encode result envelope");
                serde_json::json!({
                    "error": {
                        "message": format!("failed to encode result: {}", e),
                        "errorKind": ErrorKind::DecodeFailure,
                    }
                })
                .to_string()
            }
        }
    }
}

/// Successful `info` payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResult {
    pub format_info: FormatInfo,
    pub used_backend: String,
    pub file_size: u64,
    pub text_repr: String,
    pub markup_repr: String,
    pub versions: String,
    pub dimensions_flattened: BTreeMap<String, BTreeMap<String, usize>>,
    pub variables_flattened: BTreeMap<String, Vec<VariableDescriptor>>,
    pub coordinates_flattened: BTreeMap<String, Vec<VariableDescriptor>>,
    pub attributes_flattened: BTreeMap<String, BTreeMap<String, AttributeValue>>,
    pub text_repr_flattened: BTreeMap<String, String>,
    pub markup_repr_flattened: BTreeMap<String, String>,
}

impl InfoResult {
    /// Distribute per-group metadata into the flattened maps.
    pub fn with_groups(mut self, groups: BTreeMap<String, GroupMetadata>) -> Self {
        for (path, group) in groups {
            self.dimensions_flattened.insert(path.clone(), group.dimensions);
            self.variables_flattened.insert(path.clone(), group.variables);
            self.coordinates_flattened.insert(path.clone(), group.coordinates);
            self.attributes_flattened.insert(path, group.attributes);
        }
        self
    }
}

/// Failed `info` payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoError {
    pub message: String,
    pub error_kind: ErrorKind,
    pub suggestion: String,
    pub format_info: FormatInfo,
    pub versions: String,
}

impl InfoError {
    pub fn new(error: &SdvError, format_info: FormatInfo, versions: String) -> Self {
        Self {
            message: error.to_string(),
            error_kind: error.kind(),
            suggestion: error.suggestion(),
            format_info,
            versions,
        }
    }
}

/// Successful `plot` payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotResult {
    /// Base64-encoded PNG
    pub plot_data: String,
    pub format_info: FormatInfo,
    pub strategy: PlotStrategy,
}

/// Failed `plot` payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotError {
    pub message: String,
    pub error_kind: ErrorKind,
    pub format_info: FormatInfo,
}

impl PlotError {
    pub fn new(error: &SdvError, format_info: FormatInfo) -> Self {
        Self {
            message: error.to_string(),
            error_kind: error.kind(),
            format_info,
        }
    }
}

/// `versions` payload
#[derive(Debug, Serialize)]
pub struct VersionsResult {
    pub versions: String,
}

/// Failure before any request runs, e.g. a bad settings file or log filter
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupError {
    pub message: String,
    pub error_kind: ErrorKind,
    pub suggestion: String,
}

impl StartupError {
    pub fn new(error: &SdvError) -> Self {
        Self {
            message: error.to_string(),
            error_kind: error.kind(),
            suggestion: error.suggestion(),
        }
    }
}

pub type InfoEnvelope = Envelope<InfoResult, InfoError>;
pub type PlotEnvelope = Envelope<PlotResult, PlotError>;
pub type StartupEnvelope = Envelope<(), StartupError>;

/// Envelope reporting a startup failure as an invalid request.
pub fn startup_error(message: impl Into<String>) -> StartupEnvelope {
    let error = SdvError::InvalidRequest {
        message: message.into(),
    };
    Envelope::Error(StartupError::new(&error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn serialize_float_ref<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_float(*value, serializer)
    }

    #[derive(Serialize)]
    struct Wrapper(#[serde(serialize_with = "serialize_float_ref")] f64);

    #[test]
    fn test_non_finite_sentinels() {
        assert_eq!(serde_json::to_string(&Wrapper(f64::NAN)).unwrap(), "\"nan\"");
        assert_eq!(serde_json::to_string(&Wrapper(f64::INFINITY)).unwrap(), "\"inf\"");
        assert_eq!(serde_json::to_string(&Wrapper(f64::NEG_INFINITY)).unwrap(), "\"-inf\"");
        assert_eq!(serde_json::to_string(&Wrapper(2.5)).unwrap(), "2.5");
    }

    #[test]
    fn test_envelope_tags() {
        let ok: Envelope<VersionsResult, ()> = Envelope::Result(VersionsResult {
            versions: "v".to_string(),
        });
        let value: Value = serde_json::from_str(&ok.to_json()).unwrap();
        assert_eq!(value, json!({"result": {"versions": "v"}}));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_plot_error_shape() {
        let format_info = FormatInfo {
            extension: ".nc".to_string(),
            display_name: "NetCDF".to_string(),
            available_backends: vec!["netcdf".to_string()],
            missing_dependencies: vec![],
            candidates: vec![],
            registered: true,
        };
        let err = SdvError::VariableNotFound {
            var: "nonexistent".to_string(),
            group: "/".to_string(),
        };
        let envelope: PlotEnvelope = Envelope::Error(PlotError::new(&err, format_info));
        let value: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(value["error"]["errorKind"], "VariableNotFound");
        assert_eq!(value["error"]["formatInfo"]["displayName"], "NetCDF");
    }

    #[test]
    fn test_startup_error_is_invalid_request() {
        let envelope = startup_error("failed to load settings: sdv.yaml: missing field");
        assert!(!envelope.is_ok());
        let value: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(value["error"]["errorKind"], "InvalidRequest");
        assert!(value["error"]["message"].as_str().unwrap().contains("sdv.yaml"));
        assert!(!value["error"]["suggestion"].as_str().unwrap().is_empty());
        assert!(value.get("result").is_none());
    }
}
