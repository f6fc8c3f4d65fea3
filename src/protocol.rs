//! JSON message codec for the controller channel.
//!
//! Decoding is total: any missing or wrong-typed field falls back to its default so a
//! malformed command can never take the worker loop down.

use crate::model::{AnalysisRequest, AnalysisResponse, EngineStatus, Perform, ProgressControl, DEFAULT_PPI};
use anyhow::{Context, Result};
use serde_json::{json, Value};

/// Decode an inbound command, substituting defaults for anything unusable.
pub fn decode_request(data: &[u8]) -> AnalysisRequest {
    let request: Value = serde_json::from_slice(data).unwrap_or(Value::Null);

    let id = request.get("id").and_then(Value::as_i64).unwrap_or(-1);
    let perform = request
        .get("perform")
        .and_then(Value::as_str)
        .map(Perform::parse)
        .unwrap_or(Perform::Run);
    let name = request
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let options = request.get("options").cloned().unwrap_or(Value::Null);
    let options = serde_json::to_string_pretty(&options).unwrap_or_else(|_| "null".into());
    let ppi = request
        .get("settings")
        .filter(|s| s.is_object())
        .and_then(|s| s.get("ppi"))
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_PPI);

    AnalysisRequest {
        id,
        perform,
        name,
        options,
        ppi,
    }
}

/// Build the outbound message for an analysis. A `status` reported by the engine inside
/// its own results takes precedence over the lifecycle status.
pub fn build_response(id: i64, name: &str, status: EngineStatus, results: &Value) -> AnalysisResponse {
    let reported = results
        .as_object()
        .and_then(|obj| obj.get("status"))
        .filter(|s| !s.is_null());

    match reported {
        Some(reported) => AnalysisResponse {
            id,
            name: name.to_string(),
            status: match reported {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            results: results.get("results").cloned().unwrap_or(Value::Null),
        },
        None => AnalysisResponse {
            id,
            name: name.to_string(),
            status: status.wire_str().to_string(),
            results: results.clone(),
        },
    }
}

pub fn encode_response(response: &AnalysisResponse) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(response).context("failed to encode analysis response")
}

/// Wire form of a progress-callback answer.
pub fn encode_control(control: &ProgressControl) -> String {
    let v = match control {
        ProgressControl::Continue => json!({ "status": "ok" }),
        ProgressControl::Changed(options) => {
            let options: Value = serde_json::from_str(options).unwrap_or(Value::Null);
            json!({ "status": "changed", "options": options })
        }
        ProgressControl::Stop => json!({ "status": "stopped" }),
        ProgressControl::Abort => json!({ "status": "aborted" }),
    };
    v.to_string()
}

/// Parse a results payload produced by the computation engine.
pub fn parse_results(blob: &str) -> Result<Value> {
    serde_json::from_str(blob).context("computation engine returned malformed results")
}

/// Paths the engine asked to keep after a completed cycle: either an array of strings
/// (non-strings skipped) or a single string under `keep`.
pub fn files_to_keep(results: &Value) -> Vec<String> {
    match results.as_object().and_then(|obj| obj.get("keep")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_request() {
        let req = decode_request(
            br#"{"id": 7, "perform": "init", "name": "ttest", "options": {"alpha": 0.05}, "settings": {"ppi": 192}}"#,
        );
        assert_eq!(req.id, 7);
        assert_eq!(req.perform, Perform::Init);
        assert_eq!(req.name, "ttest");
        assert_eq!(req.ppi, 192);
        let options: Value = serde_json::from_str(&req.options).unwrap();
        assert_eq!(options, json!({"alpha": 0.05}));
    }

    #[test]
    fn malformed_request_falls_back_to_defaults() {
        let req = decode_request(br#"{"id": 3, "settings": "wide"}"#);
        assert_eq!(req.id, 3);
        assert_eq!(req.perform, Perform::Run);
        assert_eq!(req.name, "");
        assert_eq!(req.options, "null");
        assert_eq!(req.ppi, DEFAULT_PPI);

        let req = decode_request(br#"{"settings": {"ppi": 72.5}, "perform": 4}"#);
        assert_eq!(req.id, -1);
        assert_eq!(req.perform, Perform::Run);
        assert_eq!(req.ppi, DEFAULT_PPI);

        let req = decode_request(b"\x00not json");
        assert_eq!(req.id, -1);
        assert_eq!(req.perform, Perform::Run);
    }

    #[test]
    fn unknown_perform_is_preserved() {
        let req = decode_request(br#"{"id": 1, "perform": "close"}"#);
        assert_eq!(req.perform, Perform::Other("close".into()));
    }

    #[test]
    fn engine_reported_status_takes_precedence() {
        let results = json!({"status": "validationError", "results": {"error": "bad"}});
        let resp = build_response(4, "anova", EngineStatus::Complete, &results);
        assert_eq!(resp.status, "validationError");
        assert_eq!(resp.results, json!({"error": "bad"}));
    }

    #[test]
    fn lifecycle_status_used_without_engine_status() {
        let results = json!({"table": [1, 2]});
        let resp = build_response(4, "anova", EngineStatus::Changed, &results);
        assert_eq!(resp.status, "running");
        assert_eq!(resp.results, results);

        let resp = build_response(4, "anova", EngineStatus::Aborted, &Value::Null);
        assert_eq!(resp.status, "error");
        assert_eq!(resp.results, Value::Null);
    }

    #[test]
    fn control_encoding_matches_wire_format() {
        assert_eq!(encode_control(&ProgressControl::Continue), r#"{"status":"ok"}"#);
        assert_eq!(encode_control(&ProgressControl::Stop), r#"{"status":"stopped"}"#);
        assert_eq!(encode_control(&ProgressControl::Abort), r#"{"status":"aborted"}"#);
        let changed: Value =
            serde_json::from_str(&encode_control(&ProgressControl::Changed(r#"{"a": 1}"#.into()))).unwrap();
        assert_eq!(changed, json!({"status": "changed", "options": {"a": 1}}));
    }

    #[test]
    fn keep_list_shapes() {
        assert_eq!(files_to_keep(&json!({"keep": ["a.png", 3, "b.png"]})), vec!["a.png", "b.png"]);
        assert_eq!(files_to_keep(&json!({"keep": "state"})), vec!["state"]);
        assert!(files_to_keep(&json!({"keep": {"x": 1}})).is_empty());
        assert!(files_to_keep(&json!(["a.png"])).is_empty());
    }
}
