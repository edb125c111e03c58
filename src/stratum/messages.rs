//! Stratum wire messages.
//!
//! The three dialects share one framing: a single JSON object per line,
//! loosely following JSON-RPC 1.0 or 2.0. Pool implementations are sloppy
//! about which, so incoming frames are captured into a permissive envelope
//! first and validated per version afterwards, the way the pools actually
//! behave rather than the way the specs read.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{StratumError, StratumResult};

/// JSON-RPC version of a frame, inferred from the `jsonrpc` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcVersion {
    V1,
    V2,
}

/// One incoming frame, before classification.
///
/// Every member is optional; validation decides what the combination means.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Parse one line into a raw message.
///
/// A line that is not a JSON object maps to [`StratumError::Frame`], which
/// the session logs and survives.
pub fn parse_line(line: &str) -> StratumResult<RawMessage> {
    serde_json::from_str(line).map_err(|e| StratumError::Frame(format!("{e}: {line}")))
}

impl RawMessage {
    /// V2 when the frame carries a `jsonrpc` member, V1 otherwise.
    pub fn rpc_version(&self) -> RpcVersion {
        if self.jsonrpc.is_some() {
            RpcVersion::V2
        } else {
            RpcVersion::V1
        }
    }

    /// Frames with a `method` are notifications (or server requests); the
    /// rest are responses to something we sent.
    pub fn is_notification(&self) -> bool {
        self.method.is_some()
    }

    /// Sanity-check the frame against its claimed JSON-RPC version.
    ///
    /// Violations here are grounds for disconnect; they mean the pool is
    /// emitting frames we cannot safely interpret.
    pub fn validate(&self) -> StratumResult<()> {
        match self.rpc_version() {
            RpcVersion::V1 => {
                if self.result.is_none() && self.method.is_none() {
                    return Err(StratumError::Protocol(
                        "jsonrpc v1 frame with neither result nor method".into(),
                    ));
                }
                if self.method.is_some() && self.params.is_none() {
                    return Err(StratumError::Protocol(
                        "jsonrpc v1 notification without params".into(),
                    ));
                }
            }
            RpcVersion::V2 => {
                if self.error.is_some() && truthy(self.result.as_ref()) {
                    return Err(StratumError::Protocol(
                        "jsonrpc v2 frame with both result and error".into(),
                    ));
                }
                if self.jsonrpc.as_deref() != Some("2.0") {
                    return Err(StratumError::Protocol(format!(
                        "unsupported jsonrpc version {:?}",
                        self.jsonrpc
                    )));
                }
                if self.method.is_some() && !non_empty(self.params.as_ref()) {
                    return Err(StratumError::Protocol(
                        "jsonrpc v2 notification without params".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The frame id as a number. Tolerates string ids; anything else is 0.
    pub fn id_u64(&self) -> u64 {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Whether a response reports success.
    ///
    /// V1: a present, non-null result that isn't `false`. V2: no error
    /// member (and not an explicit `false` result; some pools reject shares
    /// that way instead of using an error object).
    pub fn is_success(&self) -> bool {
        match self.rpc_version() {
            RpcVersion::V1 => {
                non_empty(self.result.as_ref()) && self.result != Some(Value::Bool(false))
            }
            RpcVersion::V2 => self.error.is_none() && self.result != Some(Value::Bool(false)),
        }
    }

    /// Flatten whatever the pool stuffed into `error` into one line.
    pub fn error_reason(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .map(display_fragment)
                .collect::<Vec<_>>()
                .join(" "),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| format!("{}:{}", k, display_fragment(v)))
                .collect::<Vec<_>>()
                .join(" "),
            _ => "unknown error".to_string(),
        }
    }
}

fn display_fragment(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Bool(true)))
}

fn non_empty(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// One outgoing request.
///
/// `jsonrpc` and `worker` are dialect-dependent extras: classic Stratum
/// stamps `"jsonrpc":"2.0"` on its requests, and the eth-proxy style pools
/// take the worker name as a top-level member.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    pub method: &'static str,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Vec<Value>) -> Self {
        Self {
            id,
            jsonrpc: None,
            worker: None,
            method,
            params,
        }
    }

    /// Stamp the request as JSON-RPC 2.0.
    pub fn rpc2(mut self) -> Self {
        self.jsonrpc = Some("2.0");
        self
    }

    /// Attach a top-level worker member when one is configured.
    pub fn with_worker(mut self, worker: Option<&str>) -> Self {
        self.worker = worker.map(str::to_string);
        self
    }

    pub fn to_value(&self) -> StratumResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Build the reply to `client.get_version`: echo the incoming id and rpc
/// version, answer with our agent string.
pub fn version_reply(incoming_id: Option<&Value>, version: RpcVersion, agent: &str) -> Value {
    let id = incoming_id.cloned().unwrap_or(Value::Null);
    match version {
        RpcVersion::V1 => json!({ "id": id, "result": agent, "error": null }),
        RpcVersion::V2 => json!({ "id": id, "jsonrpc": "2.0", "result": agent }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v2_response() {
        let msg = parse_line(r#"{"id":1,"result":true,"jsonrpc":"2.0"}"#).unwrap();
        assert_eq!(msg.rpc_version(), RpcVersion::V2);
        assert!(!msg.is_notification());
        assert!(msg.validate().is_ok());
        assert_eq!(msg.id_u64(), 1);
        assert!(msg.is_success());
    }

    #[test]
    fn test_parse_v1_notification() {
        let msg =
            parse_line(r#"{"id":null,"method":"mining.notify","params":["j","0xaa"]}"#).unwrap();
        assert_eq!(msg.rpc_version(), RpcVersion::V1);
        assert!(msg.is_notification());
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_malformed_line_is_frame_error() {
        assert!(matches!(parse_line("not json"), Err(StratumError::Frame(_))));
        assert!(matches!(parse_line("[1,2,3]"), Err(StratumError::Frame(_))));
    }

    #[test]
    fn test_v1_validation_rules() {
        // Neither result nor method
        let msg = parse_line(r#"{"id":1}"#).unwrap();
        assert!(matches!(msg.validate(), Err(StratumError::Protocol(_))));

        // Method without params
        let msg = parse_line(r#"{"method":"mining.notify"}"#).unwrap();
        assert!(matches!(msg.validate(), Err(StratumError::Protocol(_))));
    }

    #[test]
    fn test_v2_validation_rules() {
        // Success claimed alongside an error member
        let msg =
            parse_line(r#"{"id":1,"jsonrpc":"2.0","result":true,"error":{"code":-1}}"#).unwrap();
        assert!(matches!(msg.validate(), Err(StratumError::Protocol(_))));

        // Wrong version string
        let msg = parse_line(r#"{"id":1,"jsonrpc":"3.0","result":true}"#).unwrap();
        assert!(matches!(msg.validate(), Err(StratumError::Protocol(_))));

        // Notification with empty params
        let msg = parse_line(r#"{"jsonrpc":"2.0","method":"mining.notify","params":[]}"#).unwrap();
        assert!(matches!(msg.validate(), Err(StratumError::Protocol(_))));

        // Error response with null result is fine
        let msg = parse_line(r#"{"id":4,"jsonrpc":"2.0","result":null,"error":{"code":-1,"message":"stale"}}"#)
            .unwrap();
        assert!(msg.validate().is_ok());
        assert!(!msg.is_success());
    }

    #[test]
    fn test_success_variants() {
        assert!(parse_line(r#"{"id":4,"result":true}"#).unwrap().is_success());
        assert!(!parse_line(r#"{"id":4,"result":false}"#).unwrap().is_success());
        assert!(!parse_line(r#"{"id":4,"result":null,"error":["bad"]}"#)
            .unwrap()
            .is_success());
        assert!(!parse_line(r#"{"id":4,"jsonrpc":"2.0","result":false}"#)
            .unwrap()
            .is_success());
        // Subscribe result arrays count as success
        assert!(parse_line(r#"{"id":1,"result":[["mining.notify","x"],"abcd",4]}"#)
            .unwrap()
            .is_success());
    }

    #[test]
    fn test_error_reason_shapes() {
        let msg = parse_line(r#"{"id":4,"result":null,"error":[21,"Job not found"]}"#).unwrap();
        assert_eq!(msg.error_reason(), "21 Job not found");

        let msg =
            parse_line(r#"{"id":4,"jsonrpc":"2.0","error":{"code":-32000,"message":"stale"}}"#)
                .unwrap();
        assert_eq!(msg.error_reason(), "code:-32000 message:stale");

        let msg = parse_line(r#"{"id":4,"result":null,"error":"boom"}"#).unwrap();
        assert_eq!(msg.error_reason(), "boom");

        let msg = parse_line(r#"{"id":4,"result":null}"#).unwrap();
        assert_eq!(msg.error_reason(), "unknown error");
    }

    #[test]
    fn test_string_id_tolerated() {
        let msg = parse_line(r#"{"id":"4","result":true}"#).unwrap();
        assert_eq!(msg.id_u64(), 4);
    }

    #[test]
    fn test_request_serialization_shapes() {
        let req = Request::new(1, "mining.subscribe", vec![]).rpc2();
        let line = serde_json::to_string(&req.to_value().unwrap()).unwrap();
        assert!(line.contains(r#""id":1"#));
        assert!(line.contains(r#""jsonrpc":"2.0""#));
        assert!(line.contains(r#""params":[]"#));
        assert!(!line.contains("worker"));

        let req = Request::new(1, "eth_submitLogin", vec![json!("0xabc")])
            .with_worker(Some("rig1"));
        let line = serde_json::to_string(&req.to_value().unwrap()).unwrap();
        assert!(line.contains(r#""worker":"rig1""#));
        assert!(!line.contains("jsonrpc"));
    }

    #[test]
    fn test_version_reply_echoes_id_and_version() {
        let id = json!(7);
        let v1 = version_reply(Some(&id), RpcVersion::V1, "cinder-miner/0.3.0");
        assert_eq!(v1["id"], json!(7));
        assert_eq!(v1["error"], Value::Null);
        assert_eq!(v1["result"], json!("cinder-miner/0.3.0"));

        let id = json!("str-id");
        let v2 = version_reply(Some(&id), RpcVersion::V2, "cinder-miner/0.3.0");
        assert_eq!(v2["id"], json!("str-id"));
        assert_eq!(v2["jsonrpc"], json!("2.0"));
    }
}
