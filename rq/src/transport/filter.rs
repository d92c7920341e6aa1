//! Dispatch filter: which outgoing calls go through the scheduler

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version marker carried by JSON-RPC 2.0 requests
pub const JSON_RPC_VERSION: &str = "2.0";

/// Arguments of one outgoing transport call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    pub payload: Value,
}

impl RpcCall {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// True when the payload is a JSON-RPC request
    pub fn is_json_rpc(&self) -> bool {
        is_json_rpc_payload(&self.payload)
    }
}

/// True when `payload` is an object with `"jsonrpc": "2.0"` and a string `method`
pub fn is_json_rpc_payload(payload: &Value) -> bool {
    let Some(object) = payload.as_object() else {
        return false;
    };

    object.get("jsonrpc").and_then(Value::as_str) == Some(JSON_RPC_VERSION)
        && object.get("method").is_some_and(Value::is_string)
}
