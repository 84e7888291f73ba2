use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

/// User declined a proposal or request.
pub const USER_REJECTED: i64 = 4001;
/// User tore down a session.
pub const USER_DISCONNECTED: i64 = 6000;

// WalletConnect SDK codes used when a proposal asks for something we cannot serve.
pub const UNSUPPORTED_CHAINS: i64 = 5100;
pub const UNSUPPORTED_METHODS: i64 = 5101;
pub const UNSUPPORTED_EVENTS: i64 = 5102;
pub const UNSUPPORTED_NAMESPACE_KEY: i64 = 5104;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReason {
    pub code: i64,
    pub message: String,
}

impl ErrorReason {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected_session() -> Self {
        Self::new(USER_REJECTED, "User rejected the session")
    }

    pub fn user_rejected_request() -> Self {
        Self::new(USER_REJECTED, "User rejected the request")
    }

    pub fn user_disconnected() -> Self {
        Self::new(USER_DISCONNECTED, "User disconnected the session")
    }
}

/// JSON-RPC 2.0 response envelope. Serializes to exactly
/// `{id, jsonrpc, result}` or `{id, jsonrpc, error: {code, message}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponse {
    Error {
        id: u64,
        jsonrpc: String,
        error: ErrorReason,
    },
    Success {
        id: u64,
        jsonrpc: String,
        result: serde_json::Value,
    },
}

impl JsonRpcResponse {
    pub fn id(&self) -> u64 {
        match self {
            JsonRpcResponse::Error { id, .. } | JsonRpcResponse::Success { id, .. } => *id,
        }
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            JsonRpcResponse::Success { result, .. } => Some(result),
            JsonRpcResponse::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorReason> {
        match self {
            JsonRpcResponse::Error { error, .. } => Some(error),
            JsonRpcResponse::Success { .. } => None,
        }
    }
}

pub fn encode_success(id: u64, result: serde_json::Value) -> JsonRpcResponse {
    JsonRpcResponse::Success {
        id,
        jsonrpc: JSONRPC_VERSION.to_string(),
        result,
    }
}

pub fn encode_error(id: u64, code: i64, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::Error {
        id,
        jsonrpc: JSONRPC_VERSION.to_string(),
        error: ErrorReason::new(code, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_shape() {
        let encoded = serde_json::to_value(encode_success(7, json!("0xdead"))).unwrap();
        assert_eq!(
            encoded,
            json!({"id": 7, "jsonrpc": "2.0", "result": "0xdead"})
        );
    }

    #[test]
    fn null_results_are_kept() {
        let encoded = serde_json::to_value(encode_success(3, serde_json::Value::Null)).unwrap();
        assert_eq!(encoded, json!({"id": 3, "jsonrpc": "2.0", "result": null}));
    }

    #[test]
    fn error_envelope_shape() {
        let encoded =
            serde_json::to_value(encode_error(9, USER_REJECTED, "User rejected the request"))
                .unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": 9,
                "jsonrpc": "2.0",
                "error": {"code": 4001, "message": "User rejected the request"}
            })
        );
    }

    #[test]
    fn decodes_either_variant() {
        let ok: JsonRpcResponse =
            serde_json::from_value(json!({"id": 1, "jsonrpc": "2.0", "result": "0x"})).unwrap();
        assert_eq!(ok.result(), Some(&json!("0x")));

        let err: JsonRpcResponse = serde_json::from_value(json!({
            "id": 2,
            "jsonrpc": "2.0",
            "error": {"code": 6000, "message": "User disconnected the session"}
        }))
        .unwrap();
        assert_eq!(err.error(), Some(&ErrorReason::user_disconnected()));
        assert_eq!(err.id(), 2);
    }
}
