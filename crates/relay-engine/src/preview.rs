//! Human-readable previews of a pending session request, so the user can see
//! what they are about to sign before approving it.

use bridge_proto::{parse_quantity, ChainId, SessionRequest};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::dispatcher::{decode_typed_data, Route};

const SIMULATOR_URL: &str = "https://dashboard.tenderly.co/simulator/new";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEncoding {
    /// Hex payload that decoded to valid UTF-8.
    Utf8,
    /// Hex payload that is not text; shown as-is.
    Hex,
    /// Not hex at all; shown as-is.
    Plain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPreview {
    Message {
        text: String,
        encoding: MessageEncoding,
    },
    TypedData {
        domain: Value,
        types: Value,
        primary_type: Value,
        message: Value,
    },
    Transaction {
        to: Option<String>,
        value: String,
        data: String,
        simulation_url: Option<String>,
    },
    SwitchChain {
        chain_id: Option<String>,
    },
    AddChain {
        params: Value,
    },
    Raw {
        method: String,
        params: Value,
    },
}

pub fn decode_sign_message(message: &str) -> (String, MessageEncoding) {
    let Some(hex_body) = message.strip_prefix("0x") else {
        return (message.to_string(), MessageEncoding::Plain);
    };
    match hex::decode(hex_body)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    {
        Some(text) => (text, MessageEncoding::Utf8),
        None => (message.to_string(), MessageEncoding::Hex),
    }
}

/// Link to a transaction simulation for `from` on `chain`. `None` when the
/// transaction has no recipient (contract creation).
pub fn simulation_url(
    from: &str,
    to: Option<&str>,
    value: &str,
    data: &str,
    chain: ChainId,
) -> Option<String> {
    let to = to?;
    let network = chain.to_string();
    Url::parse_with_params(
        SIMULATOR_URL,
        &[
            ("from", from),
            ("contractAddress", to),
            ("value", value),
            ("rawFunctionInput", data),
            ("network", network.as_str()),
        ],
    )
    .ok()
    .map(String::from)
}

/// Builds the preview for `request` as it would be signed by `from`.
pub fn preview(request: &SessionRequest, from: &str) -> RequestPreview {
    let first = request.param(0);
    match Route::resolve(&request.method) {
        Route::SignMessage => match first.and_then(Value::as_str) {
            Some(message) => {
                let (text, encoding) = decode_sign_message(message);
                RequestPreview::Message { text, encoding }
            }
            None => raw(request),
        },
        Route::SignTypedData => match request.param(1) {
            Some(data) => {
                let data = decode_typed_data(data);
                let field = |name: &str| data.get(name).cloned().unwrap_or(Value::Null);
                RequestPreview::TypedData {
                    domain: field("domain"),
                    types: field("types"),
                    primary_type: field("primaryType"),
                    message: field("message"),
                }
            }
            None => raw(request),
        },
        Route::SendTransaction => match first.filter(|tx| tx.is_object()) {
            Some(tx) => transaction_preview(request, tx, from),
            None => raw(request),
        },
        Route::SwitchChain => RequestPreview::SwitchChain {
            chain_id: first
                .and_then(|p| p.get("chainId"))
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        Route::AddChain => RequestPreview::AddChain {
            params: first.cloned().unwrap_or(Value::Null),
        },
        Route::Acknowledge => raw(request),
    }
}

fn transaction_preview(request: &SessionRequest, tx: &Value, from: &str) -> RequestPreview {
    let to = tx.get("to").and_then(Value::as_str).map(str::to_string);
    let value = tx
        .get("value")
        .and_then(|v| parse_quantity(v).ok())
        .unwrap_or(0)
        .to_string();
    let data = tx
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or("0x")
        .to_string();
    let simulation_url = ChainId::parse_caip2(&request.chain_id)
        .ok()
        .and_then(|chain| simulation_url(from, to.as_deref(), &value, &data, chain));
    RequestPreview::Transaction {
        to,
        value,
        data,
        simulation_url,
    }
}

fn raw(request: &SessionRequest) -> RequestPreview {
    RequestPreview::Raw {
        method: request.method.clone(),
        params: request.params.clone(),
    }
}
