//! Wire types for the Hop quote API and EVM JSON-RPC.

use serde::{Deserialize, Serialize};

/// Response of `GET /v1/quote`.
///
/// Amounts are decimal strings in the token's native precision.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HopQuote {
    pub amount_in: String,
    #[serde(default)]
    pub slippage: Option<f64>,
    #[serde(default)]
    pub amount_out_min: Option<String>,
    #[serde(default)]
    pub bonder_fee: Option<String>,
    /// The API has shipped this field misspelled; accept both.
    #[serde(alias = "estimatedRecieved")]
    pub estimated_received: String,
}

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<P: Serialize> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: P,
}

impl<P: Serialize> RpcRequest<P> {
    pub fn new(id: u64, method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// Call object of `eth_call`.
#[derive(Debug, Clone, Serialize)]
pub struct CallRequest {
    pub to: String,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}
