use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorCode {
    Network,
    Flood,
    NotAvailable,
    BadRequest,
    Internal,
}

/// Terminal failure of a single RPC request.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct RpcFailure {
    pub code: RpcErrorCode,
    pub message: String,
}

impl RpcFailure {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Network, message)
    }
}
