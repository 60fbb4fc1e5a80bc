//! Server-provided call configuration, cached with a refresh cooldown.

use std::time::{Duration, Instant};

use shared::protocol::{RpcMethod, RpcResponse};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::RpcSender;

/// Fallback ring timeout until the first successful config fetch.
pub const DEFAULT_RING_TIMEOUT_MS: i64 = 90_000;
pub const DEFAULT_RECEIVE_TIMEOUT_MS: i64 = 20_000;

const REFRESH_COOLDOWN: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallConfig {
    pub ring_timeout_ms: i64,
    pub receive_timeout_ms: i64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout_ms: DEFAULT_RING_TIMEOUT_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
        }
    }
}

struct CallConfigState {
    config: CallConfig,
    last_fetch: Option<Instant>,
    refreshing: bool,
}

pub struct CallConfigCache {
    inner: Mutex<CallConfigState>,
    cooldown: Duration,
}

impl CallConfigCache {
    pub fn new() -> Self {
        Self::with_cooldown(REFRESH_COOLDOWN)
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(CallConfigState {
                config: CallConfig::default(),
                last_fetch: None,
                refreshing: false,
            }),
            cooldown,
        }
    }

    pub async fn ring_timeout_ms(&self) -> i64 {
        self.inner.lock().await.config.ring_timeout_ms
    }

    pub async fn config(&self) -> CallConfig {
        self.inner.lock().await.config
    }

    /// Refresh from the server unless one is in flight or the cooldown has
    /// not elapsed. Returns whether a request was actually issued.
    pub async fn refresh(&self, rpc: &dyn RpcSender) -> bool {
        {
            let mut state = self.inner.lock().await;
            if state.refreshing {
                return false;
            }
            let cooling_down = state
                .last_fetch
                .is_some_and(|at| at.elapsed() < self.cooldown);
            if cooling_down {
                debug!("call config refresh suppressed by cooldown");
                return false;
            }
            state.refreshing = true;
        }

        let result = rpc.request(RpcMethod::GetCallConfig).await;

        let mut state = self.inner.lock().await;
        state.refreshing = false;
        match result {
            Ok(RpcResponse::CallConfig {
                ring_timeout_ms,
                receive_timeout_ms,
            }) => {
                state.config = CallConfig {
                    ring_timeout_ms,
                    receive_timeout_ms,
                };
                state.last_fetch = Some(Instant::now());
            }
            Ok(other) => {
                warn!(?other, "unexpected response to call config request");
            }
            Err(err) => {
                warn!(error = %err, "call config refresh failed");
            }
        }
        true
    }
}

impl Default for CallConfigCache {
    fn default() -> Self {
        Self::new()
    }
}
