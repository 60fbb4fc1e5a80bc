//! Cached Diffie-Hellman domain parameters for one-to-one call key exchange.
//!
//! One process-wide cache, refreshed from the server keyed by the cached
//! version. A full response is validated before being trusted and the
//! cached version never regresses; a not-modified response reuses the cache
//! and is an error if nothing was ever fetched.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    error::RpcFailure,
    protocol::{RpcMethod, RpcResponse},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::RpcSender;

pub const DH_RANDOM_LENGTH: i32 = 256;
const PRIME_LENGTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhConfig {
    pub version: i32,
    pub prime: Vec<u8>,
    pub g: i32,
}

/// Parameters plus fresh random material, ready to start a key exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhBootstrap {
    pub config: DhConfig,
    pub random: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum DhError {
    #[error("dh config request failed: {0}")]
    Rpc(#[from] RpcFailure),
    #[error("server returned malformed dh parameters")]
    BadParameters,
    #[error("not-modified dh response with an empty cache")]
    EmptyCache,
    #[error("unexpected response to dh config request")]
    UnexpectedResponse,
    #[error("dh config refresh already in flight")]
    AlreadyRefreshing,
}

struct DhCacheState {
    config: Option<DhConfig>,
    refreshing: bool,
}

pub struct DhConfigCache {
    inner: Mutex<DhCacheState>,
}

impl DhConfigCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DhCacheState {
                config: None,
                refreshing: false,
            }),
        }
    }

    pub async fn cached_version(&self) -> i32 {
        self.inner
            .lock()
            .await
            .config
            .as_ref()
            .map_or(0, |config| config.version)
    }

    /// Fetch parameters for a new call. A refresh already in flight
    /// suppresses the duplicate request.
    pub async fn refresh(&self, rpc: &dyn RpcSender) -> Result<DhBootstrap, DhError> {
        let version = {
            let mut state = self.inner.lock().await;
            if state.refreshing {
                debug!("dh config refresh already in flight; suppressing");
                return Err(DhError::AlreadyRefreshing);
            }
            state.refreshing = true;
            state.config.as_ref().map_or(0, |config| config.version)
        };

        let result = rpc
            .request(RpcMethod::GetDhConfig {
                version,
                random_length: DH_RANDOM_LENGTH,
            })
            .await;

        let mut state = self.inner.lock().await;
        state.refreshing = false;

        match result {
            Ok(RpcResponse::DhConfig {
                version,
                prime_b64,
                g,
                random_b64,
            }) => {
                let prime = STANDARD
                    .decode(prime_b64)
                    .map_err(|_| DhError::BadParameters)?;
                let random = STANDARD
                    .decode(random_b64)
                    .map_err(|_| DhError::BadParameters)?;
                if !is_good_prime(&prime, g) || random.len() != DH_RANDOM_LENGTH as usize {
                    return Err(DhError::BadParameters);
                }
                let config = DhConfig { version, prime, g };
                let newer = state
                    .config
                    .as_ref()
                    .map_or(true, |cached| version >= cached.version);
                if newer {
                    state.config = Some(config.clone());
                }
                Ok(DhBootstrap { config, random })
            }
            Ok(RpcResponse::DhConfigNotModified { random_b64 }) => {
                // Startup-ordering invariant: a not-modified response is
                // only meaningful after one successful full fetch.
                let Some(config) = state.config.clone() else {
                    return Err(DhError::EmptyCache);
                };
                let random = STANDARD
                    .decode(random_b64)
                    .map_err(|_| DhError::BadParameters)?;
                if random.len() != DH_RANDOM_LENGTH as usize {
                    return Err(DhError::BadParameters);
                }
                Ok(DhBootstrap { config, random })
            }
            Ok(_) => Err(DhError::UnexpectedResponse),
            Err(err) => Err(DhError::Rpc(err)),
        }
    }
}

impl Default for DhConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural goodness checks: expected modulus width with the top bit set
/// and a generator from the small known-good set. Deeper primality checks
/// belong to the encryption module consuming the bootstrap.
fn is_good_prime(prime: &[u8], g: i32) -> bool {
    prime.len() == PRIME_LENGTH
        && prime.first().is_some_and(|byte| byte & 0x80 != 0)
        && (2..=7).contains(&g)
}

#[cfg(test)]
#[path = "tests/dh_tests.rs"]
mod tests;
