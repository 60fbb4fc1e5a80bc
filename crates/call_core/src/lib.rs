//! Call signaling core for the desktop client: group-call side-channel
//! messaging, one-to-one and group call lifecycle, and server-update
//! dispatch.
//!
//! Everything here is driven from the application's single logical event
//! loop; state lives behind async mutexes on long-lived `Arc` objects and
//! RPC completions are applied by spawned tasks. UI, media, and transport
//! cryptography stay behind the collaborator traits below.

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{CallPrivacy, PeerRecord, UserId},
    error::{RpcErrorCode, RpcFailure},
    protocol::{RpcMethod, RpcResponse},
};

pub mod call;
pub mod config;
pub mod coordinator;
pub mod dh;
pub mod dispatcher;
pub mod envelope;
pub mod group_call;
pub mod ledger;
pub mod markup;
pub mod permissions;
pub mod teardown;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod tests_support;

pub use coordinator::{Coordinator, CoordinatorDeps};
pub use ledger::{GroupCallMessages, GroupCallRef, Message};

/// Fire-and-forget RPC submission; completion is delivered asynchronously.
#[async_trait]
pub trait RpcSender: Send + Sync {
    async fn request(&self, method: RpcMethod) -> Result<RpcResponse, RpcFailure>;
}

pub struct MissingRpcSender;

#[async_trait]
impl RpcSender for MissingRpcSender {
    async fn request(&self, _method: RpcMethod) -> Result<RpcResponse, RpcFailure> {
        Err(RpcFailure::new(
            RpcErrorCode::Internal,
            "rpc sender unavailable",
        ))
    }
}

/// Opaque end-to-end encryption primitive for conference call payloads,
/// keyed by the remote peer and the message direction.
pub trait CallCrypto: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], peer: UserId, outgoing: bool) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8], peer: UserId, outgoing: bool) -> Result<Vec<u8>>;
}

pub struct PassthroughCrypto;

impl CallCrypto for PassthroughCrypto {
    fn encrypt(&self, plaintext: &[u8], _peer: UserId, _outgoing: bool) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8], _peer: UserId, _outgoing: bool) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

/// Identity and session information supplied by the account layer.
pub trait Identity: Send + Sync {
    fn self_id(&self) -> UserId;
    /// Session-scoped unique id; late-arriving async results are validated
    /// against it before being applied.
    fn session_id(&self) -> u64;
    fn resolve_peer(&self, user: UserId) -> PeerRecord;
    fn is_contact(&self, user: UserId) -> bool;
    fn is_broadcast(&self, user: UserId) -> bool;
    fn call_privacy(&self, user: UserId) -> CallPrivacy;
    /// Kick off a full profile refresh for `user`; the cached privacy
    /// setting may be stale.
    fn refresh_full_profile(&self, user: UserId);
}

pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
