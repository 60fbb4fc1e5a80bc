use serde::{Deserialize, Serialize};

use crate::{
    domain::{CallId, GroupCallId, UserId},
    entities::MessageEntity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    Busy,
    Hangup,
    Missed,
}

/// Outbound RPC methods used by the call core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RpcMethod {
    SendGroupCallMessage {
        call_id: GroupCallId,
        access_hash: u64,
        random_id: u64,
        text: String,
        entities: Vec<MessageEntity>,
    },
    SendGroupCallEncryptedMessage {
        call_id: GroupCallId,
        access_hash: u64,
        random_id: u64,
        ciphertext_b64: String,
    },
    GetDhConfig {
        version: i32,
        random_length: i32,
    },
    GetCallConfig,
    DiscardCall {
        call_id: CallId,
        access_hash: u64,
        reason: DiscardReason,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RpcResponse {
    /// Server acknowledged a side-channel message; `date` is the assigned
    /// server timestamp (unix seconds).
    MessageSent { date: i64 },
    DhConfig {
        version: i32,
        prime_b64: String,
        g: i32,
        random_b64: String,
    },
    DhConfigNotModified { random_b64: String },
    CallConfig {
        ring_timeout_ms: i64,
        receive_timeout_ms: i64,
    },
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    pub user: UserId,
    pub joined: bool,
    pub muted: bool,
}

/// Inbound server update events routed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerUpdate {
    CallRequested {
        call_id: CallId,
        access_hash: u64,
        from: UserId,
        date: i64,
        video: bool,
    },
    CallSignalingData {
        call_id: CallId,
        data_b64: String,
    },
    GroupCallUpdated {
        peer: UserId,
        call_id: GroupCallId,
        access_hash: u64,
        conference: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scheduled_date: Option<i64>,
        discarded: bool,
    },
    GroupCallParticipants {
        call_id: GroupCallId,
        version: i32,
        participants: Vec<ParticipantUpdate>,
    },
    /// Generic connection-state blob; only ever offered to the live group
    /// call, never used to create state.
    GroupCallConnection { data: serde_json::Value },
}
