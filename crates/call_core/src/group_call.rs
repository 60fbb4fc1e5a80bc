//! Live group call: lifecycle state plus its side-channel message ledger.

use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{GroupCallId, UserId},
    protocol::ServerUpdate,
};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::{
    ledger::{GroupCallMessages, GroupCallRef},
    CallCrypto, Clock, Identity, RpcSender,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCallState {
    /// Waiting for the server to confirm the call's live data.
    Connecting,
    /// Exists on the server but has not started yet.
    Scheduled,
    Active,
    Ended,
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupCallOptions {
    pub conference: bool,
    pub scheduled_date: Option<i64>,
}

struct GroupCallInner {
    session: Option<GroupCallRef>,
    requested_access_hash: u64,
    scheduled_date: Option<i64>,
    participants_version: i32,
    participants: HashMap<UserId, bool>,
}

pub struct GroupCall {
    peer: UserId,
    conference: bool,
    session_token: u64,
    messages: Arc<GroupCallMessages>,
    state: watch::Sender<GroupCallState>,
    inner: Mutex<GroupCallInner>,
}

impl GroupCall {
    pub fn new(
        peer: UserId,
        access_hash: u64,
        options: GroupCallOptions,
        identity: Arc<dyn Identity>,
        rpc: Arc<dyn RpcSender>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let initial = if options.scheduled_date.is_some() {
            GroupCallState::Scheduled
        } else {
            GroupCallState::Connecting
        };
        let (state, _) = watch::channel(initial);
        let session_token = identity.session_id();
        Arc::new(Self {
            peer,
            conference: options.conference,
            session_token,
            messages: GroupCallMessages::new(options.conference, identity, rpc, clock),
            state,
            inner: Mutex::new(GroupCallInner {
                session: None,
                requested_access_hash: access_hash,
                scheduled_date: options.scheduled_date,
                participants_version: 0,
                participants: HashMap::new(),
            }),
        })
    }

    pub fn peer(&self) -> UserId {
        self.peer
    }

    pub fn is_conference(&self) -> bool {
        self.conference
    }

    /// The account session this call was created under; late async results
    /// carrying another token are stale and must not be applied.
    pub fn session_token(&self) -> u64 {
        self.session_token
    }

    pub fn messages(&self) -> &Arc<GroupCallMessages> {
        &self.messages
    }

    pub fn current_state(&self) -> GroupCallState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<GroupCallState> {
        self.state.subscribe()
    }

    pub async fn session(&self) -> Option<GroupCallRef> {
        self.inner.lock().await.session
    }

    pub async fn is_scheduled_unstarted(&self) -> bool {
        self.current_state() == GroupCallState::Scheduled
    }

    pub async fn participant_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .participants
            .values()
            .filter(|joined| **joined)
            .count()
    }

    /// Make the conference encryption primitive available to the ledger.
    pub async fn attach_crypto(&self, crypto: Arc<dyn CallCrypto>) {
        self.messages.set_crypto(crypto).await;
    }

    /// Re-join an already-active call with a (possibly newer) access hash.
    pub async fn join(&self, access_hash: u64) {
        let mut inner = self.inner.lock().await;
        inner.requested_access_hash = access_hash;
        info!(peer = self.peer.0, "re-joining active group call");
    }

    pub async fn handle_update(&self, update: &ServerUpdate) {
        match update {
            ServerUpdate::GroupCallUpdated {
                call_id,
                access_hash,
                discarded,
                scheduled_date,
                ..
            } => {
                if *discarded {
                    self.set_state(GroupCallState::Ended);
                    return;
                }
                let session = GroupCallRef {
                    id: *call_id,
                    access_hash: *access_hash,
                };
                {
                    let mut inner = self.inner.lock().await;
                    inner.session = Some(session);
                    inner.scheduled_date = *scheduled_date;
                }
                self.set_state(if scheduled_date.is_some() {
                    GroupCallState::Scheduled
                } else {
                    GroupCallState::Active
                });
                self.messages.set_call(session).await;
            }
            ServerUpdate::GroupCallParticipants {
                version,
                participants,
                ..
            } => {
                let mut inner = self.inner.lock().await;
                if *version <= inner.participants_version {
                    debug!(version, "stale participants update; ignoring");
                    return;
                }
                inner.participants_version = *version;
                for participant in participants {
                    inner.participants.insert(participant.user, participant.joined);
                }
            }
            ServerUpdate::GroupCallConnection { data } => {
                debug!(payload = %data, "group call connection update");
            }
            other => {
                debug!(?other, "update not relevant to a group call");
            }
        }
    }

    /// Leave locally; the side channel dies with the call object.
    pub async fn leave(&self) {
        if !matches!(
            self.current_state(),
            GroupCallState::Ended | GroupCallState::Failed
        ) {
            self.set_state(GroupCallState::Ended);
        }
    }

    pub fn fail(&self, reason: &str) {
        tracing::warn!(peer = self.peer.0, reason, "group call failed");
        self.set_state(GroupCallState::Failed);
    }

    fn set_state(&self, next: GroupCallState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/group_call_tests.rs"]
mod tests;
