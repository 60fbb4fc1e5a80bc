//! One-to-one call lifecycle.

use std::sync::Arc;

use shared::{
    domain::{CallId, UserId},
    protocol::{DiscardReason, RpcMethod, ServerUpdate},
};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::{dh::DhBootstrap, RpcSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Outgoing call created, key exchange not yet started.
    WaitingInit,
    /// Key exchange material applied, request sent to the peer.
    Requesting,
    Ringing,
    Established,
    Failed,
    Ended,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Ended)
    }
}

/// Audio cue the owner plays for a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSound {
    Connecting,
    Busy,
    Ended,
}

struct CallInner {
    id: Option<(CallId, u64)>,
    dh: Option<DhBootstrap>,
    signaling_frames: u32,
}

pub struct Call {
    user: UserId,
    outgoing: bool,
    video: bool,
    rpc: Arc<dyn RpcSender>,
    state: watch::Sender<CallState>,
    inner: Mutex<CallInner>,
}

impl Call {
    pub fn new_outgoing(user: UserId, video: bool, rpc: Arc<dyn RpcSender>) -> Arc<Self> {
        let (state, _) = watch::channel(CallState::WaitingInit);
        Arc::new(Self {
            user,
            outgoing: true,
            video,
            rpc,
            state,
            inner: Mutex::new(CallInner {
                id: None,
                dh: None,
                signaling_frames: 0,
            }),
        })
    }

    pub fn new_incoming(
        user: UserId,
        call_id: CallId,
        access_hash: u64,
        video: bool,
        rpc: Arc<dyn RpcSender>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(CallState::Ringing);
        Arc::new(Self {
            user,
            outgoing: false,
            video,
            rpc,
            state,
            inner: Mutex::new(CallInner {
                id: Some((call_id, access_hash)),
                dh: None,
                signaling_frames: 0,
            }),
        })
    }

    pub fn peer(&self) -> UserId {
        self.user
    }

    pub fn is_outgoing(&self) -> bool {
        self.outgoing
    }

    pub fn is_video(&self) -> bool {
        self.video
    }

    pub fn current_state(&self) -> CallState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CallState> {
        self.state.subscribe()
    }

    pub async fn call_id(&self) -> Option<CallId> {
        self.inner.lock().await.id.map(|(id, _)| id)
    }

    /// Number of signaling frames accepted so far.
    pub async fn signaling_frames(&self) -> u32 {
        self.inner.lock().await.signaling_frames
    }

    /// Key exchange material arrived; move an outgoing call into the
    /// requesting phase.
    pub async fn apply_dh_bootstrap(&self, bootstrap: DhBootstrap) {
        {
            let mut inner = self.inner.lock().await;
            inner.dh = Some(bootstrap);
        }
        if self.current_state() == CallState::WaitingInit {
            self.set_state(CallState::Requesting);
        }
    }

    pub async fn establish(&self) {
        if !self.current_state().is_terminal() {
            self.set_state(CallState::Established);
        }
    }

    /// Protocol/state invariant violation; terminal.
    pub fn fail(&self, reason: &str) {
        warn!(peer = self.user.0, reason, "call failed");
        self.set_state(CallState::Failed);
    }

    /// Tell the server we are leaving, then mark the call ended. Always
    /// invoked before the object is destroyed so the teardown message gets
    /// on the wire.
    pub async fn hangup(&self) {
        let id = { self.inner.lock().await.id };
        if let Some((call_id, access_hash)) = id {
            let reason = if self.current_state() == CallState::Ringing && !self.outgoing {
                DiscardReason::Missed
            } else {
                DiscardReason::Hangup
            };
            if let Err(err) = self
                .rpc
                .request(RpcMethod::DiscardCall {
                    call_id,
                    access_hash,
                    reason,
                })
                .await
            {
                warn!(call_id = call_id.0, error = %err, "discard-call rpc failed");
            }
        }
        if !self.current_state().is_terminal() {
            self.set_state(CallState::Ended);
        }
    }

    pub async fn handle_update(&self, update: &ServerUpdate) {
        match update {
            ServerUpdate::CallRequested {
                call_id,
                access_hash,
                ..
            } => {
                let mut inner = self.inner.lock().await;
                if inner.id == Some((*call_id, *access_hash)) {
                    debug!(call_id = call_id.0, "duplicate call-requested; ignoring");
                    return;
                }
                if inner.id.is_none() {
                    inner.id = Some((*call_id, *access_hash));
                }
            }
            ServerUpdate::CallSignalingData { call_id, .. } => {
                let mut inner = self.inner.lock().await;
                if inner.id.map(|(id, _)| id) != Some(*call_id) {
                    debug!(call_id = call_id.0, "signaling data for another call");
                    return;
                }
                inner.signaling_frames += 1;
            }
            other => {
                debug!(?other, "update not relevant to a one-to-one call");
            }
        }
    }

    fn set_state(&self, next: CallState) {
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
#[path = "tests/call_tests.rs"]
mod tests;
