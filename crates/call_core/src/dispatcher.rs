//! Server update routing.
//!
//! Updates arrive as one tagged union; each kind is routed to the live call
//! object that owns it. Anything unroutable is logged and dropped so a
//! malformed or late update can never take the update pipeline down.

use std::sync::{Arc, Weak};

use shared::{
    domain::{CallId, UserId},
    protocol::{DiscardReason, RpcMethod, ServerUpdate},
};
use tracing::{debug, warn};

use crate::{call::Call, coordinator::Coordinator, group_call::GroupCall};

impl Coordinator {
    pub async fn handle_update(self: &Arc<Self>, update: ServerUpdate) {
        match update {
            ServerUpdate::CallRequested {
                call_id,
                access_hash,
                from,
                date,
                video,
            } => {
                self.on_call_requested(call_id, access_hash, from, date, video)
                    .await;
            }
            ServerUpdate::CallSignalingData { .. } => {
                let call = self.active_call().await;
                match call {
                    Some(call) => call.handle_update(&update).await,
                    None => debug!("signaling data with no active call; dropping"),
                }
            }
            ServerUpdate::GroupCallUpdated { .. }
            | ServerUpdate::GroupCallParticipants { .. }
            | ServerUpdate::GroupCallConnection { .. } => {
                self.on_group_call_update(&update).await;
            }
        }
    }

    async fn on_call_requested(
        self: &Arc<Self>,
        call_id: CallId,
        access_hash: u64,
        from: UserId,
        date: i64,
        video: bool,
    ) {
        if let Some(active) = self.active_call().await {
            if active.call_id().await == Some(call_id) {
                // Repeat delivery of the same request.
                active
                    .handle_update(&ServerUpdate::CallRequested {
                        call_id,
                        access_hash,
                        from,
                        date,
                        video,
                    })
                    .await;
                return;
            }
            self.discard_busy(call_id, access_hash);
            return;
        }

        let group_call_active = self.active_group_call().await.is_some();
        if group_call_active || from == self.identity.self_id() {
            self.discard_busy(call_id, access_hash);
            return;
        }

        // Ring timeout comes from server config; refresh it off the hot
        // path so routing never waits on the network.
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator
                .call_config
                .refresh(coordinator.rpc.as_ref())
                .await;
        });
        let ring_timeout_ms = self.call_config.ring_timeout_ms().await;
        if date + ring_timeout_ms / 1000 < self.clock.now_unix() {
            debug!(call_id = call_id.0, "incoming call rang out before delivery; dropping");
            return;
        }

        let call = Call::new_incoming(from, call_id, access_hash, video, Arc::clone(&self.rpc));
        self.install_call(call).await;
    }

    /// Reject an incoming request we cannot take, without touching the
    /// active call. Runs detached; shutdown waits for it via the barrier.
    fn discard_busy(self: &Arc<Self>, call_id: CallId, access_hash: u64) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let _token = coordinator.teardown.token().await;
            if let Err(err) = coordinator
                .rpc
                .request(RpcMethod::DiscardCall {
                    call_id,
                    access_hash,
                    reason: DiscardReason::Busy,
                })
                .await
            {
                warn!(call_id = call_id.0, error = %err, "busy-discard rpc failed");
            }
        });
    }

    async fn on_group_call_update(self: &Arc<Self>, update: &ServerUpdate) {
        let live = self.active_group_call().await;

        if let ServerUpdate::GroupCallConnection { .. } = update {
            match live {
                Some(live) => live.handle_update(update).await,
                None => debug!("connection payload with no live group call; dropping"),
            }
            return;
        }

        let mut handled_by: Option<Arc<GroupCall>> = None;
        if let Some(live) = &live {
            if self.live_owns_update(live, update).await {
                live.handle_update(update).await;
                // The update may have just resolved the server-side session;
                // record it so later updates route by id alone.
                if let Some(session) = live.session().await {
                    self.group_calls
                        .lock()
                        .await
                        .insert(session.id, Arc::downgrade(live));
                }
                handled_by = Some(Arc::clone(live));
            }
        }

        let call_id = match update {
            ServerUpdate::GroupCallUpdated { call_id, .. }
            | ServerUpdate::GroupCallParticipants { call_id, .. } => *call_id,
            _ => return,
        };
        let tracked = {
            self.group_calls
                .lock()
                .await
                .get(&call_id)
                .and_then(Weak::upgrade)
        };
        match tracked {
            Some(call) => {
                let already = handled_by
                    .as_ref()
                    .is_some_and(|handled| Arc::ptr_eq(handled, &call));
                if !already {
                    call.handle_update(update).await;
                }
            }
            None if handled_by.is_some() => {}
            None => {
                debug!(
                    call_id = call_id.0,
                    "group call update matches no tracked call; dropping"
                );
            }
        }
    }

    async fn live_owns_update(&self, live: &Arc<GroupCall>, update: &ServerUpdate) -> bool {
        let session_id = live.session().await.map(|session| session.id);
        match update {
            ServerUpdate::GroupCallUpdated { peer, call_id, .. } => {
                live.peer() == *peer || session_id == Some(*call_id)
            }
            ServerUpdate::GroupCallParticipants { call_id, .. } => session_id == Some(*call_id),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
