//! Singleton owner of the active call and group call.
//!
//! At most one one-to-one call and one group call exist at any time; both
//! only coexist transiently while one replaces the other. Replacement always
//! hangs the displaced object up before it is freed so its teardown traffic
//! reaches the wire.
//!
//! Main-thread discipline: every method here is expected to be driven from
//! the application's single logical event loop.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use async_trait::async_trait;
use shared::domain::{CallPrivacy, GroupCallId, PeerRecord, UserId};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    call::{Call, CallSound, CallState},
    config::CallConfigCache,
    dh::{DhConfigCache, DhError},
    group_call::{GroupCall, GroupCallOptions},
    permissions::{PermissionProvider, PermissionStatus, PermissionType},
    teardown::{TeardownBarrier, TeardownToken},
    CallCrypto, Clock, Identity, RpcSender,
};

/// Modal/confirmation surface the UI provides.
#[async_trait]
pub trait ConfirmPrompts: Send + Sync {
    /// Confirm leaving the active one-to-one call to join a group call;
    /// wording differs when the target is a broadcast channel.
    async fn confirm_leave_call(&self, peer: PeerRecord, joining_broadcast: bool) -> bool;
    async fn confirm_leave_group_call(&self, peer: PeerRecord) -> bool;
    fn show_not_available(&self, peer: PeerRecord);
    fn show_permission_settings_redirect(&self, permission: PermissionType);
}

/// The call window. Reparented to whichever call is current.
pub trait CallPanel: Send + Sync {
    fn activate(&self);
    fn show_call(&self, call: &Arc<Call>);
    fn show_group_call(&self, call: &Arc<GroupCall>);
    fn play_sound(&self, sound: CallSound);
    fn close(&self);
}

/// Capability surface a live call needs from its owner.
#[async_trait]
pub trait CallDelegate: Send + Sync {
    async fn call_finished(&self, call: &Arc<Call>);
    async fn call_failed(&self, call: &Arc<Call>);
    async fn call_redial(&self, call: &Arc<Call>);
    async fn request_permissions(&self, video: bool) -> bool;
    fn play_sound(&self, sound: CallSound);
    fn video_capture_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCallOutcome {
    Started,
    /// A call was already active; its panel was brought to the foreground.
    ActivatedExisting,
    /// The user declined a device permission prompt; nothing was created.
    PermissionAborted,
}

#[derive(Debug, Error)]
pub enum StartCallError {
    #[error("peer only accepts calls from contacts")]
    NotAvailable,
    #[error(transparent)]
    Dh(#[from] DhError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCallOutcome {
    Joined,
    /// The same peer's call was already active and was re-activated.
    Rejoined,
    /// The user declined to leave an existing call.
    Cancelled,
}

pub struct CoordinatorDeps {
    pub identity: Arc<dyn Identity>,
    pub rpc: Arc<dyn RpcSender>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub prompts: Arc<dyn ConfirmPrompts>,
    pub panel: Arc<dyn CallPanel>,
    pub clock: Arc<dyn Clock>,
    /// End-to-end primitive for conference calls, when the encryption
    /// module has produced one.
    pub conference_crypto: Option<Arc<dyn CallCrypto>>,
    /// Whether a camera capture source exists on this machine.
    pub video_capture: bool,
}

pub struct Coordinator {
    pub(crate) identity: Arc<dyn Identity>,
    pub(crate) rpc: Arc<dyn RpcSender>,
    pub(crate) permissions: Arc<dyn PermissionProvider>,
    pub(crate) prompts: Arc<dyn ConfirmPrompts>,
    pub(crate) panel: Arc<dyn CallPanel>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) conference_crypto: Option<Arc<dyn CallCrypto>>,
    pub(crate) video_capture: bool,
    pub(crate) dh_config: DhConfigCache,
    pub(crate) call_config: CallConfigCache,
    pub(crate) current_call: Mutex<Option<Arc<Call>>>,
    pub(crate) current_group_call: Mutex<Option<Arc<GroupCall>>>,
    pub(crate) group_calls: Mutex<HashMap<GroupCallId, Weak<GroupCall>>>,
    pub(crate) teardown: TeardownBarrier,
}

impl Coordinator {
    pub fn new(deps: CoordinatorDeps) -> Arc<Self> {
        Arc::new(Self {
            identity: deps.identity,
            rpc: deps.rpc,
            permissions: deps.permissions,
            prompts: deps.prompts,
            panel: deps.panel,
            clock: deps.clock,
            conference_crypto: deps.conference_crypto,
            video_capture: deps.video_capture,
            dh_config: DhConfigCache::new(),
            call_config: CallConfigCache::new(),
            current_call: Mutex::new(None),
            current_group_call: Mutex::new(None),
            group_calls: Mutex::new(HashMap::new()),
            teardown: TeardownBarrier::new(),
        })
    }

    pub async fn active_call(&self) -> Option<Arc<Call>> {
        self.current_call.lock().await.clone()
    }

    pub async fn active_group_call(&self) -> Option<Arc<GroupCall>> {
        self.current_group_call.lock().await.clone()
    }

    pub async fn start_outgoing_call(
        self: &Arc<Self>,
        user: UserId,
        video: bool,
    ) -> Result<StartCallOutcome, StartCallError> {
        if self.current_call.lock().await.is_some() {
            self.panel.activate();
            return Ok(StartCallOutcome::ActivatedExisting);
        }

        let peer = self.identity.resolve_peer(user);
        if self.identity.call_privacy(user) == CallPrivacy::ContactsOnly
            && !self.identity.is_contact(user)
        {
            self.prompts.show_not_available(peer);
            // The cached privacy setting may be stale.
            self.identity.refresh_full_profile(user);
            return Err(StartCallError::NotAvailable);
        }

        if !self.request_device_permissions(video).await {
            return Ok(StartCallOutcome::PermissionAborted);
        }

        let bootstrap = self.dh_config.refresh(self.rpc.as_ref()).await?;
        let call = Call::new_outgoing(user, video, Arc::clone(&self.rpc));
        call.apply_dh_bootstrap(bootstrap).await;
        self.install_call(call).await;
        Ok(StartCallOutcome::Started)
    }

    pub async fn start_or_join_group_call(
        self: &Arc<Self>,
        peer: UserId,
        access_hash: u64,
        options: GroupCallOptions,
    ) -> GroupCallOutcome {
        if let Some(existing) = self.active_group_call().await {
            if existing.peer() == peer {
                existing.join(access_hash).await;
                self.panel.activate();
                return GroupCallOutcome::Rejoined;
            }
        }

        if self.current_call.lock().await.is_some() {
            let record = self.identity.resolve_peer(peer);
            let broadcast = self.identity.is_broadcast(peer);
            if !self.prompts.confirm_leave_call(record, broadcast).await {
                return GroupCallOutcome::Cancelled;
            }
        }

        if let Some(existing) = self.active_group_call().await {
            // Scheduled-but-unstarted calls are left without asking.
            if !existing.is_scheduled_unstarted().await {
                let record = self.identity.resolve_peer(existing.peer());
                if !self.prompts.confirm_leave_group_call(record).await {
                    return GroupCallOutcome::Cancelled;
                }
            }
        }

        self.hangup_active_call().await;
        self.leave_active_group_call().await;

        let call = GroupCall::new(
            peer,
            access_hash,
            options,
            Arc::clone(&self.identity),
            Arc::clone(&self.rpc),
            Arc::clone(&self.clock),
        );
        if options.conference {
            if let Some(crypto) = &self.conference_crypto {
                call.attach_crypto(Arc::clone(crypto)).await;
            }
        }
        {
            let mut slot = self.current_group_call.lock().await;
            *slot = Some(Arc::clone(&call));
        }
        self.panel.show_group_call(&call);
        GroupCallOutcome::Joined
    }

    /// Put `call` into the slot and hand it the panel. A displaced call is
    /// hung up first and only freed afterwards.
    pub(crate) async fn install_call(self: &Arc<Self>, call: Arc<Call>) {
        let previous = { self.current_call.lock().await.replace(Arc::clone(&call)) };
        self.panel.show_call(&call);
        if let Some(previous) = previous {
            previous.hangup().await;
        }
        self.watch_call(call);
    }

    pub async fn hangup_active_call(&self) {
        let call = { self.current_call.lock().await.take() };
        if let Some(call) = call {
            call.hangup().await;
        }
    }

    pub async fn leave_active_group_call(&self) {
        let call = { self.current_group_call.lock().await.take() };
        if let Some(call) = call {
            if let Some(session) = call.session().await {
                self.group_calls.lock().await.remove(&session.id);
            }
            call.leave().await;
        }
    }

    pub async fn teardown_token(&self) -> TeardownToken {
        self.teardown.token().await
    }

    /// Hang everything up, then block until every outstanding
    /// fire-and-forget teardown step has completed.
    pub async fn shutdown(&self) {
        self.hangup_active_call().await;
        self.leave_active_group_call().await;
        self.teardown.wait().await;
    }

    async fn request_device_permissions(&self, video: bool) -> bool {
        let mut required = vec![PermissionType::Microphone];
        if video {
            required.push(PermissionType::Camera);
        }
        for permission in required {
            match self.permissions.status(permission) {
                PermissionStatus::Granted => {}
                PermissionStatus::CanRequest => {
                    if self.permissions.request(permission).await != PermissionStatus::Granted {
                        debug!(?permission, "permission prompt declined; aborting");
                        return false;
                    }
                }
                PermissionStatus::Denied => {
                    self.hangup_active_call().await;
                    self.prompts.show_permission_settings_redirect(permission);
                    self.permissions.open_system_settings(permission);
                    return false;
                }
            }
        }
        true
    }

    /// Follow a call's state and run the owner-side reactions to terminal
    /// transitions.
    fn watch_call(self: &Arc<Self>, call: Arc<Call>) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut state = call.subscribe_state();
            loop {
                let current = *state.borrow_and_update();
                match current {
                    CallState::Requesting => coordinator.play_sound(CallSound::Connecting),
                    CallState::Failed => {
                        coordinator.call_failed(&call).await;
                        break;
                    }
                    CallState::Ended => {
                        coordinator.call_finished(&call).await;
                        break;
                    }
                    _ => {}
                }
                if state.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    async fn release_call_slot(&self, call: &Arc<Call>) {
        let mut slot = self.current_call.lock().await;
        let is_current = slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, call));
        if is_current {
            slot.take();
            drop(slot);
            if self.current_group_call.lock().await.is_none() {
                self.panel.close();
            }
        }
    }
}

#[async_trait]
impl CallDelegate for Coordinator {
    async fn call_finished(&self, call: &Arc<Call>) {
        self.play_sound(CallSound::Ended);
        self.release_call_slot(call).await;
    }

    async fn call_failed(&self, call: &Arc<Call>) {
        self.play_sound(CallSound::Busy);
        self.release_call_slot(call).await;
    }

    async fn call_redial(&self, call: &Arc<Call>) {
        match self.dh_config.refresh(self.rpc.as_ref()).await {
            Ok(bootstrap) => call.apply_dh_bootstrap(bootstrap).await,
            Err(err) => call.fail(&err.to_string()),
        }
    }

    async fn request_permissions(&self, video: bool) -> bool {
        self.request_device_permissions(video).await
    }

    fn play_sound(&self, sound: CallSound) {
        self.panel.play_sound(sound);
    }

    fn video_capture_available(&self) -> bool {
        self.video_capture
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
