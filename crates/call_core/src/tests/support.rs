//! Shared test doubles.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use shared::{
    domain::{CallPrivacy, PeerRecord, UserId},
    error::{RpcErrorCode, RpcFailure},
    protocol::{RpcMethod, RpcResponse},
};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::{
    call::{Call, CallSound},
    coordinator::{CallPanel, ConfirmPrompts},
    group_call::GroupCall,
    permissions::{PermissionProvider, PermissionStatus, PermissionType},
    Clock, Identity, RpcSender,
};

/// Answers requests from a fixed script, in order, and records every method
/// it saw. Runs out of script: every further request fails.
pub struct ScriptedRpc {
    responses: Mutex<Vec<Result<RpcResponse, RpcFailure>>>,
    requests: Mutex<Vec<RpcMethod>>,
}

impl ScriptedRpc {
    pub fn with_responses(responses: Vec<Result<RpcResponse, RpcFailure>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::with_responses(Vec::new())
    }

    pub async fn requests(&self) -> Vec<RpcMethod> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl RpcSender for ScriptedRpc {
    async fn request(&self, method: RpcMethod) -> Result<RpcResponse, RpcFailure> {
        self.requests.lock().await.push(method);
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            return Err(RpcFailure::new(RpcErrorCode::Internal, "script exhausted"));
        }
        responses.remove(0)
    }
}

/// Holds every request until the test answers it, so in-flight windows can
/// be observed deterministically.
pub struct GatedRpc {
    tx: mpsc::UnboundedSender<GatedRequest>,
    rx: Mutex<mpsc::UnboundedReceiver<GatedRequest>>,
}

pub struct GatedRequest {
    pub method: RpcMethod,
    pub respond: oneshot::Sender<Result<RpcResponse, RpcFailure>>,
}

impl GatedRpc {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub async fn next_request(&self) -> GatedRequest {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("rpc side dropped without a request")
    }
}

#[async_trait]
impl RpcSender for GatedRpc {
    async fn request(&self, method: RpcMethod) -> Result<RpcResponse, RpcFailure> {
        let (respond, outcome) = oneshot::channel();
        if self.tx.send(GatedRequest { method, respond }).is_err() {
            return Err(RpcFailure::network("gate closed"));
        }
        outcome
            .await
            .unwrap_or_else(|_| Err(RpcFailure::network("gate dropped")))
    }
}

pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn at(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub struct StaticIdentity {
    self_id: UserId,
    session_id: u64,
    contacts: HashSet<UserId>,
    privacy: HashMap<UserId, CallPrivacy>,
    broadcasts: HashSet<UserId>,
    refreshed: std::sync::Mutex<Vec<UserId>>,
}

impl StaticIdentity {
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            session_id: 7,
            contacts: HashSet::new(),
            privacy: HashMap::new(),
            broadcasts: HashSet::new(),
            refreshed: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_contact(mut self, user: UserId) -> Self {
        self.contacts.insert(user);
        self
    }

    pub fn with_privacy(mut self, user: UserId, privacy: CallPrivacy) -> Self {
        self.privacy.insert(user, privacy);
        self
    }

    pub fn with_broadcast(mut self, user: UserId) -> Self {
        self.broadcasts.insert(user);
        self
    }

    pub fn refreshed_profiles(&self) -> Vec<UserId> {
        self.refreshed.lock().unwrap().clone()
    }
}

impl Identity for StaticIdentity {
    fn self_id(&self) -> UserId {
        self.self_id
    }

    fn session_id(&self) -> u64 {
        self.session_id
    }

    fn resolve_peer(&self, user: UserId) -> PeerRecord {
        PeerRecord {
            id: user,
            name: format!("user-{}", user.0),
        }
    }

    fn is_contact(&self, user: UserId) -> bool {
        self.contacts.contains(&user)
    }

    fn is_broadcast(&self, user: UserId) -> bool {
        self.broadcasts.contains(&user)
    }

    fn call_privacy(&self, user: UserId) -> CallPrivacy {
        self.privacy
            .get(&user)
            .copied()
            .unwrap_or(CallPrivacy::Everybody)
    }

    fn refresh_full_profile(&self, user: UserId) {
        self.refreshed.lock().unwrap().push(user);
    }
}

pub struct FakePermissions {
    statuses: HashMap<PermissionType, PermissionStatus>,
    request_answer: PermissionStatus,
    requested: std::sync::Mutex<Vec<PermissionType>>,
    opened_settings: AtomicBool,
}

impl FakePermissions {
    pub fn granted() -> Self {
        Self::with_status(PermissionStatus::Granted, PermissionStatus::Granted)
    }

    pub fn with_status(status: PermissionStatus, request_answer: PermissionStatus) -> Self {
        let mut statuses = HashMap::new();
        statuses.insert(PermissionType::Microphone, status);
        statuses.insert(PermissionType::Camera, status);
        Self {
            statuses,
            request_answer,
            requested: std::sync::Mutex::new(Vec::new()),
            opened_settings: AtomicBool::new(false),
        }
    }

    pub fn camera_status(mut self, status: PermissionStatus) -> Self {
        self.statuses.insert(PermissionType::Camera, status);
        self
    }

    pub fn requested(&self) -> Vec<PermissionType> {
        self.requested.lock().unwrap().clone()
    }

    pub fn settings_opened(&self) -> bool {
        self.opened_settings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for FakePermissions {
    fn status(&self, permission: PermissionType) -> PermissionStatus {
        self.statuses[&permission]
    }

    async fn request(&self, permission: PermissionType) -> PermissionStatus {
        self.requested.lock().unwrap().push(permission);
        self.request_answer
    }

    fn open_system_settings(&self, _permission: PermissionType) {
        self.opened_settings.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptEvent {
    LeaveCall { joining_broadcast: bool },
    LeaveGroupCall,
    NotAvailable(UserId),
    SettingsRedirect(PermissionType),
}

pub struct FakePrompts {
    confirm_leave_call: bool,
    confirm_leave_group_call: bool,
    events: std::sync::Mutex<Vec<PromptEvent>>,
}

impl FakePrompts {
    pub fn confirming() -> Self {
        Self::answering(true, true)
    }

    pub fn answering(leave_call: bool, leave_group_call: bool) -> Self {
        Self {
            confirm_leave_call: leave_call,
            confirm_leave_group_call: leave_group_call,
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<PromptEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmPrompts for FakePrompts {
    async fn confirm_leave_call(&self, _peer: PeerRecord, joining_broadcast: bool) -> bool {
        self.events
            .lock()
            .unwrap()
            .push(PromptEvent::LeaveCall { joining_broadcast });
        self.confirm_leave_call
    }

    async fn confirm_leave_group_call(&self, _peer: PeerRecord) -> bool {
        self.events.lock().unwrap().push(PromptEvent::LeaveGroupCall);
        self.confirm_leave_group_call
    }

    fn show_not_available(&self, peer: PeerRecord) {
        self.events
            .lock()
            .unwrap()
            .push(PromptEvent::NotAvailable(peer.id));
    }

    fn show_permission_settings_redirect(&self, permission: PermissionType) {
        self.events
            .lock()
            .unwrap()
            .push(PromptEvent::SettingsRedirect(permission));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    Activated,
    ShowedCall(UserId),
    ShowedGroupCall(UserId),
    Played(CallSound),
    Closed,
}

#[derive(Default)]
pub struct FakePanel {
    events: std::sync::Mutex<Vec<PanelEvent>>,
}

impl FakePanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PanelEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CallPanel for FakePanel {
    fn activate(&self) {
        self.events.lock().unwrap().push(PanelEvent::Activated);
    }

    fn show_call(&self, call: &Arc<Call>) {
        self.events
            .lock()
            .unwrap()
            .push(PanelEvent::ShowedCall(call.peer()));
    }

    fn show_group_call(&self, call: &Arc<GroupCall>) {
        self.events
            .lock()
            .unwrap()
            .push(PanelEvent::ShowedGroupCall(call.peer()));
    }

    fn play_sound(&self, sound: CallSound) {
        self.events.lock().unwrap().push(PanelEvent::Played(sound));
    }

    fn close(&self) {
        self.events.lock().unwrap().push(PanelEvent::Closed);
    }
}
