//! In-memory message ledger for a group call's side channel.
//!
//! Messages submitted before the call (and, for conference calls, the
//! encryption primitive) is available sit in a pending queue and are
//! drained in submission order the moment the ledger becomes ready. Sent
//! messages are optimistic: they appear immediately with `date = 0` and are
//! stamped or marked failed when the RPC completes.

use std::{collections::VecDeque, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    domain::{GroupCallId, PeerRecord, UserId},
    entities::MessageEntity,
    protocol::{RpcMethod, RpcResponse},
    wire::TextPayload,
};
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::{
    envelope::{self, PreparedMessage},
    markup, CallCrypto, Clock, Identity, RpcSender,
};

/// A chat-style message inside the call's side channel.
///
/// `date` is 0 until the server acknowledges the send; `failed` is terminal
/// and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub date: i64,
    pub origin: PeerRecord,
    pub text: String,
    pub entities: Vec<MessageEntity>,
    pub failed: bool,
}

/// Server-side identity of a group call: numeric id plus access hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCallRef {
    pub id: GroupCallId,
    pub access_hash: u64,
}

struct LedgerState {
    call: Option<GroupCallRef>,
    crypto: Option<Arc<dyn CallCrypto>>,
    pending: VecDeque<String>,
    messages: Vec<Message>,
    next_id: u64,
}

pub struct GroupCallMessages {
    conference: bool,
    identity: Arc<dyn Identity>,
    rpc: Arc<dyn RpcSender>,
    clock: Arc<dyn Clock>,
    inner: Mutex<LedgerState>,
    snapshots: watch::Sender<Vec<Message>>,
}

impl GroupCallMessages {
    pub fn new(
        conference: bool,
        identity: Arc<dyn Identity>,
        rpc: Arc<dyn RpcSender>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (snapshots, _) = watch::channel(Vec::new());
        Arc::new(Self {
            conference,
            identity,
            rpc,
            clock,
            inner: Mutex::new(LedgerState {
                call: None,
                crypto: None,
                pending: VecDeque::new(),
                messages: Vec::new(),
                next_id: 1,
            }),
            snapshots,
        })
    }

    pub fn is_conference(&self) -> bool {
        self.conference
    }

    /// Current snapshot, then future changes. The receiver sees the present
    /// state immediately and is only woken on actual changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.snapshots.subscribe()
    }

    pub fn snapshot_stream(&self) -> WatchStream<Vec<Message>> {
        WatchStream::new(self.subscribe())
    }

    /// The underlying call's live data resolved; part one of readiness.
    pub async fn set_call(self: &Arc<Self>, call: GroupCallRef) {
        {
            let mut state = self.inner.lock().await;
            state.call = Some(call);
        }
        self.drain_pending().await;
    }

    /// The encryption primitive became available; part two of readiness for
    /// conference calls.
    pub async fn set_crypto(self: &Arc<Self>, crypto: Arc<dyn CallCrypto>) {
        {
            let mut state = self.inner.lock().await;
            state.crypto = Some(crypto);
        }
        self.drain_pending().await;
    }

    fn is_ready(&self, state: &LedgerState) -> bool {
        state.call.is_some() && (!self.conference || state.crypto.is_some())
    }

    async fn drain_pending(self: &Arc<Self>) {
        let drained: Vec<String> = {
            let mut state = self.inner.lock().await;
            if !self.is_ready(&state) {
                return;
            }
            state.pending.drain(..).collect()
        };
        for text in drained {
            self.send(&text).await;
        }
    }

    /// Submit a message. Queued while not ready; otherwise appended with a
    /// fresh local id and dispatched. Returns immediately; the RPC outcome
    /// is merged in later.
    pub async fn send(self: &Arc<Self>, text: &str) {
        let (call, crypto, message) = {
            let mut state = self.inner.lock().await;
            if !self.is_ready(&state) {
                debug!("ledger not ready; queueing message");
                state.pending.push_back(text.to_string());
                return;
            }
            let Some(call) = state.call else {
                return;
            };
            let crypto = state.crypto.clone();

            let (clean_text, entities) = markup::parse(text);
            let id = state.next_id;
            state.next_id += 1;
            let message = Message {
                id,
                date: 0,
                origin: self.identity.resolve_peer(self.identity.self_id()),
                text: clean_text,
                entities,
                failed: false,
            };
            state.messages.push(message.clone());
            self.publish(&state);
            (call, crypto, message)
        };

        let random_id = non_zero_random_id();
        let method = if self.conference {
            let Some(crypto) = crypto else {
                // is_ready guarantees the primitive for conference calls.
                return;
            };
            let prepared = PreparedMessage {
                random_id,
                text: message.text.clone(),
                entities: message.entities.clone(),
            };
            match crypto.encrypt(&envelope::encode(&prepared), self.identity.self_id(), true) {
                Ok(ciphertext) => RpcMethod::SendGroupCallEncryptedMessage {
                    call_id: call.id,
                    access_hash: call.access_hash,
                    random_id,
                    ciphertext_b64: STANDARD.encode(ciphertext),
                },
                Err(err) => {
                    warn!(message_id = message.id, error = %err, "message encryption failed");
                    self.mark_failed(message.id).await;
                    return;
                }
            }
        } else {
            RpcMethod::SendGroupCallMessage {
                call_id: call.id,
                access_hash: call.access_hash,
                random_id,
                text: message.text.clone(),
                entities: message.entities.clone(),
            }
        };

        let ledger = Arc::clone(self);
        let id = message.id;
        tokio::spawn(async move {
            match ledger.rpc.request(method).await {
                Ok(RpcResponse::MessageSent { date }) => ledger.mark_sent(id, date).await,
                Ok(other) => {
                    warn!(message_id = id, ?other, "unexpected send-message response");
                    ledger.mark_failed(id).await;
                }
                Err(err) => {
                    warn!(message_id = id, error = %err, "send-message rpc failed");
                    ledger.mark_failed(id).await;
                }
            }
        });
    }

    /// Server acknowledged the message; stamp its date. No-op if the
    /// message is gone (ledger torn down and rebuilt, duplicate ack).
    pub async fn mark_sent(&self, id: u64, date: i64) {
        let mut state = self.inner.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|m| m.id == id) {
            message.date = date;
            self.publish(&state);
        }
    }

    /// Permanent send failure; terminal, no automatic retry.
    pub async fn mark_failed(&self, id: u64) {
        let mut state = self.inner.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|m| m.id == id) {
            message.failed = true;
            self.publish(&state);
        }
    }

    /// Inbound cleartext message. Self-authored messages already exist
    /// locally from the optimistic send path and are dropped here.
    pub async fn receive_text(&self, from: UserId, text: String, entities: Vec<MessageEntity>) {
        if from == self.identity.self_id() {
            debug!("dropping self-authored inbound message");
            return;
        }
        let origin = self.identity.resolve_peer(from);
        let date = self.clock.now_unix();
        let mut state = self.inner.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.messages.push(Message {
            id,
            date,
            origin,
            text,
            entities,
            failed: false,
        });
        self.publish(&state);
    }

    /// Inbound encrypted message: decrypt, validate the word-aligned frame,
    /// then continue as the cleartext path. Invalid payloads log and drop.
    pub async fn receive_encrypted(&self, from: UserId, ciphertext: &[u8]) {
        let crypto = { self.inner.lock().await.crypto.clone() };
        let Some(crypto) = crypto else {
            warn!("encrypted message before the primitive is available; dropping");
            return;
        };
        let plaintext = match crypto.decrypt(ciphertext, from, false) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(error = %err, "failed to decrypt inbound message");
                return;
            }
        };
        if plaintext.is_empty() || plaintext.len() % 4 != 0 {
            warn!(len = plaintext.len(), "decrypted payload has an invalid size");
            return;
        }
        let payload = match TextPayload::from_bytes(&plaintext) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to parse decrypted payload");
                return;
            }
        };
        self.receive_text(from, payload.text, payload.entities).await;
    }

    fn publish(&self, state: &LedgerState) {
        let _ = self.snapshots.send(state.messages.clone());
    }
}

fn non_zero_random_id() -> u64 {
    loop {
        let id = rand::random::<u64>();
        if id != 0 {
            return id;
        }
    }
}

#[cfg(test)]
#[path = "tests/ledger_tests.rs"]
mod tests;
