//! Presence & routing hub: the single owner of the live-connection registry.
//!
//! Every registry mutation and every dispatch flows through one control loop
//! fed by [`HubCommand`]s, so reads and writes never race. Callers interact
//! through a cloneable [`HubHandle`] whose methods never block — delivery is
//! best-effort, at-most-once; durability comes from the message store, not
//! from the hub.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::user::UserSummary;
use crate::store::ChatStore;

use super::events::PresenceEvent;
use super::session::ConnectionSession;

enum HubCommand {
    Register(ConnectionSession),
    Unregister {
        session_id: String,
    },
    DirectSend {
        recipient_id: String,
        payload: String,
    },
    BroadcastAll {
        payload: String,
    },
    BroadcastExcept {
        sender_id: String,
        payload: String,
    },
}

/// Cloneable, non-blocking handle to the hub's control loop.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Hand a session over to the hub. The hub closes any previous session
    /// for the same identity before inserting the new one.
    pub fn register(&self, session: ConnectionSession) {
        let _ = self.tx.send(HubCommand::Register(session));
    }

    /// Idempotent: unknown or already-removed session IDs are a no-op.
    pub fn unregister(&self, session_id: impl Into<String>) {
        let _ = self.tx.send(HubCommand::Unregister {
            session_id: session_id.into(),
        });
    }

    /// Push a payload to one identity's live session, if any. Fire-and-forget:
    /// a disconnected recipient silently drops the payload.
    pub fn send_direct(&self, recipient_id: impl Into<String>, payload: String) {
        let _ = self.tx.send(HubCommand::DirectSend {
            recipient_id: recipient_id.into(),
            payload,
        });
    }

    /// Push a payload to every connected session.
    pub fn broadcast_all(&self, payload: String) {
        let _ = self.tx.send(HubCommand::BroadcastAll { payload });
    }

    /// Push a payload to every connected session except the sender's own.
    pub fn broadcast_except(&self, sender_id: impl Into<String>, payload: String) {
        let _ = self.tx.send(HubCommand::BroadcastExcept {
            sender_id: sender_id.into(),
            payload,
        });
    }
}

/// The hub's control loop state. Constructed with [`Hub::new`] and consumed
/// by [`Hub::run`] on a dedicated task.
pub struct Hub {
    rx: mpsc::UnboundedReceiver<HubCommand>,
    store: Arc<dyn ChatStore>,
    /// Live sessions keyed by session ID.
    sessions: HashMap<String, ConnectionSession>,
    /// Identity → session ID. Exactly one live session per identity.
    by_identity: HashMap<String, String>,
}

impl Hub {
    pub fn new(store: Arc<dyn ChatStore>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx,
                store,
                sessions: HashMap::new(),
                by_identity: HashMap::new(),
            },
            HubHandle { tx },
        )
    }

    /// Process commands in arrival order until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                HubCommand::Register(session) => self.register(session).await,
                HubCommand::Unregister { session_id } => self.unregister(&session_id).await,
                HubCommand::DirectSend {
                    recipient_id,
                    payload,
                } => self.direct_send(&recipient_id, payload).await,
                HubCommand::BroadcastAll { payload } => self.broadcast(None, payload).await,
                HubCommand::BroadcastExcept { sender_id, payload } => {
                    self.broadcast(Some(sender_id.as_str()), payload).await
                }
            }
        }
    }

    async fn register(&mut self, session: ConnectionSession) {
        // Reconnect: close the previous session for this identity before the
        // new one takes the registry slot. The identity never goes offline
        // from its peers' point of view, so no presence event is emitted.
        if let Some(previous) = self.by_identity.remove(&session.identity) {
            if self.sessions.remove(&previous).is_some() {
                tracing::debug!(
                    identity = %session.identity,
                    session_id = %previous,
                    "closing replaced session on reconnect"
                );
            }
        }

        let session_id = session.session_id.clone();
        let identity = session.identity.clone();

        self.by_identity.insert(identity.clone(), session_id.clone());
        self.sessions.insert(session_id.clone(), session);

        if let Err(err) = self.store.set_online(&identity, true).await {
            tracing::warn!(%identity, code = %err.code, "failed to mark identity online");
        }

        // The fresh session gets the online snapshot before any peer hears
        // about it coming online.
        let snapshot = PresenceEvent::OnlineUsers {
            user_ids: self.by_identity.keys().cloned().collect(),
        }
        .to_json();
        if let Some(session) = self.sessions.get(&session_id) {
            if session.try_push(snapshot).is_err() {
                self.unregister(&session_id).await;
                return;
            }
        }

        let user = match self.store.user_by_id(&identity).await {
            Ok(user) => user.map(|u| UserSummary::from(&u)),
            Err(_) => None,
        };
        let event = PresenceEvent::UserOnline {
            user_id: identity.clone(),
            user,
        }
        .to_json();

        tracing::info!(%session_id, user_id = %identity, "session registered");

        self.notify_peers(&session_id, event).await;
    }

    /// Remove a session, mirror the offline flag, and tell the remaining
    /// sessions. Idempotent; a stale unregister from a session that was
    /// already replaced by a reconnect leaves the successor untouched.
    async fn unregister(&mut self, session_id: &str) {
        // Teardown worklist: notifying peers can itself evict sessions whose
        // queues are full, and those evictions must not recurse.
        let mut pending = vec![session_id.to_string()];

        while let Some(id) = pending.pop() {
            let Some(session) = self.sessions.remove(&id) else {
                continue;
            };

            if self.by_identity.get(&session.identity).map(String::as_str) == Some(id.as_str()) {
                self.by_identity.remove(&session.identity);
            }

            if let Err(err) = self.store.set_online(&session.identity, false).await {
                tracing::warn!(identity = %session.identity, code = %err.code, "failed to mark identity offline");
            }

            tracing::info!(session_id = %id, user_id = %session.identity, "session unregistered");

            let event = PresenceEvent::UserOffline {
                user_id: session.identity.clone(),
            }
            .to_json();

            for (peer_id, peer) in &self.sessions {
                if peer.try_push(event.clone()).is_err() {
                    pending.push(peer_id.clone());
                }
            }

            // Dropping the session closes its outbound queue; the connection
            // task observes that and shuts the transport down.
            drop(session);
        }
    }

    async fn direct_send(&mut self, recipient_id: &str, payload: String) {
        let Some(session_id) = self.by_identity.get(recipient_id).cloned() else {
            tracing::trace!(%recipient_id, "direct send to offline identity dropped");
            return;
        };

        if let Some(session) = self.sessions.get(&session_id) {
            if session.try_push(payload).is_err() {
                tracing::debug!(%session_id, %recipient_id, "outbound queue full, dropping session");
                self.unregister(&session_id).await;
            }
        }
    }

    async fn broadcast(&mut self, except_identity: Option<&str>, payload: String) {
        let mut evicted = Vec::new();

        for (session_id, session) in &self.sessions {
            if except_identity == Some(session.identity.as_str()) {
                continue;
            }
            if session.try_push(payload.clone()).is_err() {
                evicted.push(session_id.clone());
            }
        }

        for session_id in evicted {
            tracing::debug!(%session_id, "outbound queue full, dropping session");
            self.unregister(&session_id).await;
        }
    }

    /// Deliver a presence event to every session except the one it is about.
    async fn notify_peers(&mut self, except_session: &str, payload: String) {
        let mut evicted = Vec::new();

        for (session_id, session) in &self.sessions {
            if session_id == except_session {
                continue;
            }
            if session.try_push(payload.clone()).is_err() {
                evicted.push(session_id.clone());
            }
        }

        for session_id in evicted {
            tracing::debug!(%session_id, "outbound queue full, dropping session");
            self.unregister(&session_id).await;
        }
    }
}
