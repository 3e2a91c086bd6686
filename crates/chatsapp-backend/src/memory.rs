//! In-process backend.
//!
//! Implements the account and chat services without any network dependency.
//! Used by tests and by `chatsapp gateway run --backend memory`.
//!
//! Every live subscriber has a bounded queue. Delivery waits for room in it,
//! so a slow reader slows its senders down instead of losing messages.

use crate::error::{BackendError, Rejection, Result};
use crate::service::{AccountService, ChatService, ReceiveCursor, SendStream};
use async_trait::async_trait;
use chatsapp_core::secret::constant_time_eq;
use chatsapp_core::types::{
    Contact, Credentials, Destination, GroupId, GroupSummary, Identity, LoginGrant,
    MessageEnvelope, NewAccount, OutgoingMessage, Roster, Scope, SendAck, UserId,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Queue depth per live subscriber.
const SUBSCRIBER_BUFFER: usize = 64;

struct Account {
    identity: Identity,
    password_hash: String,
}

struct Group {
    name: String,
    members: Vec<UserId>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<MessageEnvelope>,
}

#[derive(Default)]
struct State {
    accounts: BTreeMap<UserId, Account>,
    groups: BTreeMap<GroupId, Group>,
    direct_history: Vec<MessageEnvelope>,
    group_history: Vec<MessageEnvelope>,
}

impl State {
    fn find_user(&self, username: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.identity.username == username)
    }
}

fn hash_password(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// In-memory account and chat backend.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
    subscribers: DashMap<(UserId, Scope), Vec<Subscriber>>,
    next_user_id: AtomicU64,
    next_group_id: AtomicU64,
    next_subscriber_id: AtomicU64,
    calls: AtomicUsize,
    failing_sends: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a backend with a few users and a group for local development.
    ///
    /// Users `abi`, `bob` and `carol` all have the password `secret`.
    pub async fn with_demo_data() -> Result<Arc<Self>> {
        let backend = Self::new();
        let abi = backend.register("abi", "Abi", "secret").await?;
        let bob = backend.register("bob", "Bob", "secret").await?;
        let carol = backend.register("carol", "Carol", "secret").await?;
        backend.create_group("general", &[abi, bob, carol]).await?;
        Ok(backend)
    }

    /// Register an account directly and return its id.
    pub async fn register(
        &self,
        username: &str,
        display_name: &str,
        password: &str,
    ) -> Result<UserId> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(BackendError::Rejected(Rejection::InvalidArgument));
        }

        let mut state = self.state.write().await;
        if state.find_user(username).is_some() {
            return Err(BackendError::Rejected(Rejection::AccountExists));
        }

        let user_id = UserId::new(self.next_user_id.fetch_add(1, Ordering::SeqCst) as i64 + 1);
        let display_name = match display_name.trim() {
            "" => username.to_string(),
            name => name.to_string(),
        };
        state.accounts.insert(
            user_id,
            Account {
                identity: Identity {
                    user_id,
                    username: username.to_string(),
                    display_name,
                },
                password_hash: hash_password(username, password),
            },
        );

        debug!(%user_id, username, "Registered account");
        Ok(user_id)
    }

    /// Create a group with the given members.
    pub async fn create_group(&self, name: &str, members: &[UserId]) -> Result<GroupId> {
        let mut state = self.state.write().await;
        if let Some(missing) = members.iter().find(|m| !state.accounts.contains_key(m)) {
            warn!(user_id = %missing, "Cannot add unknown user to group");
            return Err(BackendError::Rejected(Rejection::InvalidArgument));
        }

        let group_id = GroupId::new(self.next_group_id.fetch_add(1, Ordering::SeqCst) as i64 + 1);
        state.groups.insert(
            group_id,
            Group {
                name: name.to_string(),
                members: members.to_vec(),
            },
        );
        Ok(group_id)
    }

    /// Make every subsequent send report a failed delivery.
    pub fn set_failing_sends(&self, failing: bool) {
        self.failing_sends.store(failing, Ordering::SeqCst);
    }

    /// Number of service calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of live receive streams for a user and scope.
    pub fn subscriber_count(&self, user_id: UserId, scope: Scope) -> usize {
        self.subscribers
            .get(&(user_id, scope))
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// End every receive stream of a user and scope from the backend side.
    pub fn end_streams(&self, user_id: UserId, scope: Scope) {
        self.subscribers.remove(&(user_id, scope));
    }

    /// Direct chat service view of this backend.
    pub fn direct_chat(self: &Arc<Self>) -> MemoryChat {
        MemoryChat {
            backend: Arc::clone(self),
            scope: Scope::Direct,
        }
    }

    /// Group chat service view of this backend.
    pub fn group_chat(self: &Arc<Self>) -> MemoryChat {
        MemoryChat {
            backend: Arc::clone(self),
            scope: Scope::Group,
        }
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn remove_subscriber(&self, key: (UserId, Scope), id: u64) {
        if let Some(mut subs) = self.subscribers.get_mut(&key) {
            subs.retain(|s| s.id != id);
        }
        self.subscribers.remove_if(&key, |_, subs| subs.is_empty());
    }

    /// Queue `envelope` for every live subscriber of `user_id`.
    ///
    /// A full queue holds the sender until the subscriber catches up.
    async fn push(&self, user_id: UserId, envelope: &MessageEnvelope) {
        let key = (user_id, envelope.scope());
        let targets: Vec<(u64, mpsc::Sender<MessageEnvelope>)> = match self.subscribers.get(&key) {
            Some(subs) => subs.iter().map(|s| (s.id, s.tx.clone())).collect(),
            None => return,
        };

        for (id, tx) in targets {
            if tx.send(envelope.clone()).await.is_err() {
                debug!(%user_id, subscriber = id, "Subscriber gone, removing");
                self.remove_subscriber(key, id);
            }
        }
    }

    async fn deliver(&self, message: &OutgoingMessage) -> SendAck {
        let now = Utc::now();
        if self.failing_sends.load(Ordering::SeqCst) {
            return SendAck {
                delivered: false,
                timestamp: now,
            };
        }

        let sender = message.sender().id;
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&sender) {
            return SendAck {
                delivered: false,
                timestamp: now,
            };
        }

        let envelope = message.clone().accepted(now);
        let recipients: Vec<UserId> = match message.destination() {
            Destination::User(receiver) => {
                if !state.accounts.contains_key(&receiver) {
                    return SendAck {
                        delivered: false,
                        timestamp: now,
                    };
                }
                state.direct_history.push(envelope.clone());
                vec![receiver]
            }
            Destination::Group(group_id) => {
                let members = match state.groups.get(&group_id) {
                    Some(group) if group.members.contains(&sender) => group.members.clone(),
                    _ => {
                        return SendAck {
                            delivered: false,
                            timestamp: now,
                        }
                    }
                };
                state.group_history.push(envelope.clone());
                members.into_iter().filter(|m| *m != sender).collect()
            }
        };
        drop(state);

        for recipient in recipients {
            self.push(recipient, &envelope).await;
        }

        SendAck {
            delivered: true,
            timestamp: now,
        }
    }
}

#[async_trait]
impl AccountService for MemoryBackend {
    async fn create_account(&self, account: &NewAccount) -> Result<()> {
        self.record_call();
        self.register(
            &account.username,
            &account.display_name,
            account.password.expose_secret(),
        )
        .await
        .map(|_| ())
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant> {
        self.record_call();
        let state = self.state.read().await;
        let username = credentials.username.trim();
        let account = state
            .find_user(username)
            .ok_or(BackendError::Rejected(Rejection::AccountNotFound))?;

        let presented = hash_password(username, credentials.password.expose_secret());
        if !constant_time_eq(presented.as_bytes(), account.password_hash.as_bytes()) {
            return Err(BackendError::Rejected(Rejection::Unauthorized));
        }

        let me = account.identity.user_id;
        let contacts = state
            .accounts
            .values()
            .filter(|a| a.identity.user_id != me)
            .map(|a| Contact {
                user_id: a.identity.user_id,
                username: a.identity.username.clone(),
                display_name: a.identity.display_name.clone(),
            })
            .collect();
        let groups = state
            .groups
            .iter()
            .filter(|(_, g)| g.members.contains(&me))
            .map(|(id, g)| GroupSummary {
                group_id: *id,
                name: g.name.clone(),
            })
            .collect();

        Ok(LoginGrant {
            identity: account.identity.clone(),
            roster: Roster { contacts, groups },
        })
    }
}

/// One scope of a [`MemoryBackend`].
#[derive(Clone)]
pub struct MemoryChat {
    backend: Arc<MemoryBackend>,
    scope: Scope,
}

#[async_trait]
impl ChatService for MemoryChat {
    fn scope(&self) -> Scope {
        self.scope
    }

    async fn load_history(
        &self,
        me: &Identity,
        destination: Destination,
    ) -> Result<Vec<MessageEnvelope>> {
        self.backend.record_call();
        if destination.scope() != self.scope {
            return Err(BackendError::Rejected(Rejection::InvalidArgument));
        }

        let state = self.backend.state.read().await;
        let me = me.user_id;
        let history = match destination {
            Destination::User(peer) => state
                .direct_history
                .iter()
                .filter(|e| {
                    (e.sender.id == me && e.destination == Destination::User(peer))
                        || (e.sender.id == peer && e.destination == Destination::User(me))
                })
                .cloned()
                .collect(),
            Destination::Group(group_id) => {
                let is_member = state
                    .groups
                    .get(&group_id)
                    .is_some_and(|g| g.members.contains(&me));
                if !is_member {
                    return Err(BackendError::Rejected(Rejection::Unauthorized));
                }
                state
                    .group_history
                    .iter()
                    .filter(|e| e.destination == destination)
                    .cloned()
                    .collect()
            }
        };
        Ok(history)
    }

    async fn open_send_stream(&self) -> Result<Box<dyn SendStream>> {
        self.backend.record_call();
        Ok(Box::new(MemorySendStream {
            backend: Arc::clone(&self.backend),
            scope: self.scope,
        }))
    }

    async fn open_receive_stream(&self, subscriber: &Identity) -> Result<ReceiveCursor> {
        self.backend.record_call();
        if !self
            .backend
            .state
            .read()
            .await
            .accounts
            .contains_key(&subscriber.user_id)
        {
            return Err(BackendError::Rejected(Rejection::AccountNotFound));
        }

        let key = (subscriber.user_id, self.scope);
        let id = self.backend.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.backend
            .subscribers
            .entry(key)
            .or_default()
            .push(Subscriber { id, tx });

        let token = CancellationToken::new();
        let backend = Arc::clone(&self.backend);
        let cancelled = token.clone();
        tokio::spawn(async move {
            cancelled.cancelled().await;
            backend.remove_subscriber(key, id);
            debug!(user_id = %key.0, scope = %key.1, subscriber = id, "Receive stream released");
        });

        Ok(ReceiveCursor::new(ReceiverStream::new(rx).map(Ok), token))
    }
}

struct MemorySendStream {
    backend: Arc<MemoryBackend>,
    scope: Scope,
}

#[async_trait]
impl SendStream for MemorySendStream {
    async fn send(&mut self, message: &OutgoingMessage) -> Result<SendAck> {
        if message.scope() != self.scope {
            return Err(BackendError::Rejected(Rejection::InvalidArgument));
        }
        Ok(self.backend.deliver(message).await)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
