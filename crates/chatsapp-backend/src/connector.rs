//! Backend connector: the single entry point the gateway uses.

use crate::error::{BackendError, Result};
use crate::grpc::{GrpcAccountService, GrpcDirectChat, GrpcGroupChat, LazyChannel};
use crate::memory::MemoryBackend;
use crate::service::{AccountService, ChatService, ReceiveCursor};
use chatsapp_core::config::{BackendConfig, BackendMode};
use chatsapp_core::types::{
    Credentials, Destination, Identity, LoginGrant, MessageEnvelope, NewAccount, OutgoingMessage,
    Scope,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default deadline for unary calls and stream opening.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the account service and one chat service per scope, and applies the
/// call policy (deadlines, single retry of transient unary failures).
#[derive(Clone)]
pub struct BackendConnector {
    accounts: Arc<dyn AccountService>,
    direct: Arc<dyn ChatService>,
    group: Arc<dyn ChatService>,
    timeout: Duration,
}

impl BackendConnector {
    /// Create a connector from service implementations.
    ///
    /// Fails with `Protocol` when a chat service is wired to the wrong scope.
    pub fn new(
        accounts: Arc<dyn AccountService>,
        direct: Arc<dyn ChatService>,
        group: Arc<dyn ChatService>,
    ) -> Result<Self> {
        for (expected, chat) in [(Scope::Direct, &direct), (Scope::Group, &group)] {
            if chat.scope() != expected {
                return Err(BackendError::Protocol(format!(
                    "{} chat slot given a {} service",
                    expected,
                    chat.scope()
                )));
            }
        }
        Ok(Self::from_parts(accounts, direct, group))
    }

    fn from_parts(
        accounts: Arc<dyn AccountService>,
        direct: Arc<dyn ChatService>,
        group: Arc<dyn ChatService>,
    ) -> Self {
        Self {
            accounts,
            direct,
            group,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connector over an in-process backend.
    pub fn memory(backend: Arc<MemoryBackend>) -> Self {
        Self::from_parts(
            backend.clone(),
            Arc::new(backend.direct_chat()),
            Arc::new(backend.group_chat()),
        )
    }

    /// Connector over the remote gRPC services. Channels connect on first use.
    pub fn grpc(config: &BackendConfig) -> Result<Self> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let accounts = GrpcAccountService::new(LazyChannel::new(&config.account_url, connect_timeout)?);
        let direct = GrpcDirectChat::new(LazyChannel::new(&config.direct_chat_url, connect_timeout)?);
        let group = GrpcGroupChat::new(LazyChannel::new(&config.group_chat_url, connect_timeout)?);

        Ok(Self::from_parts(Arc::new(accounts), Arc::new(direct), Arc::new(group))
            .with_timeout(Duration::from_millis(config.request_timeout_ms)))
    }

    /// Build the connector selected by `config.mode`.
    pub async fn from_config(config: &BackendConfig) -> Result<Self> {
        match config.mode {
            BackendMode::Grpc => Self::grpc(config),
            BackendMode::Memory => Ok(Self::memory(MemoryBackend::with_demo_data().await?)
                .with_timeout(Duration::from_millis(config.request_timeout_ms))),
        }
    }

    /// The call deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn chat(&self, scope: Scope) -> &Arc<dyn ChatService> {
        match scope {
            Scope::Direct => &self.direct,
            Scope::Group => &self.group,
        }
    }

    async fn deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
    }

    async fn unary<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.deadline(call()).await {
            Err(e) if e.is_transient() => {
                warn!(op, error = %e, "Transient backend failure, retrying once");
                self.deadline(call()).await.map_err(|e| match e {
                    BackendError::Connect { endpoint, message } => {
                        BackendError::Unavailable(format!("{}: {}", endpoint, message))
                    }
                    other => other,
                })
            }
            other => other,
        }
    }

    /// Register a new account.
    pub async fn create_account(&self, account: &NewAccount) -> Result<()> {
        self.unary("create_account", || self.accounts.create_account(account))
            .await
    }

    /// Authenticate a user.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginGrant> {
        self.unary("login", || self.accounts.login(credentials)).await
    }

    /// Load the conversation with a user or group, oldest first.
    pub async fn load_history(
        &self,
        me: &Identity,
        destination: Destination,
    ) -> Result<Vec<MessageEnvelope>> {
        let chat = self.chat(destination.scope());
        self.unary("load_history", || chat.load_history(me, destination))
            .await
    }

    /// Send one message over a fresh send stream and wait for its acknowledgment.
    ///
    /// A negative acknowledgment fails with `Rejected(MessageFailed)`.
    pub async fn send_once(&self, message: OutgoingMessage) -> Result<MessageEnvelope> {
        let chat = self.chat(message.scope());
        let mut stream = self.deadline(chat.open_send_stream()).await?;
        let ack = self.deadline(stream.send(&message)).await;

        if let Err(e) = self.deadline(stream.close()).await {
            debug!(error = %e, "Send stream close failed");
        }

        let ack = ack?;
        if !ack.delivered {
            return Err(BackendError::Rejected(crate::Rejection::MessageFailed));
        }
        Ok(message.accepted(ack.timestamp))
    }

    /// Open a receive stream for `subscriber`. Not retried.
    pub async fn open_receive_stream(
        &self,
        scope: Scope,
        subscriber: &Identity,
    ) -> Result<ReceiveCursor> {
        self.deadline(self.chat(scope).open_receive_stream(subscriber))
            .await
    }
}

impl std::fmt::Debug for BackendConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnector")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
