//! Service traits implemented by backend providers.

use crate::error::Result;
use async_trait::async_trait;
use chatsapp_core::types::{
    Credentials, Destination, Identity, LoginGrant, MessageEnvelope, NewAccount, OutgoingMessage,
    Scope, SendAck,
};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Account creation and login.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Register a new account.
    async fn create_account(&self, account: &NewAccount) -> Result<()>;

    /// Authenticate and fetch the identity with its contacts and groups.
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant>;
}

/// Chat operations for one scope.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// The scope this service handles.
    fn scope(&self) -> Scope;

    /// Load the conversation between `me` and `destination`, oldest first.
    async fn load_history(
        &self,
        me: &Identity,
        destination: Destination,
    ) -> Result<Vec<MessageEnvelope>>;

    /// Open a send stream. Each send waits for its own acknowledgment.
    async fn open_send_stream(&self) -> Result<Box<dyn SendStream>>;

    /// Subscribe to messages pushed to `subscriber`.
    async fn open_receive_stream(&self, subscriber: &Identity) -> Result<ReceiveCursor>;
}

/// An open send call.
#[async_trait]
pub trait SendStream: Send {
    /// Push one message and wait for the first acknowledgment.
    async fn send(&mut self, message: &OutgoingMessage) -> Result<SendAck>;

    /// Release the underlying call.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Cancellable stream of messages pushed by the backend.
///
/// Items arrive in backend order. After the backend ends the stream, or after
/// [`cancel`](Self::cancel), [`next`](Self::next) returns `None` forever.
/// Dropping an uncancelled cursor cancels it.
pub struct ReceiveCursor {
    inner: BoxStream<'static, Result<MessageEnvelope>>,
    token: CancellationToken,
    finished: bool,
}

impl ReceiveCursor {
    /// Wrap a backend stream.
    ///
    /// `token` must be observed by the producer so cancelling the cursor
    /// releases the backend call.
    pub fn new<S>(stream: S, token: CancellationToken) -> Self
    where
        S: Stream<Item = Result<MessageEnvelope>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            token,
            finished: false,
        }
    }

    /// Wait for the next pushed message.
    pub async fn next(&mut self) -> Option<Result<MessageEnvelope>> {
        if self.finished || self.token.is_cancelled() {
            return None;
        }

        let item = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            item = self.inner.next() => item,
        };

        if item.is_none() {
            self.finished = true;
        }
        item
    }

    /// Cancel the backend call. Returns `true` only for the call that cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Whether the cursor has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the backend ended the stream.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ReceiveCursor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for ReceiveCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveCursor")
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use chatsapp_core::types::{MessageSender, UserId};
    use chrono::Utc;

    fn envelope(body: &str) -> MessageEnvelope {
        OutgoingMessage::new(
            MessageSender {
                id: UserId::new(1),
                username: "a".to_string(),
            },
            Destination::User(UserId::new(2)),
            body,
        )
        .accepted(Utc::now())
    }

    #[tokio::test]
    async fn test_cursor_yields_in_order_then_ends() {
        let items = vec![Ok(envelope("1")), Ok(envelope("2"))];
        let mut cursor = ReceiveCursor::new(futures::stream::iter(items), CancellationToken::new());

        assert_eq!(cursor.next().await.unwrap().unwrap().body, "1");
        assert_eq!(cursor.next().await.unwrap().unwrap().body, "2");
        assert!(cursor.next().await.is_none());
        assert!(cursor.is_finished());
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cursor_passes_errors_through() {
        let items = vec![Err(BackendError::StreamClosed)];
        let mut cursor = ReceiveCursor::new(futures::stream::iter(items), CancellationToken::new());
        assert!(matches!(
            cursor.next().await,
            Some(Err(BackendError::StreamClosed))
        ));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        let mut cursor = ReceiveCursor::new(futures::stream::pending(), token.clone());

        assert!(cursor.cancel());
        assert!(!cursor.cancel());
        assert!(token.is_cancelled());
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_next() {
        let token = CancellationToken::new();
        let mut cursor = ReceiveCursor::new(futures::stream::pending(), token.clone());

        let waiter = tokio::spawn(async move { cursor.next().await.is_none() });
        tokio::task::yield_now().await;
        token.cancel();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_drop_cancels() {
        let token = CancellationToken::new();
        let cursor = ReceiveCursor::new(futures::stream::pending(), token.clone());
        drop(cursor);
        assert!(token.is_cancelled());
    }
}
