//! Bridges backend receive cursors to client streams.
//!
//! Every subscription gets a [`RelayStream`] fed by one pump task. The pump
//! forwards cursor items through a bounded channel and always cancels the
//! cursor on exit, whichever side ended first.

use chatsapp_backend::{BackendConnector, BackendError, ReceiveCursor};
use chatsapp_core::types::{Identity, MessageEnvelope, Scope, UserId};
use dashmap::DashMap;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Default per-stream buffer.
pub const DEFAULT_BUFFER: usize = 16;

/// Lifecycle of a relayed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Opening,
    Streaming,
    Closing,
    Closed,
}

/// Snapshot of a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamHandle {
    pub id: u64,
    pub user_id: UserId,
    pub scope: Scope,
    pub state: StreamState,
}

#[derive(Debug)]
enum CloseReason {
    ClientGone,
    BackendEnded,
    BackendFailed(BackendError),
    Shutdown,
}

type Registry = DashMap<u64, StreamHandle>;

/// Relay of live subscriptions.
pub struct StreamRelay {
    connector: BackendConnector,
    buffer: usize,
    handles: Arc<Registry>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl StreamRelay {
    /// Create a relay whose streams buffer up to `buffer` messages.
    pub fn new(connector: BackendConnector, buffer: usize) -> Self {
        Self {
            connector,
            buffer: buffer.max(1),
            handles: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Open a subscription for `identity` in `scope`.
    ///
    /// If the backend refuses, the error is returned and nothing is registered.
    pub async fn open(&self, identity: &Identity, scope: Scope) -> Result<RelayStream, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(
            id,
            StreamHandle {
                id,
                user_id: identity.user_id,
                scope,
                state: StreamState::Opening,
            },
        );

        let cursor = match self.connector.open_receive_stream(scope, identity).await {
            Ok(cursor) => cursor,
            Err(e) => {
                self.handles.remove(&id);
                warn!(user_id = %identity.user_id, %scope, error = %e, "Failed to open receive stream");
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(self.buffer);
        set_state(&self.handles, id, StreamState::Streaming);
        info!(stream = id, user_id = %identity.user_id, %scope, "Stream opened");

        self.tracker.spawn(pump(
            id,
            cursor,
            tx,
            Arc::clone(&self.handles),
            self.shutdown.clone(),
        ));

        Ok(RelayStream { id, rx })
    }

    /// Number of registered subscriptions.
    pub fn active_count(&self) -> usize {
        self.handles.len()
    }

    /// Snapshots of registered subscriptions, ordered by id.
    pub fn handles(&self) -> Vec<StreamHandle> {
        let mut handles: Vec<_> = self.handles.iter().map(|h| h.value().clone()).collect();
        handles.sort_by_key(|h| h.id);
        handles
    }

    /// Current state of a subscription. Removed subscriptions are `Closed`.
    pub fn state(&self, id: u64) -> StreamState {
        self.handles
            .get(&id)
            .map(|h| h.state)
            .unwrap_or(StreamState::Closed)
    }

    /// Token cancelled when the relay shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Close every subscription and wait for their pumps to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Stream relay stopped");
    }
}

fn set_state(handles: &Registry, id: u64, state: StreamState) {
    if let Some(mut handle) = handles.get_mut(&id) {
        handle.state = state;
    }
}

async fn pump(
    id: u64,
    mut cursor: ReceiveCursor,
    tx: mpsc::Sender<MessageEnvelope>,
    handles: Arc<Registry>,
    shutdown: CancellationToken,
) {
    let mut forwarded = 0u64;

    let reason = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            _ = tx.closed() => break CloseReason::ClientGone,
            item = cursor.next() => match item {
                Some(Ok(envelope)) => {
                    // Waits for room in the buffer; the cursor is not polled meanwhile.
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break CloseReason::Shutdown,
                        sent = tx.send(envelope) => {
                            if sent.is_err() {
                                break CloseReason::ClientGone;
                            }
                            forwarded += 1;
                        }
                    }
                }
                Some(Err(e)) => break CloseReason::BackendFailed(e),
                None => break CloseReason::BackendEnded,
            },
        }
    };

    set_state(&handles, id, StreamState::Closing);
    cursor.cancel();
    drop(tx);
    handles.remove(&id);

    match reason {
        CloseReason::BackendFailed(e) => {
            warn!(stream = id, forwarded, error = %e, "Stream closed by backend failure")
        }
        other => info!(stream = id, forwarded, reason = ?other, "Stream closed"),
    }
}

/// Client side of a subscription. Dropping it closes the subscription.
#[derive(Debug)]
pub struct RelayStream {
    id: u64,
    rx: mpsc::Receiver<MessageEnvelope>,
}

impl RelayStream {
    /// Registry id of this subscription.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Stream for RelayStream {
    type Item = MessageEnvelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
