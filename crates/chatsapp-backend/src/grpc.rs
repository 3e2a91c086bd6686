//! gRPC implementation of the backend services.
//!
//! Clients are built directly on `tonic::client::Grpc` with the hand-written
//! messages in [`crate::proto`]. Each service owns a lazily connected channel.

use crate::error::{BackendError, Rejection, Result};
use crate::proto::{auth, common, group, user};
use crate::service::{AccountService, ChatService, ReceiveCursor, SendStream};
use async_trait::async_trait;
use chatsapp_core::types::{
    Contact, Credentials, Destination, GroupId, GroupSummary, Identity, LoginGrant,
    MessageEnvelope, MessageSender, NewAccount, OutgoingMessage, Roster, Scope, SendAck, UserId,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::{Stream, StreamExt};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OnceCell};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, warn};

const SEND_BUFFER: usize = 4;

/// A channel established on first use and shared afterwards.
///
/// Concurrent first callers wait on the same connection attempt. A failed
/// attempt leaves the cell empty so the next call reconnects.
#[derive(Clone)]
pub struct LazyChannel {
    endpoint: Endpoint,
    cell: Arc<OnceCell<Channel>>,
}

impl LazyChannel {
    /// Create a lazy channel for `url`.
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self> {
        let endpoint = Endpoint::from_shared(url.to_string())
            .map_err(|e| BackendError::Connect {
                endpoint: url.to_string(),
                message: e.to_string(),
            })?
            .connect_timeout(connect_timeout);

        Ok(Self {
            endpoint,
            cell: Arc::new(OnceCell::new()),
        })
    }

    /// Get the channel, connecting if needed.
    pub async fn get(&self) -> Result<Channel> {
        let channel = self
            .cell
            .get_or_try_init(|| async {
                debug!(endpoint = %self.endpoint.uri(), "Connecting to backend");
                self.endpoint
                    .connect()
                    .await
                    .map_err(|e| BackendError::Connect {
                        endpoint: self.endpoint.uri().to_string(),
                        message: e.to_string(),
                    })
            })
            .await?;
        Ok(channel.clone())
    }

    /// Whether a connection has been established.
    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }
}

async fn ready_client(channel: Channel) -> Result<tonic::client::Grpc<Channel>> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| BackendError::Unavailable(format!("service not ready: {}", e)))?;
    Ok(grpc)
}

async fn unary_call<Req, Resp>(channel: Channel, path: &'static str, request: Req) -> Result<Resp>
where
    Req: prost::Message + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    let mut grpc = ready_client(channel).await?;
    let codec: ProstCodec<Req, Resp> = ProstCodec::default();
    let response = grpc
        .unary(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            codec,
        )
        .await?;
    Ok(response.into_inner())
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 and naive ISO-8601 (interpreted as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn timestamp_or_now(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        if !raw.trim().is_empty() {
            warn!(timestamp = raw, "Unparseable backend timestamp, using receipt time");
        }
        Utc::now()
    })
}

fn message_user(id: UserId, username: &str) -> common::MessageUser {
    common::MessageUser {
        userid: id.get(),
        username: username.to_string(),
        sentat: String::new(),
    }
}

fn sender_of(user: Option<common::MessageUser>) -> Result<(MessageSender, String)> {
    let user = user.ok_or_else(|| BackendError::Protocol("message without sender".into()))?;
    let id = UserId::checked(user.userid).map_err(|e| BackendError::Protocol(e.to_string()))?;
    Ok((
        MessageSender {
            id,
            username: user.username,
        },
        user.sentat,
    ))
}

fn ack_from(status: i32, sentat: &str) -> Result<SendAck> {
    let status = common::MessageStatus::try_from(status)
        .map_err(|_| BackendError::Protocol(format!("unknown message status {}", status)))?;
    Ok(SendAck {
        delivered: status == common::MessageStatus::Delivered,
        timestamp: timestamp_or_now(sentat),
    })
}

fn rejection_of(status: i32) -> Result<Option<Rejection>> {
    let status = common::ResponseStatus::try_from(status)
        .map_err(|_| BackendError::Protocol(format!("unknown response status {}", status)))?;
    Ok(match status {
        common::ResponseStatus::Success => None,
        common::ResponseStatus::Failure => Some(Rejection::Failed),
        common::ResponseStatus::AccountExists => Some(Rejection::AccountExists),
        common::ResponseStatus::AccountNotFound => Some(Rejection::AccountNotFound),
        common::ResponseStatus::Unauthorized => Some(Rejection::Unauthorized),
    })
}

/// Account service client.
pub struct GrpcAccountService {
    channel: LazyChannel,
}

impl GrpcAccountService {
    const CREATE_PATH: &'static str = "/ChatsApp.auth.AccountService/CreateAccount";
    const LOGIN_PATH: &'static str = "/ChatsApp.auth.AccountService/LoginAccount";

    pub fn new(channel: LazyChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl AccountService for GrpcAccountService {
    async fn create_account(&self, account: &NewAccount) -> Result<()> {
        let request = auth::CreateAccountRequest {
            user_name: account.username.clone(),
            display_name: account.display_name.clone(),
            password: account.password.expose_secret().to_string(),
        };
        let channel = self.channel.get().await?;
        let response: auth::CreateAccountResponse =
            unary_call(channel, Self::CREATE_PATH, request).await?;

        match rejection_of(response.status)? {
            None => Ok(()),
            Some(rejection) => Err(BackendError::Rejected(rejection)),
        }
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant> {
        let request = auth::LoginAccountRequest {
            user_name: credentials.username.clone(),
            password: credentials.password.expose_secret().to_string(),
        };
        let channel = self.channel.get().await?;
        let response: auth::LoginAccountResponse =
            unary_call(channel, Self::LOGIN_PATH, request).await?;

        if let Some(rejection) = rejection_of(response.status)? {
            return Err(BackendError::Rejected(rejection));
        }

        let protocol = |e: chatsapp_core::error::IdError| BackendError::Protocol(e.to_string());
        let identity = Identity {
            user_id: UserId::checked(response.userid).map_err(protocol)?,
            username: response.user_name,
            display_name: response.display_name,
        };

        let contacts = response
            .contacts
            .into_iter()
            .map(|c| {
                Ok(Contact {
                    user_id: UserId::checked(c.userid).map_err(protocol)?,
                    username: c.user_name,
                    display_name: c.display_name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let groups = response
            .groups
            .into_iter()
            .map(|g| {
                Ok(GroupSummary {
                    group_id: GroupId::checked(g.groupid).map_err(protocol)?,
                    name: g.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LoginGrant {
            identity,
            roster: Roster { contacts, groups },
        })
    }
}

/// Wire mapping for one chat scope.
pub trait ChatWire: Send + Sync + 'static {
    const SCOPE: Scope;
    const LOAD_PATH: &'static str;
    const SEND_PATH: &'static str;
    const RECEIVE_PATH: &'static str;

    type LoadRequest: prost::Message + Send + Sync + 'static;
    type LoadResponse: prost::Message + Default + Send + Sync + 'static;
    type SendRequest: prost::Message + Send + Sync + 'static;
    type SendResponse: prost::Message + Default + Send + Sync + 'static;
    type ReceiveRequest: prost::Message + Send + Sync + 'static;
    type ReceiveResponse: prost::Message + Default + Send + Sync + 'static;

    fn load_request(me: &Identity, destination: Destination) -> Result<Self::LoadRequest>;

    fn history(
        me: &Identity,
        destination: Destination,
        response: Self::LoadResponse,
    ) -> Result<Vec<MessageEnvelope>>;

    fn send_request(message: &OutgoingMessage) -> Result<Self::SendRequest>;

    fn send_ack(response: Self::SendResponse) -> Result<SendAck>;

    fn receive_request(subscriber: &Identity) -> Self::ReceiveRequest;

    fn pushed(subscriber: &Identity, response: Self::ReceiveResponse) -> Result<MessageEnvelope>;
}

fn wrong_scope(expected: Scope, destination: Destination) -> BackendError {
    BackendError::Protocol(format!(
        "{} chat cannot address {}",
        expected, destination
    ))
}

fn zip_history(
    senders: Vec<common::MessageUser>,
    messages: Vec<String>,
    timestamps: Vec<String>,
    mut destination_for: impl FnMut(&MessageSender) -> Destination,
) -> Result<Vec<MessageEnvelope>> {
    if senders.len() != messages.len() {
        return Err(BackendError::Protocol(format!(
            "history has {} senders for {} messages",
            senders.len(),
            messages.len()
        )));
    }

    let mut timestamps = timestamps.into_iter();
    senders
        .into_iter()
        .zip(messages)
        .map(|(sender, body)| {
            let (sender, sentat) = sender_of(Some(sender))?;
            let raw = timestamps.next().unwrap_or(sentat);
            Ok(MessageEnvelope {
                destination: destination_for(&sender),
                sender,
                body,
                sent_at: timestamp_or_now(&raw),
            })
        })
        .collect()
}

/// Direct (user to user) chat wire mapping.
pub struct DirectWire;

impl ChatWire for DirectWire {
    const SCOPE: Scope = Scope::Direct;
    const LOAD_PATH: &'static str = "/ChatsApp.user.UserChatService/LoadMessages";
    const SEND_PATH: &'static str = "/ChatsApp.user.UserChatService/SendMessages";
    const RECEIVE_PATH: &'static str = "/ChatsApp.user.UserChatService/ReceiveMessages";

    type LoadRequest = user::LoadMessageRequest;
    type LoadResponse = user::LoadMessageResponse;
    type SendRequest = user::SendMessageRequest;
    type SendResponse = user::SendMessageResponse;
    type ReceiveRequest = user::ReceiveMessageRequest;
    type ReceiveResponse = user::ReceiveMessageResponse;

    fn load_request(me: &Identity, destination: Destination) -> Result<Self::LoadRequest> {
        let Destination::User(peer) = destination else {
            return Err(wrong_scope(Self::SCOPE, destination));
        };
        Ok(user::LoadMessageRequest {
            fromuser: Some(message_user(me.user_id, &me.username)),
            touser: Some(message_user(peer, "")),
        })
    }

    fn history(
        me: &Identity,
        destination: Destination,
        response: Self::LoadResponse,
    ) -> Result<Vec<MessageEnvelope>> {
        let Destination::User(peer) = destination else {
            return Err(wrong_scope(Self::SCOPE, destination));
        };
        let me = me.user_id;
        zip_history(
            response.senders,
            response.messages,
            response.timestamps,
            |sender| {
                if sender.id == me {
                    Destination::User(peer)
                } else {
                    Destination::User(me)
                }
            },
        )
    }

    fn send_request(message: &OutgoingMessage) -> Result<Self::SendRequest> {
        let Destination::User(receiver) = message.destination() else {
            return Err(wrong_scope(Self::SCOPE, message.destination()));
        };
        let sender = message.sender();
        Ok(user::SendMessageRequest {
            sender: Some(message_user(sender.id, &sender.username)),
            receiver: Some(message_user(receiver, "")),
            message: message.body().to_string(),
        })
    }

    fn send_ack(response: Self::SendResponse) -> Result<SendAck> {
        ack_from(response.status, &response.sentat)
    }

    fn receive_request(subscriber: &Identity) -> Self::ReceiveRequest {
        user::ReceiveMessageRequest {
            fromuser: Some(message_user(subscriber.user_id, &subscriber.username)),
        }
    }

    fn pushed(subscriber: &Identity, response: Self::ReceiveResponse) -> Result<MessageEnvelope> {
        let (sender, sentat) = sender_of(response.sender)?;
        Ok(MessageEnvelope {
            sender,
            destination: Destination::User(subscriber.user_id),
            body: response.message,
            sent_at: timestamp_or_now(&sentat),
        })
    }
}

/// Group chat wire mapping.
pub struct GroupWire;

impl GroupWire {
    fn group_id(group: Option<common::MessageGroup>) -> Result<GroupId> {
        let group = group.ok_or_else(|| BackendError::Protocol("message without group".into()))?;
        GroupId::checked(group.groupid).map_err(|e| BackendError::Protocol(e.to_string()))
    }
}

impl ChatWire for GroupWire {
    const SCOPE: Scope = Scope::Group;
    const LOAD_PATH: &'static str = "/ChatsApp.group.GroupChatService/LoadMessages";
    const SEND_PATH: &'static str = "/ChatsApp.group.GroupChatService/SendMessage";
    const RECEIVE_PATH: &'static str = "/ChatsApp.group.GroupChatService/ReceiveMessages";

    type LoadRequest = group::LoadMessageRequest;
    type LoadResponse = group::LoadMessageResponse;
    type SendRequest = group::SendMessageRequest;
    type SendResponse = group::SendMessageResponse;
    type ReceiveRequest = group::ReceiveMessageRequest;
    type ReceiveResponse = group::ReceiveMessageResponse;

    fn load_request(me: &Identity, destination: Destination) -> Result<Self::LoadRequest> {
        let Destination::Group(group_id) = destination else {
            return Err(wrong_scope(Self::SCOPE, destination));
        };
        Ok(group::LoadMessageRequest {
            fromuser: Some(message_user(me.user_id, &me.username)),
            group: Some(common::MessageGroup {
                groupid: group_id.get(),
                name: String::new(),
            }),
        })
    }

    fn history(
        _me: &Identity,
        destination: Destination,
        response: Self::LoadResponse,
    ) -> Result<Vec<MessageEnvelope>> {
        if destination.scope() != Self::SCOPE {
            return Err(wrong_scope(Self::SCOPE, destination));
        }
        zip_history(
            response.senders,
            response.messages,
            response.timestamps,
            |_| destination,
        )
    }

    fn send_request(message: &OutgoingMessage) -> Result<Self::SendRequest> {
        let Destination::Group(group_id) = message.destination() else {
            return Err(wrong_scope(Self::SCOPE, message.destination()));
        };
        let sender = message.sender();
        Ok(group::SendMessageRequest {
            sender: Some(message_user(sender.id, &sender.username)),
            group: Some(common::MessageGroup {
                groupid: group_id.get(),
                name: String::new(),
            }),
            message: message.body().to_string(),
        })
    }

    fn send_ack(response: Self::SendResponse) -> Result<SendAck> {
        ack_from(response.status, &response.sentat)
    }

    fn receive_request(subscriber: &Identity) -> Self::ReceiveRequest {
        group::ReceiveMessageRequest {
            fromuser: Some(message_user(subscriber.user_id, &subscriber.username)),
        }
    }

    fn pushed(_subscriber: &Identity, response: Self::ReceiveResponse) -> Result<MessageEnvelope> {
        let group_id = Self::group_id(response.group)?;
        let (sender, sentat) = sender_of(response.sender)?;
        Ok(MessageEnvelope {
            sender,
            destination: Destination::Group(group_id),
            body: response.message,
            sent_at: timestamp_or_now(&sentat),
        })
    }
}

/// Chat service client for one scope.
pub struct GrpcChatService<W> {
    channel: LazyChannel,
    _wire: PhantomData<fn() -> W>,
}

/// Direct chat client.
pub type GrpcDirectChat = GrpcChatService<DirectWire>;

/// Group chat client.
pub type GrpcGroupChat = GrpcChatService<GroupWire>;

impl<W: ChatWire> GrpcChatService<W> {
    pub fn new(channel: LazyChannel) -> Self {
        Self {
            channel,
            _wire: PhantomData,
        }
    }
}

/// Subscribe request stream: the single subscribe message, then open until cancelled.
///
/// The call half-closes when `token` is cancelled.
fn subscribe_requests<R: Send + 'static>(
    first: R,
    token: CancellationToken,
) -> impl Stream<Item = R> + Send + 'static {
    futures::stream::once(futures::future::ready(first)).chain(
        futures::stream::once(async move { token.cancelled().await })
            .filter_map(|()| futures::future::ready(None)),
    )
}

#[async_trait]
impl<W: ChatWire> ChatService for GrpcChatService<W> {
    fn scope(&self) -> Scope {
        W::SCOPE
    }

    async fn load_history(
        &self,
        me: &Identity,
        destination: Destination,
    ) -> Result<Vec<MessageEnvelope>> {
        let request = W::load_request(me, destination)?;
        let channel = self.channel.get().await?;
        let response: W::LoadResponse = unary_call(channel, W::LOAD_PATH, request).await?;
        W::history(me, destination, response)
    }

    async fn open_send_stream(&self) -> Result<Box<dyn SendStream>> {
        let channel = self.channel.get().await?;
        Ok(Box::new(GrpcSendStream::<W> {
            channel,
            call: None,
        }))
    }

    async fn open_receive_stream(&self, subscriber: &Identity) -> Result<ReceiveCursor> {
        let channel = self.channel.get().await?;
        let mut grpc = ready_client(channel).await?;

        // The subscribe request is already queued when the call starts, so a
        // server that reads it before sending headers still answers. Refusals
        // surface here rather than on the first pull.
        let token = CancellationToken::new();
        let outbound = subscribe_requests(W::receive_request(subscriber), token.clone());
        let codec: ProstCodec<W::ReceiveRequest, W::ReceiveResponse> = ProstCodec::default();
        let response = grpc
            .streaming(
                tonic::Request::new(outbound),
                PathAndQuery::from_static(W::RECEIVE_PATH),
                codec,
            )
            .await?;
        debug!(user_id = %subscriber.user_id, scope = %W::SCOPE, "Receive stream established");

        let subscriber = subscriber.clone();
        let pushes = response.into_inner().map(move |item| {
            item.map_err(BackendError::from)
                .and_then(|response| W::pushed(&subscriber, response))
        });
        Ok(ReceiveCursor::new(pushes, token))
    }
}

struct OpenSend<W: ChatWire> {
    tx: mpsc::Sender<W::SendRequest>,
    inbound: tonic::Streaming<W::SendResponse>,
}

/// Send stream over a bidirectional call, started by the first send.
struct GrpcSendStream<W: ChatWire> {
    channel: Channel,
    call: Option<OpenSend<W>>,
}

#[async_trait]
impl<W: ChatWire> SendStream for GrpcSendStream<W> {
    async fn send(&mut self, message: &OutgoingMessage) -> Result<SendAck> {
        let request = W::send_request(message)?;

        if let Some(call) = self.call.as_mut() {
            call.tx
                .send(request)
                .await
                .map_err(|_| BackendError::StreamClosed)?;
        } else {
            // Queue the first message before starting the call so a server
            // that waits for input before sending headers cannot deadlock us.
            let (tx, rx) = mpsc::channel(SEND_BUFFER);
            tx.send(request)
                .await
                .map_err(|_| BackendError::StreamClosed)?;

            let mut grpc = ready_client(self.channel.clone()).await?;
            let codec: ProstCodec<W::SendRequest, W::SendResponse> = ProstCodec::default();
            let response = grpc
                .streaming(
                    tonic::Request::new(ReceiverStream::new(rx)),
                    PathAndQuery::from_static(W::SEND_PATH),
                    codec,
                )
                .await?;

            self.call = Some(OpenSend {
                tx,
                inbound: response.into_inner(),
            });
        }

        let call = self.call.as_mut().ok_or(BackendError::StreamClosed)?;
        match call.inbound.message().await? {
            Some(response) => W::send_ack(response),
            None => Err(BackendError::StreamClosed),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        let Some(OpenSend { tx, mut inbound }) = this.call else {
            return Ok(());
        };

        drop(tx);
        while inbound.message().await?.is_some() {}
        Ok(())
    }
}
