//! HTTP handlers.
//!
//! Account forms answer with redirects and flash notices. Everything under
//! `/api` answers with JSON and relies on [`require_session`] having resolved
//! the caller.
//!
//! [`require_session`]: crate::auth::require_session

use crate::auth::{redirect, take_notice, CurrentSession, PageSession};
use crate::error::GatewayError;
use crate::flash::{Flash, Notice};
use crate::relay::RelayStream;
use crate::server::GatewayState;
use crate::session::Session;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use axum_extra::extract::cookie::CookieJar;
use chatsapp_backend::Rejection;
use chatsapp_core::types::{
    Contact, Credentials, Destination, GroupId, GroupSummary, Identity, MessageEnvelope,
    MessageSender, NewAccount, OutgoingMessage, RawId, Scope, UserId,
};
use chatsapp_core::SecretString;
use chrono::{DateTime, Utc};
use futures::stream::Map;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Registration form.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, rename = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub password: SecretString,
}

/// Login form.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: SecretString,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDirectRequest {
    pub recipient_id: RawId,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendGroupRequest {
    pub group_id: RawId,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Main page view model.
#[derive(Debug, Serialize)]
pub struct MainView {
    pub user: Identity,
    pub contacts: Vec<Contact>,
    pub groups: Vec<GroupSummary>,
    pub flash: Option<Flash>,
}

/// Login and registration page view model.
#[derive(Debug, Serialize)]
pub struct AuthView {
    pub flash: Option<Flash>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub user: Identity,
    pub contacts: Vec<Contact>,
    pub groups: Vec<GroupSummary>,
}

/// A message as sent to browsers, in history lists and push events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeView {
    pub sender: MessageSender,
    pub destination: Destination,
    pub scope: Scope,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl From<MessageEnvelope> for EnvelopeView {
    fn from(envelope: MessageEnvelope) -> Self {
        Self {
            scope: envelope.scope(),
            sender: envelope.sender,
            destination: envelope.destination,
            body: envelope.body,
            sent_at: envelope.sent_at,
        }
    }
}

fn flash_redirect(
    state: &GatewayState,
    jar: CookieJar,
    notice: Notice,
    location: &'static str,
) -> Response {
    (jar.add(state.cookies.flash_cookie(notice)), redirect(location)).into_response()
}

/// `POST /register`
pub async fn register(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    form: Result<Form<RegisterForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!(error = %rejection, "Unreadable registration form");
            return flash_redirect(&state, jar, Notice::RegistrationFailed, "/register");
        }
    };

    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return flash_redirect(&state, jar, Notice::RegistrationFailed, "/register");
    }
    let display_name = match form.display_name.trim() {
        "" => username,
        name => name,
    };

    let account = NewAccount {
        username: username.to_string(),
        display_name: display_name.to_string(),
        password: form.password.clone(),
    };

    let (notice, location) = match state.backend.create_account(&account).await {
        Ok(()) => {
            info!(username, "Account registered");
            (Notice::Registered, "/login")
        }
        Err(e) => {
            let notice = match e.rejection() {
                Some(Rejection::AccountExists) => Notice::UsernameTaken,
                Some(_) => Notice::RegistrationFailed,
                None => {
                    error!(username, error = %e, "Registration failed");
                    Notice::Unavailable
                }
            };
            debug!(username, error = %e, "Registration rejected");
            (notice, "/register")
        }
    };

    flash_redirect(&state, jar, notice, location)
}

/// `POST /login`
pub async fn login(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!(error = %rejection, "Unreadable login form");
            return flash_redirect(&state, jar, Notice::LoginFailed, "/login");
        }
    };

    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return flash_redirect(&state, jar, Notice::WrongCredentials, "/login");
    }

    let credentials = Credentials {
        username: username.to_string(),
        password: form.password.clone(),
    };

    match state.backend.login(&credentials).await {
        Ok(grant) => {
            let user_id = grant.identity.user_id;
            let token = state.sessions.create(grant.identity, grant.roster);
            state.sessions.attach_flash(&token, Notice::LoggedIn.flash());
            info!(%user_id, username, "User logged in");

            let jar = jar
                .add(state.cookies.session_cookie(token))
                .remove(state.cookies.flash_removal());
            (jar, redirect("/")).into_response()
        }
        Err(e) => {
            let notice = match e.rejection() {
                Some(Rejection::AccountNotFound) => Notice::AccountNotFound,
                Some(Rejection::Unauthorized) => Notice::WrongCredentials,
                Some(_) => Notice::LoginFailed,
                None => {
                    error!(username, error = %e, "Login failed");
                    Notice::Unavailable
                }
            };
            debug!(username, error = %e, "Login rejected");
            flash_redirect(&state, jar, notice, "/login")
        }
    }
}

/// `GET /logout`
pub async fn logout(State(state): State<Arc<GatewayState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(&state.cookies.name) {
        state.sessions.destroy(cookie.value());
    }
    let jar = jar
        .remove(state.cookies.session_removal())
        .add(state.cookies.flash_cookie(Notice::LoggedOut));
    (jar, redirect("/login")).into_response()
}

/// `GET /`
pub async fn main_view(page: PageSession) -> Json<MainView> {
    let PageSession { session, flash } = page;
    Json(MainView {
        user: session.identity,
        contacts: session.roster.contacts,
        groups: session.roster.groups,
        flash,
    })
}

/// `GET /login`
pub async fn login_view(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
) -> (CookieJar, Json<AuthView>) {
    let (jar, flash) = take_notice(jar, &state.cookies);
    (jar, Json(AuthView { flash }))
}

/// `GET /register`
pub async fn register_view(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
) -> (CookieJar, Json<AuthView>) {
    let (jar, flash) = take_notice(jar, &state.cookies);
    (jar, Json(AuthView { flash }))
}

/// `GET /api/session`
pub async fn session_info(CurrentSession(session): CurrentSession) -> Json<SessionInfo> {
    Json(SessionInfo {
        user: session.identity,
        contacts: session.roster.contacts,
        groups: session.roster.groups,
    })
}

/// `GET /api/messages/user/:userId`
pub async fn direct_history(
    State(state): State<Arc<GatewayState>>,
    CurrentSession(session): CurrentSession,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<EnvelopeView>>, GatewayError> {
    let Path(raw) = path?;
    let peer: UserId = raw.parse()?;
    history(&state, &session, Destination::User(peer)).await
}

/// `GET /api/messages/group/:groupId`
pub async fn group_history(
    State(state): State<Arc<GatewayState>>,
    CurrentSession(session): CurrentSession,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<EnvelopeView>>, GatewayError> {
    let Path(raw) = path?;
    let group: GroupId = raw.parse()?;
    history(&state, &session, Destination::Group(group)).await
}

async fn history(
    state: &GatewayState,
    session: &Session,
    destination: Destination,
) -> Result<Json<Vec<EnvelopeView>>, GatewayError> {
    let envelopes = state
        .backend
        .load_history(&session.identity, destination)
        .await?;
    debug!(
        user_id = %session.identity.user_id,
        %destination,
        count = envelopes.len(),
        "Loaded history"
    );
    Ok(Json(envelopes.into_iter().map(EnvelopeView::from).collect()))
}

/// `POST /api/messages/user/send`
pub async fn send_direct(
    State(state): State<Arc<GatewayState>>,
    CurrentSession(session): CurrentSession,
    payload: Result<Json<SendDirectRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, GatewayError> {
    let Json(request) = payload?;
    let recipient = request.recipient_id.into_user_id()?;
    send(&state, &session, Destination::User(recipient), &request.message).await
}

/// `POST /api/messages/group/send`
pub async fn send_group(
    State(state): State<Arc<GatewayState>>,
    CurrentSession(session): CurrentSession,
    payload: Result<Json<SendGroupRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, GatewayError> {
    let Json(request) = payload?;
    let group = request.group_id.into_group_id()?;
    send(&state, &session, Destination::Group(group), &request.message).await
}

async fn send(
    state: &GatewayState,
    session: &Session,
    destination: Destination,
    text: &str,
) -> Result<Json<SendResponse>, GatewayError> {
    let body = text.trim();
    if body.is_empty() {
        return Err(GatewayError::BadRequest(
            "Message must not be empty.".to_string(),
        ));
    }

    let sender = MessageSender {
        id: session.identity.user_id,
        username: session.identity.username.clone(),
    };
    let envelope = state
        .backend
        .send_once(OutgoingMessage::new(sender, destination, body))
        .await?;

    debug!(user_id = %envelope.sender.id, %destination, "Message sent");
    Ok(Json(SendResponse {
        success: true,
        timestamp: envelope.sent_at,
    }))
}

/// Server-sent events for one subscription.
pub type EventStream = Map<RelayStream, fn(MessageEnvelope) -> Result<Event, Infallible>>;

/// `GET /api/messages/user/stream`
pub async fn stream_direct(
    State(state): State<Arc<GatewayState>>,
    CurrentSession(session): CurrentSession,
) -> Result<Sse<EventStream>, GatewayError> {
    subscribe(&state, &session, Scope::Direct).await
}

/// `GET /api/messages/group/stream`
pub async fn stream_group(
    State(state): State<Arc<GatewayState>>,
    CurrentSession(session): CurrentSession,
) -> Result<Sse<EventStream>, GatewayError> {
    subscribe(&state, &session, Scope::Group).await
}

async fn subscribe(
    state: &GatewayState,
    session: &Session,
    scope: Scope,
) -> Result<Sse<EventStream>, GatewayError> {
    let stream = state.relay.open(&session.identity, scope).await?;
    let events = stream.map(push_event as fn(MessageEnvelope) -> Result<Event, Infallible>);
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(state.config.keep_alive)))
}

fn push_event(envelope: MessageEnvelope) -> Result<Event, Infallible> {
    let event = Event::default()
        .event("message")
        .json_data(EnvelopeView::from(envelope))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to encode push event");
            Event::default().comment("dropped")
        });
    Ok(event)
}
