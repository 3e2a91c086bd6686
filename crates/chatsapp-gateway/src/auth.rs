//! Session cookies and the authentication middleware.

use crate::error::GatewayError;
use crate::flash::{Flash, Notice};
use crate::server::GatewayState;
use crate::session::Session;
use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use tracing::debug;

/// Cookie carrying a notice code for visitors without a session.
pub const FLASH_COOKIE: &str = "chatsapp_flash";

/// Session cookie attributes.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub secure: bool,
}

impl CookieSettings {
    fn build(&self, name: String, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .secure(self.secure)
            .build()
    }

    /// Cookie holding a session token.
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        self.build(self.name.clone(), token)
    }

    /// Cookie that removes the session cookie.
    pub fn session_removal(&self) -> Cookie<'static> {
        self.build(self.name.clone(), String::new())
    }

    /// Cookie holding a notice for the next page view.
    pub fn flash_cookie(&self, notice: Notice) -> Cookie<'static> {
        self.build(FLASH_COOKIE.to_string(), notice.code().to_string())
    }

    /// Cookie that removes the notice cookie.
    pub fn flash_removal(&self) -> Cookie<'static> {
        self.build(FLASH_COOKIE.to_string(), String::new())
    }
}

/// Take the notice carried by the flash cookie, clearing it.
pub fn take_notice(jar: CookieJar, settings: &CookieSettings) -> (CookieJar, Option<Flash>) {
    let notice = match jar.get(FLASH_COOKIE) {
        Some(cookie) => Notice::from_code(cookie.value()),
        None => return (jar, None),
    };
    (jar.remove(settings.flash_removal()), notice.map(|n| n.flash()))
}

/// `302 Found` to `location`.
pub fn redirect(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Session resolved by the authentication middleware.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(GatewayError::Unauthenticated)
    }
}

/// Session resolved for a page render, with its pending flash.
#[derive(Debug, Clone)]
pub struct PageSession {
    pub session: Session,
    pub flash: Option<Flash>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PageSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PageSession>()
            .cloned()
            .ok_or_else(|| redirect("/login"))
    }
}

/// Resolve the session cookie for API routes, or reject with 401.
pub async fn require_session(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = jar
        .get(&state.cookies.name)
        .and_then(|cookie| state.sessions.resolve(cookie.value()));

    match session {
        Some(session) => {
            request.extensions_mut().insert(CurrentSession(session));
            next.run(request).await
        }
        None => GatewayError::Unauthenticated.into_response(),
    }
}

/// Resolve the session cookie for page routes, or redirect to the login page.
pub async fn require_page_session(
    State(state): State<Arc<GatewayState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = jar
        .get(&state.cookies.name)
        .and_then(|cookie| state.sessions.resolve_page(cookie.value()));

    match resolved {
        Some((session, flash)) => {
            request
                .extensions_mut()
                .insert(PageSession { session, flash });
            next.run(request).await
        }
        None => {
            debug!(path = %request.uri().path(), "No session, redirecting to login");
            redirect("/login")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secure: bool) -> CookieSettings {
        CookieSettings {
            name: "chatsapp_session".to_string(),
            secure,
        }
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = settings(false).session_cookie("abc".to_string());
        assert_eq!(cookie.name(), "chatsapp_session");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_ne!(cookie.secure(), Some(true));

        let cookie = settings(true).session_cookie("abc".to_string());
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_take_notice() {
        let settings = settings(false);
        let jar = CookieJar::new().add(settings.flash_cookie(Notice::UsernameTaken));

        let (_, flash) = take_notice(jar, &settings);
        assert_eq!(flash, Some(Notice::UsernameTaken.flash()));

        let (_, flash) = take_notice(CookieJar::new(), &settings);
        assert_eq!(flash, None);
    }

    #[test]
    fn test_unknown_notice_code_is_ignored() {
        let settings = settings(false);
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "whatever"));
        let (_, flash) = take_notice(jar, &settings);
        assert_eq!(flash, None);
    }

    #[test]
    fn test_redirect_is_found() {
        let response = redirect("/login");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }
}
