use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{auth::jwt::JwtKeys, error::AppError, state::AppState};

/// Trusted header carrying the session-resolved user id to handlers. Only the
/// gate writes it.
pub const USER_ID_HEADER: &str = "x-user-id";

pub const SESSION_COOKIE: &str = "session_token";

/// Bearer token first, then the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")));
    if bearer.is_some() {
        return bearer;
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|v| !v.is_empty())
}

/// Resolves the caller's session and stamps `x-user-id` on the request.
/// Anything a client sent in that header is discarded first.
pub async fn session_gate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if req.headers_mut().remove(USER_ID_HEADER).is_some() {
        warn!("dropped client-supplied x-user-id header");
    }

    let keys = JwtKeys::from_ref(&state);
    let user_id = session_token(req.headers())
        .ok_or(AppError::Unauthorized)
        .and_then(|token| {
            keys.verify_access(token).map_err(|e| {
                debug!(error = %e, "session rejected");
                AppError::Unauthorized
            })
        })?;

    let value = HeaderValue::from_str(&user_id.to_string())
        .map_err(|e| AppError::Internal(e.into()))?;
    req.headers_mut().insert(USER_ID_HEADER, value);
    Ok(next.run(req).await)
}

/// Identity of the caller, read from the header the gate injected.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let h = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "session_token=from-cookie"),
        ]);
        assert_eq!(session_token(&h), Some("from-header"));
    }

    #[test]
    fn reads_session_cookie_among_others() {
        let h = headers(&[(header::COOKIE, "theme=dark; session_token=abc.def; lang=en")]);
        assert_eq!(session_token(&h), Some("abc.def"));
    }

    #[test]
    fn missing_or_other_scheme_yields_none() {
        assert_eq!(session_token(&HeaderMap::new()), None);
        let h = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(session_token(&h), None);
        let h = headers(&[(header::COOKIE, "session_token=")]);
        assert_eq!(session_token(&h), None);
    }
}
