use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, PublicUser, RefreshRequest, SessionResponse, SignInRequest, SignUpRequest},
        gate::{session_gate, AuthUser, SESSION_COOKIE},
        jwt::JwtKeys,
        password::{hash_password, is_valid_email, normalize_email, verify_password, MIN_PASSWORD_LEN},
        repo_types::{NewUser, User},
    },
    error::AppError,
    state::AppState,
    tasks::dto::MessageResponse,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/refresh", post(refresh))
        .route("/auth/sign-out", post(sign_out))
}

pub fn session_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/session", get(get_session))
        .route_layer(middleware::from_fn_with_state(state.clone(), session_gate))
}

fn session_cookie(state: &AppState, token: &str, max_age_secs: u64) -> Result<HeaderValue, AppError> {
    let secure = if state.config.cookie_secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}{secure}"
    ))
    .map_err(|e| AppError::Internal(e.into()))
}

/// Issues a token pair for `user` and sets the session cookie.
fn issue_session(state: &AppState, user: User) -> Result<(HeaderMap, AuthResponse), AppError> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        session_cookie(state, &access_token, keys.access_ttl.as_secs())?,
    );
    Ok((
        headers,
        AuthResponse {
            access_token,
            refresh_token,
            user: user.into(),
        },
    ))
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| email.split('@').next())
        .unwrap_or_default()
        .to_owned();

    let user = state
        .users
        .create(NewUser {
            name,
            email: email.clone(),
            image: payload.image,
            password_hash: hash_password(&payload.password)?,
        })
        .await?
        .ok_or_else(|| {
            warn!(%email, "email already registered");
            AppError::Conflict("Email already registered".into())
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    let (headers, body) = issue_session(&state, user)?;
    Ok((StatusCode::CREATED, headers, Json(body)))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "sign-in for unknown email");
        return Err(AppError::InvalidCredentials);
    };
    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "sign-in with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user signed in");
    let (headers, body) = issue_session(&state, user)?;
    Ok((headers, Json(body)))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let keys = JwtKeys::from_ref(&state);
    let user_id: Uuid = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthorized
    })?;
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let (headers, body) = issue_session(&state, user)?;
    Ok((headers, Json(body)))
}

/// Sessions are stateless tokens; signing out only clears the cookie.
#[instrument(skip(state))]
pub async fn sign_out(
    State(state): State<AppState>,
) -> Result<(HeaderMap, Json<MessageResponse>), AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&state, "", 0)?);
    Ok((
        headers,
        Json(MessageResponse {
            message: "Signed out".into(),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<SessionResponse>, AppError> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(%user_id, "session for unknown user");
        AppError::Unauthorized
    })?;
    Ok(Json(SessionResponse {
        user: PublicUser::from(user),
    }))
}
