use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        cookie::{removal_cookie, session_cookie},
        dto::{
            LoginRequest, LoginResponse, MeResponse, MessageResponse, PublicUser,
            RegisterRequest, RegisterResponse,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        validation::{validate_login, validate_register, RegisterInput},
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let Json(payload) = payload?;
    let input = validate_register(&payload).map_err(|errors| {
        warn!(count = errors.len(), "register validation failed");
        AppError::Validation(errors)
    })?;

    let RegisterInput {
        username,
        email,
        password,
    } = input;

    if let Some(existing) = state
        .directory
        .find_by_email_or_username(&email, &username)
        .await?
    {
        let message = if existing.email == email {
            "Email is already registered"
        } else {
            "Username is already taken"
        };
        warn!(%email, %username, reason = message, "registration collision");
        return Err(AppError::Conflict(message.into()));
    }

    let hash = state.passwords.hash_blocking(password).await?;

    // A concurrent registration can still win the insert; the directory
    // reports that as a duplicate.
    let user = state.directory.create(&username, &email, &hash).await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully".into(),
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let Json(payload) = payload?;
    let input = validate_login(&payload).map_err(|errors| {
        warn!(count = errors.len(), "login validation failed");
        AppError::Validation(errors)
    })?;

    let email = input.email;
    let user = match state.directory.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            warn!(%email, "login unknown email");
            return Err(AppError::NotFound("User not found".into()));
        }
    };

    let ok = state
        .passwords
        .verify_blocking(input.password, user.password_hash.clone())
        .await?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.issue(user.id, &user.email)?;
    let cookie = session_cookie(token.clone(), keys.ttl, state.config.production);

    info!(user_id = %user.id, "user logged in");
    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            success: true,
            message: "Login successful".into(),
            token,
            user: user.into(),
        }),
    ))
}

/// Clears the session cookie. Tokens are stateless, so nothing is revoked server-side.
#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    info!("logout");
    (
        jar.add(removal_cookie()),
        Json(MessageResponse {
            success: true,
            message: "Logout successful".into(),
        }),
    )
}

#[instrument(skip(state, claims))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> AppResult<Json<MeResponse>> {
    let user = state
        .directory
        .find_by_id(claims.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(MeResponse {
        success: true,
        user: PublicUser::from(user),
    }))
}
