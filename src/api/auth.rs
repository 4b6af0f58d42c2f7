//! Authentication: signup, login, token refresh, logout and password reset.
//!
//! Sessions are a JWT pair: a short-lived access token and a longer refresh
//! token, both set as httpOnly cookies and also returned in the body for
//! non-browser clients. The `AuthUser` extractor accepts the cookie first
//! and falls back to an `Authorization: Bearer` header.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation::{validate_email, validate_name, validate_password};
use crate::db::{
    ForgotPasswordRequest, LoginRequest, PasswordResetToken, RefreshRequest, ResetPasswordRequest,
    SignupRequest, TokenPairResponse, User, UserResponse,
};
use crate::sanitize::sanitize_string;
use crate::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// JWT claims carried by both access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    /// Expiry as a unix timestamp
    pub exp: i64,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random reset token
fn generate_reset_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Sign a JWT for the user with the given secret and lifetime.
pub fn sign_token(user: &User, secret: &str, ttl_seconds: i64) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        exp: chrono::Utc::now().timestamp() + ttl_seconds,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Failed to sign token: {}", e);
        ApiError::internal("Failed to create session")
    })
}

/// Verify a JWT and return its claims. Expiry is checked by the library.
pub fn verify_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

fn issue_token_pair(state: &AppState, user: &User) -> Result<TokenPairResponse, ApiError> {
    let auth = &state.config.auth;
    let access_token = sign_token(
        user,
        &auth.access_token_secret,
        auth.access_token_ttl_minutes * 60,
    )?;
    let refresh_token = sign_token(
        user,
        &auth.refresh_token_secret,
        auth.refresh_token_ttl_days * 24 * 3600,
    )?;

    Ok(TokenPairResponse {
        access_token,
        refresh_token,
    })
}

fn auth_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn clear_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn with_session_cookies(jar: CookieJar, tokens: &TokenPairResponse) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, tokens.access_token.clone()))
        .add(auth_cookie(REFRESH_COOKIE, tokens.refresh_token.clone()))
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordResponse {
    pub message: String,
    /// Only populated when no mail transport is configured, so local
    /// setups can complete the flow without SMTP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_url: Option<String>,
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<UserResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_email(&request.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&request.password) {
        errors.add("password", e);
    }
    if let Err(e) = validate_name(&request.name) {
        errors.add("name", e);
    }
    errors.finish()?;

    let email = request.email.trim().to_lowercase();
    let name = sanitize_string(&request.name);

    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("Email já cadastrado"));
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        password_hash: hash_password(&request.password).map_err(|e| {
            tracing::error!("Failed to hash password: {}", e);
            ApiError::internal("Failed to create account")
        })?,
        name,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query("INSERT INTO users (id, email, password_hash, name, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.created_at)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %user.id, "New account created");

    let tokens = issue_token_pair(&state, &user)?;
    let jar = with_session_cookies(jar, &tokens);

    Ok((StatusCode::CREATED, jar, Json(UserResponse::from(user))))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<TokenPairResponse>), ApiError> {
    let email = request.email.trim().to_lowercase();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    // Same message for unknown email and wrong password
    let user = user.ok_or_else(|| ApiError::unauthorized("Credenciais inválidas"))?;
    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Credenciais inválidas"));
    }

    let tokens = issue_token_pair(&state, &user)?;
    let jar = with_session_cookies(jar, &tokens);

    tracing::info!(user_id = %user.id, "User logged in");

    Ok((jar, Json(tokens)))
}

/// POST /api/auth/refresh
///
/// Accepts the refresh token from the request body or the refreshToken
/// cookie, in that order.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<TokenPairResponse>), ApiError> {
    let token = body
        .and_then(|Json(r)| r.refresh_token)
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| ApiError::unauthorized("Refresh token ausente"))?;

    let claims = verify_token(&token, &state.config.auth.refresh_token_secret)
        .ok_or_else(|| ApiError::unauthorized("Refresh token inválido ou expirado"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::unauthorized("Refresh token inválido ou expirado"))?;

    let tokens = issue_token_pair(&state, &user)?;
    let jar = with_session_cookies(jar, &tokens);

    Ok((jar, Json(tokens)))
}

/// POST /api/auth/logout
pub async fn logout(jar: CookieJar) -> (StatusCode, CookieJar) {
    let jar = jar
        .remove(clear_cookie(ACCESS_COOKIE))
        .remove(clear_cookie(REFRESH_COOKIE));
    (StatusCode::NO_CONTENT, jar)
}

/// POST /api/auth/forgot-password
///
/// Always answers 200 with the same message so the endpoint cannot be used
/// to probe which emails have accounts.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let neutral = "Se o email estiver cadastrado, você receberá um link de recuperação".to_string();
    let email = request.email.trim().to_lowercase();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    let Some(user) = user else {
        return Ok(Json(ForgotPasswordResponse {
            message: neutral,
            reset_url: None,
        }));
    };

    let now = chrono::Utc::now();

    // A new request supersedes any outstanding tokens
    sqlx::query("UPDATE password_reset_tokens SET used_at = ? WHERE user_id = ? AND used_at IS NULL")
        .bind(now.to_rfc3339())
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    let token = generate_reset_token();
    let expires_at = (now + chrono::Duration::hours(1)).to_rfc3339();

    sqlx::query(
        "INSERT INTO password_reset_tokens (id, user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(&token)
    .bind(&expires_at)
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await?;

    let reset_url = format!("{}/reset-password/{}", state.config.server.app_url, token);

    if state.mailer.is_enabled() {
        if let Err(e) = state.mailer.send_password_reset(&user.email, &reset_url).await {
            tracing::error!(user_id = %user.id, "Failed to send reset email: {}", e);
        }
        Ok(Json(ForgotPasswordResponse {
            message: neutral,
            reset_url: None,
        }))
    } else {
        tracing::info!(user_id = %user.id, reset_url = %reset_url, "Password reset link (SMTP not configured)");
        Ok(Json(ForgotPasswordResponse {
            message: neutral,
            reset_url: Some(reset_url),
        }))
    }
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if request.token.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Token e senha são obrigatórios"));
    }
    if request.password.len() < 6 {
        return Err(ApiError::bad_request(
            "A senha deve ter pelo menos 6 caracteres",
        ));
    }

    let token: Option<PasswordResetToken> =
        sqlx::query_as("SELECT * FROM password_reset_tokens WHERE token = ?")
            .bind(&request.token)
            .fetch_optional(&state.db)
            .await?;
    let token = token.ok_or_else(|| ApiError::bad_request("Token inválido"))?;

    let now = chrono::Utc::now().to_rfc3339();
    if token.expires_at < now {
        return Err(ApiError::bad_request(
            "Token expirado. Solicite um novo link de recuperação",
        ));
    }
    if token.used_at.is_some() {
        return Err(ApiError::bad_request("Token já foi utilizado"));
    }

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to reset password")
    })?;

    // Setting the hash and consuming the token must not be torn apart
    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(&token.user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE password_reset_tokens SET used_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&token.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %token.user_id, "Password reset completed");

    Ok(Json(MessageResponse {
        message: "Senha alterada com sucesso".to_string(),
    }))
}

/// The authenticated caller, extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let token = jar
            .get(ACCESS_COOKIE)
            .map(|c| c.value().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get("Authorization")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .map(|t| t.to_string())
            })
            .ok_or_else(|| ApiError::unauthorized("Não autenticado"))?;

        let claims = verify_token(&token, &state.config.auth.access_token_secret)
            .ok_or_else(|| ApiError::unauthorized("Sessão inválida ou expirada"))?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}
