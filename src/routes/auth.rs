use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::{User, UserRepository};
use crate::error::AppError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub created_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: UserResponse,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new account. The account row is the identity record the
/// invitation reconciler resolves invitee emails against.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = normalize_email(&request.email);
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if request.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    if UserRepository::find_by_email(&state.db, &email)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)?;
    let user = UserRepository::create(&state.db, &email, &password_hash).await?;

    tracing::info!("Registered new account: {}", user.id);

    let (token, expires_at) = create_jwt(&state, &user.id)?;
    Ok(Json(AuthResponse {
        token,
        expires_at,
        user: user.into(),
    }))
}

/// Log in with email and password.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = normalize_email(&request.email);

    let user = UserRepository::find_by_email(&state.db, &email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !bcrypt::verify(&request.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let (token, expires_at) = create_jwt(&state, &user.id)?;
    Ok(Json(AuthResponse {
        token,
        expires_at,
        user: user.into(),
    }))
}

/// Get current user info
async fn me(
    State(_state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(user.into()))
}

/// Logout - invalidate session
async fn logout(State(_state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    // This service uses stateless JWTs for auth. There's no server-side
    // session to clear by default, but exposing a `/logout` endpoint ensures
    // the frontend can call it without 404s and provides a place to implement
    // server-side invalidation (e.g. token blacklist) in the future if needed.
    Ok(Json(serde_json::json!({ "message": "Logged out" })))
}

// ============================================================================
// Helper functions
// ============================================================================

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal shape check; real deliverability is the mail system's problem.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Create a signed JWT for a user id. Returns the token and its expiry
/// as a unix timestamp.
fn create_jwt(state: &Arc<AppState>, user_id: &str) -> Result<(String, i64), AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(state.config.jwt.expiration_hours);
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
    };

    let header = Header::default();
    let token = encode(
        &header,
        &claims,
        &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
    )?;
    Ok((token, exp.timestamp()))
}

/// Decode and validate a JWT, returning the claims
fn decode_jwt(state: &Arc<AppState>, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Get current user from a bearer token string
pub async fn get_user_from_token(
    state: &Arc<AppState>,
    token: &str,
) -> Result<User, AppError> {
    let claims = decode_jwt(state, token)?;
    let user = UserRepository::find_by_id(&state.db, &claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(user)
}

// ============================================================================
// Auth Middleware / Extractor
// ============================================================================

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Extractor for authenticated user
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Extract Authorization header (Bearer token)
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() {
            tracing::debug!("Empty bearer token in Authorization header");
            return Err(AppError::Unauthorized);
        }

        let user = get_user_from_token(state, token).await.map_err(|e| {
            tracing::debug!("Failed to get user from token: {:?}", e);
            e
        })?;

        tracing::debug!("Authenticated user: {}", user.id);
        Ok(AuthUser(user))
    }
}
