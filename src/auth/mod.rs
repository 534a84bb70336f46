/*!
 * # Authentication and Authorization Module
 *
 * Bearer-token authentication for the meals API.
 *
 * - Tokens are HS256 JWTs carrying the user id, email, name and role.
 * - `auth_context_middleware` runs on every request and attaches an [`AuthUser`]
 *   when a valid token is presented. A present but invalid token is rejected with 401.
 * - Route groups opt into `with_auth` (any signed-in user) or `with_roles` (401 when
 *   anonymous, 403 when the role does not match).
 * - Logout revokes the token id in an in-memory blacklist until the token expires.
 */

pub mod password;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{user, UserRole};
use crate::errors::ErrorResponse;

pub use password::{hash_password, validate_password, verify_password, PasswordPolicyError};

const DEFAULT_ISSUER: &str = "meals-api";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // Subject (user ID)
    pub name: String,  // User's name
    pub email: String, // User's email
    pub role: UserRole,
    pub jti: String, // JWT ID (unique identifier for this token)
    pub iat: i64,    // Issued at time
    pub exp: i64,    // Expiration time
    pub nbf: i64,    // Not valid before time
    pub iss: String, // Issuer
}

/// Authenticated caller, attached to request extensions by the auth layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: UserRole) -> bool {
        self.role == role
    }

    /// Check if the user is an admin
    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin)
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(AuthError::InvalidToken)?;
        Ok(Self {
            user_id,
            name: claims.name,
            email: claims.email,
            role: claims.role,
            token_id: claims.jti,
            expires_at,
        })
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, access_token_expiration: Duration) -> Self {
        Self {
            jwt_secret,
            jwt_issuer: DEFAULT_ISSUER.to_string(),
            access_token_expiration,
        }
    }
}

impl From<&crate::config::AppConfig> for AuthConfig {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(cfg.jwt_expiration_secs),
        )
    }
}

/// Signed token handed to the client after login or registration
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Token blacklist entry
#[derive(Clone, Debug)]
struct BlacklistedToken {
    jti: String,
    expiry: DateTime<Utc>,
}

/// Authentication service that handles token issuance and validation
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    blacklisted_tokens: Arc<RwLock<Vec<BlacklistedToken>>>,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            blacklisted_tokens: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Generate a JWT for a user
    pub fn generate_token(&self, user: &user::Model) -> Result<AccessToken, AuthError> {
        let now = Utc::now();
        let expiration = ChronoDuration::from_std(self.config.access_token_expiration)
            .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + expiration).timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(AccessToken {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: expiration.num_seconds(),
        })
    }

    /// Validate a JWT and extract the claims
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.validate_nbf = true;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if self.is_token_blacklisted(&claims.jti).await {
            return Err(AuthError::RevokedToken);
        }

        Ok(claims)
    }

    /// Revoke a token until it would have expired anyway
    pub async fn revoke(&self, user: &AuthUser) {
        let mut blacklist = self.blacklisted_tokens.write().await;
        blacklist.push(BlacklistedToken {
            jti: user.token_id.clone(),
            expiry: user.expires_at,
        });
        Self::clean_blacklist(&mut blacklist);
    }

    async fn is_token_blacklisted(&self, token_id: &str) -> bool {
        let blacklist = self.blacklisted_tokens.read().await;
        blacklist.iter().any(|t| t.jti == token_id)
    }

    fn clean_blacklist(blacklist: &mut Vec<BlacklistedToken>) {
        let now = Utc::now();
        blacklist.retain(|t| t.expiry > now);
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuth
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::RevokedToken => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::TokenCreation(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::MissingAuth => "Authentication required".to_string(),
            Self::TokenCreation(msg) | Self::InternalError(msg) => {
                tracing::error!("auth failure: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse::new(status, message))).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the caller from the `Authorization` header when one is present
pub async fn auth_context_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Some(token) = bearer_token(request.headers()) {
        let claims = auth_service.validate_token(token).await.map_err(|e| {
            debug!("rejected bearer token: {}", e);
            e
        })?;
        let user = AuthUser::try_from(claims)?;
        request.extensions_mut().insert(user);
    }

    Ok(next.run(request).await)
}

/// Rejects anonymous requests
pub async fn require_auth_middleware(request: Request, next: Next) -> Result<Response, AuthError> {
    if request.extensions().get::<AuthUser>().is_none() {
        return Err(AuthError::MissingAuth);
    }
    Ok(next.run(request).await)
}

/// Role middleware to check if a user has one of the allowed roles
pub async fn role_middleware(
    State(allowed_roles): State<Arc<[UserRole]>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user,
        None => return Err(AuthError::MissingAuth),
    };

    if !allowed_roles.contains(&user.role) {
        warn!(
            user_id = %user.user_id,
            role = %user.role,
            path = %request.uri().path(),
            "role check failed"
        );
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_roles(self, roles: &[UserRole]) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.route_layer(axum::middleware::from_fn(require_auth_middleware))
    }

    fn with_roles(self, roles: &[UserRole]) -> Self {
        let allowed: Arc<[UserRole]> = roles.into();
        self.route_layer(axum::middleware::from_fn_with_state(
            allowed,
            role_middleware,
        ))
    }
}
