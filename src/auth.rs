use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info};
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Connection, ToSql,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

use crate::api::state::AppState;
use crate::config::AuthConfig;
use crate::error::AbsensiError;
use crate::users::User;

const INVALID_TOKEN: &str = "Authorization failed, token is invalid or expired";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Guru,
    Siswa,
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_ref()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Role::from_str(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Token payload. `id` is the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signing material and lifetime for session tokens
#[derive(Debug, Clone)]
pub struct AuthKeys {
    pub secret: String,
    pub token_ttl_secs: i64,
}

impl AuthKeys {
    pub fn from_config(config: &AuthConfig) -> Self {
        AuthKeys {
            secret: config.jwt_secret.clone(),
            token_ttl_secs: config.token_ttl_hours * 3600,
        }
    }
}

pub fn issue_token(user_id: i64, role: Role, keys: &AuthKeys, now: i64) -> Result<String, AbsensiError> {
    let claims = Claims {
        id: user_id,
        role,
        iat: now,
        exp: now + keys.token_ttl_secs,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(keys.secret.as_bytes()),
    )
    .map_err(|e| AbsensiError::Error(format!("Failed to sign token: {}", e)))
}

/// Verifies the signature and checks expiry against `now` (Unix seconds).
pub fn verify_token(token: &str, secret: &str, now: i64) -> Result<Claims, AbsensiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        debug!("Token rejected: {}", e);
        AbsensiError::Auth(INVALID_TOKEN.to_string())
    })?;

    if data.claims.exp <= now {
        return Err(AbsensiError::Auth(INVALID_TOKEN.to_string()));
    }

    Ok(data.claims)
}

pub fn hash_password(password: &str) -> Result<String, AbsensiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AbsensiError::Error(format!("Failed to hash password: {}", e)))
}

/// False for a wrong password and for a hash that does not parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub token: String,
    pub message: String,
}

pub fn login(
    conn: &Connection,
    req: &LoginRequest,
    keys: &AuthKeys,
    now: i64,
) -> Result<LoginResponse, AbsensiError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AbsensiError::Validation("Please enter all fields".to_string()));
    }

    let (user, hash) = User::get_by_username_with_hash(conn, req.username.trim())?
        .ok_or_else(|| AbsensiError::Auth("Invalid username or password".to_string()))?;

    if !verify_password(&req.password, &hash) {
        return Err(AbsensiError::Auth("Invalid username or password".to_string()));
    }

    let token = issue_token(user.user_id, user.role, keys, now)?;
    info!("User '{}' logged in as {}", user.username, user.role);

    Ok(LoginResponse {
        user_id: user.user_id,
        username: user.username,
        role: user.role,
        token,
        message: "Login successful".to_string(),
    })
}

/// The authenticated caller, re-read from the database on every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require(&self, roles: &[Role]) -> Result<(), AbsensiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AbsensiError::Forbidden(
                "You do not have permission to access this route".to_string(),
            ))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AbsensiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AbsensiError::Auth("No token, authorization denied".to_string()))?;

        let claims = verify_token(token, &state.auth.secret, Utc::now().timestamp())?;

        let user = state
            .db
            .run(move |conn| User::get_by_id(conn, claims.id))
            .await?
            .ok_or_else(|| {
                AbsensiError::Auth("Authorization failed, user no longer exists".to_string())
            })?;

        Ok(AuthUser {
            id: user.user_id,
            username: user.username,
            role: user.role,
        })
    }
}
