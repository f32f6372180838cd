pub mod academic_years;
pub mod admin;
pub mod app;
pub mod attendance;
pub mod auth;
pub mod classes;
pub mod guru;
pub mod homerooms;
pub mod notifications;
pub mod qr;
pub mod settings;
pub mod siswa;
pub mod state;
pub mod students;
pub mod teachers;

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::auth::Role;
use crate::error::AbsensiError;

pub const ADMIN: &[Role] = &[Role::Admin];
/// Roles allowed to scan and read recaps
pub const STAFF: &[Role] = &[Role::Guru, Role::Admin];

/// `{ "message": ... }`
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `{ "message": ..., "data": ... }` returned by writes that echo the record
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// JSON request body. Rejected bodies are answered with the
/// `{message, success:false}` error envelope.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AbsensiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(AbsensiError::Validation(rejection.body_text())),
        }
    }
}
