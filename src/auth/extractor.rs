//! Actix-web extractor for the triggering user.

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError};
use std::future::{Ready, ready};

use crate::config::USER_HEADER;
use crate::error::ErrorResponse;

/// Longest accepted identity value.
const MAX_IDENTITY_LEN: usize = 255;

/// Authentication error for extractors.
#[derive(Debug)]
pub struct AuthError {
    message: String,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::UNAUTHORIZED).json(ErrorResponse {
            error: "UNAUTHORIZED".to_string(),
            message: self.message.clone(),
        })
    }
}

/// Identity of the user making the request.
///
/// ```ignore
/// async fn handler(user: TriggeredBy) -> impl Responder {
///     // user.0 is the trimmed header value
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredBy(pub String);

impl TriggeredBy {
    fn from_header(req: &HttpRequest) -> Result<Self, AuthError> {
        let value = req
            .headers()
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError {
                message: format!("Missing {} header", USER_HEADER),
            })?;

        if value.len() > MAX_IDENTITY_LEN {
            return Err(AuthError {
                message: format!("{} header is too long", USER_HEADER),
            });
        }

        Ok(TriggeredBy(value.to_string()))
    }
}

impl FromRequest for TriggeredBy {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_header(req))
    }
}
