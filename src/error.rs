use std::fmt;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::errors::ErrorKind;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// The claim a token failed validation on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimKind {
    Expiry,
    Audience,
    Issuer,
    Subject,
    Other(String),
}

impl ClaimKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "exp" => Self::Expiry,
            "aud" => Self::Audience,
            "iss" => Self::Issuer,
            "sub" => Self::Subject,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expiry => f.write_str("expiry"),
            Self::Audience => f.write_str("audience"),
            Self::Issuer => f.write_str("issuer"),
            Self::Subject => f.write_str("subject"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No bearer credential was presented")]
    MissingCredential,
    #[error("Malformed token: {0}")]
    MalformedCredential(String),
    #[error("Token header has no key id")]
    MissingKeyId,
    #[error("Unsupported signing algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("No signing certificate for key id {0}")]
    KeyNotFound(String),
    #[error("Could not fetch signing certificates: {0}")]
    FetchFailure(String),
    #[error("Token signature is invalid")]
    SignatureInvalid,
    #[error("Token claim is invalid: {0}")]
    ClaimInvalid(ClaimKind),
    #[error("Access to this resource is not permitted")]
    Forbidden,
    #[error("Custom claims may not set reserved claim {0}")]
    ReservedClaim(String),
    #[error("Error signing token: {0}")]
    Signing(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential
            | Self::MalformedCredential(_)
            | Self::MissingKeyId
            | Self::UnsupportedAlgorithm(_)
            | Self::KeyNotFound(_)
            | Self::SignatureInvalid
            | Self::ClaimInvalid(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::FetchFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ReservedClaim(_) | Self::Signing(_) | Self::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Sorts a `jsonwebtoken` failure into the credential taxonomy.
    pub(crate) fn from_jwt(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            ErrorKind::ExpiredSignature => Self::ClaimInvalid(ClaimKind::Expiry),
            ErrorKind::InvalidAudience => Self::ClaimInvalid(ClaimKind::Audience),
            ErrorKind::InvalidIssuer => Self::ClaimInvalid(ClaimKind::Issuer),
            ErrorKind::InvalidSubject => Self::ClaimInvalid(ClaimKind::Subject),
            ErrorKind::MissingRequiredClaim(name) => Self::ClaimInvalid(ClaimKind::from_name(name)),
            ErrorKind::InvalidAlgorithm => Self::UnsupportedAlgorithm("mismatched".into()),
            _ => Self::MalformedCredential(error.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let status = self.status();
        let message = match status {
            StatusCode::UNAUTHORIZED => {
                // The exact failing check stays in the logs so callers can't probe for it.
                tracing::warn!("{}", self);
                "unauthorized".to_owned()
            }
            StatusCode::FORBIDDEN => {
                tracing::info!("{}", self);
                "forbidden".to_owned()
            }
            _ => {
                tracing::error!("{}", self);
                "Please try again later".to_owned()
            }
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_are_unauthorized() {
        for error in [
            AuthError::MissingCredential,
            AuthError::MalformedCredential("bad".into()),
            AuthError::MissingKeyId,
            AuthError::KeyNotFound("kid".into()),
            AuthError::SignatureInvalid,
            AuthError::ClaimInvalid(ClaimKind::Audience),
        ] {
            assert_eq!(error.status(), StatusCode::UNAUTHORIZED, "{error}");
        }
    }

    #[test]
    fn server_failures_are_5xx() {
        assert_eq!(
            AuthError::FetchFailure("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert!(AuthError::Signing("bad key".into()).status().is_server_error());
        assert_eq!(AuthError::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn jwt_errors_name_the_failed_claim() {
        let expired = jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature);
        assert!(matches!(
            AuthError::from_jwt(expired),
            AuthError::ClaimInvalid(ClaimKind::Expiry)
        ));

        let missing = jsonwebtoken::errors::Error::from(ErrorKind::MissingRequiredClaim(
            "sub".into(),
        ));
        assert!(matches!(
            AuthError::from_jwt(missing),
            AuthError::ClaimInvalid(ClaimKind::Subject)
        ));

        let signature = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature);
        assert!(matches!(AuthError::from_jwt(signature), AuthError::SignatureInvalid));
    }

    #[test]
    fn unauthorized_body_is_generic() {
        let response = AuthError::ClaimInvalid(ClaimKind::Issuer).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
